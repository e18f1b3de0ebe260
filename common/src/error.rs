use thiserror::Error;

/// Transient failure talking to a valve over BLE.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("communication with {address} failed: {reason}")]
    Communication { address: String, reason: String },
    #[error("{address} did not answer in time")]
    Timeout { address: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("broker request failed: {0}")]
pub struct BrokerError(pub String);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config validation failed:\n  - {}", .0.join("\n  - "))]
    Invalid(Vec<String>),
    #[error("thermostat '{name}': no mode configured and mode guessing disabled")]
    ModeUnresolved { name: String },
    #[error("thermostat '{name}': secret is not valid hex")]
    InvalidSecret {
        name: String,
        #[source]
        source: hex::FromHexError,
    },
    #[error("thermostat '{name}': neither set_point nor set_points configured")]
    MissingSetPoint { name: String },
}

/// Inbound payload that could not be turned into a command.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PayloadError {
    #[error("payload of {0} bytes exceeds the limit")]
    TooLarge(usize),
    #[error("payload is not utf-8")]
    NotUtf8,
    #[error("unknown command '{0}'")]
    UnknownToken(String),
    #[error("'{0}' is not a number")]
    NotANumber(String),
    #[error("{0} is outside the accepted range")]
    OutOfRange(f32),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Broker(#[from] BrokerError),
    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}
