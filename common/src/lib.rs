pub mod broker;
pub mod commands;
pub mod config;
pub mod device;
pub mod discovery;
pub mod error;
pub mod poll;
pub mod router;
pub mod thermostat;
pub mod topics;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use broker::Broker;
pub use commands::{Command, Route};
pub use config::{BridgeConfig, DeviceConfig, MqttConfig, Profile, Secret, StartupMode};
pub use device::DeviceTransport;
pub use error::{BrokerError, ConfigError, DeviceError, Error, PayloadError};
pub use poll::BatterySweep;
pub use router::Router;
pub use thermostat::Thermostat;
pub use topics::DeviceTopics;
pub use types::{BatteryReading, Mode, SetPoints, StatePayload};
