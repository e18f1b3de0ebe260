use std::{collections::HashSet, fmt};

use serde::{Deserialize, Serialize};

use crate::{
    error::ConfigError,
    topics::device_id,
    types::{Mode, SetPoints, MAX_SET_POINT_C, MIN_SET_POINT_C},
};

/// Device authentication key. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(Vec<u8>);

impl Secret {
    pub fn from_hex(raw: &str) -> Result<Self, hex::FromHexError> {
        hex::decode(raw.trim()).map(Self)
    }

    pub fn expose(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(**redacted**)")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub pass: String,
    pub client_id: String,
    pub keep_alive_secs: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 1883,
            user: String::new(),
            pass: String::new(),
            client_id: "etrv-bridge".to_string(),
            keep_alive_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
    #[serde(default = "default_discovery_prefix")]
    pub discovery_prefix: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default)]
    pub thermostats: Vec<DeviceConfig>,
}

fn default_topic_prefix() -> String {
    "etrv".to_string()
}

fn default_discovery_prefix() -> String {
    "homeassistant".to_string()
}

fn default_poll_interval_secs() -> u64 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub name: String,
    pub address: String,
    /// Hex-encoded key.
    pub secret: String,
    #[serde(default)]
    pub set_point: Option<f32>,
    #[serde(default)]
    pub set_points: Option<SetPoints>,
    #[serde(default)]
    pub offset: f32,
    #[serde(default)]
    pub remote_sensor_topic: Option<String>,
    #[serde(default)]
    pub mode: Option<Mode>,
    #[serde(default)]
    pub guess_mode: bool,
}

/// How a thermostat's mode is established at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupMode {
    Explicit(Mode),
    Guess,
}

/// Static description of one thermostat, resolved from its config entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub name: String,
    pub address: String,
    pub set_points: SetPoints,
    pub offset: f32,
    pub remote_sensor_topic: Option<String>,
}

impl BridgeConfig {
    pub fn from_json(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }

    /// Validate all entries. Reports every violation, not just the first one.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if self.mqtt.host.trim().is_empty() {
            errors.push("mqtt: host is empty".to_string());
        }
        if self.mqtt.client_id.trim().is_empty() {
            errors.push("mqtt: client_id is empty".to_string());
        }
        if self.topic_prefix.trim().is_empty() || self.topic_prefix.contains(['+', '#']) {
            errors.push(format!(
                "topic_prefix '{}' must be a non-empty topic without wildcards",
                self.topic_prefix
            ));
        }
        if self.discovery_prefix.trim().is_empty() {
            errors.push("discovery_prefix is empty".to_string());
        }
        if self.poll_interval_secs == 0 {
            errors.push("poll_interval_secs must be positive".to_string());
        }

        self.validate_thermostats(&mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }

    fn validate_thermostats(&self, errors: &mut Vec<String>) {
        let mut seen_names: HashSet<&str> = HashSet::new();
        let mut seen_ids: HashSet<String> = HashSet::new();

        for (i, t) in self.thermostats.iter().enumerate() {
            let ctx = || {
                if t.name.trim().is_empty() {
                    format!("thermostats[{i}]")
                } else {
                    format!("thermostat '{}'", t.name)
                }
            };

            if t.name.trim().is_empty() {
                errors.push(format!("{}: name is empty", ctx()));
            } else if !seen_names.insert(&t.name) {
                errors.push(format!("{}: duplicate name", ctx()));
            }

            let id = device_id(&t.address);
            if id.is_empty() {
                errors.push(format!("{}: address is empty", ctx()));
            } else if !seen_ids.insert(id) {
                errors.push(format!("{}: duplicate address '{}'", ctx(), t.address));
            }

            if Secret::from_hex(&t.secret).is_err() {
                errors.push(format!("{}: secret is not valid hex", ctx()));
            }

            match t.set_points() {
                Some(points) => {
                    for mode in Mode::ALL {
                        let value = points.get(mode);
                        if !value.is_finite()
                            || !(MIN_SET_POINT_C..=MAX_SET_POINT_C).contains(&value)
                        {
                            errors.push(format!(
                                "{}: {} set point {} out of range [{}, {}]",
                                ctx(),
                                mode.as_str(),
                                value,
                                MIN_SET_POINT_C,
                                MAX_SET_POINT_C
                            ));
                        }
                    }
                }
                None => errors.push(format!(
                    "{}: neither set_point nor set_points configured",
                    ctx()
                )),
            }

            if !t.offset.is_finite() {
                errors.push(format!("{}: offset must be finite", ctx()));
            }

            if let Some(topic) = &t.remote_sensor_topic {
                if topic.trim().is_empty() {
                    errors.push(format!("{}: remote_sensor_topic is empty", ctx()));
                }
            }

            if t.mode.is_none() && !t.guess_mode {
                errors.push(format!(
                    "{}: no mode configured and guess_mode is disabled",
                    ctx()
                ));
            }
        }
    }
}

impl DeviceConfig {
    /// `set_points` wins over the single `set_point` when both are present.
    pub fn set_points(&self) -> Option<SetPoints> {
        self.set_points
            .or_else(|| self.set_point.map(SetPoints::uniform))
    }

    pub fn secret(&self) -> Result<Secret, ConfigError> {
        Secret::from_hex(&self.secret).map_err(|source| ConfigError::InvalidSecret {
            name: self.name.clone(),
            source,
        })
    }

    pub fn startup_mode(&self) -> Result<StartupMode, ConfigError> {
        match (self.mode, self.guess_mode) {
            (Some(mode), _) => Ok(StartupMode::Explicit(mode)),
            (None, true) => Ok(StartupMode::Guess),
            (None, false) => Err(ConfigError::ModeUnresolved {
                name: self.name.clone(),
            }),
        }
    }

    pub fn profile(&self) -> Result<Profile, ConfigError> {
        let set_points = self.set_points().ok_or_else(|| ConfigError::MissingSetPoint {
            name: self.name.clone(),
        })?;

        Ok(Profile {
            name: self.name.clone(),
            address: self.address.clone(),
            set_points,
            offset: self.offset,
            remote_sensor_topic: self.remote_sensor_topic.clone(),
        })
    }
}
