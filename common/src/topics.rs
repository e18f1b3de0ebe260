pub const AWAY_MODE_COMMAND: &str = "away_mode/command";
pub const MODE_COMMAND: &str = "mode/command";
pub const TEMP_COMMAND: &str = "temp/command";
pub const STATE: &str = "state";

/// Topic-safe identifier: the device address with `:` and `-` removed.
pub fn device_id(address: &str) -> String {
    address
        .trim()
        .chars()
        .filter(|c| !matches!(c, ':' | '-'))
        .collect()
}

/// Every topic one thermostat reads or writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTopics {
    pub id: String,
    pub away_mode_command: String,
    pub mode_command: String,
    pub temp_command: String,
    pub state: String,
    pub climate_config: String,
    pub battery_config: String,
    pub offset_config: String,
}

impl DeviceTopics {
    pub fn new(prefix: &str, discovery_prefix: &str, address: &str) -> Self {
        let id = device_id(address);
        let base = format!("{prefix}/{id}");

        Self {
            away_mode_command: format!("{base}/{AWAY_MODE_COMMAND}"),
            mode_command: format!("{base}/{MODE_COMMAND}"),
            temp_command: format!("{base}/{TEMP_COMMAND}"),
            state: format!("{base}/{STATE}"),
            climate_config: format!("{discovery_prefix}/climate/{id}-climate/config"),
            battery_config: format!("{discovery_prefix}/sensor/{id}-battery/config"),
            offset_config: format!("{discovery_prefix}/sensor/{id}-offset/config"),
            id,
        }
    }

    pub fn command_topics(&self) -> [&str; 3] {
        [
            &self.away_mode_command,
            &self.mode_command,
            &self.temp_command,
        ]
    }
}
