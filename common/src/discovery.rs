//! Home Assistant MQTT discovery documents.
//!
//! Each thermostat is announced as one climate entity plus two sensors
//! (battery and learned offset). All three read from the retained state topic
//! through value templates.

use serde::Serialize;

use crate::{
    topics::DeviceTopics,
    types::{MAX_SET_POINT_C, MIN_SET_POINT_C, SET_POINT_STEP_C},
};

const MANUFACTURER: &str = "Danfoss";
const MODEL: &str = "eTRV";

#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    pub identifiers: Vec<String>,
    pub name: String,
    pub manufacturer: &'static str,
    pub model: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClimateConfig {
    pub name: String,
    pub unique_id: String,
    pub device: DeviceInfo,
    pub modes: [&'static str; 2],
    pub mode_command_topic: String,
    pub mode_state_topic: String,
    pub mode_state_template: &'static str,
    pub temperature_command_topic: String,
    pub temperature_state_topic: String,
    pub temperature_state_template: &'static str,
    pub current_temperature_topic: String,
    pub current_temperature_template: &'static str,
    pub away_mode_command_topic: String,
    pub away_mode_state_topic: String,
    pub away_mode_state_template: &'static str,
    pub min_temp: f32,
    pub max_temp: f32,
    pub temp_step: f32,
    pub precision: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SensorConfig {
    pub name: String,
    pub unique_id: String,
    pub device: DeviceInfo,
    pub state_topic: String,
    pub value_template: &'static str,
    pub unit_of_measurement: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<&'static str>,
    pub entity_category: &'static str,
}

fn device_info(topics: &DeviceTopics, name: &str) -> DeviceInfo {
    DeviceInfo {
        identifiers: vec![topics.id.clone()],
        name: name.to_string(),
        manufacturer: MANUFACTURER,
        model: MODEL,
    }
}

pub fn climate(topics: &DeviceTopics, name: &str) -> ClimateConfig {
    ClimateConfig {
        name: name.to_string(),
        unique_id: format!("{}-climate", topics.id),
        device: device_info(topics, name),
        modes: ["heat", "off"],
        mode_command_topic: topics.mode_command.clone(),
        mode_state_topic: topics.state.clone(),
        mode_state_template: "{{ value_json.mode }}",
        temperature_command_topic: topics.temp_command.clone(),
        temperature_state_topic: topics.state.clone(),
        temperature_state_template: "{{ value_json.target_temp }}",
        current_temperature_topic: topics.state.clone(),
        current_temperature_template: "{{ value_json.current_temp }}",
        away_mode_command_topic: topics.away_mode_command.clone(),
        away_mode_state_topic: topics.state.clone(),
        away_mode_state_template: "{{ value_json.away_mode }}",
        min_temp: MIN_SET_POINT_C,
        max_temp: MAX_SET_POINT_C,
        temp_step: SET_POINT_STEP_C,
        precision: SET_POINT_STEP_C,
    }
}

pub fn battery_sensor(topics: &DeviceTopics, name: &str) -> SensorConfig {
    SensorConfig {
        name: format!("{name} battery"),
        unique_id: format!("{}-battery", topics.id),
        device: device_info(topics, name),
        state_topic: topics.state.clone(),
        value_template: "{{ value_json.battery }}",
        unit_of_measurement: "%",
        device_class: Some("battery"),
        entity_category: "diagnostic",
    }
}

pub fn offset_sensor(topics: &DeviceTopics, name: &str) -> SensorConfig {
    SensorConfig {
        name: format!("{name} offset"),
        unique_id: format!("{}-offset", topics.id),
        device: device_info(topics, name),
        state_topic: topics.state.clone(),
        value_template: "{{ value_json.offset }}",
        unit_of_measurement: "°C",
        device_class: None,
        entity_category: "diagnostic",
    }
}

/// `(topic, body)` for the climate, battery and offset announcements.
pub fn announcements(
    topics: &DeviceTopics,
    name: &str,
) -> Result<[(String, Vec<u8>); 3], serde_json::Error> {
    Ok([
        (
            topics.climate_config.clone(),
            serde_json::to_vec(&climate(topics, name))?,
        ),
        (
            topics.battery_config.clone(),
            serde_json::to_vec(&battery_sensor(topics, name))?,
        ),
        (
            topics.offset_config.clone(),
            serde_json::to_vec(&offset_sensor(topics, name))?,
        ),
    ])
}
