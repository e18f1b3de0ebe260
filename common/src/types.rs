use serde::{Deserialize, Serialize};

/// Lowest setpoint the radiator valve accepts, in °C.
pub const MIN_SET_POINT_C: f32 = 5.0;
/// Highest setpoint the radiator valve accepts, in °C.
pub const MAX_SET_POINT_C: f32 = 30.0;
/// Setpoint granularity advertised to Home Assistant.
pub const SET_POINT_STEP_C: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Home,
    Away,
    Off,
}

impl Mode {
    /// Declared evaluation order. Mode guessing breaks ties in favour of the
    /// earliest entry.
    pub const ALL: [Mode; 3] = [Mode::Home, Mode::Away, Mode::Off];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Home => "home",
            Self::Away => "away",
            Self::Off => "off",
        }
    }

    /// Home Assistant `away_mode` state.
    pub fn away_state(self) -> &'static str {
        match self {
            Self::Away => "ON",
            Self::Home | Self::Off => "OFF",
        }
    }

    /// Home Assistant HVAC mode. Home and Away both heat.
    pub fn hvac_mode(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Home | Self::Away => "heat",
        }
    }
}

/// Target temperature per mode. Every mode always has an entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SetPoints {
    pub home: f32,
    pub away: f32,
    #[serde(default = "default_off_set_point")]
    pub off: f32,
}

pub(crate) fn default_off_set_point() -> f32 {
    MIN_SET_POINT_C
}

impl SetPoints {
    /// Home and Away share `value`; Off holds the valve at its minimum.
    pub fn uniform(value: f32) -> Self {
        Self {
            home: value,
            away: value,
            off: MIN_SET_POINT_C,
        }
    }

    pub fn get(&self, mode: Mode) -> f32 {
        match mode {
            Mode::Home => self.home,
            Mode::Away => self.away,
            Mode::Off => self.off,
        }
    }

    pub fn set(&mut self, mode: Mode, value: f32) {
        match mode {
            Mode::Home => self.home = value,
            Mode::Away => self.away = value,
            Mode::Off => self.off = value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryReading {
    pub level: u8,
    pub sampled_at: chrono::DateTime<chrono::Utc>,
}

/// Retained per-device state document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatePayload {
    pub away_mode: &'static str,
    pub mode: &'static str,
    pub target_temp: f32,
    pub current_temp: f32,
    pub offset: f32,
    pub battery: Option<u8>,
}
