use crate::{
    error::PayloadError,
    types::{Mode, MAX_SET_POINT_C, MIN_SET_POINT_C},
};

/// Largest inbound payload considered for parsing.
pub const MAX_PAYLOAD_BYTES: usize = 512;

/// Plausible range for a room temperature reported by a remote sensor.
const REMOTE_RANGE_C: std::ops::RangeInclusive<f32> = -40.0..=85.0;

/// Which per-device topic a message arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    AwayMode,
    Mode,
    SetPoint,
    Remote,
}

impl Route {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AwayMode => "away_mode",
            Self::Mode => "mode",
            Self::SetPoint => "temp",
            Self::Remote => "remote",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    SetMode(Mode),
    SetPoint(f32),
    Remote(f32),
}

pub fn parse_command(route: Route, payload: &[u8]) -> Result<Command, PayloadError> {
    match route {
        Route::AwayMode => parse_away_mode(payload).map(Command::SetMode),
        Route::Mode => parse_mode(payload).map(Command::SetMode),
        Route::SetPoint => parse_set_point(payload).map(Command::SetPoint),
        Route::Remote => parse_remote_temperature(payload).map(Command::Remote),
    }
}

/// `on` enters Away, `off` returns Home.
pub fn parse_away_mode(payload: &[u8]) -> Result<Mode, PayloadError> {
    let text = payload_text(payload)?;
    match text.to_ascii_lowercase().as_str() {
        "on" => Ok(Mode::Away),
        "off" => Ok(Mode::Home),
        _ => Err(PayloadError::UnknownToken(text.to_string())),
    }
}

/// `heat` selects Home, `off` selects Off.
pub fn parse_mode(payload: &[u8]) -> Result<Mode, PayloadError> {
    let text = payload_text(payload)?;
    match text.to_ascii_lowercase().as_str() {
        "heat" => Ok(Mode::Home),
        "off" => Ok(Mode::Off),
        _ => Err(PayloadError::UnknownToken(text.to_string())),
    }
}

pub fn parse_set_point(payload: &[u8]) -> Result<f32, PayloadError> {
    let value = parse_float(payload)?;
    if (MIN_SET_POINT_C..=MAX_SET_POINT_C).contains(&value) {
        Ok(value)
    } else {
        Err(PayloadError::OutOfRange(value))
    }
}

pub fn parse_remote_temperature(payload: &[u8]) -> Result<f32, PayloadError> {
    let value = parse_float(payload)?;
    if REMOTE_RANGE_C.contains(&value) {
        Ok(value)
    } else {
        Err(PayloadError::OutOfRange(value))
    }
}

fn parse_float(payload: &[u8]) -> Result<f32, PayloadError> {
    let text = payload_text(payload)?;
    let value = text
        .parse::<f32>()
        .map_err(|_| PayloadError::NotANumber(text.to_string()))?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(PayloadError::NotANumber(text.to_string()))
    }
}

fn payload_text(payload: &[u8]) -> Result<&str, PayloadError> {
    if payload.len() > MAX_PAYLOAD_BYTES {
        return Err(PayloadError::TooLarge(payload.len()));
    }
    std::str::from_utf8(payload)
        .map(str::trim)
        .map_err(|_| PayloadError::NotUtf8)
}
