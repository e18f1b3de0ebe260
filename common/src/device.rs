//! Seam between the controller and a radiator valve.
//!
//! The valve is reached through a connection-per-operation transport: every
//! logical action opens a BLE connection, does its reads and writes, and must
//! release the connection with [`DeviceTransport::disconnect`] whether or not
//! the action succeeded.

use crate::error::DeviceError;

#[allow(async_fn_in_trait)]
pub trait DeviceTransport {
    /// Setpoint currently active on the valve, offset included.
    async fn read_set_point(&mut self) -> Result<f32, DeviceError>;

    async fn write_set_point(&mut self, value: f32) -> Result<(), DeviceError>;

    async fn read_room_temperature(&mut self) -> Result<f32, DeviceError>;

    /// Battery charge in percent.
    async fn read_battery(&mut self) -> Result<u8, DeviceError>;

    async fn disconnect(&mut self) -> Result<(), DeviceError>;
}

/// Combine the outcome of an operation with the outcome of releasing the
/// connection afterwards. The operation's own error takes precedence.
pub(crate) fn released<T>(
    outcome: Result<T, DeviceError>,
    release: Result<(), DeviceError>,
) -> Result<T, DeviceError> {
    let value = outcome?;
    release?;
    Ok(value)
}
