use std::time::Duration;

use tracing::{debug, warn};

use etrv_common::{DeviceError, DeviceTransport, Secret};

pub const RETRY_ATTEMPTS: u32 = 3;
pub const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Stand-in for a BLE eTRV. Replace with a real GATT client to drive hardware.
#[derive(Debug)]
pub struct SimulatedTrv {
    address: String,
    secret: Secret,
    connected: bool,
    set_point: f32,
    room_temperature: f32,
    battery: u8,
}

impl SimulatedTrv {
    pub fn new(address: &str, secret: Secret) -> Self {
        Self {
            address: address.to_string(),
            secret,
            connected: false,
            set_point: 20.0,
            room_temperature: 18.0,
            battery: 100,
        }
    }

    fn connect(&mut self) {
        if !self.connected {
            debug!(
                address = %self.address,
                key_len = self.secret.expose().len(),
                "connecting"
            );
            self.connected = true;
        }
    }
}

impl DeviceTransport for SimulatedTrv {
    async fn read_set_point(&mut self) -> Result<f32, DeviceError> {
        self.connect();
        Ok(self.set_point)
    }

    async fn write_set_point(&mut self, value: f32) -> Result<(), DeviceError> {
        self.connect();
        self.set_point = value;
        Ok(())
    }

    // Room temperature creeps toward the setpoint on each read.
    async fn read_room_temperature(&mut self) -> Result<f32, DeviceError> {
        self.connect();
        self.room_temperature += (self.set_point - self.room_temperature) * 0.1;
        Ok((self.room_temperature * 2.0).round() / 2.0)
    }

    async fn read_battery(&mut self) -> Result<u8, DeviceError> {
        self.connect();
        self.battery = self.battery.saturating_sub(1).max(5);
        Ok(self.battery)
    }

    async fn disconnect(&mut self) -> Result<(), DeviceError> {
        if self.connected {
            debug!(address = %self.address, "disconnecting");
            self.connected = false;
        }
        Ok(())
    }
}

/// Retries each transport call a bounded number of times, dropping the
/// connection between attempts. Back-off grows linearly with the attempt.
#[derive(Debug)]
pub struct Retry<T> {
    inner: T,
    attempts: u32,
    backoff: Duration,
}

impl<T: DeviceTransport> Retry<T> {
    pub fn new(inner: T) -> Self {
        Self::with_policy(inner, RETRY_ATTEMPTS, RETRY_BACKOFF)
    }

    pub fn with_policy(inner: T, attempts: u32, backoff: Duration) -> Self {
        Self {
            inner,
            attempts: attempts.max(1),
            backoff,
        }
    }

    #[cfg(test)]
    fn inner(&self) -> &T {
        &self.inner
    }

    /// Decide whether a failed attempt is retried, resetting the connection
    /// and sleeping first if so.
    async fn should_retry(&mut self, op: &str, attempt: u32, err: &DeviceError) -> bool {
        if attempt >= self.attempts {
            warn!(op, attempt, "giving up: {err}");
            return false;
        }

        warn!(op, attempt, "attempt failed, retrying: {err}");
        if let Err(err) = self.inner.disconnect().await {
            debug!(op, "disconnect between attempts failed: {err}");
        }
        tokio::time::sleep(self.backoff * attempt).await;
        true
    }
}

macro_rules! retried {
    ($self:ident, $op:literal, $call:expr) => {{
        let mut attempt = 1;
        loop {
            match $call.await {
                Ok(value) => break Ok(value),
                Err(err) => {
                    if !$self.should_retry($op, attempt, &err).await {
                        break Err(err);
                    }
                    attempt += 1;
                }
            }
        }
    }};
}

impl<T: DeviceTransport> DeviceTransport for Retry<T> {
    async fn read_set_point(&mut self) -> Result<f32, DeviceError> {
        retried!(self, "read_set_point", self.inner.read_set_point())
    }

    async fn write_set_point(&mut self, value: f32) -> Result<(), DeviceError> {
        retried!(self, "write_set_point", self.inner.write_set_point(value))
    }

    async fn read_room_temperature(&mut self) -> Result<f32, DeviceError> {
        retried!(self, "read_room_temperature", self.inner.read_room_temperature())
    }

    async fn read_battery(&mut self) -> Result<u8, DeviceError> {
        retried!(self, "read_battery", self.inner.read_battery())
    }

    async fn disconnect(&mut self) -> Result<(), DeviceError> {
        self.inner.disconnect().await
    }
}
