//! In-memory doubles for the device and broker seams.

use crate::{broker::Broker, device::DeviceTransport, error::BrokerError, error::DeviceError};

#[derive(Debug, Default)]
pub(crate) struct MockDevice {
    pub active_set_point: f32,
    pub room_temperature: f32,
    pub battery: u8,
    pub writes: Vec<f32>,
    pub battery_reads: usize,
    pub disconnects: usize,
    pub fail_writes: bool,
    pub fail_reads: bool,
}

impl MockDevice {
    fn failure(&self, reason: &str) -> DeviceError {
        DeviceError::Communication {
            address: "mock".to_string(),
            reason: reason.to_string(),
        }
    }
}

impl DeviceTransport for MockDevice {
    async fn read_set_point(&mut self) -> Result<f32, DeviceError> {
        if self.fail_reads {
            return Err(self.failure("read set point"));
        }
        Ok(self.active_set_point)
    }

    async fn write_set_point(&mut self, value: f32) -> Result<(), DeviceError> {
        if self.fail_writes {
            return Err(self.failure("write set point"));
        }
        self.active_set_point = value;
        self.writes.push(value);
        Ok(())
    }

    async fn read_room_temperature(&mut self) -> Result<f32, DeviceError> {
        if self.fail_reads {
            return Err(self.failure("read room temperature"));
        }
        Ok(self.room_temperature)
    }

    async fn read_battery(&mut self) -> Result<u8, DeviceError> {
        if self.fail_reads {
            return Err(self.failure("read battery"));
        }
        self.battery_reads += 1;
        Ok(self.battery)
    }

    async fn disconnect(&mut self) -> Result<(), DeviceError> {
        self.disconnects += 1;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Published {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retain: bool,
}

impl Published {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.payload).unwrap()
    }
}

#[derive(Debug, Default)]
pub(crate) struct RecordingBroker {
    pub subscriptions: Vec<String>,
    pub published: Vec<Published>,
    /// Publishes to this topic are refused.
    pub fail_topic: Option<String>,
}

impl RecordingBroker {
    pub fn published_to(&self, topic: &str) -> Vec<&Published> {
        self.published.iter().filter(|p| p.topic == topic).collect()
    }
}

impl Broker for RecordingBroker {
    async fn subscribe(&mut self, topic: &str) -> Result<(), BrokerError> {
        self.subscriptions.push(topic.to_string());
        Ok(())
    }

    async fn publish(
        &mut self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
    ) -> Result<(), BrokerError> {
        if self.fail_topic.as_deref() == Some(topic) {
            return Err(BrokerError(format!("publish to {topic} refused")));
        }
        self.published.push(Published {
            topic: topic.to_string(),
            payload,
            retain,
        });
        Ok(())
    }
}
