use crate::error::BrokerError;

/// Outbound half of an MQTT session.
#[allow(async_fn_in_trait)]
pub trait Broker {
    async fn subscribe(&mut self, topic: &str) -> Result<(), BrokerError>;

    async fn publish(
        &mut self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
    ) -> Result<(), BrokerError>;
}
