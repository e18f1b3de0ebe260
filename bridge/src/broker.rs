use rumqttc::{AsyncClient, QoS};

use etrv_common::{Broker, BrokerError};

/// [`Broker`] over a rumqttc client. The event loop is polled elsewhere.
pub struct MqttBroker {
    client: AsyncClient,
}

impl MqttBroker {
    pub fn new(client: AsyncClient) -> Self {
        Self { client }
    }
}

impl Broker for MqttBroker {
    async fn subscribe(&mut self, topic: &str) -> Result<(), BrokerError> {
        self.client
            .subscribe(topic, QoS::AtLeastOnce)
            .await
            .map_err(|err| BrokerError(err.to_string()))
    }

    async fn publish(
        &mut self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
    ) -> Result<(), BrokerError> {
        self.client
            .publish(topic, QoS::AtLeastOnce, retain, payload)
            .await
            .map_err(|err| BrokerError(format!("publish to {topic}: {err}")))
    }
}
