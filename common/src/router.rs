use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::{
    broker::Broker,
    commands::{parse_command, Command, Route},
    device::DeviceTransport,
    discovery,
    error::{DeviceError, Error},
    poll::BatterySweep,
    thermostat::Thermostat,
    topics::DeviceTopics,
};

struct Managed<D> {
    thermostat: Thermostat<D>,
    topics: DeviceTopics,
}

/// Maps broker traffic onto thermostats and publishes their state.
pub struct Router<B, D> {
    broker: B,
    managed: Vec<Managed<D>>,
}

impl<B: Broker, D: DeviceTransport> Router<B, D> {
    pub fn new(
        broker: B,
        topic_prefix: &str,
        discovery_prefix: &str,
        thermostats: Vec<Thermostat<D>>,
    ) -> Self {
        let managed = thermostats
            .into_iter()
            .map(|thermostat| Managed {
                topics: DeviceTopics::new(topic_prefix, discovery_prefix, thermostat.address()),
                thermostat,
            })
            .collect();

        Self { broker, managed }
    }

    pub fn broker(&self) -> &B {
        &self.broker
    }

    pub fn thermostats(&self) -> impl Iterator<Item = &Thermostat<D>> + '_ {
        self.managed.iter().map(|managed| &managed.thermostat)
    }

    pub fn thermostat_mut(&mut self, index: usize) -> Option<&mut Thermostat<D>> {
        self.managed
            .get_mut(index)
            .map(|managed| &mut managed.thermostat)
    }

    /// Every `(thermostat index, route)` that `topic` addresses. A remote
    /// sensor topic may feed several thermostats.
    pub fn routes(&self, topic: &str) -> Vec<(usize, Route)> {
        self.managed
            .iter()
            .enumerate()
            .filter_map(|(index, managed)| {
                let route = if topic == managed.topics.away_mode_command {
                    Route::AwayMode
                } else if topic == managed.topics.mode_command {
                    Route::Mode
                } else if topic == managed.topics.temp_command {
                    Route::SetPoint
                } else if managed.thermostat.remote_sensor_topic() == Some(topic) {
                    Route::Remote
                } else {
                    return None;
                };
                Some((index, route))
            })
            .collect()
    }

    /// Subscribe, announce and publish state for every thermostat. Runs on
    /// each (re)connect so retained documents survive broker restarts.
    pub async fn on_connect(&mut self) -> Result<(), Error> {
        let mut subscribed: HashSet<String> = HashSet::new();

        for index in 0..self.managed.len() {
            let managed = &self.managed[index];

            let mut topics: Vec<&str> = managed.topics.command_topics().to_vec();
            if let Some(remote) = managed.thermostat.remote_sensor_topic() {
                topics.push(remote);
            }
            for topic in topics {
                if subscribed.insert(topic.to_string()) {
                    self.broker.subscribe(topic).await?;
                }
            }

            let announcements =
                discovery::announcements(&managed.topics, managed.thermostat.name())?;
            for (topic, body) in announcements {
                self.broker.publish(&topic, body, true).await?;
            }

            self.publish_state(index).await?;
        }

        info!(thermostats = self.managed.len(), "announced thermostats");
        Ok(())
    }

    /// Apply an inbound message. Every addressed thermostat republishes its
    /// state afterwards, even when the payload was malformed or the device
    /// write failed. Returns how many thermostats the topic addressed.
    pub async fn handle_message(
        &mut self,
        topic: &str,
        payload: &[u8],
        now: DateTime<Utc>,
    ) -> Result<usize, Error> {
        let routes = self.routes(topic);
        if routes.is_empty() {
            debug!(topic, "no thermostat listens on topic");
            return Ok(0);
        }

        let mut device_failure: Option<DeviceError> = None;
        let mut publish_failure: Option<Error> = None;
        for &(index, route) in &routes {
            if let Err(err) = self.dispatch(index, route, payload, now).await {
                warn!(
                    device = %self.managed[index].topics.id,
                    route = route.as_str(),
                    "device operation failed: {err}"
                );
                device_failure.get_or_insert(err);
            }
            if let Err(err) = self.publish_state(index).await {
                warn!(device = %self.managed[index].topics.id, "state publish failed: {err}");
                publish_failure.get_or_insert(err);
            }
        }

        if let Some(err) = device_failure {
            return Err(err.into());
        }
        match publish_failure {
            Some(err) => Err(err),
            None => Ok(routes.len()),
        }
    }

    async fn publish_state(&mut self, index: usize) -> Result<(), Error> {
        let Some(managed) = self.managed.get(index) else {
            return Ok(());
        };
        let body = serde_json::to_vec(&managed.thermostat.state_payload())?;
        self.broker.publish(&managed.topics.state, body, true).await?;
        Ok(())
    }

    /// Force a battery read on every thermostat and republish state. A
    /// failing valve does not stop the sweep. Returns the number of failures.
    pub async fn sweep_batteries(&mut self, now: DateTime<Utc>) -> Result<usize, Error> {
        let mut failures = 0;
        let mut publish_failure: Option<Error> = None;

        for index in 0..self.managed.len() {
            let managed = &mut self.managed[index];
            match managed.thermostat.refresh_battery(now).await {
                Ok(level) => info!(device = %managed.topics.id, level, "battery refreshed"),
                Err(err) => {
                    failures += 1;
                    warn!(device = %managed.topics.id, "battery refresh failed: {err}");
                }
            }
            if let Err(err) = self.publish_state(index).await {
                warn!(device = %self.managed[index].topics.id, "state publish failed: {err}");
                publish_failure.get_or_insert(err);
            }
        }

        match publish_failure {
            Some(err) => Err(err),
            None => Ok(failures),
        }
    }

    /// Run the battery sweep if `sweep` says it is due. Returns `None` when it
    /// was not, otherwise the number of valves that failed to answer.
    pub async fn sweep_if_due(
        &mut self,
        sweep: &mut BatterySweep,
        now: DateTime<Utc>,
    ) -> Result<Option<usize>, Error> {
        if !sweep.is_due(now) {
            return Ok(None);
        }
        sweep.mark(now);
        self.sweep_batteries(now).await.map(Some)
    }

    async fn dispatch(
        &mut self,
        index: usize,
        route: Route,
        payload: &[u8],
        now: DateTime<Utc>,
    ) -> Result<(), DeviceError> {
        let managed = &mut self.managed[index];

        let command = match parse_command(route, payload) {
            Ok(command) => command,
            Err(err) => {
                warn!(
                    device = %managed.topics.id,
                    route = route.as_str(),
                    "ignoring payload: {err}"
                );
                return Ok(());
            }
        };

        debug!(device = %managed.topics.id, ?command, "applying command");
        let thermostat = &mut managed.thermostat;
        match command {
            Command::SetMode(mode) => thermostat.set_mode(mode, now).await,
            Command::SetPoint(value) => thermostat.apply_set_point(value, now).await,
            Command::Remote(temperature) => {
                thermostat.add_remote(temperature, now).await.map(drop)
            }
        }
    }
}
