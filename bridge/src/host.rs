use std::{path::Path, time::Duration};

use anyhow::Context;
use chrono::Utc;
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions};
use tokio::sync::mpsc;
use tracing::{info, warn};

use etrv_common::{BatterySweep, BridgeConfig, MqttConfig, Router, Thermostat};

use crate::{
    broker::MqttBroker,
    transport::{Retry, SimulatedTrv},
};

pub type Valve = Retry<SimulatedTrv>;

const MQTT_REQUEST_CAPACITY: usize = 64;
const MQTT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// What the event loop task hands to the polling loop.
#[derive(Debug)]
enum Inbound {
    Connected,
    Message { topic: String, payload: Vec<u8> },
}

/// One reading per thermostat, printed by the one-shot commands.
#[derive(Debug, Clone, Copy)]
pub enum Reading {
    Temperature,
    SetPoint,
    Battery,
}

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

pub fn load_config(path: &Path) -> anyhow::Result<BridgeConfig> {
    let raw = std::fs::read(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let mut config = BridgeConfig::from_json(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;

    apply_env_overrides(&mut config.mqtt);
    config.validate()?;
    Ok(config)
}

fn apply_env_overrides(mqtt: &mut MqttConfig) {
    if let Ok(host) = std::env::var("MQTT_HOST") {
        mqtt.host = host;
    }
    if let Some(port) = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
    {
        mqtt.port = port;
    }
    if let Ok(user) = std::env::var("MQTT_USER") {
        mqtt.user = user;
    }
    if let Ok(pass) = std::env::var("MQTT_PASS") {
        mqtt.pass = pass;
    }
}

/// Build every configured thermostat. Mode guessing talks to the valve, so a
/// failure here aborts startup.
pub async fn build_thermostats(config: &BridgeConfig) -> anyhow::Result<Vec<Thermostat<Valve>>> {
    let mut thermostats = Vec::with_capacity(config.thermostats.len());

    for device in &config.thermostats {
        let profile = device.profile()?;
        let startup = device.startup_mode()?;
        let valve = Retry::new(SimulatedTrv::new(&device.address, device.secret()?));

        let thermostat = Thermostat::start(profile, valve, startup, Utc::now())
            .await
            .with_context(|| format!("failed to start thermostat '{}'", device.name))?;
        info!(
            device = thermostat.id(),
            name = thermostat.name(),
            mode = thermostat.mode().as_str(),
            "thermostat ready"
        );
        thermostats.push(thermostat);
    }

    Ok(thermostats)
}

fn mqtt_options(mqtt: &MqttConfig) -> MqttOptions {
    let mut options = MqttOptions::new(&mqtt.client_id, &mqtt.host, mqtt.port);
    options.set_keep_alive(Duration::from_secs(mqtt.keep_alive_secs));
    if !mqtt.user.is_empty() {
        options.set_credentials(&mqtt.user, &mqtt.pass);
    }
    options
}

pub async fn run(config: BridgeConfig) -> anyhow::Result<()> {
    let thermostats = build_thermostats(&config).await?;

    let (client, eventloop) = AsyncClient::new(mqtt_options(&config.mqtt), MQTT_REQUEST_CAPACITY);
    let mut inbound = spawn_mqtt_loop(eventloop);

    let mut router = Router::new(
        MqttBroker::new(client),
        &config.topic_prefix,
        &config.discovery_prefix,
        thermostats,
    );
    let mut sweep = BatterySweep::default();
    let poll_interval = Duration::from_secs(config.poll_interval_secs);

    info!(
        host = %config.mqtt.host,
        port = config.mqtt.port,
        thermostats = config.thermostats.len(),
        "bridge started"
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutting down");
                return Ok(());
            }
            received = tokio::time::timeout(poll_interval, inbound.recv()) => match received {
                Ok(Some(event)) => handle_inbound(&mut router, event).await,
                Ok(None) => anyhow::bail!("mqtt event loop stopped"),
                Err(_elapsed) => {}
            },
        }

        match router.sweep_if_due(&mut sweep, Utc::now()).await {
            Ok(None | Some(0)) => {}
            Ok(Some(failures)) => warn!(failures, "battery sweep incomplete"),
            Err(err) => warn!("battery sweep failed: {err}"),
        }
    }
}

async fn handle_inbound(router: &mut Router<MqttBroker, Valve>, event: Inbound) {
    match event {
        Inbound::Connected => {
            if let Err(err) = router.on_connect().await {
                warn!("announcing thermostats failed: {err}");
            }
        }
        Inbound::Message { topic, payload } => {
            if let Err(err) = router.handle_message(&topic, &payload, Utc::now()).await {
                warn!(topic = %topic, "mqtt message handling error: {err}");
            }
        }
    }
}

fn spawn_mqtt_loop(mut eventloop: EventLoop) -> mpsc::Receiver<Inbound> {
    let (tx, rx) = mpsc::channel(MQTT_REQUEST_CAPACITY);

    tokio::spawn(async move {
        loop {
            let event = match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                    Inbound::Connected
                }
                Ok(Event::Incoming(Incoming::Publish(message))) => Inbound::Message {
                    topic: message.topic,
                    payload: message.payload.to_vec(),
                },
                Ok(_) => continue,
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(MQTT_RETRY_DELAY).await;
                    continue;
                }
            };

            if tx.send(event).await.is_err() {
                break;
            }
        }
    });

    rx
}

/// Read one value from every thermostat and print it. Failing valves are
/// reported and skipped.
pub async fn print_readings(config: &BridgeConfig, reading: Reading) -> anyhow::Result<()> {
    let mut failures = 0;

    for mut thermostat in build_thermostats(config).await? {
        let value = match reading {
            Reading::Temperature => thermostat.read_temperature().await.map(|t| format!("{t:.1}")),
            Reading::SetPoint => thermostat.read_set_point().await.map(|t| format!("{t:.1}")),
            Reading::Battery => thermostat.battery(Utc::now()).await.map(|b| format!("{b}%")),
        };

        match value {
            Ok(value) => println!("{}: {value}", thermostat.name()),
            Err(err) => {
                failures += 1;
                warn!(device = thermostat.id(), "read failed: {err}");
                println!("{}: unavailable", thermostat.name());
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} thermostat(s) could not be read");
    }
    Ok(())
}
