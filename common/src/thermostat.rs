use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::{
    config::{Profile, StartupMode},
    device::{released, DeviceTransport},
    error::DeviceError,
    topics::device_id,
    types::{BatteryReading, Mode, SetPoints, StatePayload},
};

/// Minimum time after a setpoint write before remote readings may move the offset.
pub const LEARNING_COOLDOWN_SECS: i64 = 60 * 60;
/// Battery readings older than this are re-sampled.
pub const BATTERY_TTL_SECS: i64 = 12 * 60 * 60;
/// Mean remote drift that triggers an offset correction.
pub const DRIFT_THRESHOLD_C: f32 = 1.0;
pub const OFFSET_STEP_C: f32 = 0.5;
/// Upper bound on retained remote samples; the oldest are dropped first.
const MAX_REMOTE_SAMPLES: usize = 4_096;

/// Reconciled state of one radiator valve.
#[derive(Debug)]
pub struct Thermostat<D> {
    id: String,
    name: String,
    address: String,
    remote_sensor_topic: Option<String>,
    device: D,

    mode: Mode,
    set_points: SetPoints,
    offset: f32,
    remote_history: VecDeque<f32>,
    last_change: DateTime<Utc>,
    battery: Option<BatteryReading>,
}

impl<D: DeviceTransport> Thermostat<D> {
    pub fn new(profile: Profile, device: D, mode: Mode, now: DateTime<Utc>) -> Self {
        Self {
            id: device_id(&profile.address),
            name: profile.name,
            address: profile.address,
            remote_sensor_topic: profile.remote_sensor_topic,
            device,
            mode,
            set_points: profile.set_points,
            offset: profile.offset,
            remote_history: VecDeque::new(),
            last_change: now,
            battery: None,
        }
    }

    /// Build a thermostat and establish its mode. With [`StartupMode::Guess`]
    /// the valve's active setpoint is read and matched against the configured
    /// setpoints, which recovers the mode after a restart.
    pub async fn start(
        profile: Profile,
        device: D,
        startup: StartupMode,
        now: DateTime<Utc>,
    ) -> Result<Self, DeviceError> {
        match startup {
            StartupMode::Explicit(mode) => Ok(Self::new(profile, device, mode, now)),
            StartupMode::Guess => {
                let mut thermostat = Self::new(profile, device, Mode::Home, now);
                let reported = thermostat.read_set_point().await?;
                thermostat.mode = thermostat.infer_mode(reported);
                info!(
                    device = %thermostat.id,
                    reported,
                    mode = thermostat.mode.as_str(),
                    "guessed mode from active setpoint"
                );
                Ok(thermostat)
            }
        }
    }

    /// Mode whose offset-adjusted setpoint is closest to `reported`. Ties go to
    /// the earliest mode in [`Mode::ALL`].
    pub fn infer_mode(&self, reported: f32) -> Mode {
        let mut best = Mode::ALL[0];
        let mut best_distance = f32::INFINITY;

        for mode in Mode::ALL {
            let distance = (reported - (self.set_points.get(mode) + self.offset)).abs();
            if distance < best_distance {
                best = mode;
                best_distance = distance;
            }
        }

        best
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn remote_sensor_topic(&self) -> Option<&str> {
        self.remote_sensor_topic.as_deref()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Target of the active mode, without offset.
    pub fn set_point(&self) -> f32 {
        self.set_points.get(self.mode)
    }

    pub fn set_points(&self) -> SetPoints {
        self.set_points
    }

    pub fn offset(&self) -> f32 {
        self.offset
    }

    pub fn remote_history(&self) -> impl Iterator<Item = f32> + '_ {
        self.remote_history.iter().copied()
    }

    pub fn last_change(&self) -> DateTime<Utc> {
        self.last_change
    }

    pub fn cached_battery(&self) -> Option<BatteryReading> {
        self.battery
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn is_battery_stale(&self, now: DateTime<Utc>) -> bool {
        self.battery
            .map(|reading| now - reading.sampled_at >= Duration::seconds(BATTERY_TTL_SECS))
            .unwrap_or(true)
    }

    /// Setpoint currently active on the valve, offset included.
    pub async fn read_set_point(&mut self) -> Result<f32, DeviceError> {
        let outcome = self.device.read_set_point().await;
        let release = self.device.disconnect().await;
        released(outcome, release)
    }

    pub async fn read_temperature(&mut self) -> Result<f32, DeviceError> {
        let outcome = self.device.read_room_temperature().await;
        let release = self.device.disconnect().await;
        let temperature = released(outcome, release)?;
        debug!(device = %self.id, temperature, "read room temperature");
        Ok(temperature)
    }

    /// Battery level, served from cache while it is younger than
    /// [`BATTERY_TTL_SECS`].
    pub async fn battery(&mut self, now: DateTime<Utc>) -> Result<u8, DeviceError> {
        match self.battery {
            Some(reading) if !self.is_battery_stale(now) => Ok(reading.level),
            _ => self.refresh_battery(now).await,
        }
    }

    /// Query the valve for its battery level regardless of cache age.
    pub async fn refresh_battery(&mut self, now: DateTime<Utc>) -> Result<u8, DeviceError> {
        let outcome = self.device.read_battery().await;
        let release = self.device.disconnect().await;
        let level = released(outcome, release)?;
        self.record_battery(level, now);
        Ok(level)
    }

    /// Store `value` as the active mode's target and push it, offset included,
    /// to the valve. Cached state is updated before the write and kept if the
    /// write fails. A stale battery is sampled on the same connection; a
    /// failed sample leaves the cache as it was.
    pub async fn apply_set_point(
        &mut self,
        value: f32,
        now: DateTime<Utc>,
    ) -> Result<(), DeviceError> {
        self.last_change = now;
        while self.remote_history.len() > 1 {
            self.remote_history.pop_front();
        }
        self.set_points.set(self.mode, value);

        let written = value + self.offset;
        let outcome = self.write_and_sample(written, now).await;
        let release = self.device.disconnect().await;
        released(outcome, release)?;

        info!(
            device = %self.id,
            mode = self.mode.as_str(),
            set_point = value,
            offset = self.offset,
            written,
            "set point written"
        );
        Ok(())
    }

    /// Switch mode and immediately push that mode's target to the valve.
    pub async fn set_mode(&mut self, mode: Mode, now: DateTime<Utc>) -> Result<(), DeviceError> {
        self.mode = mode;
        let target = self.set_points.get(mode);
        self.apply_set_point(target, now).await
    }

    /// Feed a remote-sensor reading. In Home mode readings accumulate and,
    /// once the cooldown since the last setpoint write has passed, a mean
    /// drift of at least [`DRIFT_THRESHOLD_C`] moves the offset one step
    /// against the drift and rewrites the setpoint. Returns whether the offset
    /// changed.
    pub async fn add_remote(
        &mut self,
        temperature: f32,
        now: DateTime<Utc>,
    ) -> Result<bool, DeviceError> {
        if self.mode != Mode::Home {
            self.remote_history.clear();
            self.remote_history.push_back(temperature);
            return Ok(false);
        }

        if self.remote_history.len() >= MAX_REMOTE_SAMPLES {
            self.remote_history.pop_front();
        }
        self.remote_history.push_back(temperature);

        if now - self.last_change <= Duration::seconds(LEARNING_COOLDOWN_SECS) {
            return Ok(false);
        }

        let mean = self.remote_history.iter().sum::<f32>() / self.remote_history.len() as f32;
        let set_point = self.set_point();
        let drift = mean - set_point;

        let step = if drift >= DRIFT_THRESHOLD_C {
            -OFFSET_STEP_C
        } else if drift <= -DRIFT_THRESHOLD_C {
            OFFSET_STEP_C
        } else {
            return Ok(false);
        };

        self.offset += step;
        info!(
            device = %self.id,
            mean,
            drift,
            offset = self.offset,
            samples = self.remote_history.len(),
            "remote drift corrected offset"
        );

        self.apply_set_point(set_point, now).await?;
        Ok(true)
    }

    /// Latest remote reading, or the active target when none has arrived.
    pub fn displayed_temperature(&self) -> f32 {
        self.remote_history
            .back()
            .copied()
            .unwrap_or_else(|| self.set_point())
    }

    pub fn state_payload(&self) -> StatePayload {
        StatePayload {
            away_mode: self.mode.away_state(),
            mode: self.mode.hvac_mode(),
            target_temp: self.set_point(),
            current_temp: self.displayed_temperature(),
            offset: self.offset,
            battery: self.battery.map(|reading| reading.level),
        }
    }

    async fn write_and_sample(
        &mut self,
        written: f32,
        now: DateTime<Utc>,
    ) -> Result<(), DeviceError> {
        self.device.write_set_point(written).await?;
        if self.is_battery_stale(now) {
            match self.device.read_battery().await {
                Ok(level) => self.record_battery(level, now),
                Err(err) => warn!(device = %self.id, "battery sample skipped: {err}"),
            }
        }
        Ok(())
    }

    fn record_battery(&mut self, level: u8, now: DateTime<Utc>) {
        debug!(device = %self.id, level, "battery sampled");
        self.battery = Some(BatteryReading {
            level,
            sampled_at: now,
        });
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::testing::MockDevice;

    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 5, 8, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn profile(offset: f32) -> Profile {
        Profile {
            name: "Living room".to_string(),
            address: "00:04:2F:00:00:01".to_string(),
            set_points: SetPoints {
                home: 20.0,
                away: 16.0,
                off: 5.0,
            },
            offset,
            remote_sensor_topic: Some("sensors/living/temperature".to_string()),
        }
    }

    fn thermostat(mode: Mode, offset: f32) -> Thermostat<MockDevice> {
        Thermostat::new(profile(offset), MockDevice::default(), mode, at(0))
    }

    fn history(thermostat: &Thermostat<MockDevice>) -> Vec<f32> {
        thermostat.remote_history().collect()
    }

    #[tokio::test]
    async fn write_includes_offset() {
        let mut t = thermostat(Mode::Home, 1.5);

        t.apply_set_point(21.0, at(1)).await.unwrap();

        assert_eq!(t.device().writes, vec![22.5]);
        assert_eq!(t.set_point(), 21.0);
        assert_eq!(t.set_points().get(Mode::Home), 21.0);
        assert_eq!(t.set_points().get(Mode::Away), 16.0);
    }

    #[tokio::test]
    async fn set_point_keeps_latest_remote_and_resets_last_change() {
        let mut t = thermostat(Mode::Home, 0.0);
        for reading in [19.0, 19.5, 20.5] {
            t.add_remote(reading, at(10)).await.unwrap();
        }

        t.apply_set_point(20.0, at(30)).await.unwrap();

        assert_eq!(history(&t), vec![20.5]);
        assert_eq!(t.last_change(), at(30));
        assert_eq!(t.device().disconnects, 1);
    }

    #[tokio::test]
    async fn averaged_readings_after_cooldown_step_offset_down() {
        let mut t = thermostat(Mode::Home, 0.0);

        assert!(!t.add_remote(22.0, at(30)).await.unwrap());
        assert!(t.add_remote(22.5, at(61)).await.unwrap());

        assert_eq!(t.offset(), -0.5);
        assert_eq!(t.device().writes, vec![19.5]);
        assert_eq!(history(&t), vec![22.5]);
        assert_eq!(t.last_change(), at(61));
        assert_eq!(t.set_point(), 20.0);
    }

    #[tokio::test]
    async fn cold_drift_increases_offset() {
        let mut t = thermostat(Mode::Home, 0.0);

        t.add_remote(18.5, at(20)).await.unwrap();
        assert!(t.add_remote(19.0, at(90)).await.unwrap());

        assert_eq!(t.offset(), 0.5);
        assert_eq!(t.device().writes, vec![20.5]);
    }

    #[tokio::test]
    async fn drift_exactly_at_threshold_corrects() {
        let mut t = thermostat(Mode::Home, 0.0);
        assert!(t.add_remote(21.0, at(61)).await.unwrap());
        assert_eq!(t.offset(), -0.5);

        let mut t = thermostat(Mode::Home, 0.0);
        assert!(t.add_remote(19.0, at(61)).await.unwrap());
        assert_eq!(t.offset(), 0.5);
    }

    #[tokio::test]
    async fn small_drift_leaves_offset_alone() {
        let mut t = thermostat(Mode::Home, 0.0);

        t.add_remote(20.5, at(20)).await.unwrap();
        assert!(!t.add_remote(20.9, at(120)).await.unwrap());

        assert_eq!(t.offset(), 0.0);
        assert!(t.device().writes.is_empty());
        assert_eq!(history(&t), vec![20.5, 20.9]);
    }

    #[tokio::test]
    async fn no_learning_within_cooldown() {
        let mut t = thermostat(Mode::Home, 0.0);

        for minute in [5, 30, 60] {
            assert!(!t.add_remote(25.0, at(minute)).await.unwrap());
        }

        assert_eq!(t.offset(), 0.0);
        assert!(t.device().writes.is_empty());
        assert_eq!(history(&t).len(), 3);
    }

    #[tokio::test]
    async fn away_mode_keeps_only_latest_reading() {
        let mut t = thermostat(Mode::Away, 0.0);

        t.add_remote(25.0, at(100)).await.unwrap();
        t.add_remote(26.0, at(200)).await.unwrap();

        assert_eq!(history(&t), vec![26.0]);
        assert_eq!(t.offset(), 0.0);
        assert!(t.device().writes.is_empty());
        assert_eq!(t.displayed_temperature(), 26.0);
    }

    #[tokio::test]
    async fn leaving_home_discards_accumulated_history() {
        let mut t = thermostat(Mode::Home, 0.0);
        t.add_remote(20.2, at(10)).await.unwrap();
        t.add_remote(20.4, at(20)).await.unwrap();

        t.set_mode(Mode::Away, at(30)).await.unwrap();

        assert_eq!(t.mode(), Mode::Away);
        assert_eq!(history(&t), vec![20.4]);
        assert_eq!(t.device().writes, vec![16.0]);
    }

    #[tokio::test]
    async fn mode_change_reapplies_offset() {
        let mut t = thermostat(Mode::Away, -1.0);

        t.set_mode(Mode::Home, at(5)).await.unwrap();
        t.set_mode(Mode::Off, at(6)).await.unwrap();

        assert_eq!(t.device().writes, vec![19.0, 4.0]);
        assert_eq!(t.mode(), Mode::Off);
    }

    #[tokio::test]
    async fn battery_is_cached_for_twelve_hours() {
        let mut t = thermostat(Mode::Home, 0.0);
        t.device_mut().battery = 80;

        assert_eq!(t.battery(at(0)).await.unwrap(), 80);
        t.device_mut().battery = 70;
        assert_eq!(t.battery(at(11 * 60)).await.unwrap(), 80);
        assert_eq!(t.device().battery_reads, 1);

        assert_eq!(t.battery(at(12 * 60)).await.unwrap(), 70);
        assert_eq!(t.device().battery_reads, 2);
        assert_eq!(t.cached_battery().map(|b| b.sampled_at), Some(at(12 * 60)));
        assert_eq!(t.device().disconnects, 2);
    }

    #[tokio::test]
    async fn forced_refresh_ignores_cache() {
        let mut t = thermostat(Mode::Home, 0.0);
        t.device_mut().battery = 90;
        t.battery(at(0)).await.unwrap();

        t.device_mut().battery = 85;
        assert_eq!(t.refresh_battery(at(1)).await.unwrap(), 85);
        assert_eq!(t.device().battery_reads, 2);
    }

    #[tokio::test]
    async fn set_point_samples_stale_battery_in_same_connection() {
        let mut t = thermostat(Mode::Home, 0.0);
        t.device_mut().battery = 64;

        t.apply_set_point(21.0, at(1)).await.unwrap();
        assert_eq!(t.device().battery_reads, 1);
        assert_eq!(t.device().disconnects, 1);
        assert_eq!(t.state_payload().battery, Some(64));

        t.apply_set_point(21.5, at(2)).await.unwrap();
        assert_eq!(t.device().battery_reads, 1);
        assert_eq!(t.device().disconnects, 2);
    }

    #[tokio::test]
    async fn failed_write_keeps_state_and_still_disconnects() {
        let mut t = thermostat(Mode::Home, 0.0);
        t.device_mut().fail_writes = true;

        let err = t.set_mode(Mode::Away, at(3)).await.unwrap_err();

        assert!(matches!(err, DeviceError::Communication { .. }));
        assert_eq!(t.mode(), Mode::Away);
        assert_eq!(t.last_change(), at(3));
        assert_eq!(t.device().disconnects, 1);
    }

    #[tokio::test]
    async fn failed_battery_sample_does_not_fail_write() {
        let mut t = thermostat(Mode::Home, 0.0);
        t.device_mut().battery = 50;
        t.battery(at(0)).await.unwrap();
        t.device_mut().fail_reads = true;

        t.apply_set_point(21.0, at(13 * 60)).await.unwrap();

        assert_eq!(t.device().writes, vec![21.0]);
        assert_eq!(t.device().disconnects, 2);
        let cached = t.cached_battery().unwrap();
        assert_eq!((cached.level, cached.sampled_at), (50, at(0)));
    }

    #[tokio::test]
    async fn learning_survives_failed_battery_sample() {
        let mut t = thermostat(Mode::Home, 0.0);
        t.device_mut().fail_reads = true;

        assert!(t.add_remote(22.0, at(61)).await.unwrap());

        assert_eq!(t.offset(), -0.5);
        assert_eq!(t.device().writes, vec![19.5]);
        assert_eq!(t.state_payload().battery, None);
    }

    #[tokio::test]
    async fn read_temperature_releases_connection_on_failure() {
        let mut t = thermostat(Mode::Home, 0.0);
        t.device_mut().room_temperature = 19.25;
        assert_eq!(t.read_temperature().await.unwrap(), 19.25);

        t.device_mut().fail_reads = true;
        assert!(t.read_temperature().await.is_err());
        assert_eq!(t.device().disconnects, 2);
    }

    #[test]
    fn infers_mode_nearest_to_reported_set_point() {
        let t = Thermostat::new(
            Profile {
                set_points: SetPoints {
                    home: 20.5,
                    away: 16.0,
                    off: 5.0,
                },
                ..profile(0.5)
            },
            MockDevice::default(),
            Mode::Off,
            at(0),
        );

        assert_eq!(t.infer_mode(21.0), Mode::Home);
        assert_eq!(t.infer_mode(16.0), Mode::Away);
        assert_eq!(t.infer_mode(6.0), Mode::Off);
    }

    #[test]
    fn infer_mode_ties_go_to_first_mode() {
        let t = Thermostat::new(
            Profile {
                set_points: SetPoints::uniform(18.0),
                ..profile(0.0)
            },
            MockDevice::default(),
            Mode::Off,
            at(0),
        );

        assert_eq!(t.infer_mode(18.0), Mode::Home);
        assert_eq!(t.infer_mode(17.0), Mode::Home);
    }

    #[tokio::test]
    async fn start_guesses_mode_from_device() {
        let device = MockDevice {
            active_set_point: 16.5,
            ..MockDevice::default()
        };

        let t = Thermostat::start(profile(0.5), device, StartupMode::Guess, at(0))
            .await
            .unwrap();

        assert_eq!(t.mode(), Mode::Away);
        assert_eq!(t.device().disconnects, 1);
        assert!(t.device().writes.is_empty());
    }

    #[tokio::test]
    async fn start_with_explicit_mode_skips_device() {
        let t = Thermostat::start(
            profile(0.0),
            MockDevice::default(),
            StartupMode::Explicit(Mode::Off),
            at(0),
        )
        .await
        .unwrap();

        assert_eq!(t.mode(), Mode::Off);
        assert_eq!(t.device().disconnects, 0);
    }

    #[test]
    fn displayed_temperature_falls_back_to_set_point() {
        let t = thermostat(Mode::Home, 0.0);
        let state = t.state_payload();

        assert_eq!(state.current_temp, 20.0);
        assert_eq!(state.target_temp, 20.0);
        assert_eq!(state.mode, "heat");
        assert_eq!(state.away_mode, "OFF");
        assert_eq!(state.battery, None);
    }
}
