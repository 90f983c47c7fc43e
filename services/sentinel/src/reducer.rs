//! Folds raw snapshots into the next [`SystemState`].

use crate::history::HistoryPoint;
use crate::state::{PartialSnapshot, SystemState};
use crate::transitions::{detect, Transition};
use chrono::{DateTime, TimeZone};
use std::fmt::Display;

/// Format used for history ticks and ledger timestamps
pub const TICK_FORMAT: &str = "%H:%M:%S";

/// Result of folding one snapshot.
#[derive(Debug, Clone)]
pub struct Reduction {
    pub state: SystemState,
    /// Every detected edge, in ledger insertion order
    pub events: Vec<Transition>,
    /// How many of `events` actually entered the ledger
    pub logged: usize,
}

/// Produce the next state from `prev` and one raw snapshot.
///
/// Deterministic given `now`; nothing outside the returned value is touched.
pub fn reduce<Tz>(prev: &SystemState, raw: &PartialSnapshot, now: &DateTime<Tz>) -> Reduction
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let tick = now.format(TICK_FORMAT).to_string();
    let mut next = merge(prev, raw);

    let point = HistoryPoint {
        time: tick.clone(),
        temp: coalesce(next.temperature, prev.temperature),
        hum: coalesce(next.humidity, prev.humidity),
        soil: coalesce(next.soil_moisture, prev.soil_moisture),
        rain: coalesce(next.rain, prev.rain),
        smoke: coalesce(next.smoke, prev.smoke),
    };
    next.history = prev.history.append(point);

    let events = detect(prev, &next);
    let mut log = prev.log.clone();
    let mut logged = 0;
    for event in &events {
        if log.push_front(&tick, event.message(), event.severity()) {
            logged += 1;
        }
    }
    next.log = log;

    Reduction {
        state: next,
        events,
        logged,
    }
}

fn coalesce(current: Option<f64>, previous: Option<f64>) -> f64 {
    current.or(previous).unwrap_or(0.0)
}

/// Field-wise merge: present in `raw` wins, absent keeps `prev`.
fn merge(prev: &SystemState, raw: &PartialSnapshot) -> SystemState {
    SystemState {
        online: raw.online.unwrap_or(prev.online),
        uptime: pick(&raw.uptime, &prev.uptime),
        fence_active: pick(&raw.fence_active, &prev.fence_active),
        fence_current: pick(&raw.fence_current, &prev.fence_current),
        camera_feed_url: pick(&raw.camera_feed_url, &prev.camera_feed_url),
        pir: raw.pir.unwrap_or(prev.pir),
        vibration: raw.vibration.unwrap_or(prev.vibration),
        pole_tamper: raw.pole_tamper.unwrap_or(prev.pole_tamper),
        box_tamper: raw.box_tamper.unwrap_or(prev.box_tamper),
        smoke: pick(&raw.smoke, &prev.smoke),
        rain: pick(&raw.rain, &prev.rain),
        soil_moisture: pick(&raw.soil_moisture, &prev.soil_moisture),
        light_level: pick(&raw.light_level, &prev.light_level),
        temperature: pick(&raw.temperature, &prev.temperature),
        humidity: pick(&raw.humidity, &prev.humidity),
        pressure: pick(&raw.pressure, &prev.pressure),
        history: prev.history.clone(),
        log: prev.log.clone(),
    }
}

fn pick<T: Clone>(raw: &Option<Option<T>>, prev: &Option<T>) -> Option<T> {
    match raw {
        Some(value) => value.clone(),
        None => prev.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Severity;
    use crate::state::SensorState;
    use chrono::{Duration, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap() + Duration::seconds(secs)
    }

    #[test]
    fn test_absent_fields_retained() {
        let prev = reduce(
            &SystemState::default(),
            &PartialSnapshot::default().with_temperature(21.0).with_online(true),
            &at(0),
        )
        .state;

        let next = reduce(&prev, &PartialSnapshot::default().with_humidity(40.0), &at(1)).state;

        assert_eq!(next.temperature, Some(21.0));
        assert_eq!(next.humidity, Some(40.0));
        assert!(next.online);
    }

    #[test]
    fn test_explicit_null_clears_field() {
        let prev = reduce(
            &SystemState::default(),
            &PartialSnapshot::default().with_smoke(120.0),
            &at(0),
        )
        .state;

        let raw: PartialSnapshot = serde_json::from_str(r#"{"smoke": null}"#).unwrap();
        let next = reduce(&prev, &raw, &at(1)).state;

        assert_eq!(next.smoke, None);
        // History falls back to the previous reading rather than zero.
        assert_eq!(next.history.latest().map(|p| p.smoke), Some(120.0));
    }

    #[test]
    fn test_history_point_coalesces_to_zero_without_readings() {
        let next = reduce(
            &SystemState::default(),
            &PartialSnapshot::default().with_temperature(19.5),
            &at(0),
        )
        .state;

        let point = next.history.latest().unwrap();
        assert_eq!(point.time, "12:00:00");
        assert_eq!(point.temp, 19.5);
        assert_eq!(point.hum, 0.0);
        assert_eq!(point.smoke, 0.0);
    }

    #[test]
    fn test_empty_snapshot_only_advances_history() {
        let prev = SystemState::default();
        let reduction = reduce(&prev, &PartialSnapshot::default(), &at(5));

        assert!(reduction.events.is_empty());
        assert_eq!(reduction.state.history.len(), 1);
        assert_eq!(reduction.state.log.len(), 0);
        assert_eq!(reduction.state.pir, prev.pir);
        assert_eq!(reduction.state.online, prev.online);
    }

    #[test]
    fn test_history_bounded_to_most_recent() {
        let mut state = SystemState::default();
        for n in 0..40 {
            state = reduce(
                &state,
                &PartialSnapshot::default().with_temperature(n as f64),
                &at(n),
            )
            .state;
        }

        assert_eq!(state.history.len(), 30);
        let temps: Vec<f64> = state.history.iter().map(|p| p.temp).collect();
        assert_eq!(temps.first(), Some(&10.0));
        assert_eq!(temps.last(), Some(&39.0));
    }

    #[test]
    fn test_prev_is_not_modified() {
        let prev = SystemState::default();
        let snapshot = prev.clone();
        let _ = reduce(&prev, &PartialSnapshot::default().with_pir(SensorState::Active), &at(0));
        assert_eq!(prev, snapshot);
    }

    #[test]
    fn test_motion_logged_once_across_repeated_active() {
        let mut state = SystemState::default();
        let snapshots = [
            PartialSnapshot::default().with_pir(SensorState::Inactive),
            PartialSnapshot::default().with_pir(SensorState::Active),
            PartialSnapshot::default().with_pir(SensorState::Active),
            PartialSnapshot::default().with_pir(SensorState::Active),
        ];
        for (n, raw) in snapshots.iter().enumerate() {
            state = reduce(&state, raw, &at(n as i64)).state;
        }

        let motion: Vec<_> = state
            .log
            .iter()
            .filter(|e| e.message == "Motion Sensor Triggered (PIR)")
            .collect();
        assert_eq!(motion.len(), 1);
        assert_eq!(motion[0].severity, Severity::Alert);
    }

    #[test]
    fn test_connection_flip_logs_in_order() {
        let mut state = SystemState::default();
        state = reduce(&state, &PartialSnapshot::default().with_online(true), &at(0)).state;
        state = reduce(&state, &PartialSnapshot::default().with_online(false), &at(1)).state;

        let messages: Vec<&str> = state.log.iter().rev().map(|e| e.message.as_str()).collect();
        assert_eq!(
            messages,
            vec!["ESP32 Connection Established", "ESP32 Connection Lost"]
        );
    }

    #[test]
    fn test_first_fence_report_not_logged() {
        let state = reduce(
            &SystemState::default(),
            &PartialSnapshot::default().with_fence_active(Some(true)),
            &at(0),
        )
        .state;
        assert!(state.log.is_empty());

        let state = reduce(
            &state,
            &PartialSnapshot::default().with_fence_active(Some(false)),
            &at(1),
        )
        .state;
        assert_eq!(
            state.log.front().map(|e| e.message.as_str()),
            Some("Fence Power DISARMED")
        );
    }

    #[test]
    fn test_dedup_applies_within_one_reduction() {
        let mut prev = SystemState::default();
        prev.log = prev.log.record("11:59:59", "Motion Sensor Triggered (PIR)", Severity::Alert);

        let reduction = reduce(
            &prev,
            &PartialSnapshot::default().with_pir(SensorState::Active),
            &at(0),
        );

        assert_eq!(reduction.events, vec![Transition::MotionTriggered]);
        assert_eq!(reduction.logged, 0);
        assert_eq!(reduction.state.log.len(), 1);
    }
}
