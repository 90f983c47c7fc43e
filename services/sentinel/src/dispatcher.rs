use crate::config::AlarmConfig;
use crate::state::SystemState;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fmt;
use tracing::{debug, trace};

/// Alarm kinds that produce evidence captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlarmTag {
    Vibration,
    FenceGate,
    ControlBox,
    Motion,
    Smoke,
    HighCurrent,
}

impl AlarmTag {
    /// Tag as burned into the overlay and the artifact filename
    pub fn as_str(&self) -> &'static str {
        match self {
            AlarmTag::Vibration => "Vibration",
            AlarmTag::FenceGate => "Fence_Gate",
            AlarmTag::ControlBox => "Control_Box",
            AlarmTag::Motion => "Motion",
            AlarmTag::Smoke => "Smoke",
            AlarmTag::HighCurrent => "High_Current",
        }
    }
}

impl fmt::Display for AlarmTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One evidence capture to run against the current frame.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRequest {
    pub tag: AlarmTag,
    pub requested_at: DateTime<Utc>,
}

/// Outcome of evaluating one state.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchDecision {
    /// No alarm predicate holds
    Idle,
    /// Alarms hold but the shared cooldown has not elapsed
    CoolingDown {
        tags: Vec<AlarmTag>,
        remaining_ms: i64,
    },
    /// Cooldown passed; one request per firing alarm
    Fire(Vec<CaptureRequest>),
}

impl DispatchDecision {
    pub fn into_requests(self) -> Vec<CaptureRequest> {
        match self {
            DispatchDecision::Fire(requests) => requests,
            _ => Vec::new(),
        }
    }
}

/// Maps alarm predicates on a reduced state to capture requests.
///
/// A single cooldown is shared by every alarm kind: once a batch fires, no
/// kind can fire again until the cooldown elapses.
pub struct AlarmDispatcher {
    config: AlarmConfig,
    last_capture: Mutex<Option<DateTime<Utc>>>,
}

impl AlarmDispatcher {
    pub fn new(config: AlarmConfig) -> Self {
        Self {
            config,
            last_capture: Mutex::new(None),
        }
    }

    /// Alarm predicates that hold for `state`, in evaluation order.
    pub fn active_alarms(&self, state: &SystemState) -> Vec<AlarmTag> {
        let mut tags = Vec::new();

        if state.vibration.is_active() {
            tags.push(AlarmTag::Vibration);
        }
        if state.pole_tamper.is_active() {
            tags.push(AlarmTag::FenceGate);
        }
        if state.box_tamper.is_active() {
            tags.push(AlarmTag::ControlBox);
        }
        if state.pir.is_active() {
            tags.push(AlarmTag::Motion);
        }
        if state.smoke.is_some_and(|v| v > self.config.smoke_threshold) {
            tags.push(AlarmTag::Smoke);
        }
        if state
            .fence_current
            .is_some_and(|v| v > self.config.current_threshold)
        {
            tags.push(AlarmTag::HighCurrent);
        }

        tags
    }

    /// Evaluate `state` at `now`, consuming the cooldown if a batch fires.
    pub fn dispatch(&self, state: &SystemState, now: DateTime<Utc>) -> DispatchDecision {
        let tags = self.active_alarms(state);
        if tags.is_empty() {
            trace!("No alarm predicates hold");
            return DispatchDecision::Idle;
        }

        // Check and update under one lock so concurrent evaluations serialize.
        let mut last_capture = self.last_capture.lock();
        if let Some(last) = *last_capture {
            let elapsed_ms = now.signed_duration_since(last).num_milliseconds();
            let cooldown_ms =
                i64::try_from(self.config.cooldown().as_millis()).unwrap_or(i64::MAX);
            if elapsed_ms < cooldown_ms {
                debug!(
                    tags = ?tags,
                    elapsed_ms = elapsed_ms,
                    "Capture suppressed by cooldown"
                );
                return DispatchDecision::CoolingDown {
                    tags,
                    remaining_ms: cooldown_ms - elapsed_ms,
                };
            }
        }
        *last_capture = Some(now);

        DispatchDecision::Fire(
            tags.into_iter()
                .map(|tag| CaptureRequest {
                    tag,
                    requested_at: now,
                })
                .collect(),
        )
    }

    /// Time of the last batch that fired
    pub fn last_capture(&self) -> Option<DateTime<Utc>> {
        *self.last_capture.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SensorState;
    use chrono::{Duration, TimeZone};

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap() + Duration::milliseconds(ms)
    }

    fn motion_state() -> SystemState {
        let mut state = SystemState::default();
        state.pir = SensorState::Active;
        state
    }

    #[test]
    fn test_quiet_state_is_idle() {
        let dispatcher = AlarmDispatcher::new(AlarmConfig::default());
        assert_eq!(
            dispatcher.dispatch(&SystemState::default(), at(0)),
            DispatchDecision::Idle
        );
        assert!(dispatcher.last_capture().is_none());
    }

    #[test]
    fn test_cooldown_blocks_second_batch_within_window() {
        let dispatcher = AlarmDispatcher::new(AlarmConfig::default());
        let state = motion_state();

        assert_eq!(dispatcher.dispatch(&state, at(0)).into_requests().len(), 1);
        match dispatcher.dispatch(&state, at(2000)) {
            DispatchDecision::CoolingDown { tags, remaining_ms } => {
                assert_eq!(tags, vec![AlarmTag::Motion]);
                assert_eq!(remaining_ms, 3000);
            }
            other => panic!("Expected CoolingDown, got {:?}", other),
        }
        // Suppression leaves the timestamp where the first batch put it.
        assert_eq!(dispatcher.last_capture(), Some(at(0)));
    }

    #[test]
    fn test_cooldown_elapsed_fires_again() {
        let dispatcher = AlarmDispatcher::new(AlarmConfig::default());
        let state = motion_state();

        assert_eq!(dispatcher.dispatch(&state, at(0)).into_requests().len(), 1);
        assert_eq!(dispatcher.dispatch(&state, at(6000)).into_requests().len(), 1);
        assert_eq!(dispatcher.last_capture(), Some(at(6000)));
    }

    #[test]
    fn test_cooldown_is_shared_across_kinds() {
        let dispatcher = AlarmDispatcher::new(AlarmConfig::default());
        dispatcher.dispatch(&motion_state(), at(0));

        let mut smoky = SystemState::default();
        smoky.smoke = Some(450.0);
        assert!(matches!(
            dispatcher.dispatch(&smoky, at(1000)),
            DispatchDecision::CoolingDown { .. }
        ));
    }

    #[test]
    fn test_all_predicates_fire_in_one_batch() {
        let dispatcher = AlarmDispatcher::new(AlarmConfig::default());
        let mut state = SystemState::default();
        state.vibration = SensorState::Active;
        state.pole_tamper = SensorState::Active;
        state.box_tamper = SensorState::Active;
        state.pir = SensorState::Active;
        state.smoke = Some(301.0);
        state.fence_current = Some(5.5);

        let tags: Vec<AlarmTag> = dispatcher
            .dispatch(&state, at(0))
            .into_requests()
            .into_iter()
            .map(|r| r.tag)
            .collect();
        assert_eq!(
            tags,
            vec![
                AlarmTag::Vibration,
                AlarmTag::FenceGate,
                AlarmTag::ControlBox,
                AlarmTag::Motion,
                AlarmTag::Smoke,
                AlarmTag::HighCurrent,
            ]
        );
    }

    #[test]
    fn test_thresholds_are_strict() {
        let dispatcher = AlarmDispatcher::new(AlarmConfig::default());
        let mut state = SystemState::default();
        state.smoke = Some(300.0);
        state.fence_current = Some(5.0);

        assert!(dispatcher.active_alarms(&state).is_empty());
    }

    #[test]
    fn test_tag_names() {
        assert_eq!(AlarmTag::FenceGate.to_string(), "Fence_Gate");
        assert_eq!(AlarmTag::ControlBox.as_str(), "Control_Box");
        assert_eq!(AlarmTag::HighCurrent.as_str(), "High_Current");
    }
}
