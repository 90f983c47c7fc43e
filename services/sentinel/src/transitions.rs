//! Edge detection between consecutive states.
//!
//! Only edges into `ACTIVE` are reported for the motion, vibration and
//! tamper sensors; recovery is visible from current status.

use crate::ledger::Severity;
use crate::state::{SensorState, SystemState};

/// A semantic event derived from a state delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    MotionTriggered,
    VibrationDetected,
    PoleTamper,
    BoxOpened,
    FencePower { armed: bool },
    ConnectionEstablished,
    ConnectionLost,
}

impl Transition {
    pub fn message(&self) -> &'static str {
        match self {
            Transition::MotionTriggered => "Motion Sensor Triggered (PIR)",
            Transition::VibrationDetected => "Fence Vibration Detected",
            Transition::PoleTamper => "Pole Tamper Switch Activation",
            Transition::BoxOpened => "Control Box Door Opened",
            Transition::FencePower { armed: true } => "Fence Power ARMED",
            Transition::FencePower { armed: false } => "Fence Power DISARMED",
            Transition::ConnectionEstablished => "ESP32 Connection Established",
            Transition::ConnectionLost => "ESP32 Connection Lost",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Transition::MotionTriggered | Transition::VibrationDetected => Severity::Alert,
            Transition::PoleTamper | Transition::BoxOpened | Transition::ConnectionLost => {
                Severity::Error
            }
            Transition::FencePower { .. } | Transition::ConnectionEstablished => Severity::Info,
        }
    }
}

fn rose(prev: SensorState, next: SensorState) -> bool {
    next.is_active() && !prev.is_active()
}

/// Compare `prev` against `next` and return the events in ledger order.
pub fn detect(prev: &SystemState, next: &SystemState) -> Vec<Transition> {
    let mut events = Vec::new();

    if rose(prev.pir, next.pir) {
        events.push(Transition::MotionTriggered);
    }
    if rose(prev.vibration, next.vibration) {
        events.push(Transition::VibrationDetected);
    }
    if rose(prev.pole_tamper, next.pole_tamper) {
        events.push(Transition::PoleTamper);
    }
    if rose(prev.box_tamper, next.box_tamper) {
        events.push(Transition::BoxOpened);
    }

    // No baseline on first report, so the initial relay state is not a change.
    if let (Some(before), Some(after)) = (prev.fence_active, next.fence_active) {
        if before != after {
            events.push(Transition::FencePower { armed: after });
        }
    }

    if next.online && !prev.online {
        events.push(Transition::ConnectionEstablished);
    }
    if !next.online && prev.online {
        events.push(Transition::ConnectionLost);
    }

    events
}
