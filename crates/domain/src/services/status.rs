//! Status engine: deterministic classification of device health.
//!
//! Pure decision logic, no I/O. Given the latest reading, the commanded
//! toggle, the mode flags, and whether the local time falls inside the
//! device's schedule, produce a (state, severity) pair.

use serde::Deserialize;

use crate::models::alert::{OperationalState, Severity, StatusDecision};

/// Which telemetry field counts as the "drawing power" signal.
///
/// The threshold meaning follows the signal: watts for `Power`, volts
/// for `Voltage`. Both existed at different points in this system's
/// history, so the choice is configuration, not a constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LivenessSignal {
    Power,
    Voltage,
}

/// Inputs to one evaluation. `None` means no reading is available for
/// the device at all.
#[derive(Debug, Clone, Copy)]
pub struct StatusInput {
    pub power: f64,
    pub voltage: f64,
    /// Commanded on/off toggle.
    pub toggle: bool,
    /// Auto mode: the schedule governs; manual mode ignores it.
    pub auto_mode: bool,
    /// Whether local time falls inside the configured schedule window.
    pub in_schedule: bool,
}

/// Deterministic, side-effect-free status classifier.
#[derive(Debug, Clone, Copy)]
pub struct StatusEngine {
    signal: LivenessSignal,
    threshold: f64,
}

impl StatusEngine {
    pub fn new(signal: LivenessSignal, threshold: f64) -> Self {
        Self { signal, threshold }
    }

    fn drawing_power(&self, input: &StatusInput) -> bool {
        match self.signal {
            LivenessSignal::Power => input.power >= self.threshold,
            LivenessSignal::Voltage => input.voltage >= self.threshold,
        }
    }

    /// Classify a device. First matching rule wins:
    ///
    /// 1. no reading, or zero-voltage sentinel  -> Disconnected/Critical
    /// 2. drawing, commanded on, mode agrees    -> Working/Normal
    /// 3. idle, commanded off, mode agrees      -> Off/Normal
    /// 4. idle but commanded on                 -> PowerLost/Critical
    /// 5. drawing but commanded off             -> Working/Critical
    /// 6. drawing, auto, out of schedule        -> OnOutOfSchedule/Warning
    /// 7. idle, auto, in schedule               -> OffOutOfSchedule/Warning
    /// 8. fallback (unreachable given 1-7)      -> Working/Normal
    pub fn evaluate(&self, input: Option<&StatusInput>) -> StatusDecision {
        let input = match input {
            // Units that lost their meter report an all-zero frame; treat
            // it the same as silence.
            Some(input) if input.voltage != 0.0 => input,
            _ => {
                return StatusDecision::new(OperationalState::Disconnected, Severity::Critical)
            }
        };

        let working = self.drawing_power(input);
        let scheduled_on = !input.auto_mode || input.in_schedule;
        let scheduled_off = !input.auto_mode || !input.in_schedule;

        if working && input.toggle && scheduled_on {
            StatusDecision::new(OperationalState::Working, Severity::Normal)
        } else if !working && !input.toggle && scheduled_off {
            StatusDecision::new(OperationalState::Off, Severity::Normal)
        } else if !working && input.toggle {
            StatusDecision::new(OperationalState::PowerLost, Severity::Critical)
        } else if working && !input.toggle {
            // Still drawing power despite a commanded-off.
            StatusDecision::new(OperationalState::Working, Severity::Critical)
        } else if working && input.auto_mode && !input.in_schedule {
            StatusDecision::new(OperationalState::OnOutOfSchedule, Severity::Warning)
        } else if !working && input.auto_mode && input.in_schedule {
            StatusDecision::new(OperationalState::OffOutOfSchedule, Severity::Warning)
        } else {
            StatusDecision::new(OperationalState::Working, Severity::Normal)
        }
    }
}
