//! Alert domain models: operational states, severities, alert records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Derived operational state of a power-control unit.
///
/// The same state can carry different severities (a unit that keeps
/// drawing power after a commanded-off is `Working` at `Critical`), so
/// classification always travels as a [`StatusDecision`] pair and is
/// never re-derived from the state name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationalState {
    Working,
    Off,
    Disconnected,
    PowerLost,
    OnOutOfSchedule,
    OffOutOfSchedule,
}

impl std::fmt::Display for OperationalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OperationalState::Working => "working",
            OperationalState::Off => "off",
            OperationalState::Disconnected => "disconnected",
            OperationalState::PowerLost => "power_lost",
            OperationalState::OnOutOfSchedule => "on_out_of_schedule",
            OperationalState::OffOutOfSchedule => "off_out_of_schedule",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for OperationalState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "working" => Ok(OperationalState::Working),
            "off" => Ok(OperationalState::Off),
            "disconnected" => Ok(OperationalState::Disconnected),
            "power_lost" => Ok(OperationalState::PowerLost),
            "on_out_of_schedule" => Ok(OperationalState::OnOutOfSchedule),
            "off_out_of_schedule" => Ok(OperationalState::OffOutOfSchedule),
            other => Err(format!("unknown operational state: {other}")),
        }
    }
}

/// Alert severity, ordered from least to most urgent.
///
/// Only `Warning` and `Critical` transitions produce alerts.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Normal,
    Warning,
    Critical,
}

impl Severity {
    /// Whether a decision at this severity is worth persisting and
    /// publishing as an alert.
    pub fn is_alertable(&self) -> bool {
        *self > Severity::Normal
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Normal => "normal",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(Severity::Normal),
            "warning" => Ok(Severity::Warning),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

/// The outcome of one status evaluation: a (state, severity) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusDecision {
    pub state: OperationalState,
    pub severity: Severity,
}

impl StatusDecision {
    pub fn new(state: OperationalState, severity: Severity) -> Self {
        Self { state, severity }
    }
}

/// One persisted state transition. Append-only: alert rows are never
/// updated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRecord {
    pub state: OperationalState,
    pub severity: Severity,
    pub device_id: Uuid,
    pub device_name: String,
    pub tenant_id: Uuid,
    pub address: String,
    pub timestamp: DateTime<Utc>,
}
