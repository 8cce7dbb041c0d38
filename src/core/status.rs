use serde::{Deserialize, Serialize};
use std::fmt;

/// Status assigned by the classifier to a single probe run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProbeStatus {
    Ok,
    Warning,
    Fault,
    Skipped,
}

impl ProbeStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            ProbeStatus::Ok => "OK",
            ProbeStatus::Warning => "WARNING",
            ProbeStatus::Fault => "FAULT",
            ProbeStatus::Skipped => "SKIPPED",
        }
    }
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal state of a probe after the optional remediation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinalStatus {
    Ok,
    Warning,
    Skipped,
    /// Fault left as-is because remediation was disabled (`--diagnose-only`).
    Fault,
    OkResolved,
    FaultUnresolved,
}

impl FinalStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            FinalStatus::Ok => "OK",
            FinalStatus::Warning => "WARNING",
            FinalStatus::Skipped => "SKIPPED",
            FinalStatus::Fault => "FAULT",
            FinalStatus::OkResolved => "OK_RESOLVED",
            FinalStatus::FaultUnresolved => "FAULT_UNRESOLVED",
        }
    }

    pub const fn is_fault(self) -> bool {
        matches!(self, FinalStatus::Fault | FinalStatus::FaultUnresolved)
    }

    /// Maps a status that never went through remediation.
    pub const fn from_unremediated(status: ProbeStatus, diagnose_only: bool) -> Self {
        match status {
            ProbeStatus::Ok => FinalStatus::Ok,
            ProbeStatus::Warning => FinalStatus::Warning,
            ProbeStatus::Skipped => FinalStatus::Skipped,
            ProbeStatus::Fault if diagnose_only => FinalStatus::Fault,
            ProbeStatus::Fault => FinalStatus::FaultUnresolved,
        }
    }
}

impl fmt::Display for FinalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
