use serde::{Deserialize, Serialize};

use crate::core::{FinalStatus, ProbeResult, RemediationOutcome};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsInfo {
    pub name: String,
    /// Kernel release.
    pub version: String,
    /// Distribution or product name, e.g. `Linux (Debian 12)`.
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub arch: String,
    #[serde(default)]
    pub processor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python_version: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Diagnose,
    Repair,
}

impl RunMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            RunMode::Diagnose => "diagnose",
            RunMode::Repair => "repair",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    /// Position of the probe in the registration order.
    pub order: usize,
    pub description: String,
    pub result: ProbeResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<RemediationOutcome>,
    pub final_status: FinalStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub ok: usize,
    pub warning: usize,
    pub skipped: usize,
    pub fault: usize,
    pub ok_resolved: usize,
    pub fault_unresolved: usize,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub schema_version: String,
    pub tool_version: String,
    pub os: OsInfo,
    pub generated_at: String,
    pub mode: RunMode,
    pub summary: ReportSummary,
    pub entries: Vec<ReportEntry>,
}

impl Report {
    pub fn has_unresolved_faults(&self) -> bool {
        self.entries.iter().any(|e| e.final_status.is_fault())
    }
}

/// Orders entries by registration and tallies the summary. Notes are kept as given.
pub fn aggregate(
    mut entries: Vec<ReportEntry>,
    os: OsInfo,
    mode: RunMode,
    generated_at: String,
    notes: Vec<String>,
) -> Report {
    entries.sort_by_key(|e| e.order);

    let mut summary = ReportSummary {
        notes,
        ..ReportSummary::default()
    };
    for entry in &entries {
        match entry.final_status {
            FinalStatus::Ok => summary.ok += 1,
            FinalStatus::Warning => summary.warning += 1,
            FinalStatus::Skipped => summary.skipped += 1,
            FinalStatus::Fault => summary.fault += 1,
            FinalStatus::OkResolved => summary.ok_resolved += 1,
            FinalStatus::FaultUnresolved => summary.fault_unresolved += 1,
        }
    }

    Report {
        schema_version: "1.0".to_string(),
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
        os,
        generated_at,
        mode,
        summary,
        entries,
    }
}
