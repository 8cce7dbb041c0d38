use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::core::{Evidence, ProbeStatus};

/// Outcome of one probe run. Built once and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub probe_id: String,
    pub status: ProbeStatus,
    pub detail: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<Evidence>,
}

impl ProbeResult {
    pub fn new(
        probe_id: impl Into<String>,
        status: ProbeStatus,
        detail: impl Into<String>,
        evidence: Vec<Evidence>,
    ) -> Self {
        Self {
            probe_id: probe_id.into(),
            status,
            detail: detail.into(),
            timestamp: now_rfc3339(),
            evidence,
        }
    }
}

pub(crate) fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "unknown".to_string())
}
