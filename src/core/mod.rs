mod evidence;
mod remediation;
mod report;
mod result;
mod status;

pub use evidence::{Evidence, EvidenceKind};
pub use remediation::{RemediationAction, RemediationOutcome};
pub use report::{OsInfo, Report, ReportEntry, ReportSummary, RunMode, aggregate};
pub use result::ProbeResult;
pub(crate) use result::now_rfc3339;
pub use status::{FinalStatus, ProbeStatus};
