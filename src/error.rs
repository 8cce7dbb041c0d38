use thiserror::Error;

/// Failures the diagnose/repair pipeline distinguishes between. Only
/// `Configuration` ever aborts a run; the rest become report values.
#[derive(Debug, Error)]
pub enum DoctorError {
    #[error("プローブの実行に失敗しました（{probe_id}）: {message}")]
    ProbeExecution { probe_id: String, message: String },

    #[error("修復に失敗しました（{action_id}）: {message}")]
    Remediation { action_id: String, message: String },

    #[error("設定が不正です: {0}")]
    Configuration(String),

    #[error("この環境では実行できません: {0}")]
    EnvironmentUnsupported(String),
}

impl DoctorError {
    pub fn unsupported(reason: impl Into<String>) -> anyhow::Error {
        DoctorError::EnvironmentUnsupported(reason.into()).into()
    }

    pub fn configuration(message: impl Into<String>) -> anyhow::Error {
        DoctorError::Configuration(message.into()).into()
    }
}

/// True when the error chain says the probe cannot run on this platform.
pub fn is_unsupported(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<DoctorError>(),
            Some(DoctorError::EnvironmentUnsupported(_))
        )
    })
}
