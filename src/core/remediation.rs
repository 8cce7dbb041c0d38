use serde::{Deserialize, Serialize};

/// Corrective action bound to a faulting probe. Only ever applied to FAULT results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum RemediationAction {
    #[serde(rename = "REPAIR_PIP")]
    RepairPip,
    #[serde(rename = "INSTALL_PACKAGE")]
    InstallPackage { name: String, min_version: String },
    #[serde(rename = "CLEAR_PIP_CACHE")]
    ClearPipCache,
    #[serde(rename = "ADD_PATH_ENTRY")]
    AddPathEntry { dir: String },
    #[serde(rename = "SET_ENV_VARS")]
    SetEnvVars { vars: Vec<(String, String)> },
}

impl RemediationAction {
    pub fn id(&self) -> String {
        match self {
            RemediationAction::RepairPip => "repair-pip".to_string(),
            RemediationAction::InstallPackage { name, .. } => format!("install-package:{name}"),
            RemediationAction::ClearPipCache => "clear-pip-cache".to_string(),
            RemediationAction::AddPathEntry { .. } => "add-path-entry".to_string(),
            RemediationAction::SetEnvVars { .. } => "set-env-vars".to_string(),
        }
    }

    pub fn title(&self) -> String {
        match self {
            RemediationAction::RepairPip => "pip を修復（ensurepip + pip/setuptools/wheel 更新）".to_string(),
            RemediationAction::InstallPackage { name, min_version } => {
                format!("{name}>={min_version} をインストール")
            }
            RemediationAction::ClearPipCache => "pip キャッシュを削除（`pip cache purge`）".to_string(),
            RemediationAction::AddPathEntry { dir } => format!("PATH に追加: {dir}"),
            RemediationAction::SetEnvVars { vars } => {
                let keys: Vec<&str> = vars.iter().map(|(k, _)| k.as_str()).collect();
                format!("環境変数を設定: {}", keys.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationOutcome {
    pub action_id: String,
    pub succeeded: bool,
    pub detail: String,
}

impl RemediationOutcome {
    pub fn success(action: &RemediationAction, detail: impl Into<String>) -> Self {
        Self {
            action_id: action.id(),
            succeeded: true,
            detail: detail.into(),
        }
    }

    pub fn failure(action: &RemediationAction, detail: impl AsRef<str>) -> Self {
        Self {
            action_id: action.id(),
            succeeded: false,
            detail: format!("remediation_failed: {}", detail.as_ref()),
        }
    }
}
