use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceKind {
    Path,
    Command,
    Stat,
    Env,
}

impl EvidenceKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            EvidenceKind::Path => "path",
            EvidenceKind::Command => "command",
            EvidenceKind::Stat => "stat",
            EvidenceKind::Env => "env",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub kind: EvidenceKind,
    pub value: String,
}

impl Evidence {
    pub fn path(value: impl Into<String>) -> Self {
        Self {
            kind: EvidenceKind::Path,
            value: value.into(),
        }
    }

    pub fn command(value: impl Into<String>) -> Self {
        Self {
            kind: EvidenceKind::Command,
            value: value.into(),
        }
    }

    pub fn stat(value: impl Into<String>) -> Self {
        Self {
            kind: EvidenceKind::Stat,
            value: value.into(),
        }
    }

    pub fn env(key: &str, value: Option<&str>) -> Self {
        Self {
            kind: EvidenceKind::Env,
            value: format!("{key}={}", value.unwrap_or("（未設定）")),
        }
    }
}
