use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::platform::Host;

/// Environment variables frozen at one point in time. Probes read this instead
/// of the live environment so that every probe in a pass sees the same values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvSnapshot {
    vars: BTreeMap<String, String>,
    captured_at: String,
}

impl EnvSnapshot {
    pub fn capture(host: &dyn Host) -> Self {
        Self::from_vars(host.env_vars())
    }

    pub fn from_vars(vars: BTreeMap<String, String>) -> Self {
        Self {
            vars,
            captured_at: crate::core::now_rfc3339(),
        }
    }

    pub fn captured_at(&self) -> &str {
        &self.captured_at
    }

    pub fn var(&self, key: &str) -> Option<&str> {
        if let Some(v) = self.vars.get(key) {
            return Some(v.as_str());
        }
        if cfg!(windows) {
            return self
                .vars
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v.as_str());
        }
        None
    }

    pub fn path_entries(&self) -> Vec<PathBuf> {
        match self.var("PATH") {
            Some(path) => std::env::split_paths(path).collect(),
            None => Vec::new(),
        }
    }

    pub fn has_path_entry(&self, dir: &Path) -> bool {
        let want = normalize(dir);
        self.path_entries().iter().any(|p| normalize(p) == want)
    }
}

fn normalize(p: &Path) -> PathBuf {
    p.components().collect()
}
