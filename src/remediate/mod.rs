use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use crate::classify::Observation;
use crate::core::{RemediationAction, RemediationOutcome};
use crate::error::DoctorError;
use crate::platform::{CommandOutput, ExternalCommand, Host, is_timeout};
use crate::probes::{Probe, ProbeSettings};

mod advice;

pub use advice::advice_for;

/// The corrective action for a faulting probe, if one exists. Callers must only
/// ask for FAULT results.
pub fn action_for(probe: &Probe, observation: Option<&Observation>) -> Option<RemediationAction> {
    match (probe, observation) {
        (Probe::Pip, _) => Some(RemediationAction::RepairPip),
        (Probe::Package { name, min_version }, _) => Some(RemediationAction::InstallPackage {
            name: name.clone(),
            min_version: min_version.to_string(),
        }),
        (Probe::DiskSpace, _) => Some(RemediationAction::ClearPipCache),
        (Probe::ScriptsOnPath, Some(Observation::ScriptsOnPath { dir, .. })) => {
            Some(RemediationAction::AddPathEntry { dir: dir.clone() })
        }
        (Probe::Environment, Some(Observation::Environment { unmet, .. })) if !unmet.is_empty() => {
            Some(RemediationAction::SetEnvVars {
                vars: unmet.clone(),
            })
        }
        _ => None,
    }
}

pub trait PackageManager {
    fn install(&self, spec: &str) -> Result<CommandOutput>;
}

/// Installs through `<python> -m pip install --upgrade`.
pub struct PipPackageManager<'a> {
    host: &'a dyn Host,
    settings: &'a ProbeSettings,
}

impl<'a> PipPackageManager<'a> {
    pub fn new(host: &'a dyn Host, settings: &'a ProbeSettings) -> Self {
        Self { host, settings }
    }
}

impl PackageManager for PipPackageManager<'_> {
    fn install(&self, spec: &str) -> Result<CommandOutput> {
        let cmd = self
            .settings
            .python(&["-m", "pip", "install", "--upgrade", spec]);
        self.host.run(&cmd)
    }
}

pub struct Remediator<'a> {
    host: &'a dyn Host,
    settings: &'a ProbeSettings,
    packages: &'a dyn PackageManager,
    backup_dir: Option<PathBuf>,
}

impl<'a> Remediator<'a> {
    pub fn new(
        host: &'a dyn Host,
        settings: &'a ProbeSettings,
        packages: &'a dyn PackageManager,
        backup_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            host,
            settings,
            packages,
            backup_dir,
        }
    }

    /// Applies `action` once. Failures are returned as an unsuccessful outcome,
    /// never as an error.
    pub fn attempt(&self, action: &RemediationAction) -> RemediationOutcome {
        tracing::info!(action = %action.id(), "remediation start");
        match self.apply(action) {
            Ok(detail) => {
                tracing::info!(action = %action.id(), "remediation succeeded");
                RemediationOutcome::success(action, detail)
            }
            Err(err) => {
                let message = if is_timeout(&err) {
                    format!("timeout: {err:#}")
                } else {
                    format!("{err:#}")
                };
                let err = DoctorError::Remediation {
                    action_id: action.id(),
                    message,
                };
                tracing::warn!("{err}");
                RemediationOutcome::failure(action, err.to_string())
            }
        }
    }

    fn apply(&self, action: &RemediationAction) -> Result<String> {
        match action {
            RemediationAction::RepairPip => {
                let backup = self.backup_pip_freeze();
                self.run_checked(&self.settings.python(&["-m", "ensurepip", "--upgrade"]))?;
                self.run_checked(&self.settings.python(&[
                    "-m", "pip", "install", "--upgrade", "pip", "setuptools", "wheel",
                ]))?;
                Ok(match backup {
                    Some(path) => format!(
                        "pip を再インストールしました（バックアップ: {}）",
                        path.display()
                    ),
                    None => "pip を再インストールしました（バックアップなし）".to_string(),
                })
            }
            RemediationAction::InstallPackage { name, min_version } => {
                let spec = format!("{name}>={min_version}");
                let out = self.packages.install(&spec)?;
                ensure_success(&format!("pip install {spec}"), &out)?;
                Ok(format!("{spec} をインストールしました"))
            }
            RemediationAction::ClearPipCache => {
                self.run_checked(&self.settings.python(&["-m", "pip", "cache", "purge"]))?;
                Ok("pip キャッシュを削除しました".to_string())
            }
            RemediationAction::AddPathEntry { dir } => self.add_path_entry(Path::new(dir)),
            RemediationAction::SetEnvVars { vars } => {
                for (key, value) in vars {
                    if key.is_empty() || key.contains('=') {
                        return Err(anyhow!("環境変数名が不正です: {key:?}"));
                    }
                    self.host.set_env_var(key, value);
                }
                let keys: Vec<&str> = vars.iter().map(|(k, _)| k.as_str()).collect();
                Ok(format!("環境変数を設定しました: {}", keys.join(", ")))
            }
        }
    }

    fn add_path_entry(&self, dir: &Path) -> Result<String> {
        let current = self.host.env_vars().get("PATH").cloned().unwrap_or_default();
        let mut entries: Vec<PathBuf> = std::env::split_paths(&current).collect();
        let want: PathBuf = dir.components().collect();
        if entries.iter().any(|p| p.components().collect::<PathBuf>() == want) {
            return Ok(format!("PATH に既に含まれています: {}", dir.display()));
        }
        entries.push(dir.to_path_buf());
        let joined = std::env::join_paths(&entries)
            .with_context(|| format!("PATH に追加できません: {}", dir.display()))?;
        let joined = joined
            .into_string()
            .map_err(|_| anyhow!("PATH が UTF-8 ではありません"))?;
        self.host.set_env_var("PATH", &joined);
        Ok(format!("PATH に追加しました: {}", dir.display()))
    }

    fn run_checked(&self, cmd: &ExternalCommand) -> Result<CommandOutput> {
        let out = self.host.run(cmd)?;
        ensure_success(&cmd.cmdline(), &out)?;
        Ok(out)
    }

    /// Best effort: a broken pip usually cannot freeze, which must not block the repair.
    fn backup_pip_freeze(&self) -> Option<PathBuf> {
        let dir = self.backup_dir.as_ref()?;
        let out = match self.host.run(&self.settings.python(&["-m", "pip", "freeze"])) {
            Ok(out) if out.success() => out,
            Ok(out) => {
                tracing::debug!(exit_code = out.exit_code, "pip freeze failed; skipping backup");
                return None;
            }
            Err(err) => {
                tracing::debug!(error = %format!("{err:#}"), "pip freeze failed; skipping backup");
                return None;
            }
        };
        let path = dir.join(crate::logs::backup_file_name());
        let written = std::fs::create_dir_all(dir)
            .and_then(|()| std::fs::write(&path, out.stdout.as_bytes()));
        match written {
            Ok(()) => Some(path),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "pip freeze backup not written");
                None
            }
        }
    }
}

fn ensure_success(what: &str, out: &CommandOutput) -> Result<()> {
    if out.success() {
        return Ok(());
    }
    match out.first_error_line() {
        Some(line) => Err(anyhow!(
            "{what} が失敗しました（exit_code={}）: {line}",
            out.exit_code
        )),
        None => Err(anyhow!(
            "{what} が失敗しました（exit_code={}）",
            out.exit_code
        )),
    }
}
