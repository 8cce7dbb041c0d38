use std::path::PathBuf;
use std::time::Duration;

use crate::classify::Observation;
use crate::core::{
    FinalStatus, OsInfo, ProbeStatus, RemediationAction, Report, ReportEntry, RunMode, aggregate,
    now_rfc3339,
};
use crate::platform::{self, Host};
use crate::probes::{EnvSnapshot, Probe, ProbeContext, ProbeRun, ProbeSettings, registry, run_probe};
use crate::remediate::{PipPackageManager, Remediator, action_for, advice_for};

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub diagnose_only: bool,
    pub show_progress: bool,
    pub timeout: Duration,
}

pub struct Engine {
    opts: EngineOptions,
    settings: ProbeSettings,
    home_dir: PathBuf,
}

impl Engine {
    pub fn new(opts: EngineOptions, settings: ProbeSettings, home_dir: PathBuf) -> Self {
        Self {
            opts,
            settings,
            home_dir,
        }
    }

    pub fn run(&self, host: &dyn Host) -> Report {
        let os = platform::os_info(std::cmp::min(self.opts.timeout, Duration::from_secs(2)));
        self.run_with_os(host, os)
    }

    /// Runs every probe in registration order. A FAULT gets at most one
    /// remediation attempt, followed by exactly one re-run on a fresh snapshot
    /// when the attempt succeeded.
    pub fn run_with_os(&self, host: &dyn Host, mut os: OsInfo) -> Report {
        use std::io::IsTerminal;
        let progress_enabled = self.opts.show_progress && std::io::stderr().is_terminal();
        let pb = if progress_enabled {
            let pb = indicatif::ProgressBar::new_spinner();
            pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
            pb.set_message("診断中...");
            pb.enable_steady_tick(Duration::from_millis(120));
            Some(pb)
        } else {
            None
        };

        let probes = registry(&self.settings);
        let packages = PipPackageManager::new(host, &self.settings);
        let remediator = Remediator::new(
            host,
            &self.settings,
            &packages,
            Some(crate::logs::backup_dir(&self.home_dir)),
        );

        let mut snapshot = EnvSnapshot::capture(host);
        tracing::debug!(captured_at = snapshot.captured_at(), "environment snapshot taken");
        let mut entries = Vec::with_capacity(probes.len());
        let mut notes = Vec::new();

        for (order, probe) in probes.iter().enumerate() {
            if let Some(pb) = &pb {
                pb.set_message(format!("診断中: {}", probe.description()));
            }
            let first = self.probe_once(probe, host, &snapshot);
            tracing::debug!(probe = %first.result.probe_id, status = %first.result.status, "probe finished");
            if let Some(Observation::Interpreter {
                version: Some(version),
                ..
            }) = &first.observation
            {
                os.python_version = Some(version.to_string());
            }

            let action = if first.result.status == ProbeStatus::Fault && !self.opts.diagnose_only {
                action_for(probe, first.observation.as_ref())
            } else {
                None
            };

            let Some(action) = action else {
                entries.push(ReportEntry {
                    order,
                    description: probe.description(),
                    final_status: FinalStatus::from_unremediated(
                        first.result.status,
                        self.opts.diagnose_only,
                    ),
                    result: first.result,
                    remediation: None,
                });
                continue;
            };

            if let Some(pb) = &pb {
                pb.set_message(format!("修復中: {}", action.title()));
            }
            let outcome = remediator.attempt(&action);
            if !outcome.succeeded {
                entries.push(ReportEntry {
                    order,
                    description: probe.description(),
                    result: first.result,
                    remediation: Some(outcome),
                    final_status: FinalStatus::FaultUnresolved,
                });
                continue;
            }

            notes.extend(persist_hints(&action));
            snapshot = EnvSnapshot::capture(host);
            tracing::debug!(captured_at = snapshot.captured_at(), "environment snapshot retaken");
            let rerun = self.probe_once(probe, host, &snapshot);
            let final_status = if rerun.result.status == ProbeStatus::Fault {
                FinalStatus::FaultUnresolved
            } else {
                FinalStatus::OkResolved
            };
            entries.push(ReportEntry {
                order,
                description: probe.description(),
                result: rerun.result,
                remediation: Some(outcome),
                final_status,
            });
        }

        if let Some(pb) = pb {
            pb.finish_and_clear();
        }

        for (probe, entry) in probes.iter().zip(&entries) {
            if let Some(advice) = advice_for(probe, entry.final_status) {
                if !notes.contains(&advice) {
                    notes.push(advice);
                }
            }
        }

        let mode = if self.opts.diagnose_only {
            notes.push("診断のみモードのため修復は実行していません。".to_string());
            RunMode::Diagnose
        } else {
            RunMode::Repair
        };

        aggregate(entries, os, mode, now_rfc3339(), notes)
    }

    fn probe_once(&self, probe: &Probe, host: &dyn Host, snapshot: &EnvSnapshot) -> ProbeRun {
        let ctx = ProbeContext {
            host,
            snapshot,
            settings: &self.settings,
        };
        run_probe(probe, &ctx)
    }
}

/// Environment fixes only live as long as this process; tell the user how to keep them.
fn persist_hints(action: &RemediationAction) -> Vec<String> {
    match action {
        RemediationAction::AddPathEntry { dir } => vec![format!(
            "PATH の変更はこの実行中のみ有効です。シェル設定に追加してください: export PATH=\"$PATH:{dir}\""
        )],
        RemediationAction::SetEnvVars { vars } => vars
            .iter()
            .map(|(k, v)| {
                format!("環境変数の変更はこの実行中のみ有効です。シェル設定に追加してください: export {k}=\"{v}\"")
            })
            .collect(),
        _ => vec![],
    }
}
