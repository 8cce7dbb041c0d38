use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};

use crate::classify::{Observation, Thresholds, classify};
use crate::config::EffectiveConfig;
use crate::core::{Evidence, ProbeResult, ProbeStatus};
use crate::error::{DoctorError, is_unsupported};
use crate::platform::{CommandOutput, ExternalCommand, Host};

mod python;
mod snapshot;
#[cfg(test)]
pub(crate) mod test_support;

pub use python::{PyVersion, parse_pip_show_version, parse_pip_version, parse_python_version};
pub use snapshot::EnvSnapshot;

const PURELIB_QUERY: &str = "import sysconfig; print(sysconfig.get_path('purelib'))";
const SCRIPTS_QUERY: &str = "import sysconfig; print(sysconfig.get_path('scripts'))";
const TLS_PORT: u16 = 443;

/// Inputs the probes need, resolved once from configuration.
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    pub interpreter: String,
    pub min_python: PyVersion,
    pub min_pip: PyVersion,
    pub packages: BTreeMap<String, PyVersion>,
    pub disk_path: PathBuf,
    pub required_env: BTreeMap<String, String>,
    pub watched_env: Vec<String>,
    pub dns_host: String,
    pub tls_host: String,
    pub network_targets: Vec<String>,
    pub thresholds: Thresholds,
    pub command_timeout: Duration,
}

impl ProbeSettings {
    pub fn from_config(cfg: &EffectiveConfig, home_dir: &Path, command_timeout: Duration) -> Self {
        Self {
            interpreter: cfg.python.interpreter.clone(),
            min_python: cfg.python.min_version.clone(),
            min_pip: cfg.python.min_pip_version.clone(),
            packages: cfg.python.packages.clone(),
            disk_path: cfg
                .disk
                .path
                .as_ref()
                .map(PathBuf::from)
                .unwrap_or_else(|| home_dir.to_path_buf()),
            required_env: cfg.env.required.clone(),
            watched_env: cfg.env.watch.clone(),
            dns_host: cfg.network.dns_host.clone(),
            tls_host: cfg.network.tls_host.clone(),
            network_targets: cfg.network.targets.clone(),
            thresholds: cfg.thresholds,
            command_timeout,
        }
    }

    pub fn python(&self, args: &[&str]) -> ExternalCommand {
        ExternalCommand::new(
            self.interpreter.clone(),
            args.iter().copied(),
            self.command_timeout,
        )
    }

    fn network_timeout(&self) -> Duration {
        Duration::from_millis(self.thresholds.network_timeout_ms)
    }
}

pub struct ProbeContext<'a> {
    pub host: &'a dyn Host,
    pub snapshot: &'a EnvSnapshot,
    pub settings: &'a ProbeSettings,
}

/// One diagnostic check. The set is closed so the full registry is known at
/// compile time and every probe shares the same `observe` capability.
#[derive(Debug, Clone, PartialEq)]
pub enum Probe {
    Interpreter,
    Pip,
    Package { name: String, min_version: PyVersion },
    SitePackages,
    ScriptsOnPath,
    Environment,
    DiskSpace,
    Memory,
    Cpu,
    Dns { host: String },
    Tls { host: String },
    Network { target: String },
}

/// The probes for one run, in execution order. A target listed twice is
/// probed once.
pub fn registry(settings: &ProbeSettings) -> Vec<Probe> {
    let mut probes = vec![Probe::Interpreter, Probe::Pip];
    probes.extend(settings.packages.iter().map(|(name, min)| Probe::Package {
        name: name.clone(),
        min_version: min.clone(),
    }));
    probes.extend([
        Probe::SitePackages,
        Probe::ScriptsOnPath,
        Probe::Environment,
        Probe::DiskSpace,
        Probe::Memory,
        Probe::Cpu,
    ]);
    if !settings.dns_host.trim().is_empty() {
        probes.push(Probe::Dns {
            host: settings.dns_host.trim().to_string(),
        });
    }
    if !settings.tls_host.trim().is_empty() {
        probes.push(Probe::Tls {
            host: settings.tls_host.trim().to_string(),
        });
    }
    let mut seen = std::collections::BTreeSet::new();
    for target in &settings.network_targets {
        if seen.insert(target.as_str()) {
            probes.push(Probe::Network {
                target: target.clone(),
            });
        }
    }
    probes
}

impl Probe {
    pub fn id(&self) -> String {
        match self {
            Probe::Interpreter => "python-interpreter".to_string(),
            Probe::Pip => "pip".to_string(),
            Probe::Package { name, .. } => format!("package:{name}"),
            Probe::SitePackages => "site-packages".to_string(),
            Probe::ScriptsOnPath => "scripts-on-path".to_string(),
            Probe::Environment => "environment".to_string(),
            Probe::DiskSpace => "disk-space".to_string(),
            Probe::Memory => "memory".to_string(),
            Probe::Cpu => "cpu".to_string(),
            Probe::Dns { .. } => "dns".to_string(),
            Probe::Tls { .. } => "tls".to_string(),
            Probe::Network { target } => format!("network:{target}"),
        }
    }

    pub fn description(&self) -> String {
        match self {
            Probe::Interpreter => "Python インタプリタ".to_string(),
            Probe::Pip => "pip".to_string(),
            Probe::Package { name, min_version } => format!("パッケージ {name}>={min_version}"),
            Probe::SitePackages => "site-packages ディレクトリ".to_string(),
            Probe::ScriptsOnPath => "スクリプトディレクトリの PATH".to_string(),
            Probe::Environment => "環境変数".to_string(),
            Probe::DiskSpace => "ディスク空き容量".to_string(),
            Probe::Memory => "メモリ使用率".to_string(),
            Probe::Cpu => "CPU 使用率".to_string(),
            Probe::Dns { host } => format!("名前解決（{host}）"),
            Probe::Tls { host } => format!("TLS ハンドシェイク（{host}）"),
            Probe::Network { target } => format!("ネットワーク到達性（{target}）"),
        }
    }

    pub fn observe(&self, ctx: &ProbeContext<'_>, evidence: &mut Vec<Evidence>) -> Result<Observation> {
        let settings = ctx.settings;
        match self {
            Probe::Interpreter => {
                let cmd = settings.python(&["--version"]);
                evidence.push(Evidence::command(cmd.cmdline()));
                let obs = match ctx.host.run(&cmd) {
                    Ok(out) if out.success() => {
                        let raw = format!("{}{}", out.stdout, out.stderr);
                        Observation::Interpreter {
                            version: parse_python_version(&raw),
                            raw,
                            min: settings.min_python.clone(),
                        }
                    }
                    Ok(out) => Observation::Interpreter {
                        version: None,
                        raw: exit_summary(&out),
                        min: settings.min_python.clone(),
                    },
                    Err(err) => Observation::Interpreter {
                        version: None,
                        raw: format!("{err:#}"),
                        min: settings.min_python.clone(),
                    },
                };
                Ok(obs)
            }
            Probe::Pip => {
                let cmd = settings.python(&["-m", "pip", "--version"]);
                evidence.push(Evidence::command(cmd.cmdline()));
                let obs = match ctx.host.run(&cmd) {
                    Ok(out) if out.success() => Observation::Pip {
                        available: true,
                        version: parse_pip_version(&out.stdout),
                        raw: out.stdout,
                        min: settings.min_pip.clone(),
                    },
                    Ok(out) => Observation::Pip {
                        available: false,
                        version: None,
                        raw: exit_summary(&out),
                        min: settings.min_pip.clone(),
                    },
                    Err(err) => Observation::Pip {
                        available: false,
                        version: None,
                        raw: format!("{err:#}"),
                        min: settings.min_pip.clone(),
                    },
                };
                Ok(obs)
            }
            Probe::Package { name, min_version } => {
                let cmd = settings.python(&["-m", "pip", "show", name]);
                evidence.push(Evidence::command(cmd.cmdline()));
                let out = ctx.host.run(&cmd)?;
                let installed = if out.success() {
                    parse_pip_show_version(&out.stdout)
                } else {
                    None
                };
                Ok(Observation::Package {
                    name: name.clone(),
                    installed,
                    min: min_version.clone(),
                })
            }
            Probe::SitePackages => {
                let dir = query_python_path(ctx, PURELIB_QUERY, evidence)?;
                evidence.push(Evidence::path(dir.display().to_string()));
                Ok(Observation::SitePackages {
                    path: dir.display().to_string(),
                    status: ctx.host.dir_status(&dir),
                })
            }
            Probe::ScriptsOnPath => {
                let dir = query_python_path(ctx, SCRIPTS_QUERY, evidence)?;
                evidence.push(Evidence::path(dir.display().to_string()));
                Ok(Observation::ScriptsOnPath {
                    dir: dir.display().to_string(),
                    exists: ctx.host.dir_status(&dir).exists,
                    on_path: ctx.snapshot.has_path_entry(&dir),
                })
            }
            Probe::Environment => {
                let mut unmet = Vec::new();
                for (key, expected) in &settings.required_env {
                    let actual = ctx.snapshot.var(key);
                    evidence.push(Evidence::env(key, actual));
                    if actual != Some(expected.as_str()) {
                        unmet.push((key.clone(), expected.clone()));
                    }
                }
                let watched = settings
                    .watched_env
                    .iter()
                    .map(|key| {
                        let value = ctx.snapshot.var(key).map(str::to_string);
                        evidence.push(Evidence::env(key, value.as_deref()));
                        (key.clone(), value)
                    })
                    .collect();
                Ok(Observation::Environment { unmet, watched })
            }
            Probe::DiskSpace => {
                evidence.push(Evidence::path(settings.disk_path.display().to_string()));
                let free_bytes = ctx
                    .host
                    .free_disk_bytes(&settings.disk_path)
                    .with_context(|| format!("空き容量: {}", settings.disk_path.display()))?;
                Ok(Observation::DiskFree {
                    path: settings.disk_path.display().to_string(),
                    free_bytes,
                })
            }
            Probe::Memory => Ok(Observation::Memory(ctx.host.memory()?)),
            Probe::Cpu => Ok(Observation::Cpu {
                used_pct: ctx.host.cpu_usage()?,
            }),
            Probe::Dns { host } => {
                evidence.push(Evidence::stat(format!(
                    "resolve {host} timeout_ms={}",
                    settings.thresholds.network_timeout_ms
                )));
                Ok(Observation::Dns {
                    host: host.clone(),
                    resolved: ctx.host.resolve(host, settings.network_timeout()),
                })
            }
            Probe::Tls { host } => {
                evidence.push(Evidence::stat(format!(
                    "tls {host}:{TLS_PORT} timeout_ms={}",
                    settings.thresholds.network_timeout_ms
                )));
                Ok(Observation::Tls {
                    host: host.clone(),
                    outcome: ctx.host.tls_handshake(host, TLS_PORT, settings.network_timeout()),
                })
            }
            Probe::Network { target } => {
                let timeout = settings.network_timeout();
                evidence.push(Evidence::stat(format!(
                    "connect {target} timeout_ms={}",
                    settings.thresholds.network_timeout_ms
                )));
                Ok(Observation::Network {
                    target: target.clone(),
                    outcome: ctx.host.connect(target, timeout),
                })
            }
        }
    }
}

/// A probe's result together with the observation it was classified from.
#[derive(Debug, Clone)]
pub struct ProbeRun {
    pub result: ProbeResult,
    pub observation: Option<Observation>,
}

/// Runs one probe. Never fails: errors and panics inside the probe become a
/// FAULT result, unsupported platforms become SKIPPED.
pub fn run_probe(probe: &Probe, ctx: &ProbeContext<'_>) -> ProbeRun {
    let id = probe.id();
    let mut evidence = Vec::new();
    let observed = panic::catch_unwind(AssertUnwindSafe(|| probe.observe(ctx, &mut evidence)));

    match observed {
        Ok(Ok(observation)) => {
            let c = classify(&observation, &ctx.settings.thresholds);
            ProbeRun {
                result: ProbeResult::new(id, c.status, c.detail, evidence),
                observation: Some(observation),
            }
        }
        Ok(Err(err)) if is_unsupported(&err) => {
            tracing::debug!(probe = %id, error = %format!("{err:#}"), "probe skipped");
            ProbeRun {
                result: ProbeResult::new(id, ProbeStatus::Skipped, format!("{err:#}"), evidence),
                observation: None,
            }
        }
        Ok(Err(err)) => {
            let err = DoctorError::ProbeExecution {
                probe_id: id.clone(),
                message: format!("{err:#}"),
            };
            tracing::warn!("{err}");
            ProbeRun {
                result: ProbeResult::new(id, ProbeStatus::Fault, err.to_string(), evidence),
                observation: None,
            }
        }
        Err(payload) => {
            let err = DoctorError::ProbeExecution {
                probe_id: id.clone(),
                message: panic_message(payload.as_ref()),
            };
            tracing::warn!("{err}");
            ProbeRun {
                result: ProbeResult::new(id, ProbeStatus::Fault, err.to_string(), evidence),
                observation: None,
            }
        }
    }
}

/// Runs every probe once, in order, against the same snapshot.
pub fn run_all(probes: &[Probe], ctx: &ProbeContext<'_>) -> Vec<ProbeResult> {
    probes.iter().map(|p| run_probe(p, ctx).result).collect()
}

fn query_python_path(
    ctx: &ProbeContext<'_>,
    query: &str,
    evidence: &mut Vec<Evidence>,
) -> Result<PathBuf> {
    let cmd = ctx.settings.python(&["-c", query]);
    evidence.push(Evidence::command(cmd.cmdline()));
    let out = ctx.host.run(&cmd)?;
    if !out.success() {
        return Err(anyhow!(
            "{} が失敗しました: {}",
            cmd.cmdline(),
            exit_summary(&out)
        ));
    }
    let line = out
        .stdout
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| anyhow!("{} の出力が空でした", cmd.cmdline()))?;
    Ok(PathBuf::from(line))
}

fn exit_summary(out: &CommandOutput) -> String {
    match out.first_error_line() {
        Some(line) => format!("exit_code={}: {line}", out.exit_code),
        None => format!("exit_code={}", out.exit_code),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        return format!("panic: {s}");
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return format!("panic: {s}");
    }
    "panic".to_string()
}
