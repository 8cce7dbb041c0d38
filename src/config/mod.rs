use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::classify::Thresholds;
use crate::error::DoctorError;
use crate::probes::PyVersion;

#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub ui: UiConfig,
    pub thresholds: Thresholds,
    pub python: PythonConfig,
    pub disk: DiskConfig,
    pub network: NetworkConfig,
    pub env: EnvConfig,
    pub report: ReportConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UiConfig {
    pub color: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PythonConfig {
    pub interpreter: String,
    pub min_version: PyVersion,
    pub min_pip_version: PyVersion,
    pub packages: BTreeMap<String, PyVersion>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiskConfig {
    /// Filesystem to check; the home directory when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NetworkConfig {
    pub targets: Vec<String>,
    /// Empty disables the DNS probe.
    pub dns_host: String,
    /// Empty disables the TLS probe.
    pub tls_host: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnvConfig {
    pub required: BTreeMap<String, String>,
    pub watch: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportConfig {
    pub write_log: bool,
}

pub fn default_interpreter() -> &'static str {
    if cfg!(windows) { "python" } else { "python3" }
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        Self {
            ui: UiConfig { color: true },
            thresholds: Thresholds::default(),
            python: PythonConfig {
                interpreter: default_interpreter().to_string(),
                min_version: PyVersion::new(&[3, 7]),
                min_pip_version: PyVersion::new(&[21, 0]),
                packages: BTreeMap::from([
                    ("setuptools".to_string(), PyVersion::new(&[45, 0, 0])),
                    ("wheel".to_string(), PyVersion::new(&[0, 37, 0])),
                ]),
            },
            disk: DiskConfig { path: None },
            network: NetworkConfig {
                targets: vec![
                    "8.8.8.8:53".to_string(),
                    "pypi.org:443".to_string(),
                    "github.com:443".to_string(),
                ],
                dns_host: "python.org".to_string(),
                tls_host: "python.org".to_string(),
            },
            env: EnvConfig {
                required: BTreeMap::new(),
                watch: vec![
                    "http_proxy".to_string(),
                    "https_proxy".to_string(),
                    "no_proxy".to_string(),
                    "PYTHONPATH".to_string(),
                ],
            },
            report: ReportConfig { write_log: true },
            config_path: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    ui: Option<RawUiConfig>,
    thresholds: Option<RawThresholds>,
    python: Option<RawPythonConfig>,
    disk: Option<RawDiskConfig>,
    network: Option<RawNetworkConfig>,
    env: Option<RawEnvConfig>,
    report: Option<RawReportConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawUiConfig {
    color: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawThresholds {
    disk_fault_mb: Option<u64>,
    disk_warn_mb: Option<u64>,
    mem_fault_pct: Option<u8>,
    mem_warn_pct: Option<u8>,
    cpu_fault_pct: Option<u8>,
    cpu_warn_pct: Option<u8>,
    network_timeout_ms: Option<u64>,
    latency_warn_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPythonConfig {
    interpreter: Option<String>,
    min_version: Option<String>,
    min_pip_version: Option<String>,
    packages: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDiskConfig {
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawNetworkConfig {
    targets: Option<Vec<String>>,
    dns_host: Option<String>,
    tls_host: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEnvConfig {
    required: Option<BTreeMap<String, String>>,
    watch: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawReportConfig {
    write_log: Option<bool>,
}

pub fn default_config_path(home_dir: &Path) -> PathBuf {
    home_dir.join(".config/pydoctor/config.toml")
}

/// Defaults, then the TOML file, then `PYDOCTOR_*` overrides. The merged result
/// is validated before it is returned.
pub fn load(config_path: Option<&Path>, home_dir: &Path) -> Result<EffectiveConfig> {
    let mut cfg = EffectiveConfig::default();

    let path = config_path
        .map(ToOwned::to_owned)
        .or_else(|| std::env::var_os("PYDOCTOR_CONFIG").map(PathBuf::from))
        .unwrap_or_else(|| default_config_path(home_dir));

    if path.exists() {
        let s = std::fs::read_to_string(&path).map_err(|e| {
            DoctorError::configuration(format!(
                "設定ファイルの読み取りに失敗しました: {}: {e}",
                path.display()
            ))
        })?;
        let raw: RawConfig = toml::from_str(&s).map_err(|e| {
            DoctorError::configuration(format!(
                "設定ファイル(TOML)の解析に失敗しました: {}: {e}",
                path.display()
            ))
        })?;
        apply_raw_config(&mut cfg, raw)?;
        cfg.config_path = Some(path.display().to_string());
    } else if config_path.is_some() {
        return Err(DoctorError::configuration(format!(
            "設定ファイルが見つかりません: {}",
            path.display()
        )));
    }

    apply_env_overrides(&mut cfg)?;
    validate(&cfg)?;

    Ok(cfg)
}

fn parse_version_field(field: &str, value: &str) -> Result<PyVersion> {
    PyVersion::parse(value).ok_or_else(|| {
        DoctorError::configuration(format!("{field}: バージョンを解析できません: {value:?}"))
    })
}

fn apply_raw_config(cfg: &mut EffectiveConfig, raw: RawConfig) -> Result<()> {
    if let Some(ui) = raw.ui {
        if let Some(color) = ui.color {
            cfg.ui.color = color;
        }
    }

    if let Some(t) = raw.thresholds {
        let th = &mut cfg.thresholds;
        th.disk_fault_mb = t.disk_fault_mb.unwrap_or(th.disk_fault_mb);
        th.disk_warn_mb = t.disk_warn_mb.unwrap_or(th.disk_warn_mb);
        th.mem_fault_pct = t.mem_fault_pct.unwrap_or(th.mem_fault_pct);
        th.mem_warn_pct = t.mem_warn_pct.unwrap_or(th.mem_warn_pct);
        th.cpu_fault_pct = t.cpu_fault_pct.unwrap_or(th.cpu_fault_pct);
        th.cpu_warn_pct = t.cpu_warn_pct.unwrap_or(th.cpu_warn_pct);
        th.network_timeout_ms = t.network_timeout_ms.unwrap_or(th.network_timeout_ms);
        th.latency_warn_ms = t.latency_warn_ms.unwrap_or(th.latency_warn_ms);
    }

    if let Some(python) = raw.python {
        if let Some(interpreter) = python.interpreter {
            cfg.python.interpreter = interpreter;
        }
        if let Some(v) = python.min_version {
            cfg.python.min_version = parse_version_field("python.min_version", &v)?;
        }
        if let Some(v) = python.min_pip_version {
            cfg.python.min_pip_version = parse_version_field("python.min_pip_version", &v)?;
        }
        if let Some(packages) = python.packages {
            let mut parsed = BTreeMap::new();
            for (name, min) in packages {
                let v = parse_version_field(&format!("python.packages.{name}"), &min)?;
                parsed.insert(name, v);
            }
            cfg.python.packages = parsed;
        }
    }

    if let Some(disk) = raw.disk {
        cfg.disk.path = disk.path.filter(|p| !p.trim().is_empty());
    }

    if let Some(network) = raw.network {
        if let Some(targets) = network.targets {
            cfg.network.targets = targets;
        }
        if let Some(dns_host) = network.dns_host {
            cfg.network.dns_host = dns_host;
        }
        if let Some(tls_host) = network.tls_host {
            cfg.network.tls_host = tls_host;
        }
    }

    if let Some(env) = raw.env {
        if let Some(required) = env.required {
            cfg.env.required = required;
        }
        if let Some(watch) = env.watch {
            cfg.env.watch = watch;
        }
    }

    if let Some(report) = raw.report {
        if let Some(write_log) = report.write_log {
            cfg.report.write_log = write_log;
        }
    }

    Ok(())
}

fn env_number<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(v) => v
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| DoctorError::configuration(format!("{key}: 数値が不正です: {v:?}"))),
        Err(_) => Ok(None),
    }
}

fn apply_env_overrides(cfg: &mut EffectiveConfig) -> Result<()> {
    if let Ok(v) = std::env::var("PYDOCTOR_UI_COLOR") {
        cfg.ui.color = parse_bool(&v).with_context(|| "PYDOCTOR_UI_COLOR")?;
    }
    if let Some(v) = env_number("PYDOCTOR_DISK_FAULT_MB")? {
        cfg.thresholds.disk_fault_mb = v;
    }
    if let Some(v) = env_number("PYDOCTOR_DISK_WARN_MB")? {
        cfg.thresholds.disk_warn_mb = v;
    }
    if let Some(v) = env_number("PYDOCTOR_MEM_FAULT_PCT")? {
        cfg.thresholds.mem_fault_pct = v;
    }
    if let Some(v) = env_number("PYDOCTOR_MEM_WARN_PCT")? {
        cfg.thresholds.mem_warn_pct = v;
    }
    if let Some(v) = env_number("PYDOCTOR_CPU_FAULT_PCT")? {
        cfg.thresholds.cpu_fault_pct = v;
    }
    if let Some(v) = env_number("PYDOCTOR_CPU_WARN_PCT")? {
        cfg.thresholds.cpu_warn_pct = v;
    }
    if let Some(v) = env_number("PYDOCTOR_NETWORK_TIMEOUT_MS")? {
        cfg.thresholds.network_timeout_ms = v;
    }
    if let Some(v) = env_number("PYDOCTOR_LATENCY_WARN_MS")? {
        cfg.thresholds.latency_warn_ms = v;
    }
    if let Ok(v) = std::env::var("PYDOCTOR_PYTHON") {
        let v = v.trim();
        if !v.is_empty() {
            cfg.python.interpreter = v.to_string();
        }
    }
    if let Ok(v) = std::env::var("PYDOCTOR_NETWORK_TARGETS") {
        if v.trim().eq_ignore_ascii_case("none") {
            cfg.network.targets.clear();
        } else {
            let parts: Vec<String> = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .collect();
            if !parts.is_empty() {
                cfg.network.targets = parts;
            }
        }
    }
    if let Ok(v) = std::env::var("PYDOCTOR_REPORT_WRITE_LOG") {
        cfg.report.write_log = parse_bool(&v).with_context(|| "PYDOCTOR_REPORT_WRITE_LOG")?;
    }

    Ok(())
}

/// Rejects values that would make classification meaningless.
pub fn validate(cfg: &EffectiveConfig) -> Result<()> {
    let th = &cfg.thresholds;
    if th.disk_warn_mb < th.disk_fault_mb {
        return Err(DoctorError::configuration(format!(
            "thresholds.disk_warn_mb ({}) は disk_fault_mb ({}) 以上にしてください",
            th.disk_warn_mb, th.disk_fault_mb
        )));
    }
    if th.mem_fault_pct == 0 || th.mem_fault_pct > 100 {
        return Err(DoctorError::configuration(format!(
            "thresholds.mem_fault_pct は 1..=100 で指定してください: {}",
            th.mem_fault_pct
        )));
    }
    if th.mem_warn_pct > th.mem_fault_pct {
        return Err(DoctorError::configuration(format!(
            "thresholds.mem_warn_pct ({}) は mem_fault_pct ({}) 以下にしてください",
            th.mem_warn_pct, th.mem_fault_pct
        )));
    }
    if th.cpu_fault_pct > 100 {
        return Err(DoctorError::configuration(format!(
            "thresholds.cpu_fault_pct は 0..=100 で指定してください: {}",
            th.cpu_fault_pct
        )));
    }
    if th.cpu_warn_pct > th.cpu_fault_pct {
        return Err(DoctorError::configuration(format!(
            "thresholds.cpu_warn_pct ({}) は cpu_fault_pct ({}) 以下にしてください",
            th.cpu_warn_pct, th.cpu_fault_pct
        )));
    }
    if th.network_timeout_ms == 0 {
        return Err(DoctorError::configuration(
            "thresholds.network_timeout_ms は 1 以上にしてください",
        ));
    }
    if cfg.python.interpreter.trim().is_empty() {
        return Err(DoctorError::configuration("python.interpreter が空です"));
    }
    if let Some(name) = cfg.python.packages.keys().find(|n| n.trim().is_empty()) {
        return Err(DoctorError::configuration(format!(
            "python.packages に空のパッケージ名があります: {name:?}"
        )));
    }
    let mut seen = std::collections::BTreeSet::new();
    for target in &cfg.network.targets {
        if !is_host_port(target) {
            return Err(DoctorError::configuration(format!(
                "network.targets は host:port で指定してください: {target:?}"
            )));
        }
        if !seen.insert(target.as_str()) {
            return Err(DoctorError::configuration(format!(
                "network.targets に重複があります: {target:?}"
            )));
        }
    }
    Ok(())
}

fn is_host_port(target: &str) -> bool {
    match target.rsplit_once(':') {
        Some((host, port)) => !host.trim().is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}

fn parse_bool(s: &str) -> Result<bool> {
    let s = s.trim().to_ascii_lowercase();
    match s.as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(DoctorError::configuration(format!(
            "真偽値が不正です: {s}（true|false|1|0|yes|no|on|off を指定してください）"
        ))),
    }
}
