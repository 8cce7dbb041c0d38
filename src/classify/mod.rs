//! Maps raw probe observations to a status.
//!
//! Everything here is a pure function of its inputs: the same observation and
//! thresholds always classify the same way.

use serde::{Deserialize, Serialize};

use crate::core::ProbeStatus;
use crate::platform::{DirStatus, MemoryStats, Reachability, Resolution};
use crate::probes::PyVersion;

const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    pub disk_fault_mb: u64,
    pub disk_warn_mb: u64,
    pub mem_fault_pct: u8,
    pub mem_warn_pct: u8,
    /// CPU bands are exclusive: usage must exceed the value.
    pub cpu_fault_pct: u8,
    pub cpu_warn_pct: u8,
    pub network_timeout_ms: u64,
    pub latency_warn_ms: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            disk_fault_mb: 1024,
            disk_warn_mb: 2048,
            mem_fault_pct: 95,
            mem_warn_pct: 85,
            cpu_fault_pct: 95,
            cpu_warn_pct: 85,
            network_timeout_ms: 3000,
            latency_warn_ms: 2000,
        }
    }
}

/// Raw output of a probe, before any judgement is applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    Interpreter {
        version: Option<PyVersion>,
        raw: String,
        min: PyVersion,
    },
    Pip {
        available: bool,
        version: Option<PyVersion>,
        raw: String,
        min: PyVersion,
    },
    Package {
        name: String,
        installed: Option<PyVersion>,
        min: PyVersion,
    },
    SitePackages {
        path: String,
        status: DirStatus,
    },
    ScriptsOnPath {
        dir: String,
        exists: bool,
        on_path: bool,
    },
    Environment {
        /// Required variables that are missing or hold another value, with the expected value.
        unmet: Vec<(String, String)>,
        watched: Vec<(String, Option<String>)>,
    },
    DiskFree {
        path: String,
        free_bytes: u64,
    },
    Memory(MemoryStats),
    Cpu {
        used_pct: f32,
    },
    Dns {
        host: String,
        resolved: Resolution,
    },
    Tls {
        host: String,
        outcome: Reachability,
    },
    Network {
        target: String,
        outcome: Reachability,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub status: ProbeStatus,
    pub detail: String,
}

impl Classification {
    fn new(status: ProbeStatus, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }
}

pub fn classify(observation: &Observation, thresholds: &Thresholds) -> Classification {
    match observation {
        Observation::Interpreter { version, raw, min } => match version {
            None => Classification::new(
                ProbeStatus::Fault,
                format!("Python インタプリタを実行できません: {}", first_line(raw)),
            ),
            Some(v) if v < min => Classification::new(
                ProbeStatus::Warning,
                format!("Python {v} は古すぎます（{min} 以上が必要）"),
            ),
            Some(v) => Classification::new(ProbeStatus::Ok, format!("Python {v}")),
        },
        Observation::Pip {
            available,
            version,
            raw,
            min,
        } => match (available, version) {
            (false, _) => Classification::new(
                ProbeStatus::Fault,
                format!("pip を実行できません: {}", first_line(raw)),
            ),
            (true, Some(v)) if v < min => Classification::new(
                ProbeStatus::Warning,
                format!("pip {v} は古いバージョンです（{min} 以上を推奨）"),
            ),
            (true, Some(v)) => Classification::new(ProbeStatus::Ok, format!("pip {v}")),
            (true, None) => Classification::new(
                ProbeStatus::Warning,
                format!("pip のバージョンを解析できません: {}", first_line(raw)),
            ),
        },
        Observation::Package {
            name,
            installed,
            min,
        } => match installed {
            None => Classification::new(
                ProbeStatus::Fault,
                format!("{name} がインストールされていません（{min} 以上が必要）"),
            ),
            Some(v) if v < min => Classification::new(
                ProbeStatus::Warning,
                format!("{name} {v} は要求バージョン {min} より古いです"),
            ),
            Some(v) => Classification::new(ProbeStatus::Ok, format!("{name} {v}")),
        },
        Observation::SitePackages { path, status } => {
            if !status.exists {
                Classification::new(
                    ProbeStatus::Fault,
                    format!("site-packages が存在しません: {path}"),
                )
            } else if !status.writable {
                Classification::new(
                    ProbeStatus::Warning,
                    format!("site-packages に書き込めません: {path}（`pip install --user` を検討してください）"),
                )
            } else {
                Classification::new(ProbeStatus::Ok, format!("site-packages: {path}"))
            }
        }
        Observation::ScriptsOnPath {
            dir,
            exists,
            on_path,
        } => match (exists, on_path) {
            (_, true) => Classification::new(ProbeStatus::Ok, format!("PATH に含まれています: {dir}")),
            (true, false) => Classification::new(
                ProbeStatus::Fault,
                format!("スクリプトディレクトリが PATH にありません: {dir}"),
            ),
            (false, false) => Classification::new(
                ProbeStatus::Warning,
                format!("スクリプトディレクトリが存在しません: {dir}"),
            ),
        },
        Observation::Environment { unmet, watched } => {
            if unmet.is_empty() {
                let set = watched.iter().filter(|(_, v)| v.is_some()).count();
                Classification::new(
                    ProbeStatus::Ok,
                    format!(
                        "必須の環境変数はすべて設定済み（監視対象 {set}/{} 件が設定あり）",
                        watched.len()
                    ),
                )
            } else {
                let names: Vec<&str> = unmet.iter().map(|(k, _)| k.as_str()).collect();
                Classification::new(
                    ProbeStatus::Fault,
                    format!("必須の環境変数が未設定または不一致です: {}", names.join(", ")),
                )
            }
        }
        Observation::DiskFree { path, free_bytes } => {
            let free_mb = free_bytes / MIB;
            let status = if free_mb <= thresholds.disk_fault_mb {
                ProbeStatus::Fault
            } else if free_mb <= thresholds.disk_warn_mb {
                ProbeStatus::Warning
            } else {
                ProbeStatus::Ok
            };
            Classification::new(status, format!("空き容量 {free_mb} MB（{path}）"))
        }
        Observation::Memory(stats) => {
            let used = stats.used_pct();
            let status = if used >= f64::from(thresholds.mem_fault_pct) {
                ProbeStatus::Fault
            } else if used >= f64::from(thresholds.mem_warn_pct) {
                ProbeStatus::Warning
            } else {
                ProbeStatus::Ok
            };
            Classification::new(
                status,
                format!(
                    "メモリ使用率 {used:.1}%（空き {} MB）",
                    stats.available_bytes / MIB
                ),
            )
        }
        Observation::Cpu { used_pct } => {
            let used = f64::from(*used_pct);
            let status = if used > f64::from(thresholds.cpu_fault_pct) {
                ProbeStatus::Fault
            } else if used > f64::from(thresholds.cpu_warn_pct) {
                ProbeStatus::Warning
            } else {
                ProbeStatus::Ok
            };
            Classification::new(status, format!("CPU 使用率 {used:.1}%"))
        }
        Observation::Dns { host, resolved } => match resolved {
            Resolution::Resolved(addrs) => Classification::new(
                ProbeStatus::Ok,
                format!("{host} → {}", first_addr(addrs)),
            ),
            Resolution::TimedOut => Classification::new(ProbeStatus::Fault, "timeout"),
            Resolution::Failed(err) => Classification::new(ProbeStatus::Fault, err.clone()),
        },
        Observation::Tls { host, outcome } => match outcome {
            Reachability::Connected { latency } => Classification::new(
                ProbeStatus::Ok,
                format!("{host} との TLS ハンドシェイク OK（{} ms）", latency.as_millis()),
            ),
            Reachability::TimedOut => Classification::new(ProbeStatus::Fault, "timeout"),
            Reachability::Failed(err) => Classification::new(ProbeStatus::Fault, err.clone()),
        },
        Observation::Network { target, outcome } => match outcome {
            Reachability::Connected { latency } => {
                let ms = latency.as_millis();
                if ms > u128::from(thresholds.latency_warn_ms) {
                    Classification::new(
                        ProbeStatus::Warning,
                        format!("{target} への遅延が大きいです（{ms} ms）"),
                    )
                } else {
                    Classification::new(ProbeStatus::Ok, format!("{target} に接続 OK（{ms} ms）"))
                }
            }
            Reachability::TimedOut => Classification::new(ProbeStatus::Fault, "timeout"),
            Reachability::Failed(err) => Classification::new(ProbeStatus::Fault, err.clone()),
        },
    }
}

fn first_line(s: &str) -> &str {
    s.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("（出力なし）")
}

fn first_addr(addrs: &[std::net::IpAddr]) -> String {
    match addrs {
        [] => "（なし）".to_string(),
        [one] => one.to_string(),
        [first, rest @ ..] => format!("{first} ほか {} 件", rest.len()),
    }
}
