#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::atomic::{AtomicU64, Ordering};

pub const ENV_KEYS: &[&str] = &[
    "PYDOCTOR_CONFIG",
    "PYDOCTOR_LOG",
    "PYDOCTOR_UI_COLOR",
    "PYDOCTOR_DISK_FAULT_MB",
    "PYDOCTOR_DISK_WARN_MB",
    "PYDOCTOR_MEM_FAULT_PCT",
    "PYDOCTOR_MEM_WARN_PCT",
    "PYDOCTOR_CPU_FAULT_PCT",
    "PYDOCTOR_CPU_WARN_PCT",
    "PYDOCTOR_NETWORK_TIMEOUT_MS",
    "PYDOCTOR_LATENCY_WARN_MS",
    "PYDOCTOR_PYTHON",
    "PYDOCTOR_NETWORK_TARGETS",
    "PYDOCTOR_REPORT_WRITE_LOG",
];

pub fn make_temp_home(tag: &str) -> PathBuf {
    static HOME_SEQ: AtomicU64 = AtomicU64::new(0);
    let seq = HOME_SEQ.fetch_add(1, Ordering::Relaxed);
    let home = std::env::temp_dir().join(format!(
        "pydoctor-{tag}-test-{}-{seq}",
        std::process::id()
    ));
    let _ = std::fs::remove_dir_all(&home);
    std::fs::create_dir_all(&home).expect("create home");
    home
}

pub fn base_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_pydoctor"));
    cmd.env("HOME", home);
    cmd.env("PATH", format!("{}:/usr/bin:/bin", home.join("bin").display()));
    for key in ENV_KEYS {
        cmd.env_remove(key);
    }
    cmd
}

pub fn run(home: &Path, args: &[&str]) -> Output {
    base_cmd(home).args(args).output().expect("run pydoctor")
}

pub fn write_file(path: &Path, bytes: &[u8]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("mkdirs");
    }
    std::fs::write(path, bytes).expect("write");
}

pub fn config_path(home: &Path) -> PathBuf {
    home.join(".config/pydoctor/config.toml")
}

/// A stand-in interpreter. `missingpkg` stays uninstalled until
/// `pip install --upgrade missingpkg>=1.0` has run once.
#[cfg(unix)]
pub fn write_stub_python(home: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let site = home.join("site");
    let bin = home.join("bin");
    std::fs::create_dir_all(&site).expect("site dir");
    std::fs::create_dir_all(&bin).expect("bin dir");
    let marker = home.join("missingpkg.installed");

    let script = format!(
        r#"#!/bin/sh
case "$*" in
  "--version") echo "Python 3.11.4" ;;
  "-m pip --version") echo "pip 23.0.1 from /stub/pip (python 3.11)" ;;
  "-m pip show "*)
    if [ "$4" = "missingpkg" ] && [ ! -f "{marker}" ]; then
      echo "WARNING: Package(s) not found: missingpkg" >&2
      exit 1
    fi
    printf 'Name: %s\nVersion: 99.0\n' "$4" ;;
  "-m pip install --upgrade missingpkg>=1.0") : > "{marker}" ;;
  *purelib*) echo "{site}" ;;
  *scripts*) echo "{bin}" ;;
  *) exit 0 ;;
esac
"#,
        marker = marker.display(),
        site = site.display(),
        bin = bin.display(),
    );
    let path = home.join("stub/python3");
    write_file(&path, script.as_bytes());
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod");
    path
}

/// Config that keeps a run offline and makes disk, memory and CPU always pass.
pub fn offline_config(python: &Path, extra: &str) -> String {
    format!(
        r#"
[thresholds]
disk_fault_mb = 0
disk_warn_mb = 0
mem_fault_pct = 100
mem_warn_pct = 100
cpu_fault_pct = 100
cpu_warn_pct = 100

[python]
interpreter = "{}"

[network]
targets = []
dns_host = ""
tls_host = ""
{extra}
"#,
        python.display()
    )
}

pub fn json_stdout(out: &Output) -> serde_json::Value {
    serde_json::from_slice(&out.stdout).unwrap_or_else(|e| {
        panic!(
            "parse json: {e}\nstdout={}\nstderr={}",
            String::from_utf8_lossy(&out.stdout),
            String::from_utf8_lossy(&out.stderr)
        )
    })
}

pub fn entry<'a>(report: &'a serde_json::Value, probe_id: &str) -> &'a serde_json::Value {
    report["entries"]
        .as_array()
        .expect("entries array")
        .iter()
        .find(|e| e["result"]["probe_id"] == probe_id)
        .unwrap_or_else(|| panic!("no entry for {probe_id}"))
}
