//! Scripted `Host` for unit tests.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;

use crate::classify::Thresholds;
use crate::error::DoctorError;
use crate::platform::{
    CommandOutput, CommandTimedOut, DirStatus, ExternalCommand, Host, MemoryStats, Reachability,
    Resolution,
};
use crate::probes::{ProbeSettings, PyVersion};

pub const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone)]
pub enum Effect {
    FreeBytes(u64),
    Script(String, CommandOutput),
}

/// Commands are matched on their exact argument list (`-m pip --version`).
/// Unscripted commands succeed with empty output.
#[derive(Default)]
pub struct FakeHost {
    scripts: RefCell<BTreeMap<String, CommandOutput>>,
    effects: RefCell<BTreeMap<String, Vec<Effect>>>,
    panic_on: RefCell<Option<String>>,
    time_out: RefCell<Option<String>>,
    commands: RefCell<Vec<String>>,
    free_bytes: Cell<Option<u64>>,
    memory: Cell<Option<MemoryStats>>,
    cpu: Cell<Option<f32>>,
    reach: RefCell<BTreeMap<String, Reachability>>,
    tls: RefCell<BTreeMap<String, Reachability>>,
    dns: RefCell<BTreeMap<String, Resolution>>,
    lookup_timeouts: RefCell<Vec<Duration>>,
    dirs: RefCell<BTreeMap<PathBuf, DirStatus>>,
    env: RefCell<BTreeMap<String, String>>,
}

impl FakeHost {
    /// A machine on which every default probe passes.
    pub fn healthy() -> Self {
        let host = Self::default();
        host.script("--version", 0, "Python 3.11.4\n", "");
        host.script(
            "-m pip --version",
            0,
            "pip 23.0.1 from /fake/site-packages/pip (python 3.11)\n",
            "",
        );
        host.script("-m pip show setuptools", 0, "Name: setuptools\nVersion: 68.0.0\n", "");
        host.script("-m pip show wheel", 0, "Name: wheel\nVersion: 0.41.2\n", "");
        host.script(
            "-c import sysconfig; print(sysconfig.get_path('purelib'))",
            0,
            "/fake/site-packages\n",
            "",
        );
        host.script(
            "-c import sysconfig; print(sysconfig.get_path('scripts'))",
            0,
            "/fake/bin\n",
            "",
        );
        host.dir("/fake/site-packages", true, true);
        host.dir("/fake/bin", true, true);
        host.set_env_var("PATH", "/usr/bin:/fake/bin");
        host.free_bytes.set(Some(10 * 1024 * MIB));
        host.memory.set(Some(MemoryStats {
            total_bytes: 16 * 1024 * MIB,
            available_bytes: 8 * 1024 * MIB,
        }));
        host.cpu.set(Some(20.0));
        host
    }

    pub fn script(&self, args: &str, exit_code: i32, stdout: &str, stderr: &str) {
        self.scripts.borrow_mut().insert(
            args.to_string(),
            CommandOutput {
                exit_code,
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
            },
        );
    }

    pub fn after(&self, args: &str, effect: Effect) {
        self.effects
            .borrow_mut()
            .entry(args.to_string())
            .or_default()
            .push(effect);
    }

    pub fn panic_on(&self, args: &str) {
        *self.panic_on.borrow_mut() = Some(args.to_string());
    }

    /// The command fails with `CommandTimedOut` instead of producing output.
    pub fn time_out(&self, args: &str) {
        *self.time_out.borrow_mut() = Some(args.to_string());
    }

    pub fn set_free_bytes(&self, bytes: Option<u64>) {
        self.free_bytes.set(bytes);
    }

    pub fn set_memory(&self, stats: Option<MemoryStats>) {
        self.memory.set(stats);
    }

    pub fn set_cpu(&self, used_pct: Option<f32>) {
        self.cpu.set(used_pct);
    }

    pub fn reach(&self, target: &str, outcome: Reachability) {
        self.reach.borrow_mut().insert(target.to_string(), outcome);
    }

    pub fn tls(&self, host: &str, outcome: Reachability) {
        self.tls.borrow_mut().insert(host.to_string(), outcome);
    }

    pub fn dns(&self, host: &str, outcome: Resolution) {
        self.dns.borrow_mut().insert(host.to_string(), outcome);
    }

    /// Timeouts passed to every `resolve` call so far.
    pub fn lookup_timeouts(&self) -> Vec<Duration> {
        self.lookup_timeouts.borrow().clone()
    }

    pub fn dir(&self, path: &str, exists: bool, writable: bool) {
        self.dirs
            .borrow_mut()
            .insert(PathBuf::from(path), DirStatus { exists, writable });
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.borrow().clone()
    }

    pub fn ran(&self, args: &str) -> usize {
        self.commands
            .borrow()
            .iter()
            .filter(|c| c.ends_with(args))
            .count()
    }
}

impl Host for FakeHost {
    fn run(&self, cmd: &ExternalCommand) -> Result<CommandOutput> {
        let key = cmd.args.join(" ");
        self.commands.borrow_mut().push(cmd.cmdline());
        if self.panic_on.borrow().as_deref() == Some(key.as_str()) {
            panic!("scripted panic: {key}");
        }
        if self.time_out.borrow().as_deref() == Some(key.as_str()) {
            return Err(CommandTimedOut {
                program: cmd.program.clone(),
                timeout: cmd.timeout,
            }
            .into());
        }
        let out = self.scripts.borrow().get(&key).cloned().unwrap_or_default();
        let effects = self.effects.borrow().get(&key).cloned().unwrap_or_default();
        for effect in effects {
            match effect {
                Effect::FreeBytes(bytes) => self.free_bytes.set(Some(bytes)),
                Effect::Script(args, output) => {
                    self.scripts.borrow_mut().insert(args, output);
                }
            }
        }
        Ok(out)
    }

    fn free_disk_bytes(&self, _path: &Path) -> Result<u64> {
        self.free_bytes
            .get()
            .ok_or_else(|| DoctorError::unsupported("free space unavailable"))
    }

    fn memory(&self) -> Result<MemoryStats> {
        self.memory
            .get()
            .ok_or_else(|| DoctorError::unsupported("memory unavailable"))
    }

    fn cpu_usage(&self) -> Result<f32> {
        self.cpu
            .get()
            .ok_or_else(|| DoctorError::unsupported("cpu unavailable"))
    }

    fn connect(&self, target: &str, _timeout: Duration) -> Reachability {
        self.reach
            .borrow()
            .get(target)
            .cloned()
            .unwrap_or(Reachability::Connected {
                latency: Duration::from_millis(10),
            })
    }

    fn tls_handshake(&self, host: &str, _port: u16, _timeout: Duration) -> Reachability {
        self.tls
            .borrow()
            .get(host)
            .cloned()
            .unwrap_or(Reachability::Connected {
                latency: Duration::from_millis(40),
            })
    }

    fn resolve(&self, host: &str, timeout: Duration) -> Resolution {
        self.lookup_timeouts.borrow_mut().push(timeout);
        self.dns
            .borrow()
            .get(host)
            .cloned()
            .unwrap_or_else(|| Resolution::Resolved(vec![IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1))]))
    }

    fn dir_status(&self, path: &Path) -> DirStatus {
        self.dirs.borrow().get(path).copied().unwrap_or(DirStatus {
            exists: false,
            writable: false,
        })
    }

    fn env_vars(&self) -> BTreeMap<String, String> {
        self.env.borrow().clone()
    }

    fn set_env_var(&self, key: &str, value: &str) {
        self.env
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
    }
}

pub fn settings() -> ProbeSettings {
    ProbeSettings {
        interpreter: "python3".to_string(),
        min_python: PyVersion::new(&[3, 7]),
        min_pip: PyVersion::new(&[21, 0]),
        packages: BTreeMap::from([
            ("setuptools".to_string(), PyVersion::new(&[45, 0, 0])),
            ("wheel".to_string(), PyVersion::new(&[0, 37, 0])),
        ]),
        disk_path: PathBuf::from("/fake/home"),
        required_env: BTreeMap::new(),
        watched_env: vec!["http_proxy".to_string()],
        dns_host: "python.org".to_string(),
        tls_host: "python.org".to_string(),
        network_targets: vec!["pypi.org:443".to_string()],
        thresholds: Thresholds::default(),
        command_timeout: Duration::from_secs(5),
    }
}
