use std::cell::RefCell;
use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr, TcpStream, ToSocketAddrs};
use std::path::Path;
use std::sync::{Arc, mpsc};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};

use crate::error::DoctorError;
use crate::platform::{CommandOutput, ExternalCommand};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryStats {
    pub total_bytes: u64,
    pub available_bytes: u64,
}

impl MemoryStats {
    pub fn used_pct(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        let used = self.total_bytes.saturating_sub(self.available_bytes);
        used as f64 * 100.0 / self.total_bytes as f64
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reachability {
    Connected { latency: Duration },
    TimedOut,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Resolved(Vec<IpAddr>),
    TimedOut,
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirStatus {
    pub exists: bool,
    pub writable: bool,
}

/// Everything the probes and remediations need from the machine.
///
/// `SystemHost` talks to the real system; tests substitute a scripted host so the
/// pipeline can be driven through faults and fixes deterministically.
pub trait Host {
    fn run(&self, cmd: &ExternalCommand) -> Result<CommandOutput>;
    fn free_disk_bytes(&self, path: &Path) -> Result<u64>;
    fn memory(&self) -> Result<MemoryStats>;
    /// Global CPU usage in percent, sampled over a short interval.
    fn cpu_usage(&self) -> Result<f32>;
    /// Name resolution and connect share one `timeout` budget.
    fn connect(&self, target: &str, timeout: Duration) -> Reachability;
    fn tls_handshake(&self, host: &str, port: u16, timeout: Duration) -> Reachability;
    fn resolve(&self, host: &str, timeout: Duration) -> Resolution;
    fn dir_status(&self, path: &Path) -> DirStatus;
    fn env_vars(&self) -> BTreeMap<String, String>;
    /// Sets a variable for this process's view of the environment and every
    /// child it spawns afterwards.
    fn set_env_var(&self, key: &str, value: &str);
}

#[derive(Debug, Default)]
pub struct SystemHost {
    overlay: RefCell<BTreeMap<String, String>>,
}

impl SystemHost {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Host for SystemHost {
    fn run(&self, cmd: &ExternalCommand) -> Result<CommandOutput> {
        let args: Vec<&str> = cmd.args.iter().map(String::as_str).collect();
        let env: Vec<(String, String)> = self
            .overlay
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        tracing::debug!(cmd = %cmd.cmdline(), "running external command");
        crate::platform::run_command_with_env(&cmd.program, &args, cmd.timeout, &env)
    }

    fn free_disk_bytes(&self, path: &Path) -> Result<u64> {
        free_disk_bytes(path)
    }

    fn memory(&self) -> Result<MemoryStats> {
        let mut sys = sysinfo::System::new();
        sys.refresh_memory();
        let total_bytes = sys.total_memory();
        if total_bytes == 0 {
            return Err(DoctorError::unsupported(
                "メモリ情報を取得できません（sysinfo が 0 を返しました）",
            ));
        }
        Ok(MemoryStats {
            total_bytes,
            available_bytes: sys.available_memory(),
        })
    }

    fn cpu_usage(&self) -> Result<f32> {
        let mut sys = sysinfo::System::new();
        sys.refresh_cpu();
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        sys.refresh_cpu();
        if sys.cpus().is_empty() {
            return Err(DoctorError::unsupported("CPU 情報を取得できません"));
        }
        Ok(sys.global_cpu_info().cpu_usage())
    }

    fn connect(&self, target: &str, timeout: Duration) -> Reachability {
        connect_with_timeout(target, timeout)
    }

    fn tls_handshake(&self, host: &str, port: u16, timeout: Duration) -> Reachability {
        tls_handshake_with_timeout(host, port, timeout)
    }

    fn resolve(&self, host: &str, timeout: Duration) -> Resolution {
        let name = host.to_string();
        let lookup = lookup_within(
            move || (name.as_str(), 0u16).to_socket_addrs().map(Iterator::collect),
            timeout,
        );
        match lookup {
            Lookup::Addrs(addrs) => {
                let mut ips: Vec<IpAddr> = addrs.iter().map(SocketAddr::ip).collect();
                ips.sort();
                ips.dedup();
                Resolution::Resolved(ips)
            }
            Lookup::TimedOut => Resolution::TimedOut,
            Lookup::Failed(err) => Resolution::Failed(format!("{err}: {host}")),
        }
    }

    fn dir_status(&self, path: &Path) -> DirStatus {
        let exists = path.is_dir();
        DirStatus {
            exists,
            writable: exists && is_writable(path),
        }
    }

    fn env_vars(&self) -> BTreeMap<String, String> {
        let mut vars: BTreeMap<String, String> = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect();
        for (k, v) in self.overlay.borrow().iter() {
            vars.insert(k.clone(), v.clone());
        }
        vars
    }

    fn set_env_var(&self, key: &str, value: &str) {
        self.overlay
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
    }
}

enum Lookup {
    Addrs(Vec<SocketAddr>),
    TimedOut,
    Failed(String),
}

/// Runs a blocking lookup on a worker thread and gives up after `timeout`.
/// A stalled worker is left behind and finishes on its own.
fn lookup_within<F>(lookup: F, timeout: Duration) -> Lookup
where
    F: FnOnce() -> std::io::Result<Vec<SocketAddr>> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let spawned = std::thread::Builder::new()
        .name("pydoctor-resolve".to_string())
        .spawn(move || {
            let _ = tx.send(lookup());
        });
    if let Err(err) = spawned {
        return Lookup::Failed(format!("名前解決スレッドを起動できません: {err}"));
    }

    match rx.recv_timeout(timeout) {
        Ok(Ok(addrs)) if addrs.is_empty() => Lookup::Failed("名前解決の結果が空でした".to_string()),
        Ok(Ok(addrs)) => Lookup::Addrs(addrs),
        Ok(Err(err)) => Lookup::Failed(format!("名前解決に失敗しました: {err}")),
        Err(mpsc::RecvTimeoutError::Timeout) => Lookup::TimedOut,
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            Lookup::Failed("名前解決スレッドが応答しませんでした".to_string())
        }
    }
}

fn is_timeout_kind(kind: std::io::ErrorKind) -> bool {
    matches!(
        kind,
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
    )
}

/// Resolves and connects within one deadline. Returns the stream and the time
/// the successful connect took.
fn open_stream(target: &str, timeout: Duration) -> Result<(TcpStream, Duration), Reachability> {
    let deadline = Instant::now() + timeout;
    let name = target.to_string();
    let addrs = match lookup_within(move || name.to_socket_addrs().map(Iterator::collect), timeout) {
        Lookup::Addrs(addrs) => addrs,
        Lookup::TimedOut => return Err(Reachability::TimedOut),
        Lookup::Failed(err) => return Err(Reachability::Failed(format!("{err}: {target}"))),
    };

    let mut last_err = None::<String>;
    for addr in addrs {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(Reachability::TimedOut);
        }
        let started = Instant::now();
        match TcpStream::connect_timeout(&addr, remaining) {
            Ok(stream) => return Ok((stream, started.elapsed())),
            Err(err) if is_timeout_kind(err.kind()) => return Err(Reachability::TimedOut),
            Err(err) => last_err = Some(format!("{addr}: {err}")),
        }
    }
    Err(Reachability::Failed(
        last_err.unwrap_or_else(|| format!("接続できませんでした: {target}")),
    ))
}

fn connect_with_timeout(target: &str, timeout: Duration) -> Reachability {
    match open_stream(target, timeout) {
        Ok((_, latency)) => Reachability::Connected { latency },
        Err(outcome) => outcome,
    }
}

/// Full TLS handshake against the bundled web PKI roots. `latency` covers
/// resolution, connect and handshake.
fn tls_handshake_with_timeout(host: &str, port: u16, timeout: Duration) -> Reachability {
    let started = Instant::now();
    let (mut sock, _) = match open_stream(&format!("{host}:{port}"), timeout) {
        Ok(opened) => opened,
        Err(outcome) => return outcome,
    };

    let remaining = timeout.saturating_sub(started.elapsed());
    if remaining.is_zero() {
        return Reachability::TimedOut;
    }
    if let Err(err) = sock
        .set_read_timeout(Some(remaining))
        .and_then(|()| sock.set_write_timeout(Some(remaining)))
    {
        return Reachability::Failed(format!("ソケットの設定に失敗しました: {err}"));
    }

    let mut conn = match tls_client(host) {
        Ok(conn) => conn,
        Err(err) => return Reachability::Failed(format!("{err:#}")),
    };
    while conn.is_handshaking() {
        if started.elapsed() >= timeout {
            return Reachability::TimedOut;
        }
        if let Err(err) = conn.complete_io(&mut sock) {
            if is_timeout_kind(err.kind()) {
                return Reachability::TimedOut;
            }
            return Reachability::Failed(format!("TLS ハンドシェイクに失敗しました: {err}"));
        }
    }
    Reachability::Connected {
        latency: started.elapsed(),
    }
}

fn tls_client(host: &str) -> Result<rustls::ClientConnection> {
    let roots = rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    let config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let name = rustls::pki_types::ServerName::try_from(host.to_string())
        .with_context(|| format!("TLS のサーバ名が不正です: {host}"))?;
    rustls::ClientConnection::new(Arc::new(config), name)
        .context("TLS 接続の初期化に失敗しました")
}

#[cfg(unix)]
fn free_disk_bytes(path: &Path) -> Result<u64> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let path_cstr = CString::new(path.as_os_str().as_bytes())
        .with_context(|| format!("パスに NUL 文字が含まれています: {}", path.display()))?;

    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(path_cstr.as_ptr(), &mut stat) };
    if rc != 0 {
        return Err(anyhow!(
            "statvfs に失敗しました: {}: {}",
            path.display(),
            std::io::Error::last_os_error()
        ));
    }
    Ok((stat.f_bavail as u64).saturating_mul(stat.f_frsize as u64))
}

#[cfg(not(unix))]
fn free_disk_bytes(path: &Path) -> Result<u64> {
    Err(DoctorError::unsupported(format!(
        "空き容量の取得は Unix のみ対応です: {}",
        path.display()
    )))
}

#[cfg(unix)]
fn is_writable(path: &Path) -> bool {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let Ok(path_cstr) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    unsafe { libc::access(path_cstr.as_ptr(), libc::W_OK) == 0 }
}

#[cfg(not(unix))]
fn is_writable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| !m.permissions().readonly())
        .unwrap_or(false)
}
