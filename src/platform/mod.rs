use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use wait_timeout::ChildExt;

use crate::core::OsInfo;

mod host;

pub use host::{DirStatus, Host, MemoryStats, Reachability, Resolution, SystemHost};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// First non-empty line of stderr, falling back to stdout.
    pub fn first_error_line(&self) -> Option<&str> {
        [&self.stderr, &self.stdout]
            .into_iter()
            .flat_map(|s| s.lines())
            .map(str::trim)
            .find(|l| !l.is_empty())
    }
}

/// A child process invocation with a hard timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommand {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl ExternalCommand {
    pub fn new<I, S>(program: impl Into<String>, args: I, timeout: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            timeout,
        }
    }

    pub fn cmdline(&self) -> String {
        let mut out = self.program.clone();
        for arg in &self.args {
            out.push(' ');
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                out.push_str(&format!("{arg:?}"));
            } else {
                out.push_str(arg);
            }
        }
        out
    }
}

#[derive(Debug, thiserror::Error)]
#[error("タイムアウトしました（{timeout:?}）: {program}")]
pub struct CommandTimedOut {
    pub program: String,
    pub timeout: Duration,
}

pub fn is_timeout(err: &anyhow::Error) -> bool {
    err.chain().any(|c| c.is::<CommandTimedOut>())
}

pub fn run_command(cmd: &str, args: &[&str], timeout: Duration) -> Result<CommandOutput> {
    run_command_with_env(cmd, args, timeout, &[])
}

pub fn run_command_with_env(
    cmd: &str,
    args: &[&str],
    timeout: Duration,
    env: &[(String, String)],
) -> Result<CommandOutput> {
    let mut command = Command::new(cmd);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    for (k, v) in env {
        command.env(k, v);
    }

    let mut child = command
        .spawn()
        .with_context(|| format!("プロセス起動に失敗しました: {cmd}"))?;

    // Drain the pipes while waiting so a chatty child cannot block on a full pipe.
    let stdout_reader = child.stdout.take().map(spawn_reader);
    let stderr_reader = child.stderr.take().map(spawn_reader);

    let status = match child
        .wait_timeout(timeout)
        .with_context(|| format!("プロセス待機に失敗しました: {cmd}"))?
    {
        Some(status) => status,
        None => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(CommandTimedOut {
                program: cmd.to_string(),
                timeout,
            }
            .into());
        }
    };

    let stdout = stdout_reader.map(join_reader).unwrap_or_default();
    let stderr = stderr_reader.map(join_reader).unwrap_or_default();

    Ok(CommandOutput {
        exit_code: status.code().unwrap_or(-1),
        stdout,
        stderr,
    })
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> std::thread::JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn join_reader(handle: std::thread::JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}

pub fn effective_home_dir() -> Result<PathBuf> {
    for key in ["HOME", "USERPROFILE"] {
        if let Some(v) = std::env::var_os(key) {
            if !v.is_empty() {
                return Ok(PathBuf::from(v));
            }
        }
    }
    Err(anyhow!("環境変数 HOME が設定されていません"))
}

/// Host description for the report header. `python_version` is filled in by
/// the engine once the interpreter has been probed.
pub fn os_info(timeout: Duration) -> OsInfo {
    let name = std::env::consts::OS.to_string();
    let platform = sysinfo::System::long_os_version().unwrap_or_else(|| name.clone());

    let mut sys = sysinfo::System::new();
    sys.refresh_cpu();
    let processor = sys
        .cpus()
        .first()
        .map(|cpu| cpu.brand().trim().to_string())
        .filter(|brand| !brand.is_empty())
        .unwrap_or_else(|| "unknown".to_string());

    OsInfo {
        version: kernel_release(timeout),
        name,
        platform,
        arch: std::env::consts::ARCH.to_string(),
        processor,
        python_version: None,
    }
}

#[cfg(unix)]
fn kernel_release(timeout: Duration) -> String {
    match run_command("uname", &["-r"], timeout) {
        Ok(output) if output.success() => output.stdout.trim().to_string(),
        _ => "unknown".to_string(),
    }
}

#[cfg(not(unix))]
fn kernel_release(_timeout: Duration) -> String {
    sysinfo::System::kernel_version().unwrap_or_else(|| "unknown".to_string())
}
