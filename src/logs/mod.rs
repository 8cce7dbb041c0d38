use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use time::OffsetDateTime;

use crate::core::{Report, ReportEntry};

const MAX_DETAIL_BYTES: usize = 4 * 1024;

pub fn logs_dir(home_dir: &Path) -> PathBuf {
    home_dir.join(".config/pydoctor/logs")
}

pub fn backup_dir(home_dir: &Path) -> PathBuf {
    home_dir.join(".config/pydoctor/backup")
}

pub fn latest_json_path(home_dir: &Path) -> PathBuf {
    logs_dir(home_dir).join("latest.json")
}

fn unique_suffix() -> String {
    let pid = std::process::id();
    let ts = OffsetDateTime::now_utc().unix_timestamp_nanos();
    format!("{pid}-{ts}")
}

pub fn backup_file_name() -> String {
    format!("pip-freeze-{}.txt", unique_suffix())
}

/// Writes the human-readable run log and returns its path.
pub fn write_run_log(home_dir: &Path, report: &Report) -> Result<PathBuf> {
    let dir = logs_dir(home_dir);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("ログディレクトリの作成に失敗しました: {}", dir.display()))?;

    let path = dir.join(format!("run-{}.log", unique_suffix()));
    std::fs::write(&path, render_log(report))
        .with_context(|| format!("ログの書き込みに失敗しました: {}", path.display()))?;
    Ok(path)
}

/// Replaces `latest.json` with the given report. Written through a temp file so a
/// reader never sees a partial document.
pub fn write_latest_json(home_dir: &Path, report: &Report) -> Result<PathBuf> {
    let dir = logs_dir(home_dir);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("ログディレクトリの作成に失敗しました: {}", dir.display()))?;

    let path = latest_json_path(home_dir);
    let tmp = dir.join(format!(".latest-{}.json.tmp", unique_suffix()));
    let buf =
        serde_json::to_vec_pretty(report).context("レポート(JSON)のシリアライズに失敗しました")?;
    std::fs::write(&tmp, buf)
        .with_context(|| format!("ログの書き込みに失敗しました: {}", tmp.display()))?;
    std::fs::rename(&tmp, &path)
        .with_context(|| format!("ログの書き込みに失敗しました: {}", path.display()))?;
    Ok(path)
}

pub fn render_log(report: &Report) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "[{}] pydoctor {} mode={} os={} {}",
        report.generated_at,
        report.tool_version,
        report.mode.as_str(),
        report.os.name,
        report.os.version
    );
    let _ = writeln!(
        out,
        "[{}] system platform={} arch={} processor={} python={}",
        report.generated_at,
        report.os.platform,
        report.os.arch,
        report.os.processor,
        report.os.python_version.as_deref().unwrap_or("unknown")
    );
    for entry in &report.entries {
        write_entry(&mut out, entry);
    }
    let s = &report.summary;
    let _ = writeln!(
        out,
        "[{}] summary ok={} warning={} skipped={} fault={} ok_resolved={} fault_unresolved={}",
        report.generated_at,
        s.ok,
        s.warning,
        s.skipped,
        s.fault,
        s.ok_resolved,
        s.fault_unresolved
    );
    for note in &s.notes {
        let _ = writeln!(out, "[{}] note: {note}", report.generated_at);
    }
    out
}

fn write_entry(out: &mut String, entry: &ReportEntry) {
    let r = &entry.result;
    let _ = writeln!(
        out,
        "[{}] #{} {} [{}] {}",
        r.timestamp,
        entry.order,
        r.probe_id,
        entry.final_status,
        truncate_string(&r.detail, MAX_DETAIL_BYTES)
    );
    for ev in &r.evidence {
        let _ = writeln!(out, "    {}: {}", ev.kind.as_str(), ev.value);
    }
    if let Some(outcome) = &entry.remediation {
        let _ = writeln!(
            out,
            "    remediation {} succeeded={}: {}",
            outcome.action_id,
            outcome.succeeded,
            truncate_string(&outcome.detail, MAX_DETAIL_BYTES)
        );
    }
}

fn truncate_string(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut idx = max_bytes;
    while idx > 0 && !s.is_char_boundary(idx) {
        idx = idx.saturating_sub(1);
    }
    let head = &s[..idx];
    format!("{head}...(truncated, total={} bytes)", s.len())
}
