use anyhow::Error;
use std::io::{self, Write};
use unicode_width::UnicodeWidthChar;

use crate::core::{FinalStatus, Report, ReportEntry};

#[derive(Debug, Clone)]
pub struct UiConfig {
    pub color: bool,
    pub quiet: bool,
    pub verbose: bool,
}

pub fn eprintln_error(err: &Error) {
    let mut stderr = io::stderr().lock();
    let _ = writeln!(stderr, "エラー:");
    let _ = writeln!(stderr, "  {err}");

    let mut causes = err.chain().skip(1).peekable();
    if causes.peek().is_some() {
        let _ = writeln!(stderr, "原因:");
        for cause in causes {
            let _ = writeln!(stderr, "  - {cause}");
        }
    }

    let _ = writeln!(stderr, "次に:");
    let _ = writeln!(
        stderr,
        "  - 詳細を見るには `--verbose` を付けて再実行してください"
    );
    let _ = writeln!(
        stderr,
        "  - 設定を確認するには `pydoctor config --show` を実行してください"
    );
}

pub fn print_report(report: &Report, cfg: &UiConfig) {
    if cfg.quiet {
        return;
    }
    let mut out = io::stdout().lock();
    write_report(&mut out, report, cfg);
}

pub fn write_report(out: &mut dyn Write, report: &Report, cfg: &UiConfig) {
    let s = &report.summary;
    let _ = writeln!(
        out,
        "pydoctor {}（{} {} / モード: {}）",
        report.tool_version,
        report.os.name,
        report.os.version,
        report.mode.as_str()
    );
    let os = &report.os;
    let _ = writeln!(
        out,
        "環境: {} / {} / {} / Python {}",
        os.platform,
        os.arch,
        os.processor,
        os.python_version.as_deref().unwrap_or("不明")
    );
    let _ = writeln!(out);
    print_entries_table(out, &report.entries, cfg);

    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "概要: OK={}  警告={}  スキップ={}  障害={}  修復済み={}  未解決={}",
        s.ok, s.warning, s.skipped, s.fault, s.ok_resolved, s.fault_unresolved
    );
    for note in &s.notes {
        let _ = writeln!(out, "- {note}");
    }
}

fn print_entries_table(out: &mut dyn Write, entries: &[ReportEntry], cfg: &UiConfig) {
    let label_status = "状態";
    let label_probe = "プローブ";
    let label_detail = "詳細";

    let status_w = entries
        .iter()
        .map(|e| visible_width_ansi(e.final_status.as_str()))
        .max()
        .unwrap_or(0)
        .max(visible_width_ansi(label_status));
    let probe_w = entries
        .iter()
        .map(|e| visible_width_ansi(&e.result.probe_id))
        .max()
        .unwrap_or(0)
        .max(visible_width_ansi(label_probe));

    let _ = writeln!(
        out,
        "{}  {}  {}",
        pad_end_display(label_status, status_w),
        pad_end_display(label_probe, probe_w),
        label_detail
    );
    let _ = writeln!(
        out,
        "{}  {}  {}",
        "-".repeat(status_w),
        "-".repeat(probe_w),
        "-".repeat(visible_width_ansi(label_detail).max(4))
    );

    for entry in entries {
        let status = pad_end_display(&format_status(entry.final_status, cfg.color), status_w);
        let probe = pad_end_display(&entry.result.probe_id, probe_w);
        let _ = writeln!(
            out,
            "{status}  {probe}  {}",
            truncate_middle(&entry.result.detail, 120)
        );
        if let Some(outcome) = &entry.remediation {
            let mark = if outcome.succeeded { "修復" } else { "修復失敗" };
            let _ = writeln!(
                out,
                "{}  {}  ↳ {mark}: {}",
                " ".repeat(status_w),
                " ".repeat(probe_w),
                truncate_middle(&outcome.detail, 120)
            );
        }
        if cfg.verbose {
            for ev in &entry.result.evidence {
                let _ = writeln!(
                    out,
                    "{}  {}  · {}: {}",
                    " ".repeat(status_w),
                    " ".repeat(probe_w),
                    ev.kind.as_str(),
                    ev.value
                );
            }
        }
    }
}

fn format_status(status: FinalStatus, color: bool) -> String {
    let s = status.as_str();
    if !color {
        return s.to_string();
    }

    let code = match status {
        FinalStatus::Ok | FinalStatus::OkResolved => "32",
        FinalStatus::Warning => "33",
        FinalStatus::Skipped => "90",
        FinalStatus::Fault | FinalStatus::FaultUnresolved => "31",
    };
    format!("\x1b[{code}m{s}\x1b[0m")
}

fn truncate_middle(s: &str, max_chars: usize) -> String {
    let len = s.chars().count();
    if len <= max_chars {
        return s.to_string();
    }

    let keep = max_chars.saturating_sub(3);
    let left = keep / 2;
    let right = keep.saturating_sub(left);

    let prefix: String = s.chars().take(left).collect();
    let suffix: String = s.chars().skip(len - right).collect();

    format!("{prefix}...{suffix}")
}

fn pad_end_display(s: &str, width: usize) -> String {
    let w = visible_width_ansi(s);
    if w >= width {
        return s.to_string();
    }
    format!("{s}{}", " ".repeat(width - w))
}

fn visible_width_ansi(s: &str) -> usize {
    let mut width: usize = 0;
    let mut chars = s.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\x1b' && chars.peek() == Some(&'[') {
            let _ = chars.next();
            for ch2 in chars.by_ref() {
                if ch2 == 'm' {
                    break;
                }
            }
            continue;
        }
        width = width.saturating_add(UnicodeWidthChar::width(ch).unwrap_or(0));
    }
    width
}
