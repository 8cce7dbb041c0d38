use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::engine::{Engine, EngineOptions};
use crate::exit::ExitCode;
use crate::platform::SystemHost;
use crate::probes::ProbeSettings;
use crate::ui::UiConfig;

#[derive(Debug, Parser)]
#[command(
    name = "pydoctor",
    version,
    about = "Python 環境（インタプリタ・pip・パッケージ・PATH・ディスク・ネットワーク）を診断し、見つかった障害を修復する"
)]
pub struct Cli {
    /// 診断のみ行い、修復は実行しない
    #[arg(long = "diagnose-only", global = true)]
    pub diagnose_only: bool,
    #[arg(long, global = true)]
    pub json: bool,
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,
    #[arg(long, global = true)]
    pub verbose: bool,
    #[arg(long, global = true)]
    pub quiet: bool,
    /// 実行ログと latest.json を書き出さない
    #[arg(long = "no-log", global = true)]
    pub no_log: bool,
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// 外部コマンド 1 回あたりのタイムアウト（秒）
    #[arg(long, default_value_t = 60, global = true)]
    pub timeout: u64,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// 診断と修復を実行する（既定）
    Check,
    Completion(CompletionArgs),
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
pub struct CompletionArgs {
    pub shell: String,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[arg(long)]
    pub show: bool,
}

pub fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(&cli);

    if cli.timeout == 0 {
        return Err(crate::exit::invalid_args(
            "--timeout は 1 以上で指定してください",
        ));
    }

    let home_dir = crate::platform::effective_home_dir()?;
    let cfg = crate::config::load(cli.config.as_deref(), &home_dir)?;
    tracing::debug!(config = ?cfg.config_path, "configuration loaded");

    let stdout_is_tty = io::stdout().is_terminal();
    let stderr_is_tty = io::stderr().is_terminal();
    let ui_cfg = UiConfig {
        color: stdout_is_tty && cfg.ui.color && !cli.no_color,
        quiet: cli.quiet,
        verbose: cli.verbose,
    };

    match cli.command.as_ref().unwrap_or(&Commands::Check) {
        Commands::Check => {
            let timeout = Duration::from_secs(cli.timeout);
            let engine = Engine::new(
                EngineOptions {
                    diagnose_only: cli.diagnose_only,
                    show_progress: stderr_is_tty && !cli.quiet && !cli.json,
                    timeout,
                },
                ProbeSettings::from_config(&cfg, &home_dir, timeout),
                home_dir.clone(),
            );
            let host = SystemHost::new();
            let report = engine.run(&host);

            let mut log_path = None;
            if cfg.report.write_log && !cli.no_log {
                match crate::logs::write_run_log(&home_dir, &report) {
                    Ok(path) => log_path = Some(path),
                    Err(err) => warn_log_failure(&err, cli.quiet),
                }
                if let Err(err) = crate::logs::write_latest_json(&home_dir, &report) {
                    warn_log_failure(&err, cli.quiet);
                }
            }

            if cli.json {
                write_json(&report)?;
            } else {
                crate::ui::print_report(&report, &ui_cfg);
                if let Some(path) = log_path {
                    if !cli.quiet {
                        println!("ログ: {}", path.display());
                    }
                }
            }

            if report.has_unresolved_faults() {
                Ok(ExitCode::FaultsRemaining)
            } else {
                Ok(ExitCode::Success)
            }
        }
        Commands::Completion(args) => {
            let shell = parse_shell(&args.shell)?;
            let mut cmd = Cli::command();
            let mut out = io::stdout().lock();
            clap_complete::generate(shell, &mut cmd, "pydoctor", &mut out);
            Ok(ExitCode::Success)
        }
        Commands::Config(args) => {
            if args.show {
                if cli.json {
                    serde_json::to_writer_pretty(io::stdout().lock(), &cfg)?;
                    println!();
                } else {
                    println!("{}", toml::to_string_pretty(&cfg)?);
                }
            } else if !cli.quiet {
                eprintln!("config: `pydoctor config --show` を使用してください");
            }
            Ok(ExitCode::Success)
        }
    }
}

fn init_tracing(cli: &Cli) {
    let default_level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_env("PYDOCTOR_LOG")
        .unwrap_or_else(|_| EnvFilter::new(format!("pydoctor={default_level}")));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn warn_log_failure(err: &anyhow::Error, quiet: bool) {
    tracing::warn!(error = %format!("{err:#}"), "run log not written");
    if !quiet {
        eprintln!("警告: ログを書き込めませんでした: {err:#}");
    }
}

fn write_json(report: &crate::core::Report) -> Result<()> {
    let buf = serde_json::to_vec_pretty(report)?;

    let mut stdout = io::stdout().lock();
    match stdout.write_all(&buf) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::BrokenPipe => return Ok(()),
        Err(err) => return Err(err.into()),
    }
    match stdout.write_all(b"\n") {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn parse_shell(s: &str) -> Result<clap_complete::Shell> {
    let s = s.trim().to_ascii_lowercase();
    match s.as_str() {
        "bash" => Ok(clap_complete::Shell::Bash),
        "zsh" => Ok(clap_complete::Shell::Zsh),
        "fish" => Ok(clap_complete::Shell::Fish),
        other => Err(crate::exit::invalid_args(format!(
            "未対応のシェルです: {other}（bash|zsh|fish を指定してください）"
        ))),
    }
}
