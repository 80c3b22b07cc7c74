//! `skiff` - run provisioning scripts against remote hosts over SSH.
//!
//! # Usage
//!
//! ```bash
//! # Run a script
//! skiff deploy.skiff
//!
//! # Read the script from stdin, resolving local paths from ./build
//! cat deploy.skiff | skiff -C build
//!
//! # Validate a script and list its steps without connecting
//! skiff --check deploy.skiff
//! skiff --check --format json deploy.skiff
//! ```
//!
//! Exit codes: 0 success, 1 a step failed, 2 grammar error, 3 remote step
//! before `CONNECT`, 4 I/O error.

mod terminal;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use skiff_core::action::Script;
use skiff_core::config::SkiffConfig;
use skiff_core::error::SkiffError;
use skiff_core::parser::parse;
use skiff_core::runner::Runner;
use skiff_core::ssh::SshConnector;

use crate::terminal::{TerminalPrompt, TerminalReporter};

/// Run provisioning scripts against remote hosts over SSH.
#[derive(Parser)]
#[command(name = "skiff")]
#[command(about = "Run provisioning and deployment scripts over SSH")]
#[command(version)]
struct Cli {
    /// Path to the script file (reads stdin if omitted)
    script: Option<PathBuf>,

    /// Resolve local paths and run CMD from this directory
    #[arg(short = 'C', long = "directory")]
    directory: Option<PathBuf>,

    /// Parse the script and list its steps without connecting
    #[arg(long)]
    check: bool,

    /// Output format for --check: text or json
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    /// TCP connect timeout in milliseconds (overrides the config file)
    #[arg(long, env = "SKIFF_CONNECT_TIMEOUT")]
    timeout: Option<u64>,

    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[derive(Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_file.as_deref());

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1))
        }
    }
}

fn init_tracing(verbose: u8, log_file: Option<&Path>) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    };

    let file_layer = log_file.and_then(|path| {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let name = path.file_name()?.to_string_lossy().into_owned();
        match RollingFileAppender::builder()
            .rotation(Rotation::NEVER)
            .filename_prefix(name)
            .build(dir)
        {
            Ok(appender) => Some(fmt::layer().with_writer(appender).with_ansi(false)),
            Err(e) => {
                eprintln!("Warning: cannot open log file {}: {}", path.display(), e);
                None
            }
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
}

fn read_source(path: Option<&Path>) -> Result<String, SkiffError> {
    match path {
        Some(path) => Ok(std::fs::read_to_string(path)?),
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

fn print_steps(script: &Script, format: OutputFormat) -> Result<(), SkiffError> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(script).map_err(std::io::Error::other)?;
            println!("{}", json);
        }
        OutputFormat::Text => {
            for (index, step) in script.steps.iter().enumerate() {
                println!("{:>3}. line {:<4} {}", index + 1, step.line, step.action);
            }
            println!("{} step(s), script is valid", script.len());
        }
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<(), SkiffError> {
    let source = read_source(cli.script.as_deref())?;
    let script = parse(&source)?;
    info!(steps = script.len(), "script parsed");

    if cli.check {
        return print_steps(&script, cli.format);
    }

    let config = SkiffConfig::load();
    let timeout = cli
        .timeout
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.connect_timeout());

    let mut runner = Runner::new(Arc::new(SshConnector::new(timeout)))
        .with_prompt(Arc::new(TerminalPrompt))
        .with_reporter(Arc::new(TerminalReporter::new()))
        .with_protected_paths(config.protected());

    if let Some(dir) = cli.directory {
        let dir = if dir.is_absolute() {
            dir
        } else {
            std::env::current_dir()?.join(dir)
        };
        runner = runner.with_local_dir(dir);
    }

    runner.run(&script).await
}
