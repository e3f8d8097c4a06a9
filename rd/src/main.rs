//! reqdispatch - rate-limited batch request dispatcher
//!
//! CLI entry point for single calls and JSONL batches.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{CommandFactory, FromArgMatches};
use colored::*;
use eyre::{Context, Result};
use tracing::{debug, info, warn};

use reqdispatch::cli::{self, Cli, Command, generate_after_help};
use reqdispatch::config::Config;
use reqdispatch::{CallError, CancellationToken, Dispatcher, Envelope, Failure};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_path = cli::get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cmd = Cli::command().after_help(generate_after_help());
    let cli = Cli::from_arg_matches(&cmd.get_matches())?;

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    info!(base_url = %config.client.base_url, "reqdispatch loaded config");

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Call { method, params, token } => {
            debug!(%method, "main: matched Call command");
            cmd_call(&config, &method, &params, token.as_deref()).await
        }
        Command::Batch {
            file,
            concurrency,
            token,
            failures,
        } => {
            debug!(?file, ?concurrency, "main: matched Batch command");
            cmd_batch(&config, &file, concurrency, token.as_deref(), failures.as_ref()).await
        }
        Command::Config => {
            debug!("main: matched Config command");
            cmd_config(&config)
        }
    }
}

/// Call one method and print its raw response
async fn cmd_call(config: &Config, method: &str, params: &[(String, String)], token: Option<&str>) -> Result<()> {
    debug!(%method, "cmd_call: called");
    let token = cli::resolve_token(token, &config.client)?;
    let dispatcher = Dispatcher::from_config(config).context("Failed to create dispatcher")?;
    let envelope = cli::call_envelope(method, params);

    let cancel = CancellationToken::new();
    let _ctrl_c = cancel_on_ctrl_c(&cancel);

    let (raw, result) = dispatcher.call::<serde_json::Value>(&cancel, &envelope, &token).await;
    match result {
        Ok(_) => {
            println!("{}", raw);
            Ok(())
        }
        Err(CallError::Failed(failure)) => {
            if !raw.is_empty() {
                println!("{}", raw);
            }
            eprintln!("{} {}", "✗".red(), failure.redacted());
            Err(eyre::eyre!("Call to {} failed ({})", method, failure.kind))
        }
        Err(e) => Err(e.into()),
    }
}

/// Dispatch a JSONL batch; successes to stdout, failures to stderr
async fn cmd_batch(
    config: &Config,
    file: &Path,
    concurrency: Option<usize>,
    token: Option<&str>,
    failures_path: Option<&PathBuf>,
) -> Result<()> {
    debug!(?file, ?concurrency, "cmd_batch: called");
    let content = fs::read_to_string(file).context(format!("Failed to read {}", file.display()))?;
    let batch = cli::parse_batch(&content)?;
    let total = batch.len();

    let token = cli::resolve_token(token, &config.client)?;
    let batch: Vec<Envelope> = batch.into_iter().map(|e| e.attach_auth(&token)).collect();

    let dispatcher = Dispatcher::from_config(config).context("Failed to create dispatcher")?;
    let workers = concurrency.unwrap_or(config.dispatch.concurrency);

    let mut failure_log = match failures_path {
        Some(path) => Some(fs::File::create(path).context(format!("Failed to create {}", path.display()))?),
        None => None,
    };

    let cancel = CancellationToken::new();
    let _ctrl_c = cancel_on_ctrl_c(&cancel);

    let mut streams = dispatcher.send_many(&cancel, batch, workers);
    let mut succeeded = 0usize;
    let mut failed = 0usize;

    loop {
        tokio::select! {
            Some(raw) = streams.successes.recv() => {
                succeeded += 1;
                println!("{}", raw);
            }
            Some(failure) = streams.failures.recv() => {
                failed += 1;
                report_failure(&failure, failure_log.as_mut())?;
            }
            else => break,
        }
    }

    let missing = total - succeeded - failed;
    info!(total, succeeded, failed, missing, "cmd_batch: done");
    eprintln!(
        "{} {} succeeded, {} failed{}",
        "→".cyan(),
        succeeded.to_string().green(),
        failed.to_string().red(),
        if missing > 0 {
            format!(", {} cancelled", missing.to_string().yellow())
        } else {
            String::new()
        }
    );

    if cancel.is_cancelled() {
        return Err(eyre::eyre!("Batch cancelled"));
    }
    Ok(())
}

fn report_failure(failure: &Failure, log: Option<&mut fs::File>) -> Result<()> {
    let shown = failure.redacted();
    eprintln!("{} {}", "✗".red(), shown.to_string().yellow());
    if let Some(file) = log {
        let line = serde_json::to_string(&shown).context("Failed to serialize failure")?;
        writeln!(file, "{}", line).context("Failed to write failure log")?;
    }
    Ok(())
}

/// Print the effective configuration as YAML
fn cmd_config(config: &Config) -> Result<()> {
    debug!("cmd_config: called");
    let yaml = serde_yaml::to_string(config).context("Failed to serialize configuration")?;
    print!("{}", yaml);
    Ok(())
}

/// Cancel `cancel` on Ctrl-C; the listener stops when the guard drops
fn cancel_on_ctrl_c(cancel: &CancellationToken) -> tokio_util::sync::DropGuard {
    let listener = CancellationToken::new();
    let stop = listener.clone();
    let cancel = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = stop.cancelled() => {}
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => {
                    warn!("Interrupted, cancelling dispatch");
                    cancel.cancel();
                }
                Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
            },
        }
    });
    listener.drop_guard()
}
