//! CLI command definitions and subcommands

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use eyre::{Result, eyre};
use tracing::debug;

use crate::config::ClientConfig;
use crate::envelope::{Envelope, parse_param};

/// reqdispatch - rate-limited batch request dispatcher
#[derive(Parser)]
#[command(
    name = "rd",
    about = "Dispatch remote method calls with pacing and retries",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Call a single method and print the raw response
    Call {
        /// Method name, e.g. users.get
        method: String,

        /// Method parameter as key=value (repeatable)
        #[arg(short, long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
        params: Vec<(String, String)>,

        /// Access token (defaults to the configured token env var)
        #[arg(short, long)]
        token: Option<String>,
    },

    /// Dispatch a JSONL file of envelopes
    Batch {
        /// File with one {"method": ..., "params": {...}} object per line
        file: PathBuf,

        /// Worker count (defaults to dispatch.concurrency)
        #[arg(short = 'n', long)]
        concurrency: Option<usize>,

        /// Access token (defaults to the configured token env var)
        #[arg(short, long)]
        token: Option<String>,

        /// Write failures as JSONL to this path
        #[arg(short, long)]
        failures: Option<PathBuf>,
    },

    /// Print the effective configuration
    Config,
}

/// Resolve the access token: explicit flag first, then the environment
pub fn resolve_token(flag: Option<&str>, client: &ClientConfig) -> Result<String> {
    debug!(flag = flag.is_some(), token_env = %client.token_env, "resolve_token: called");
    if let Some(token) = flag {
        debug!("resolve_token: using --token");
        return Ok(token.to_string());
    }
    client
        .token_from_env()
        .ok_or_else(|| eyre!("No access token: pass --token or set {}", client.token_env))
}

/// Build the envelope for `rd call`
pub fn call_envelope(method: &str, params: &[(String, String)]) -> Envelope {
    debug!(%method, count = params.len(), "call_envelope: called");
    params
        .iter()
        .fold(Envelope::new(method), |env, (k, v)| env.param(k.as_str(), v.as_str()))
}

/// Parse JSONL batch input; blank lines and `#` comments are skipped
pub fn parse_batch(content: &str) -> Result<Vec<Envelope>> {
    debug!(len = content.len(), "parse_batch: called");
    let mut batch = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let envelope: Envelope =
            serde_json::from_str(line).map_err(|e| eyre!("Invalid envelope on line {}: {}", idx + 1, e))?;
        if envelope.method.is_empty() {
            return Err(eyre!("Empty method on line {}", idx + 1));
        }
        batch.push(envelope);
    }
    debug!(count = batch.len(), "parse_batch: parsed");
    Ok(batch)
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    let path = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("reqdispatch")
        .join("logs")
        .join("reqdispatch.log");
    debug!(?path, "get_log_path: returning path");
    path
}

/// After-help text pointing at the log file
pub fn generate_after_help() -> String {
    format!("Logs are written to: {}\n", get_log_path().display())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_call_with_params() {
        let cli = Cli::parse_from(["rd", "call", "users.get", "-p", "user_ids=1,2", "-p", "fields=photo"]);
        match cli.command {
            Command::Call { method, params, token } => {
                assert_eq!(method, "users.get");
                assert_eq!(
                    params,
                    vec![
                        ("user_ids".to_string(), "1,2".to_string()),
                        ("fields".to_string(), "photo".to_string())
                    ]
                );
                assert!(token.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_cli_rejects_malformed_param() {
        assert!(Cli::try_parse_from(["rd", "call", "users.get", "-p", "oops"]).is_err());
    }

    #[test]
    fn test_cli_parse_batch() {
        let cli = Cli::parse_from(["rd", "batch", "in.jsonl", "-n", "8", "--failures", "out.jsonl"]);
        match cli.command {
            Command::Batch {
                file,
                concurrency,
                token,
                failures,
            } => {
                assert_eq!(file, PathBuf::from("in.jsonl"));
                assert_eq!(concurrency, Some(8));
                assert!(token.is_none());
                assert_eq!(failures, Some(PathBuf::from("out.jsonl")));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_cli_global_flags() {
        let cli = Cli::parse_from(["rd", "config", "--log-level", "debug", "-c", "x.yml"]);
        assert!(matches!(cli.command, Command::Config));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert_eq!(cli.config, Some(PathBuf::from("x.yml")));
    }

    #[test]
    fn test_cli_requires_command() {
        assert!(Cli::try_parse_from(["rd"]).is_err());
    }

    #[test]
    fn test_resolve_token_prefers_flag() {
        let client = ClientConfig {
            token_env: "RD_TEST_TOKEN_UNSET_VAR".to_string(),
            ..Default::default()
        };
        assert_eq!(resolve_token(Some("abc"), &client).unwrap(), "abc");
        let err = resolve_token(None, &client).unwrap_err();
        assert!(err.to_string().contains("RD_TEST_TOKEN_UNSET_VAR"));
    }

    #[test]
    fn test_call_envelope() {
        let env = call_envelope("wall.get", &[("count".to_string(), "5".to_string())]);
        assert_eq!(env.method, "wall.get");
        assert_eq!(env.get("count"), Some("5"));
    }

    #[test]
    fn test_parse_batch() {
        let content = r#"
# header comment
{"method":"users.get","params":{"user_ids":"1"}}

{"method":"status.get"}
"#;
        let batch = parse_batch(content).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].get("user_ids"), Some("1"));
        assert!(batch[1].params.is_empty());
    }

    #[test]
    fn test_parse_batch_reports_line() {
        let err = parse_batch("{\"method\":\"a\"}\nnot json\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
        assert!(parse_batch(r#"{"method":""}"#).is_err());
    }

    #[test]
    fn test_get_log_path() {
        let path = get_log_path();
        assert!(path.ends_with("reqdispatch/logs/reqdispatch.log"));
    }
}
