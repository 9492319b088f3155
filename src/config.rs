//! CLI configuration surface.
//!
//! Parsed once at startup with `clap`, then frozen and shared read-only for
//! the life of the run.

use clap::Parser;
use std::time::Duration;
use tracing::info;

use crate::utils::parse_duration_string;

#[derive(Parser, Debug, Clone)]
#[command(name = "slamtest", about = "Scripted HTTP load generator")]
pub struct Cli {
    /// Number of simulated users.
    #[arg(long, default_value_t = 10)]
    pub users: u32,

    /// Requests per second, per user.
    #[arg(long, default_value_t = 1)]
    pub rps: u32,

    /// Test duration (accepts ms/s/m literals, e.g. "30s").
    #[arg(long, default_value = "30s")]
    pub duration: String,

    /// Path to the scenario file.
    #[arg(long)]
    pub script: String,

    /// Optional login URL hit once per worker before the scenario loop.
    #[arg(long = "login-url")]
    pub login_url: Option<String>,

    /// Optional login header, "name:value", attached to every request.
    #[arg(long = "login-hdr")]
    pub login_hdr: Option<String>,

    /// Optional path to write the structured JSON report.
    #[arg(long)]
    pub out: Option<String>,

    /// Print a live progress line once per second.
    #[arg(long)]
    pub verbose: bool,

    /// Disable TLS certificate verification.
    #[arg(long = "insecure-tls")]
    pub insecure_tls: bool,

    /// Optional path to a credentials file.
    #[arg(long)]
    pub credentials: Option<String>,
}

/// The frozen, validated configuration derived from `Cli`.
#[derive(Debug, Clone)]
pub struct Config {
    pub users: u32,
    pub rps: u32,
    pub duration: Duration,
    pub script: String,
    pub login_url: Option<String>,
    pub login_header: Option<(String, String)>,
    pub out: Option<String>,
    pub verbose: bool,
    pub insecure_tls: bool,
    pub credentials: Option<String>,
}

impl Cli {
    pub fn into_config(self) -> Result<Config, String> {
        let duration = parse_duration_string(&self.duration)
            .map_err(|e| format!("invalid --duration: {}", e))?;

        let login_header = self
            .login_hdr
            .map(|raw| {
                raw.split_once(':')
                    .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
                    .ok_or_else(|| format!("invalid --login-hdr '{}', expected 'name:value'", raw))
            })
            .transpose()?;

        Ok(Config {
            users: self.users,
            rps: self.rps,
            duration,
            script: self.script,
            login_url: self.login_url,
            login_header,
            out: self.out,
            verbose: self.verbose,
            insecure_tls: self.insecure_tls,
            credentials: self.credentials,
        })
    }
}

impl Config {
    pub fn print_summary(&self) {
        info!(
            users = self.users,
            rps_per_user = self.rps,
            duration_secs = self.duration.as_secs(),
            script = %self.script,
            login_url = ?self.login_url,
            insecure_tls = self.insecure_tls,
            credentials = ?self.credentials,
            "starting load test"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(script: &str) -> Cli {
        Cli {
            users: 10,
            rps: 1,
            duration: "30s".to_string(),
            script: script.to_string(),
            login_url: None,
            login_hdr: None,
            out: None,
            verbose: false,
            insecure_tls: false,
            credentials: None,
        }
    }

    #[test]
    fn parses_duration_into_config() {
        let config = cli("scenario.yaml").into_config().unwrap();
        assert_eq!(config.duration, Duration::from_secs(30));
    }

    #[test]
    fn rejects_bad_duration() {
        let mut c = cli("scenario.yaml");
        c.duration = "not-a-duration".to_string();
        assert!(c.into_config().is_err());
    }

    #[test]
    fn splits_login_header_into_name_value() {
        let mut c = cli("scenario.yaml");
        c.login_hdr = Some("X-Api-Key: secret".to_string());
        let config = c.into_config().unwrap();
        assert_eq!(
            config.login_header,
            Some(("X-Api-Key".to_string(), "secret".to_string()))
        );
    }

    #[test]
    fn rejects_malformed_login_header() {
        let mut c = cli("scenario.yaml");
        c.login_hdr = Some("no-colon-here".to_string());
        assert!(c.into_config().is_err());
    }
}
