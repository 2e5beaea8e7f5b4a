use std::{str::FromStr, time::Duration};

use anyhow::{Context, bail};
use clap::Parser;
use harvester_common::SigningKey;

#[derive(Debug, Clone, Parser)]
#[command(name = "harvester-agent", about = "Collects process metrics and reports them to a harvester server")]
pub struct AgentArgs {
    /// Server address, with or without the http:// scheme.
    #[arg(short = 'a', long = "address", default_value = "localhost:8080")]
    pub address: String,

    /// Poll interval in seconds.
    #[arg(short = 'p', long = "poll-interval", default_value_t = 2)]
    pub poll_interval: u64,

    /// Report interval in seconds.
    #[arg(short = 'r', long = "report-interval", default_value_t = 10)]
    pub report_interval: u64,

    /// Shared key used to sign batches. Empty disables signing.
    #[arg(short = 'k', long = "key", default_value = "")]
    pub key: String,

    /// Maximum concurrent submissions. 0 uses the available parallelism.
    #[arg(short = 'l', long = "rate-limit", default_value_t = 0)]
    pub rate_limit: usize,

    #[arg(long = "log-level", default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub address: String,
    pub poll_interval: Duration,
    pub report_interval: Duration,
    pub key: Option<SigningKey>,
    pub rate_limit: usize,
    pub log_level: String,
}

impl AgentConfig {
    pub fn from_env_and_args() -> anyhow::Result<Self> {
        Self::resolve(AgentArgs::parse(), |name| std::env::var(name).ok())
    }

    /// Applies environment overrides on top of the parsed flags and validates the result.
    pub fn resolve(
        mut args: AgentArgs,
        env: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        if let Some(address) = non_empty(env("ADDRESS")) {
            args.address = address;
        }
        if let Some(value) = parse_env(&env, "POLL_INTERVAL")? {
            args.poll_interval = value;
        }
        if let Some(value) = parse_env(&env, "REPORT_INTERVAL")? {
            args.report_interval = value;
        }
        if let Some(key) = non_empty(env("KEY")) {
            args.key = key;
        }
        if let Some(value) = parse_env(&env, "RATE_LIMIT")? {
            args.rate_limit = value;
        }
        if let Some(level) = non_empty(env("LOG_LEVEL")) {
            args.log_level = level;
        }

        if args.poll_interval == 0 {
            bail!("poll interval must be positive");
        }
        if args.report_interval == 0 {
            bail!("report interval must be positive");
        }

        let rate_limit = match args.rate_limit {
            0 => std::thread::available_parallelism()
                .map(|value| value.get())
                .unwrap_or(1),
            limit => limit,
        };

        Ok(Self {
            address: with_scheme(&args.address),
            poll_interval: Duration::from_secs(args.poll_interval),
            report_interval: Duration::from_secs(args.report_interval),
            key: SigningKey::new(args.key),
            rate_limit,
            log_level: args.log_level,
        })
    }
}

fn with_scheme(address: &str) -> String {
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{address}")
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.is_empty())
}

fn parse_env<T>(env: &impl Fn(&str) -> Option<String>, name: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    non_empty(env(name))
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("failed to interpret {name}={raw}"))
        })
        .transpose()
}
