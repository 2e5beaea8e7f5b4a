use std::{path::PathBuf, str::FromStr, time::Duration};

use anyhow::{Context, anyhow};
use clap::Parser;
use harvester_common::SigningKey;

#[derive(Debug, Clone, Parser)]
#[command(name = "harvester-server", about = "Accepts, aggregates and persists metrics")]
pub struct ServerArgs {
    /// Listen address.
    #[arg(short = 'a', long = "address", default_value = "localhost:8080")]
    pub address: String,

    #[arg(short = 'l', long = "log-level", default_value = "info")]
    pub log_level: String,

    /// Seconds between snapshot flushes. 0 saves on every write.
    #[arg(short = 'i', long = "store-interval", default_value_t = 300)]
    pub store_interval: u64,

    /// Snapshot file. Empty keeps metrics in memory only.
    #[arg(short = 's', long = "file-storage-path", default_value = "/tmp/metrics-db.json")]
    pub file_storage_path: String,

    /// Load the persisted snapshot at startup.
    #[arg(
        short = 'r',
        long = "restore",
        default_value = "true",
        default_missing_value = "true",
        num_args = 0..=1,
        value_parser = parse_bool_flag,
        action = clap::ArgAction::Set
    )]
    pub restore: bool,

    /// PostgreSQL connection string. Takes precedence over the snapshot file.
    #[arg(short = 'd', long = "database-dsn", default_value = "")]
    pub database_dsn: String,

    /// Shared key for batch signature checks. Empty disables verification.
    #[arg(short = 'k', long = "key", default_value = "")]
    pub key: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StorageConfig {
    Postgres { dsn: String },
    File { path: PathBuf },
    Memory,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub address: String,
    pub log_level: String,
    /// `None` means save-on-write.
    pub store_interval: Option<Duration>,
    pub storage: StorageConfig,
    pub restore: bool,
    pub key: Option<SigningKey>,
}

impl ServerConfig {
    pub fn from_env_and_args() -> anyhow::Result<Self> {
        Self::resolve(ServerArgs::parse(), |name| std::env::var(name).ok())
    }

    /// Applies environment overrides on top of the parsed flags.
    pub fn resolve(
        mut args: ServerArgs,
        env: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        if let Some(address) = non_empty(env("ADDRESS")) {
            args.address = address;
        }
        if let Some(level) = non_empty(env("LOG_LEVEL")) {
            args.log_level = level;
        }
        if let Some(raw) = non_empty(env("STORE_INTERVAL")) {
            args.store_interval = parse_number(&raw, "STORE_INTERVAL")?;
        }
        if let Some(path) = non_empty(env("FILE_STORAGE_PATH")) {
            args.file_storage_path = path;
        }
        if let Some(raw) = env("RESTORE") {
            args.restore = parse_bool(&raw)
                .ok_or_else(|| anyhow!("failed to interpret RESTORE={raw}"))?;
        }
        if let Some(dsn) = non_empty(env("DATABASE_DSN")) {
            args.database_dsn = dsn;
        }
        if let Some(key) = non_empty(env("KEY")) {
            args.key = key;
        }

        let storage = if !args.database_dsn.is_empty() {
            StorageConfig::Postgres {
                dsn: args.database_dsn,
            }
        } else if !args.file_storage_path.is_empty() {
            StorageConfig::File {
                path: PathBuf::from(args.file_storage_path),
            }
        } else {
            StorageConfig::Memory
        };

        Ok(Self {
            address: args.address,
            log_level: args.log_level,
            store_interval: (args.store_interval > 0)
                .then(|| Duration::from_secs(args.store_interval)),
            storage,
            restore: args.restore,
            key: SigningKey::new(args.key),
        })
    }

    pub fn save_on_write(&self) -> bool {
        self.store_interval.is_none()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.is_empty())
}

fn parse_number<T>(raw: &str, name: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse::<T>()
        .with_context(|| format!("failed to interpret {name}={raw}"))
}

/// Accepts 1, t, T, TRUE, true, True and their false counterparts.
fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim() {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

fn parse_bool_flag(raw: &str) -> Result<bool, String> {
    parse_bool(raw).ok_or_else(|| format!("invalid boolean: {raw}"))
}
