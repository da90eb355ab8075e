use std::{env, path::PathBuf, str::FromStr, time::Duration};

use anyhow::{bail, Context, Result};
use dotenv::dotenv;

/// Runtime settings shared by the live scanner, the backfill coordinator and
/// the CLI.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub rpc_url: String,
    pub rpc_user: String,
    pub rpc_pass: String,
    pub rpc_timeout: Duration,
    /// Blocks covered by one live cycle.
    pub window_size: u64,
    pub min_height: u64,
    pub backfill_start_height: u64,
    pub backfill_chunk_size: u64,
    pub backfill_sleep: Duration,
    pub catalog_path: PathBuf,
    pub snapshot_path: PathBuf,
    pub backfill_state_path: PathBuf,
    /// Shell command run after every live cycle, if set.
    pub post_cycle_cmd: Option<String>,
}

impl Config {
    /// Reads `.env` when present, then the process environment.
    pub fn load() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let string = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let config = Config {
            rpc_url: string("CHAINWALK_RPC_URL", "http://127.0.0.1:8332"),
            rpc_user: string("CHAINWALK_RPC_USER", "sovereign"),
            rpc_pass: string("CHAINWALK_RPC_PASS", "bitcoin"),
            rpc_timeout: Duration::from_secs(parse_or(&lookup, "CHAINWALK_RPC_TIMEOUT_SECS", 30)?),
            window_size: parse_or(&lookup, "CHAINWALK_WINDOW_SIZE", 500)?,
            min_height: parse_or(&lookup, "CHAINWALK_MIN_HEIGHT", 1)?,
            backfill_start_height: parse_or(&lookup, "CHAINWALK_BACKFILL_START_HEIGHT", 1)?,
            backfill_chunk_size: parse_or(&lookup, "CHAINWALK_BACKFILL_CHUNK_SIZE", 500)?,
            backfill_sleep: Duration::from_secs(parse_or(
                &lookup,
                "CHAINWALK_BACKFILL_SLEEP_SECS",
                5,
            )?),
            catalog_path: PathBuf::from(string("CHAINWALK_CATALOG_PATH", "block_catalog.jsonl")),
            snapshot_path: PathBuf::from(string("CHAINWALK_SNAPSHOT_PATH", "signals_latest.json")),
            backfill_state_path: PathBuf::from(string(
                "CHAINWALK_BACKFILL_STATE_PATH",
                "backfill_state.json",
            )),
            post_cycle_cmd: lookup("CHAINWALK_POST_CYCLE_CMD").filter(|cmd| !cmd.trim().is_empty()),
        };

        if config.window_size == 0 {
            bail!("CHAINWALK_WINDOW_SIZE must be at least 1");
        }
        if config.backfill_chunk_size == 0 {
            bail!("CHAINWALK_BACKFILL_CHUNK_SIZE must be at least 1");
        }
        Ok(config)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} is not a valid number: {raw:?}")),
        None => Ok(default),
    }
}
