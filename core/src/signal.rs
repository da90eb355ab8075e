use bitcoin::Amount;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    channels::Channels,
    era::EraLabel,
    heuristics::{CustodyState, MinerMotive, NetworkHealth, RiskVector},
    patterns::ScriptPatterns,
};

/// Hex characters of the coinbase kept on a signal.
pub const SAMPLE_HEX_CHARS: usize = 80;
/// Hex characters of the sample that feed the content key.
pub const KEY_SAMPLE_CHARS: usize = 32;
/// Hex characters of the SHA-256 digest kept as the content key.
pub const CONTENT_KEY_CHARS: usize = 12;

/// Feature record derived from exactly one block.
///
/// This is the one canonical schema for snapshots and catalog records. Field
/// names from earlier record versions are accepted through `alias`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub height: u64,
    pub timestamp: i64,
    #[serde(default)]
    pub block_hash: String,
    pub pool: String,
    pub entropy: f64,
    #[serde(alias = "complexity")]
    pub compression_ratio: f64,
    #[serde(default)]
    pub header_entropy: f64,
    #[serde(default = "neutral_ratio", alias = "header_complexity")]
    pub header_compression_ratio: f64,
    pub channels: Channels,
    #[serde(default)]
    pub polyphony_score: u32,
    pub polyphonic: bool,
    pub era_label: EraLabel,
    // Tags were missing from the earliest records.
    #[serde(default)]
    pub risk_vector: RiskVector,
    #[serde(default)]
    pub custody_state: CustodyState,
    #[serde(default)]
    pub miner_motive: MinerMotive,
    #[serde(default)]
    pub tx_count: u64,
    #[serde(default, with = "bitcoin::amount::serde::as_btc")]
    pub total_output_btc: Amount,
    #[serde(default, with = "bitcoin::amount::serde::as_btc")]
    pub largest_tx_btc: Amount,
    #[serde(default, with = "bitcoin::amount::serde::as_btc")]
    pub total_fee_btc: Amount,
    #[serde(default)]
    pub sample_hex: String,
    #[serde(default)]
    pub plain: String,
    #[serde(default)]
    pub script_patterns: ScriptPatterns,
    #[serde(default)]
    pub network_health: NetworkHealth,
}

fn neutral_ratio() -> f64 {
    1.0
}

impl Signal {
    pub fn content_key(&self) -> String {
        content_key(self.height, &self.sample_hex)
    }
}

/// Identity of a catalog record: the block height plus the leading coinbase
/// bytes, hashed. Re-deriving a signal for the same block yields the same key.
pub fn content_key(height: u64, sample_hex: &str) -> String {
    let prefix: String = sample_hex.chars().take(KEY_SAMPLE_CHARS).collect();
    let digest = Sha256::digest(format!("{height}:{prefix}").as_bytes());
    let mut key = hex::encode(digest);
    key.truncate(CONTENT_KEY_CHARS);
    key
}
