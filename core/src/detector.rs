//! Block to signal transform.
//!
//! [`detect_signals`] is pure: the only state it keeps is the previous block
//! timestamp for timing checks, returned to the caller in [`DetectorState`]
//! and never read back from a previous scan.

use std::collections::VecDeque;

use bitcoin::Amount;

use crate::{
    block::Block,
    channels::{is_polyphonic, Channels},
    entropy::{compression_ratio, round3, shannon_entropy},
    era::EraLabel,
    heuristics::{NetworkHealth, RuleInput, CUSTODY_STATE, MINER_MOTIVE, RISK_VECTOR},
    patterns::ScriptPatterns,
    pools::{coinbase_text, refine_pool_hint},
    signal::{Signal, SAMPLE_HEX_CHARS},
};

pub const LOW_ENTROPY_BITS: f64 = 4.0;
pub const LOW_COMPRESSIBILITY_RATIO: f64 = 0.9;
pub const HEADER_TAIL_ENTROPY_BITS: f64 = 6.0;
pub const HEADER_TAIL_RATIO: f64 = 1.2;
/// Bytes of the block hash used for the header tail metrics.
pub const HEADER_TAIL_BYTES: usize = 16;
pub const TARGET_BLOCK_INTERVAL_SECS: i64 = 600;
pub const BLOCK_INTERVAL_TOLERANCE_SECS: i64 = 120;
pub const WHALE_TX: Amount = Amount::from_sat(1_000 * 100_000_000);
pub const HIGH_FEES: Amount = Amount::from_sat(5 * 100_000_000);
pub const TX_COUNT_PRESSURE: u64 = 3000;
/// Floor of the fee ratio denominator, 0.001 BTC.
pub const FEE_RATIO_MIN_OUTPUT: Amount = Amount::from_sat(100_000);
const RECENT_SAMPLES: usize = 256;

/// Compact per-block summary kept for the tail of a scan.
#[derive(Debug, Clone, PartialEq)]
pub struct RecentSample {
    pub height: u64,
    pub entropy: f64,
    pub compression_ratio: f64,
    pub polyphonic: bool,
    pub era: EraLabel,
    pub pool: String,
}

#[derive(Debug, Clone, Default)]
pub struct DetectorState {
    pub last_timestamp: Option<i64>,
    pub recent_samples: VecDeque<RecentSample>,
}

impl DetectorState {
    fn record(&mut self, timestamp: i64, sample: RecentSample) {
        if self.recent_samples.len() == RECENT_SAMPLES {
            self.recent_samples.pop_front();
        }
        self.recent_samples.push_back(sample);
        self.last_timestamp = Some(timestamp);
    }
}

/// Derives one signal per block, in height order.
pub fn detect_signals(blocks: &[Block]) -> (Vec<Signal>, DetectorState) {
    let mut ordered: Vec<&Block> = blocks.iter().collect();
    ordered.sort_by_key(|block| block.height);

    let mut state = DetectorState::default();
    let mut signals = Vec::with_capacity(ordered.len());
    for block in ordered {
        let signal = derive_signal(block, state.last_timestamp);
        state.record(
            block.timestamp,
            RecentSample {
                height: signal.height,
                entropy: signal.entropy,
                compression_ratio: signal.compression_ratio,
                polyphonic: signal.polyphonic,
                era: signal.era_label,
                pool: signal.pool.clone(),
            },
        );
        signals.push(signal);
    }
    (signals, state)
}

/// `previous_timestamp` is the timestamp of the block before this one in the
/// same scan, if any.
pub fn derive_signal(block: &Block, previous_timestamp: Option<i64>) -> Signal {
    let coinbase = &block.coinbase_script;
    let cb_entropy = shannon_entropy(coinbase);
    let cb_ratio = compression_ratio(coinbase);

    let tail = header_tail(&block.hash);
    let tail_entropy = shannon_entropy(&tail);
    let tail_ratio = compression_ratio(&tail);

    let script_patterns = ScriptPatterns::analyze(&coinbase_text(coinbase));

    let channels = Channels {
        coinbase_low_entropy: cb_entropy < LOW_ENTROPY_BITS,
        coinbase_low_complexity: cb_ratio < LOW_COMPRESSIBILITY_RATIO,
        header_tail_anomaly: tail_entropy > HEADER_TAIL_ENTROPY_BITS
            || tail_ratio > HEADER_TAIL_RATIO,
        time_delta_weird: previous_timestamp
            .map(|previous| is_timing_anomaly(block.timestamp - previous))
            .unwrap_or(false),
        finance_whale_tx: block.largest_tx >= WHALE_TX,
        finance_high_fees: block.total_fee >= HIGH_FEES,
        script_pattern: script_patterns.has_pattern,
        utxo_pressure: block.tx_count > TX_COUNT_PRESSURE,
        fee_pressure: is_fee_pressure(block.total_fee, block.total_output),
    };
    let polyphony_score = channels.polyphony_score();

    let pool = refine_pool_hint(&block.pool_hint, coinbase);
    let rule_input = RuleInput {
        channels: &channels,
        pool: &pool,
        total_fee: block.total_fee,
    };

    let mut sample_hex = hex::encode(coinbase);
    sample_hex.truncate(SAMPLE_HEX_CHARS);

    Signal {
        height: block.height,
        timestamp: block.timestamp,
        block_hash: block.hash.clone(),
        entropy: round3(cb_entropy),
        compression_ratio: round3(cb_ratio),
        header_entropy: round3(tail_entropy),
        header_compression_ratio: round3(tail_ratio),
        polyphony_score,
        polyphonic: is_polyphonic(polyphony_score),
        era_label: EraLabel::for_height(block.height),
        risk_vector: RISK_VECTOR.evaluate(&rule_input),
        custody_state: CUSTODY_STATE.evaluate(&rule_input),
        miner_motive: MINER_MOTIVE.evaluate(&rule_input),
        tx_count: block.tx_count,
        total_output_btc: block.total_output,
        largest_tx_btc: block.largest_tx,
        total_fee_btc: block.total_fee,
        sample_hex,
        plain: String::from_utf8_lossy(coinbase).into_owned(),
        script_patterns,
        network_health: NetworkHealth::assess(block, cb_entropy, cb_ratio),
        channels,
        pool,
    }
}

/// Strictly more than the tolerance away from the target interval.
pub fn is_timing_anomaly(delta_secs: i64) -> bool {
    (delta_secs - TARGET_BLOCK_INTERVAL_SECS).abs() > BLOCK_INTERVAL_TOLERANCE_SECS
}

/// fee / max(output, 0.001 BTC) > 0.001, only when both amounts are nonzero.
pub fn is_fee_pressure(total_fee: Amount, total_output: Amount) -> bool {
    if total_fee == Amount::ZERO || total_output == Amount::ZERO {
        return false;
    }
    let denominator = total_output.max(FEE_RATIO_MIN_OUTPUT).to_sat();
    u128::from(total_fee.to_sat()) * 1000 > u128::from(denominator)
}

/// Trailing bytes of the hash. Malformed hashes give an empty tail.
fn header_tail(hash: &str) -> Vec<u8> {
    let start = hash.len().saturating_sub(HEADER_TAIL_BYTES * 2);
    hash.get(start..)
        .and_then(|tail| hex::decode(tail).ok())
        .unwrap_or_default()
}
