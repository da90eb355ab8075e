use bitcoin::{Amount, Transaction};

use crate::pools::{resolve_pool, UNKNOWN_POOL};

/// Per-block aggregates as seen by the detector.
///
/// Monetary fields are kept as [`Amount`] (integer satoshis) so sums over
/// thousands of blocks never drift.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub height: u64,
    /// Header time, Unix seconds.
    pub timestamp: i64,
    /// Block hash in display (big-endian hex) order.
    pub hash: String,
    pub coinbase_script: Vec<u8>,
    pub pool_hint: String,
    pub tx_count: u64,
    pub total_output: Amount,
    /// Largest output sum of any non-coinbase transaction.
    pub largest_tx: Amount,
    pub total_fee: Amount,
}

impl Block {
    /// Builds the aggregates from a consensus-decoded block.
    pub fn from_consensus(height: u64, block: &bitcoin::Block) -> Self {
        let coinbase_script = block
            .txdata
            .first()
            .and_then(|tx| tx.input.first())
            .map(|input| input.script_sig.as_bytes().to_vec())
            .unwrap_or_default();

        let mut coinbase_payout = Amount::ZERO;
        let mut non_coinbase_output = Amount::ZERO;
        let mut largest_tx = Amount::ZERO;
        for (index, tx) in block.txdata.iter().enumerate() {
            let tx_output = output_sum(tx);
            if index == 0 {
                coinbase_payout = tx_output;
                continue;
            }
            non_coinbase_output = saturating_add(non_coinbase_output, tx_output);
            if tx_output > largest_tx {
                largest_tx = tx_output;
            }
        }

        let pool_hint = resolve_pool(&coinbase_script)
            .unwrap_or(UNKNOWN_POOL)
            .to_string();

        Block {
            height,
            timestamp: i64::from(block.header.time),
            hash: block.block_hash().to_string(),
            coinbase_script,
            pool_hint,
            tx_count: block.txdata.len() as u64,
            total_output: saturating_add(coinbase_payout, non_coinbase_output),
            largest_tx,
            total_fee: fee_estimate(coinbase_payout, non_coinbase_output),
        }
    }
}

/// Sum of all output values of a transaction.
pub fn output_sum(tx: &Transaction) -> Amount {
    tx.output
        .iter()
        .fold(Amount::ZERO, |acc, out| saturating_add(acc, out.value))
}

/// Rough fee estimate: what the coinbase pays out beyond the value moved by
/// the rest of the block, floored at zero.
pub fn fee_estimate(coinbase_payout: Amount, non_coinbase_output: Amount) -> Amount {
    coinbase_payout
        .checked_sub(non_coinbase_output)
        .unwrap_or(Amount::ZERO)
}

fn saturating_add(a: Amount, b: Amount) -> Amount {
    a.checked_add(b).unwrap_or(Amount::MAX)
}
