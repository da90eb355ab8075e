use serde::{Deserialize, Serialize};

/// Weighted score at or above which a block counts as polyphonic.
pub const POLYPHONY_THRESHOLD: u32 = 3;

/// The named heuristic flags of a signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Channels {
    pub coinbase_low_entropy: bool,
    pub coinbase_low_complexity: bool,
    pub header_tail_anomaly: bool,
    pub time_delta_weird: bool,
    pub finance_whale_tx: bool,
    pub finance_high_fees: bool,
    pub script_pattern: bool,
    pub utxo_pressure: bool,
    pub fee_pressure: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    CoinbaseLowEntropy,
    CoinbaseLowComplexity,
    HeaderTailAnomaly,
    TimeDeltaWeird,
    FinanceWhaleTx,
    FinanceHighFees,
    ScriptPattern,
    UtxoPressure,
    FeePressure,
}

impl Channel {
    pub const ALL: [Channel; 9] = [
        Channel::CoinbaseLowEntropy,
        Channel::CoinbaseLowComplexity,
        Channel::HeaderTailAnomaly,
        Channel::TimeDeltaWeird,
        Channel::FinanceWhaleTx,
        Channel::FinanceHighFees,
        Channel::ScriptPattern,
        Channel::UtxoPressure,
        Channel::FeePressure,
    ];

    pub const fn weight(self) -> u32 {
        match self {
            Channel::TimeDeltaWeird => 3,
            Channel::HeaderTailAnomaly | Channel::FinanceWhaleTx | Channel::FinanceHighFees => 2,
            Channel::CoinbaseLowEntropy
            | Channel::CoinbaseLowComplexity
            | Channel::ScriptPattern
            | Channel::UtxoPressure
            | Channel::FeePressure => 1,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Channel::CoinbaseLowEntropy => "coinbase_low_entropy",
            Channel::CoinbaseLowComplexity => "coinbase_low_complexity",
            Channel::HeaderTailAnomaly => "header_tail_anomaly",
            Channel::TimeDeltaWeird => "time_delta_weird",
            Channel::FinanceWhaleTx => "finance_whale_tx",
            Channel::FinanceHighFees => "finance_high_fees",
            Channel::ScriptPattern => "script_pattern",
            Channel::UtxoPressure => "utxo_pressure",
            Channel::FeePressure => "fee_pressure",
        }
    }
}

impl Channels {
    pub const fn is_active(&self, channel: Channel) -> bool {
        match channel {
            Channel::CoinbaseLowEntropy => self.coinbase_low_entropy,
            Channel::CoinbaseLowComplexity => self.coinbase_low_complexity,
            Channel::HeaderTailAnomaly => self.header_tail_anomaly,
            Channel::TimeDeltaWeird => self.time_delta_weird,
            Channel::FinanceWhaleTx => self.finance_whale_tx,
            Channel::FinanceHighFees => self.finance_high_fees,
            Channel::ScriptPattern => self.script_pattern,
            Channel::UtxoPressure => self.utxo_pressure,
            Channel::FeePressure => self.fee_pressure,
        }
    }

    pub fn active(&self) -> impl Iterator<Item = Channel> + '_ {
        Channel::ALL
            .into_iter()
            .filter(move |channel| self.is_active(*channel))
    }

    pub fn active_count(&self) -> usize {
        self.active().count()
    }

    /// Sum of the weights of every active channel.
    pub fn polyphony_score(&self) -> u32 {
        self.active().map(Channel::weight).sum()
    }
}

pub const fn is_polyphonic(score: u32) -> bool {
    score >= POLYPHONY_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_tail_alone_is_not_polyphonic() {
        let channels = Channels {
            header_tail_anomaly: true,
            ..Default::default()
        };
        assert_eq!(channels.polyphony_score(), 2);
        assert!(!is_polyphonic(channels.polyphony_score()));
    }

    #[test]
    fn test_header_tail_and_low_entropy_is_polyphonic() {
        let channels = Channels {
            header_tail_anomaly: true,
            coinbase_low_entropy: true,
            ..Default::default()
        };
        assert_eq!(channels.polyphony_score(), 3);
        assert!(is_polyphonic(channels.polyphony_score()));
    }

    #[test]
    fn test_timing_alone_reaches_threshold() {
        let channels = Channels {
            time_delta_weird: true,
            ..Default::default()
        };
        assert!(is_polyphonic(channels.polyphony_score()));
    }

    #[test]
    fn test_all_channels_weight_sum() {
        let channels = Channels {
            coinbase_low_entropy: true,
            coinbase_low_complexity: true,
            header_tail_anomaly: true,
            time_delta_weird: true,
            finance_whale_tx: true,
            finance_high_fees: true,
            script_pattern: true,
            utxo_pressure: true,
            fee_pressure: true,
        };
        assert_eq!(channels.active_count(), 9);
        assert_eq!(channels.polyphony_score(), 14);
        assert_eq!(Channels::default().polyphony_score(), 0);
    }

    #[test]
    fn test_serialized_names_match_channel_names() {
        let channels = Channels {
            fee_pressure: true,
            ..Default::default()
        };
        let value = serde_json::to_value(channels).unwrap();
        for channel in Channel::ALL {
            assert_eq!(
                value[channel.name()].as_bool(),
                Some(channels.is_active(channel))
            );
        }
    }

    #[test]
    fn test_legacy_channel_map_is_accepted() {
        // Older records carry an extra, never-set flag and may lack newer ones.
        let legacy = r#"{"coinbase_low_entropy": true, "inter_block_chain": false}"#;
        let channels: Channels = serde_json::from_str(legacy).unwrap();
        assert!(channels.coinbase_low_entropy);
        assert!(!channels.fee_pressure);
    }
}
