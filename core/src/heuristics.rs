//! Deterministic tag tables derived from a block's channels.
//!
//! Each tag is an ordered rule list: the first rule whose predicate holds
//! decides the tag, otherwise the table default applies.

use bitcoin::Amount;
use serde::{Deserialize, Serialize};

use crate::{block::Block, channels::Channels, pools::is_major_pool};

/// Fee below which a major pool is read as leaving price discovery.
pub const LOW_FEE: Amount = Amount::from_sat(10_000_000);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskVector {
    #[serde(rename = "↑")]
    Rising,
    #[serde(rename = "↓")]
    Falling,
    #[default]
    #[serde(rename = "→")]
    Neutral,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustodyState {
    #[default]
    Market,
    Vault,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MinerMotive {
    #[serde(rename = "positioning for fee dominance")]
    FeeDominance,
    #[serde(rename = "exiting price discovery")]
    ExitingPriceDiscovery,
    #[serde(rename = "front-running regulatory choke points")]
    FrontRunningRegulation,
    #[default]
    #[serde(rename = "preparing scarcity regime")]
    PreparingScarcity,
}

/// What the rule predicates may look at.
#[derive(Debug, Clone, Copy)]
pub struct RuleInput<'a> {
    pub channels: &'a Channels,
    pub pool: &'a str,
    pub total_fee: Amount,
}

pub struct Rule<T> {
    pub name: &'static str,
    pub when: fn(&RuleInput<'_>) -> bool,
    pub then: T,
}

pub struct RuleTable<T: 'static> {
    pub rules: &'static [Rule<T>],
    pub default: T,
}

impl<T: Copy + 'static> RuleTable<T> {
    /// First rule whose predicate holds.
    pub fn matching(&self, input: &RuleInput<'_>) -> Option<&'static Rule<T>> {
        self.rules.iter().find(|rule| (rule.when)(input))
    }

    /// Name of the deciding rule, `"default"` when none fired.
    pub fn explain(&self, input: &RuleInput<'_>) -> &'static str {
        self.matching(input).map_or("default", |rule| rule.name)
    }

    pub fn evaluate(&self, input: &RuleInput<'_>) -> T {
        self.matching(input)
            .map(|rule| rule.then)
            .unwrap_or(self.default)
    }
}

fn fees_or_whale(input: &RuleInput<'_>) -> bool {
    input.channels.finance_high_fees || input.channels.finance_whale_tx
}

fn low_entropy(input: &RuleInput<'_>) -> bool {
    input.channels.coinbase_low_entropy
}

fn pressure_or_whale(input: &RuleInput<'_>) -> bool {
    input.channels.utxo_pressure || input.channels.finance_whale_tx
}

fn major_with_high_fees(input: &RuleInput<'_>) -> bool {
    is_major_pool(input.pool) && input.channels.finance_high_fees
}

fn major_with_low_fees(input: &RuleInput<'_>) -> bool {
    is_major_pool(input.pool) && input.total_fee < LOW_FEE
}

fn major_pool(input: &RuleInput<'_>) -> bool {
    is_major_pool(input.pool)
}

pub const RISK_VECTOR: RuleTable<RiskVector> = RuleTable {
    rules: &[
        Rule {
            name: "fees_or_whale",
            when: fees_or_whale,
            then: RiskVector::Rising,
        },
        Rule {
            name: "low_entropy",
            when: low_entropy,
            then: RiskVector::Falling,
        },
    ],
    default: RiskVector::Neutral,
};

pub const CUSTODY_STATE: RuleTable<CustodyState> = RuleTable {
    rules: &[Rule {
        name: "pressure_or_whale",
        when: pressure_or_whale,
        then: CustodyState::Vault,
    }],
    default: CustodyState::Market,
};

pub const MINER_MOTIVE: RuleTable<MinerMotive> = RuleTable {
    rules: &[
        Rule {
            name: "major_with_high_fees",
            when: major_with_high_fees,
            then: MinerMotive::FeeDominance,
        },
        Rule {
            name: "major_with_low_fees",
            when: major_with_low_fees,
            then: MinerMotive::ExitingPriceDiscovery,
        },
        Rule {
            name: "major_pool",
            when: major_pool,
            then: MinerMotive::FrontRunningRegulation,
        },
    ],
    default: MinerMotive::PreparingScarcity,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MinerCompetition {
    High,
    Normal,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeMarket {
    HighPressure,
    Normal,
    LowPressure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockEfficiency {
    HighEntropyEfficient,
    Normal,
    LowEntropyComplex,
}

/// Coarse health read of a single block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkHealth {
    pub miner_competition: MinerCompetition,
    pub fee_market: FeeMarket,
    pub block_efficiency: BlockEfficiency,
    pub unusual_activity: bool,
}

impl Default for NetworkHealth {
    fn default() -> Self {
        NetworkHealth {
            miner_competition: MinerCompetition::Normal,
            fee_market: FeeMarket::Normal,
            block_efficiency: BlockEfficiency::Normal,
            unusual_activity: false,
        }
    }
}

impl NetworkHealth {
    /// `entropy` and `compression_ratio` are the unrounded coinbase metrics.
    pub fn assess(block: &Block, entropy: f64, compression_ratio: f64) -> Self {
        let miner_competition = match block.tx_count {
            0 => MinerCompetition::Normal,
            n if n > 4000 => MinerCompetition::High,
            n if n < 1000 => MinerCompetition::Low,
            _ => MinerCompetition::Normal,
        };

        let fee = u128::from(block.total_fee.to_sat());
        let output = u128::from(block.total_output.to_sat());
        let fee_market = if fee == 0 || output == 0 {
            FeeMarket::Normal
        } else if fee * 1000 > output * 5 {
            // fee / output > 0.005
            FeeMarket::HighPressure
        } else if fee * 10_000 < output {
            // fee / output < 0.0001
            FeeMarket::LowPressure
        } else {
            FeeMarket::Normal
        };

        let block_efficiency = if entropy > 6.0 && compression_ratio < 0.8 {
            BlockEfficiency::HighEntropyEfficient
        } else if entropy < 3.0 && compression_ratio > 1.2 {
            BlockEfficiency::LowEntropyComplex
        } else {
            BlockEfficiency::Normal
        };

        NetworkHealth {
            unusual_activity: miner_competition != MinerCompetition::Normal
                || fee_market != FeeMarket::Normal
                || block_efficiency != BlockEfficiency::Normal,
            miner_competition,
            fee_market,
            block_efficiency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input<'a>(channels: &'a Channels, pool: &'a str, fee_sat: u64) -> RuleInput<'a> {
        RuleInput {
            channels,
            pool,
            total_fee: Amount::from_sat(fee_sat),
        }
    }

    #[test]
    fn test_risk_vector_table() {
        let quiet = Channels::default();
        let fees = Channels {
            finance_high_fees: true,
            ..Default::default()
        };
        let whale = Channels {
            finance_whale_tx: true,
            ..Default::default()
        };
        let low = Channels {
            coinbase_low_entropy: true,
            ..Default::default()
        };
        let fees_and_low = Channels {
            finance_high_fees: true,
            coinbase_low_entropy: true,
            ..Default::default()
        };

        assert_eq!(RISK_VECTOR.evaluate(&input(&quiet, "unknown", 0)), RiskVector::Neutral);
        assert_eq!(RISK_VECTOR.evaluate(&input(&fees, "unknown", 0)), RiskVector::Rising);
        assert_eq!(RISK_VECTOR.evaluate(&input(&whale, "unknown", 0)), RiskVector::Rising);
        assert_eq!(RISK_VECTOR.evaluate(&input(&low, "unknown", 0)), RiskVector::Falling);
        // Earlier rule wins.
        assert_eq!(
            RISK_VECTOR.evaluate(&input(&fees_and_low, "unknown", 0)),
            RiskVector::Rising
        );
    }

    #[test]
    fn test_custody_state_table() {
        let pressure = Channels {
            utxo_pressure: true,
            ..Default::default()
        };
        let whale = Channels {
            finance_whale_tx: true,
            ..Default::default()
        };
        let fees = Channels {
            finance_high_fees: true,
            ..Default::default()
        };
        assert_eq!(CUSTODY_STATE.evaluate(&input(&pressure, "x", 0)), CustodyState::Vault);
        assert_eq!(CUSTODY_STATE.evaluate(&input(&whale, "x", 0)), CustodyState::Vault);
        assert_eq!(CUSTODY_STATE.evaluate(&input(&fees, "x", 0)), CustodyState::Market);
    }

    #[test]
    fn test_miner_motive_table() {
        let quiet = Channels::default();
        let fees = Channels {
            finance_high_fees: true,
            ..Default::default()
        };

        assert_eq!(
            MINER_MOTIVE.evaluate(&input(&fees, "AntPool", 600_000_000)),
            MinerMotive::FeeDominance
        );
        assert_eq!(
            MINER_MOTIVE.evaluate(&input(&quiet, "AntPool", 9_999_999)),
            MinerMotive::ExitingPriceDiscovery
        );
        assert_eq!(
            MINER_MOTIVE.evaluate(&input(&quiet, "F2Pool", 10_000_000)),
            MinerMotive::FrontRunningRegulation
        );
        assert_eq!(
            MINER_MOTIVE.evaluate(&input(&fees, "ViaBTC", 600_000_000)),
            MinerMotive::PreparingScarcity
        );
        assert_eq!(
            MINER_MOTIVE.evaluate(&input(&quiet, "unknown", 0)),
            MinerMotive::PreparingScarcity
        );
    }

    #[test]
    fn test_resolved_display_names_are_not_major() {
        let quiet = Channels::default();
        for pool in ["Foundry USA", "Binance Pool"] {
            let low_fee = input(&quiet, pool, 1_000_000);
            assert_eq!(MINER_MOTIVE.evaluate(&low_fee), MinerMotive::PreparingScarcity);
            assert_eq!(MINER_MOTIVE.explain(&low_fee), "default");
        }
    }

    #[test]
    fn test_explain_names_deciding_rule() {
        let both = Channels {
            finance_high_fees: true,
            coinbase_low_entropy: true,
            utxo_pressure: true,
            ..Default::default()
        };
        let quiet = Channels::default();
        assert_eq!(RISK_VECTOR.explain(&input(&both, "x", 0)), "fees_or_whale");
        assert_eq!(CUSTODY_STATE.explain(&input(&both, "x", 0)), "pressure_or_whale");
        assert_eq!(
            MINER_MOTIVE.explain(&input(&quiet, "antpool", 9_999_999)),
            "major_with_low_fees"
        );
        assert_eq!(RISK_VECTOR.explain(&input(&quiet, "x", 0)), "default");
    }

    #[test]
    fn test_tag_serialization() {
        assert_eq!(serde_json::to_string(&RiskVector::Rising).unwrap(), "\"↑\"");
        assert_eq!(serde_json::to_string(&CustodyState::Vault).unwrap(), "\"vault\"");
        assert_eq!(
            serde_json::to_string(&MinerMotive::PreparingScarcity).unwrap(),
            "\"preparing scarcity regime\""
        );
    }

    fn block(tx_count: u64, output_sat: u64, fee_sat: u64) -> Block {
        Block {
            height: 1,
            timestamp: 0,
            hash: String::new(),
            coinbase_script: Vec::new(),
            pool_hint: "unknown".into(),
            tx_count,
            total_output: Amount::from_sat(output_sat),
            largest_tx: Amount::ZERO,
            total_fee: Amount::from_sat(fee_sat),
        }
    }

    #[test]
    fn test_network_health() {
        let normal = NetworkHealth::assess(&block(2000, 1_000_000, 1_000), 5.0, 1.0);
        assert_eq!(normal, NetworkHealth::default());

        let busy = NetworkHealth::assess(&block(4001, 1_000_000, 1_000), 5.0, 1.0);
        assert_eq!(busy.miner_competition, MinerCompetition::High);
        assert!(busy.unusual_activity);

        let pricey = NetworkHealth::assess(&block(2000, 1_000_000, 5_001), 5.0, 1.0);
        assert_eq!(pricey.fee_market, FeeMarket::HighPressure);

        let cheap = NetworkHealth::assess(&block(2000, 1_000_000, 99), 5.0, 1.0);
        assert_eq!(cheap.fee_market, FeeMarket::LowPressure);

        let efficient = NetworkHealth::assess(&block(2000, 1_000_000, 1_000), 6.5, 0.7);
        assert_eq!(efficient.block_efficiency, BlockEfficiency::HighEntropyEfficient);

        let empty = NetworkHealth::assess(&block(0, 0, 0), 0.0, 1.0);
        assert_eq!(empty.miner_competition, MinerCompetition::Normal);
        assert_eq!(empty.fee_market, FeeMarket::Normal);
    }
}
