//! Height bands used to label blocks.
//!
//! Two granularities exist: the fine [`EraLabel`] carried by every signal for
//! display, and the coarse [`EraSlug`] stamped on catalog records for
//! grouping.

use serde::{Deserialize, Serialize};

/// Ten contiguous display bands, ordered by height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EraLabel {
    SatoshiEarly,
    SatoshiLate,
    GpuEarly,
    GpuLate,
    AsicTransition,
    AsicWars,
    TaprootPrep,
    Segwit,
    Taproot,
    PostEtf,
}

/// Exclusive upper height of each band but the last.
const LABEL_BOUNDS: [(u64, EraLabel); 9] = [
    (100_000, EraLabel::SatoshiEarly),
    (200_000, EraLabel::SatoshiLate),
    (300_000, EraLabel::GpuEarly),
    (400_000, EraLabel::GpuLate),
    (450_000, EraLabel::AsicTransition),
    (500_000, EraLabel::AsicWars),
    (600_000, EraLabel::TaprootPrep),
    (700_000, EraLabel::Segwit),
    (800_000, EraLabel::Taproot),
];

impl EraLabel {
    pub const ALL: [EraLabel; 10] = [
        EraLabel::SatoshiEarly,
        EraLabel::SatoshiLate,
        EraLabel::GpuEarly,
        EraLabel::GpuLate,
        EraLabel::AsicTransition,
        EraLabel::AsicWars,
        EraLabel::TaprootPrep,
        EraLabel::Segwit,
        EraLabel::Taproot,
        EraLabel::PostEtf,
    ];

    pub fn for_height(height: u64) -> Self {
        LABEL_BOUNDS
            .iter()
            .find(|(upper, _)| height < *upper)
            .map(|(_, label)| *label)
            .unwrap_or(EraLabel::PostEtf)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            EraLabel::SatoshiEarly => "satoshi_early",
            EraLabel::SatoshiLate => "satoshi_late",
            EraLabel::GpuEarly => "gpu_early",
            EraLabel::GpuLate => "gpu_late",
            EraLabel::AsicTransition => "asic_transition",
            EraLabel::AsicWars => "asic_wars",
            EraLabel::TaprootPrep => "taproot_prep",
            EraLabel::Segwit => "segwit",
            EraLabel::Taproot => "taproot",
            EraLabel::PostEtf => "post_etf",
        }
    }
}

/// 2024-10-01T00:00:00Z. Blocks from the institutional band at or after this
/// time are slugged `post_etf`.
pub const ETF_TIMESTAMP: i64 = 1_727_740_800;

/// Coarse catalog grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EraSlug {
    Satoshi,
    EarlyGpu,
    AsicWars,
    Segwit,
    Institutional,
    PostEtf,
}

impl EraSlug {
    pub fn derive(height: u64, timestamp: Option<i64>) -> Self {
        match height {
            h if h < 200_000 => EraSlug::Satoshi,
            h if h < 350_000 => EraSlug::EarlyGpu,
            h if h < 550_000 => EraSlug::AsicWars,
            h if h < 700_000 => EraSlug::Segwit,
            _ => match timestamp {
                Some(ts) if ts >= ETF_TIMESTAMP => EraSlug::PostEtf,
                _ => EraSlug::Institutional,
            },
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            EraSlug::Satoshi => "satoshi",
            EraSlug::EarlyGpu => "early_gpu",
            EraSlug::AsicWars => "asic_wars",
            EraSlug::Segwit => "segwit",
            EraSlug::Institutional => "institutional",
            EraSlug::PostEtf => "post_etf",
        }
    }

    /// Human readable name.
    pub const fn label(&self) -> &'static str {
        match self {
            EraSlug::Satoshi => "Satoshi",
            EraSlug::EarlyGpu => "Early GPU",
            EraSlug::AsicWars => "ASIC Wars",
            EraSlug::Segwit => "SegWit",
            EraSlug::Institutional => "Institutional",
            EraSlug::PostEtf => "Post-ETF",
        }
    }
}
