use std::{io::Write, path::Path};

use anyhow::{Context, Result};
use chainwalk_core::Signal;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::source::NetworkStats;

pub const LIVE_ENGINE: &str = "chainwalk-live";

/// The document a live cycle leaves behind for downstream readers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveSnapshot {
    pub engine: String,
    pub tip_height: u64,
    pub window_size: u64,
    pub signal_count: usize,
    pub polyphonic_count: usize,
    pub signals: Vec<Signal>,
    /// UTC, RFC 3339.
    pub generated_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkStats>,
}

impl LiveSnapshot {
    pub fn new(
        tip_height: u64,
        window_size: u64,
        signals: Vec<Signal>,
        network: Option<NetworkStats>,
    ) -> Self {
        LiveSnapshot {
            engine: LIVE_ENGINE.to_string(),
            tip_height,
            window_size,
            signal_count: signals.len(),
            polyphonic_count: signals.iter().filter(|s| s.polyphonic).count(),
            signals,
            generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            network,
        }
    }
}

/// Writes `value` as pretty JSON to a temp file next to `path` and renames it
/// into place, so readers only ever see a complete document.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
    serde_json::to_writer_pretty(&mut tmp, value).context("failed to serialize json")?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}
