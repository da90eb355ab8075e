use std::{path::Path, process::Command};

use anyhow::{bail, Context, Result};
use chainwalk_core::detect_signals;
use tracing::{error, info, warn};

use crate::{
    catalog::CatalogStore,
    config::Config,
    shutdown::Shutdown,
    snapshot::{write_json_atomic, LiveSnapshot},
    source::BlockSource,
};

/// Called after every cycle that wrote a snapshot. Failures never fail the
/// cycle.
pub trait CycleHook {
    fn after_cycle(&self, snapshot_path: &Path) -> Result<()>;
}

/// Runs a shell command, passing the snapshot location in
/// `CHAINWALK_SNAPSHOT_PATH`.
pub struct CommandHook {
    command: String,
}

impl CommandHook {
    pub fn new(command: impl Into<String>) -> Self {
        CommandHook {
            command: command.into(),
        }
    }
}

impl CycleHook for CommandHook {
    fn after_cycle(&self, snapshot_path: &Path) -> Result<()> {
        let status = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .env("CHAINWALK_SNAPSHOT_PATH", snapshot_path)
            .status()
            .with_context(|| format!("failed to spawn `{}`", self.command))?;
        if !status.success() {
            bail!("`{}` exited with {}", self.command, status);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The window held no heights; nothing was written.
    EmptyWindow { tip_height: u64 },
    Scanned {
        tip_height: u64,
        start: u64,
        end: u64,
        signals: usize,
        polyphonic: usize,
        new_records: usize,
    },
}

/// `[max(min_height, tip - window + 1), tip]`, or `None` when empty.
pub fn live_window(tip_height: u64, window_size: u64, min_height: u64) -> Option<(u64, u64)> {
    let start = tip_height
        .saturating_sub(window_size.saturating_sub(1))
        .max(min_height);
    (start <= tip_height).then_some((start, tip_height))
}

pub struct LiveScanner<'a, S: BlockSource> {
    source: &'a S,
    config: &'a Config,
    catalog: CatalogStore,
    hook: Option<Box<dyn CycleHook + 'a>>,
}

impl<'a, S: BlockSource> LiveScanner<'a, S> {
    pub fn new(source: &'a S, config: &'a Config) -> Self {
        let hook = config
            .post_cycle_cmd
            .as_ref()
            .map(|cmd| Box::new(CommandHook::new(cmd.clone())) as Box<dyn CycleHook + 'a>);
        LiveScanner {
            source,
            config,
            catalog: CatalogStore::new(&config.catalog_path),
            hook,
        }
    }

    pub fn with_hook(mut self, hook: Box<dyn CycleHook + 'a>) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn run_cycle(&self, shutdown: &Shutdown) -> Result<CycleOutcome> {
        let tip_height = self
            .source
            .tip_height()
            .context("failed to read chain tip")?;
        let Some((start, end)) =
            live_window(tip_height, self.config.window_size, self.config.min_height)
        else {
            warn!("live window is empty at tip {}", tip_height);
            return Ok(CycleOutcome::EmptyWindow { tip_height });
        };

        info!("live scan of blocks {}..={} (tip {})", start, end, tip_height);
        let blocks = self
            .source
            .fetch_block_range(start, end, shutdown)
            .with_context(|| format!("failed to fetch blocks {start}..={end}"))?;
        if blocks.is_empty() {
            warn!("no blocks returned for {}..={}", start, end);
            return Ok(CycleOutcome::EmptyWindow { tip_height });
        }

        let (signals, _) = detect_signals(&blocks);
        let network = self.source.network_stats();
        let snapshot = LiveSnapshot::new(tip_height, self.config.window_size, signals, network);
        let polyphonic = snapshot.polyphonic_count;

        let snapshot_written = match write_json_atomic(&self.config.snapshot_path, &snapshot) {
            Ok(()) => true,
            Err(err) => {
                error!("failed to write live snapshot: {:#}", err);
                false
            }
        };

        let new_records = self.catalog.append(&snapshot.signals)?;

        if snapshot_written {
            if let Some(hook) = &self.hook {
                if let Err(err) = hook.after_cycle(&self.config.snapshot_path) {
                    warn!("post-cycle hook failed: {:#}", err);
                }
            }
        }

        info!(
            "live cycle done: {} signals, {} polyphonic, {} new catalog records",
            snapshot.signal_count, polyphonic, new_records
        );
        Ok(CycleOutcome::Scanned {
            tip_height,
            start,
            end,
            signals: snapshot.signal_count,
            polyphonic,
            new_records,
        })
    }
}
