//! Resumable historical scan from the start of the chain (or the prune
//! height) up to the block just below the live window.
//!
//! Progress lives in a small JSON state file that is rewritten atomically
//! after every chunk, so a killed process resumes at the next unprocessed
//! height. Re-processing a chunk is harmless because the catalog deduplicates.

use std::{fs, io::ErrorKind, path::PathBuf};

use anyhow::{Context, Result};
use chainwalk_core::detect_signals;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::{
    catalog::CatalogStore,
    config::Config,
    error::SourceError,
    shutdown::Shutdown,
    snapshot::write_json_atomic,
    source::{BlockSource, ChainInfo},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillState {
    pub last_processed_height: u64,
}

/// Owns the state file. Saved heights never go backwards.
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        StateFile { path: path.into() }
    }

    /// A missing file means nothing was processed yet. An unreadable one is
    /// treated the same way, with a warning.
    pub fn load(&self) -> Result<BackfillState> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(BackfillState::default()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read {}", self.path.display()))
            }
        };
        match serde_json::from_str(&raw) {
            Ok(state) => Ok(state),
            Err(err) => {
                warn!(
                    "ignoring unreadable backfill state {}: {}",
                    self.path.display(),
                    err
                );
                Ok(BackfillState::default())
            }
        }
    }

    /// Returns `false` without writing when `state` is behind what is on disk.
    pub fn save(&self, state: BackfillState) -> Result<bool> {
        let current = self.load()?;
        if state.last_processed_height < current.last_processed_height {
            warn!(
                "refusing to move backfill state back from {} to {}",
                current.last_processed_height, state.last_processed_height
            );
            return Ok(false);
        }
        write_json_atomic(&self.path, &state)?;
        Ok(true)
    }
}

/// Height bounds of one backfill run, fixed from the chain state seen at
/// start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackfillPlan {
    pub live_window_start: u64,
    pub max_backfill_height: u64,
    pub effective_start: u64,
    pub chunk_size: u64,
}

impl BackfillPlan {
    pub fn from_chain(chain: &ChainInfo, config: &Config) -> Self {
        let live_window_start = chain
            .tip_height
            .saturating_sub(config.window_size.saturating_sub(1))
            .max(1);
        let prune_floor = if chain.pruned {
            chain.prune_height.unwrap_or(0)
        } else {
            0
        };
        BackfillPlan {
            live_window_start,
            max_backfill_height: live_window_start - 1,
            effective_start: config.backfill_start_height.max(prune_floor).max(1),
            chunk_size: config.backfill_chunk_size.max(1),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.effective_start > self.max_backfill_height
    }

    /// Next inclusive chunk after `last_processed`, or `None` once done.
    pub fn next_chunk(&self, last_processed: u64) -> Option<(u64, u64)> {
        if self.is_empty() || last_processed >= self.max_backfill_height {
            return None;
        }
        let start = self.effective_start.max(last_processed + 1);
        let end = start
            .saturating_add(self.chunk_size - 1)
            .min(self.max_backfill_height);
        Some((start, end))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillOutcome {
    NothingToDo,
    Completed {
        last_processed_height: u64,
        new_records: usize,
    },
    Cancelled {
        last_processed_height: u64,
    },
}

pub struct BackfillCoordinator<'a, S: BlockSource> {
    source: &'a S,
    config: &'a Config,
    catalog: CatalogStore,
    state_file: StateFile,
}

impl<'a, S: BlockSource> BackfillCoordinator<'a, S> {
    pub fn new(source: &'a S, config: &'a Config) -> Self {
        BackfillCoordinator {
            source,
            config,
            catalog: CatalogStore::new(&config.catalog_path),
            state_file: StateFile::new(&config.backfill_state_path),
        }
    }

    pub fn run(&self, shutdown: &Shutdown) -> Result<BackfillOutcome> {
        let chain = self
            .source
            .chain_info()
            .context("failed to read chain info")?;
        let plan = BackfillPlan::from_chain(&chain, self.config);
        if plan.is_empty() {
            info!(
                "nothing to backfill: start {} is above {} (tip {})",
                plan.effective_start, plan.max_backfill_height, chain.tip_height
            );
            return Ok(BackfillOutcome::NothingToDo);
        }
        if chain.pruned {
            info!("pruned node, backfill starts at {}", plan.effective_start);
        }

        let mut state = self.state_file.load()?;
        let mut new_records = 0;
        info!(
            "backfill {}..={} resuming after {}",
            plan.effective_start, plan.max_backfill_height, state.last_processed_height
        );

        while let Some((start, end)) = plan.next_chunk(state.last_processed_height) {
            if shutdown.is_triggered() {
                return self.cancel(state);
            }

            let blocks = match self.source.fetch_block_range(start, end, shutdown) {
                Ok(blocks) => blocks,
                Err(SourceError::Cancelled) => return self.cancel(state),
                Err(err) => {
                    error!("chunk {}..={} failed, will retry: {}", start, end, err);
                    if !shutdown.sleep(self.config.backfill_sleep) {
                        return self.cancel(state);
                    }
                    continue;
                }
            };

            if blocks.is_empty() {
                warn!("chunk {}..={} returned no blocks, skipping", start, end);
            } else {
                let (signals, _) = detect_signals(&blocks);
                let written = self.catalog.append(&signals)?;
                new_records += written;
                info!(
                    "chunk {}..={}: {} blocks, {} new records",
                    start,
                    end,
                    blocks.len(),
                    written
                );
            }

            state.last_processed_height = end;
            self.state_file.save(state)?;

            let more = end < plan.max_backfill_height;
            if more && !blocks.is_empty() && !shutdown.sleep(self.config.backfill_sleep) {
                return self.cancel(state);
            }
        }

        info!(
            "backfill complete at {} ({} new records)",
            state.last_processed_height, new_records
        );
        Ok(BackfillOutcome::Completed {
            last_processed_height: state.last_processed_height,
            new_records,
        })
    }

    fn cancel(&self, state: BackfillState) -> Result<BackfillOutcome> {
        self.state_file.save(state)?;
        warn!(
            "backfill cancelled after height {}",
            state.last_processed_height
        );
        Ok(BackfillOutcome::Cancelled {
            last_processed_height: state.last_processed_height,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};

    use crate::source::mock::MockSource;

    fn test_config(dir: &TempDir, window: u64, chunk: u64) -> Result<Config> {
        let root = dir.path().to_path_buf();
        Config::from_lookup(move |key| {
            let value = match key {
                "CHAINWALK_WINDOW_SIZE" => window.to_string(),
                "CHAINWALK_BACKFILL_CHUNK_SIZE" => chunk.to_string(),
                "CHAINWALK_BACKFILL_SLEEP_SECS" => "0".to_string(),
                "CHAINWALK_CATALOG_PATH" => root.join("catalog.jsonl").display().to_string(),
                "CHAINWALK_BACKFILL_STATE_PATH" => root.join("state.json").display().to_string(),
                _ => return None,
            };
            Some(value)
        })
    }

    fn chain(tip_height: u64) -> ChainInfo {
        ChainInfo {
            tip_height,
            pruned: false,
            prune_height: None,
        }
    }

    #[test]
    fn test_single_chunk_below_live_window() -> Result<(), anyhow::Error> {
        let dir = tempdir()?;
        let config = test_config(&dir, 500, 500)?;
        let plan = BackfillPlan::from_chain(&chain(1000), &config);
        assert_eq!(plan.live_window_start, 501);
        assert_eq!(plan.max_backfill_height, 500);
        assert_eq!(plan.effective_start, 1);

        let source = MockSource::new(1000);
        let outcome = BackfillCoordinator::new(&source, &config).run(&Shutdown::new())?;
        assert_eq!(
            outcome,
            BackfillOutcome::Completed {
                last_processed_height: 500,
                new_records: 500
            }
        );
        assert_eq!(source.calls(), vec![(1, 500)]);
        assert_eq!(StateFile::new(&config.backfill_state_path).load()?.last_processed_height, 500);
        Ok(())
    }

    #[test]
    fn test_pruned_node_starts_at_prune_height() -> Result<(), anyhow::Error> {
        let dir = tempdir()?;
        let config = test_config(&dir, 500, 500)?;
        let pruned = ChainInfo {
            tip_height: 850_000,
            pruned: true,
            prune_height: Some(300_000),
        };
        let plan = BackfillPlan::from_chain(&pruned, &config);
        assert_eq!(plan.effective_start, 300_000);
        assert_eq!(plan.next_chunk(0), Some((300_000, 300_499)));
        assert_eq!(plan.next_chunk(300_499), Some((300_500, 300_999)));

        // A prune height is ignored unless the node reports pruning.
        let unpruned = ChainInfo {
            pruned: false,
            ..pruned
        };
        assert_eq!(BackfillPlan::from_chain(&unpruned, &config).effective_start, 1);
        Ok(())
    }

    #[test]
    fn test_chunks_never_cross_ceiling() -> Result<(), anyhow::Error> {
        let dir = tempdir()?;
        let config = test_config(&dir, 10, 300)?;
        let plan = BackfillPlan::from_chain(&chain(1000), &config);
        assert_eq!(plan.max_backfill_height, 990);
        assert_eq!(plan.next_chunk(0), Some((1, 300)));
        assert_eq!(plan.next_chunk(900), Some((901, 990)));
        assert_eq!(plan.next_chunk(990), None);
        assert_eq!(plan.next_chunk(5_000), None);
        Ok(())
    }

    #[test]
    fn test_nothing_to_do() -> Result<(), anyhow::Error> {
        let dir = tempdir()?;
        let config = test_config(&dir, 500, 500)?;
        let source = MockSource::new(400);
        let outcome = BackfillCoordinator::new(&source, &config).run(&Shutdown::new())?;
        assert_eq!(outcome, BackfillOutcome::NothingToDo);
        assert!(source.calls().is_empty());
        assert!(!config.backfill_state_path.exists());

        let mut late_start = config.clone();
        late_start.backfill_start_height = 600;
        let source = MockSource::new(1000);
        let outcome = BackfillCoordinator::new(&source, &late_start).run(&Shutdown::new())?;
        assert_eq!(outcome, BackfillOutcome::NothingToDo);
        Ok(())
    }

    #[test]
    fn test_resumes_after_last_processed() -> Result<(), anyhow::Error> {
        let dir = tempdir()?;
        let config = test_config(&dir, 500, 500)?;
        StateFile::new(&config.backfill_state_path).save(BackfillState {
            last_processed_height: 250,
        })?;

        let source = MockSource::new(1000);
        let outcome = BackfillCoordinator::new(&source, &config).run(&Shutdown::new())?;
        assert_eq!(source.calls(), vec![(251, 500)]);
        assert_eq!(
            outcome,
            BackfillOutcome::Completed {
                last_processed_height: 500,
                new_records: 250
            }
        );
        Ok(())
    }

    #[test]
    fn test_unavailable_chunk_is_retried() -> Result<(), anyhow::Error> {
        let dir = tempdir()?;
        let config = test_config(&dir, 500, 250)?;
        let source = MockSource::new(1000);
        source.failures.borrow_mut().extend([false, true, true]);

        let outcome = BackfillCoordinator::new(&source, &config).run(&Shutdown::new())?;
        assert_eq!(
            source.calls(),
            vec![(1, 250), (251, 500), (251, 500), (251, 500)]
        );
        assert!(matches!(
            outcome,
            BackfillOutcome::Completed {
                last_processed_height: 500,
                ..
            }
        ));
        Ok(())
    }

    #[test]
    fn test_empty_chunk_advances_state() -> Result<(), anyhow::Error> {
        let dir = tempdir()?;
        let config = test_config(&dir, 500, 250)?;
        let mut source = MockSource::new(1000);
        source.missing.extend(1..=250);

        let outcome = BackfillCoordinator::new(&source, &config).run(&Shutdown::new())?;
        assert_eq!(source.calls(), vec![(1, 250), (251, 500)]);
        assert_eq!(
            outcome,
            BackfillOutcome::Completed {
                last_processed_height: 500,
                new_records: 250
            }
        );
        Ok(())
    }

    #[test]
    fn test_cancellation_persists_progress() -> Result<(), anyhow::Error> {
        let dir = tempdir()?;
        let config = test_config(&dir, 500, 100)?;
        let shutdown = Shutdown::new();
        let source = MockSource::new(1000);
        source.cancel_after.set(Some((2, shutdown.clone())));

        let outcome = BackfillCoordinator::new(&source, &config).run(&shutdown)?;
        assert_eq!(
            outcome,
            BackfillOutcome::Cancelled {
                last_processed_height: 100
            }
        );
        let state_file = StateFile::new(&config.backfill_state_path);
        assert_eq!(state_file.load()?.last_processed_height, 100);

        // A fresh run picks up at the next height.
        let source = MockSource::new(1000);
        BackfillCoordinator::new(&source, &config).run(&Shutdown::new())?;
        assert_eq!(source.calls().first(), Some(&(101, 200)));
        assert_eq!(state_file.load()?.last_processed_height, 500);
        Ok(())
    }

    #[test]
    fn test_state_never_moves_backwards() -> Result<(), anyhow::Error> {
        let dir = tempdir()?;
        let state_file = StateFile::new(dir.path().join("state.json"));
        assert_eq!(state_file.load()?, BackfillState::default());
        assert!(state_file.save(BackfillState {
            last_processed_height: 700
        })?);
        assert!(!state_file.save(BackfillState {
            last_processed_height: 699
        })?);
        assert_eq!(state_file.load()?.last_processed_height, 700);

        std::fs::write(dir.path().join("state.json"), "not json")?;
        assert_eq!(state_file.load()?, BackfillState::default());
        Ok(())
    }
}
