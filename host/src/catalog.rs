//! Append-only NDJSON catalog of every signal ever derived.
//!
//! The file is the only source of truth: the set of known content keys is
//! rebuilt by replaying it on every append, under an exclusive lock on a
//! sidecar `<catalog>.lock` file so concurrent scanners never write the same
//! block twice.

use std::{
    collections::{BTreeMap, HashSet},
    ffi::OsString,
    fs::{File, OpenOptions},
    io::{BufRead, BufReader, ErrorKind, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chainwalk_core::{signal::content_key, EraSlug, Signal};
use fs2::FileExt;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info, warn};

/// One catalog line: the signal plus its coarse era.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    #[serde(flatten)]
    pub signal: Signal,
    #[serde(default)]
    pub era_slug: Option<EraSlug>,
}

impl CatalogEntry {
    pub fn new(signal: Signal) -> Self {
        let era_slug = EraSlug::derive(signal.height, Some(signal.timestamp));
        CatalogEntry {
            signal,
            era_slug: Some(era_slug),
        }
    }

    pub fn content_key(&self) -> String {
        self.signal.content_key()
    }
}

/// The only fields the content key depends on. Records written by older
/// tools that no longer fit [`Signal`] still dedup through this.
#[derive(Debug, Deserialize)]
struct KeyFields {
    height: u64,
    #[serde(default)]
    sample_hex: Option<String>,
}

impl KeyFields {
    fn content_key(&self) -> String {
        content_key(self.height, self.sample_hex.as_deref().unwrap_or_default())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogStats {
    pub records: usize,
    pub skipped_lines: usize,
    pub min_height: Option<u64>,
    pub max_height: Option<u64>,
    pub polyphonic: usize,
    pub per_era: BTreeMap<EraSlug, usize>,
}

/// Result of replaying the file.
struct Replay<T> {
    records: Vec<T>,
    skipped_lines: usize,
}

#[derive(Debug, Clone)]
pub struct CatalogStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl CatalogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut lock_name = path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("catalog"));
        lock_name.push(".lock");
        let lock_path = path.with_file_name(lock_name);
        CatalogStore { path, lock_path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends the signals whose content key is not yet in the catalog and
    /// returns how many were written.
    pub fn append(&self, signals: &[Signal]) -> Result<usize> {
        if signals.is_empty() {
            return Ok(0);
        }

        let _lock = self.lock()?;
        let mut known: HashSet<String> = self
            .replay::<KeyFields>()?
            .records
            .iter()
            .map(KeyFields::content_key)
            .collect();

        let mut file = OpenOptions::new()
            .read(true)
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open catalog {}", self.path.display()))?;
        self.terminate_torn_tail(&mut file)?;

        let mut written = 0;
        for signal in signals {
            let key = signal.content_key();
            if !known.insert(key) {
                debug!(height = signal.height, "already cataloged");
                continue;
            }
            let line = serde_json::to_string(&CatalogEntry::new(signal.clone()))
                .context("failed to serialize catalog entry")?;
            writeln!(file, "{line}")
                .with_context(|| format!("failed to append to {}", self.path.display()))?;
            written += 1;
        }

        file.flush()?;
        file.sync_all()
            .with_context(|| format!("failed to sync {}", self.path.display()))?;

        info!(
            "catalog: {} new of {} signals ({})",
            written,
            signals.len(),
            self.path.display()
        );
        Ok(written)
    }

    /// Every parsable record, in file order.
    pub fn scan(&self) -> Result<Vec<CatalogEntry>> {
        Ok(self.replay::<CatalogEntry>()?.records)
    }

    pub fn stats(&self) -> Result<CatalogStats> {
        let replay = self.replay::<CatalogEntry>()?;
        let mut stats = CatalogStats {
            skipped_lines: replay.skipped_lines,
            ..Default::default()
        };
        for entry in &replay.records {
            let signal = &entry.signal;
            stats.records += 1;
            stats.min_height = Some(stats.min_height.map_or(signal.height, |h| h.min(signal.height)));
            stats.max_height = Some(stats.max_height.map_or(signal.height, |h| h.max(signal.height)));
            if signal.polyphonic {
                stats.polyphonic += 1;
            }
            let slug = entry
                .era_slug
                .unwrap_or_else(|| EraSlug::derive(signal.height, Some(signal.timestamp)));
            *stats.per_era.entry(slug).or_default() += 1;
        }
        Ok(stats)
    }

    fn lock(&self) -> Result<File> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)
            .with_context(|| format!("failed to open lock file {}", self.lock_path.display()))?;
        file.lock_exclusive()
            .with_context(|| format!("failed to lock {}", self.lock_path.display()))?;
        Ok(file)
    }

    /// A write cut short leaves a line without its newline. Closing it keeps
    /// the next record on a line of its own.
    fn terminate_torn_tail(&self, file: &mut File) -> Result<()> {
        let len = file.metadata()?.len();
        if len == 0 {
            return Ok(());
        }
        let mut last = [0u8; 1];
        file.seek(SeekFrom::Start(len - 1))?;
        file.read_exact(&mut last)?;
        if last[0] != b'\n' {
            warn!("catalog {} ends mid-line, closing it", self.path.display());
            file.write_all(b"\n")
                .with_context(|| format!("failed to repair {}", self.path.display()))?;
        }
        Ok(())
    }

    fn replay<T: DeserializeOwned>(&self) -> Result<Replay<T>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Ok(Replay {
                    records: Vec::new(),
                    skipped_lines: 0,
                })
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to open catalog {}", self.path.display()))
            }
        };

        let mut records = Vec::new();
        let mut skipped_lines = 0;
        // Split on raw bytes: a torn line may end inside a UTF-8 sequence.
        for (index, line) in BufReader::new(file).split(b'\n').enumerate() {
            let line = line.with_context(|| format!("failed to read {}", self.path.display()))?;
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match serde_json::from_slice::<T>(&line) {
                Ok(record) => records.push(record),
                Err(err) => {
                    skipped_lines += 1;
                    warn!("skipping catalog line {}: {}", index + 1, err);
                }
            }
        }
        Ok(Replay {
            records,
            skipped_lines,
        })
    }
}
