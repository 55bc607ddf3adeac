use crate::config::StoreConfig;
use crate::models::{CacheKey, ListingRecord};
use anyhow::{Context, Result};
use chrono::Local;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Rows currently in the durable file plus their keys
#[derive(Debug, Default, Clone)]
pub struct Snapshot {
    pub rows: Vec<ListingRecord>,
    pub keys: HashSet<CacheKey>,
}

impl Snapshot {
    pub fn from_rows(rows: Vec<ListingRecord>) -> Self {
        let keys = rows.iter().filter_map(|r| r.cache_key.clone()).collect();
        Self { rows, keys }
    }
}

/// Identities already persisted plus those produced during this run.
#[derive(Debug, Default)]
pub struct SeenSet {
    persisted: HashSet<CacheKey>,
    in_run: HashSet<CacheKey>,
}

impl SeenSet {
    pub fn new(persisted: HashSet<CacheKey>) -> Self {
        Self {
            persisted,
            in_run: HashSet::new(),
        }
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.persisted.contains(key) || self.in_run.contains(key)
    }

    /// Returns `false` if the key was already seen
    pub fn insert(&mut self, key: CacheKey) -> bool {
        if self.persisted.contains(&key) {
            return false;
        }
        self.in_run.insert(key)
    }

    /// Swap in the keys reloaded after a flush; in-run keys stay.
    pub fn reload(&mut self, persisted: HashSet<CacheKey>) {
        self.persisted = persisted;
    }

    pub fn len(&self) -> usize {
        self.persisted.union(&self.in_run).count()
    }
}

/// Concatenate and keep the first row per cache key.
///
/// Existing rows come first so they win over freshly scraped duplicates.
/// Rows without a key are kept as they are.
pub fn merge_records(existing: &[ListingRecord], new: &[ListingRecord]) -> Vec<ListingRecord> {
    let mut seen = HashSet::new();
    existing
        .iter()
        .chain(new.iter())
        .filter(|row| match &row.cache_key {
            Some(key) => seen.insert(key.clone()),
            None => true,
        })
        .cloned()
        .collect()
}

/// CSV-backed store of scraped listings
#[derive(Debug, Clone)]
pub struct CsvStore {
    path: PathBuf,
    backup_prefix: String,
}

impl CsvStore {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            path: config.path.clone(),
            backup_prefix: config.backup_prefix.clone(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the durable file. A missing or unreadable file yields an empty
    /// snapshot so the run can still proceed.
    pub fn load(&self) -> Snapshot {
        if !self.path.exists() {
            info!("📝 No existing cache found at {}, starting fresh", self.path.display());
            return Snapshot::default();
        }

        match self.read_rows() {
            Ok(rows) => {
                info!("✅ Loaded existing cache: {} listings", rows.len());
                Snapshot::from_rows(rows)
            }
            Err(e) => {
                warn!("⚠️ Error loading cache {}: {:#}", self.path.display(), e);
                Snapshot::default()
            }
        }
    }

    /// Rows that fail to parse are logged and left out.
    fn read_rows(&self) -> Result<Vec<ListingRecord>> {
        let mut reader = csv::Reader::from_path(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;

        let mut rows = Vec::new();
        for (i, row) in reader.deserialize::<ListingRecord>().enumerate() {
            match row {
                Ok(row) => rows.push(row),
                // Line numbers count the header
                Err(e) => warn!("⚠️ Skipping unreadable cache row {}: {}", i + 2, e),
            }
        }
        Ok(rows)
    }

    /// Copy the durable file to a timestamped sibling, if it exists.
    pub fn backup(&self) -> Result<Option<PathBuf>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let file_name = format!("{}_{}.csv", self.backup_prefix, timestamp);
        let backup = match self.path.parent() {
            Some(dir) => dir.join(file_name),
            None => PathBuf::from(file_name),
        };

        fs::copy(&self.path, &backup)
            .with_context(|| format!("Failed to back up {}", self.path.display()))?;
        info!("💾 Backup created: {}", backup.display());
        Ok(Some(backup))
    }

    /// Overwrite the durable file with `rows`.
    ///
    /// Writes a temporary sibling first and renames it over the target.
    pub fn flush(&self, rows: &[ListingRecord]) -> Result<()> {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        {
            let mut writer = csv::Writer::from_path(&tmp)
                .with_context(|| format!("Failed to create {}", tmp.display()))?;
            for row in rows {
                writer.serialize(row).context("Failed to write listing")?;
            }
            writer.flush().context("Failed to flush listings")?;
        }

        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }

    /// Back up, merge `pending` into `existing`, write, and reload.
    ///
    /// Records without a cache key are left out; they cannot be deduplicated.
    pub fn checkpoint(&self, existing: &Snapshot, pending: &[ListingRecord]) -> Result<Snapshot> {
        let keyed: Vec<ListingRecord> = pending
            .iter()
            .filter(|r| {
                if r.cache_key.is_none() {
                    warn!("⚠️ Not persisting listing without cache key: {:?}", r.title);
                }
                r.cache_key.is_some()
            })
            .cloned()
            .collect();

        self.backup()?;
        let merged = merge_records(&existing.rows, &keyed);
        self.flush(&merged)?;

        info!("💾 DATA SAVED TO {}", self.path.display());
        info!(
            "📊 {} old + {} new = {} total listings",
            existing.rows.len(),
            keyed.len(),
            merged.len()
        );

        Ok(self.load())
    }
}
