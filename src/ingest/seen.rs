// src/ingest/seen.rs
//! Cross-run cache of post keys that were already delivered.
//!
//! Reads take a shared lock, so the cache can be consulted while adapters are still
//! collecting. New keys are written back once per run with `commit`, which swaps the
//! on-disk file atomically (temp file + rename).

use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use anyhow::{Context, Result};

use crate::ingest::types::{ItemKey, RawRecord};

#[derive(Debug)]
pub struct SeenCache {
    path: Option<PathBuf>,
    keys: RwLock<BTreeSet<ItemKey>>,
}

impl SeenCache {
    /// Purely in-memory cache (tests, single-process runs).
    pub fn in_memory() -> Self {
        Self {
            path: None,
            keys: RwLock::new(BTreeSet::new()),
        }
    }

    /// Load from `path`; a missing file starts an empty cache.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let keys = if path.exists() {
            let data = fs::read_to_string(&path)
                .with_context(|| format!("reading seen cache {}", path.display()))?;
            serde_json::from_str::<BTreeSet<ItemKey>>(&data)
                .with_context(|| format!("parsing seen cache {}", path.display()))?
        } else {
            BTreeSet::new()
        };
        Ok(Self {
            path: Some(path),
            keys: RwLock::new(keys),
        })
    }

    pub fn contains(&self, key: &ItemKey) -> bool {
        self.keys
            .read()
            .map(|g| g.contains(key))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.keys.read().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop records whose key was delivered by an earlier run.
    /// Returns the remaining records and how many were removed.
    pub fn filter_unseen(&self, records: Vec<RawRecord>) -> (Vec<RawRecord>, usize) {
        let Ok(guard) = self.keys.read() else {
            return (records, 0);
        };
        let before = records.len();
        let kept: Vec<RawRecord> = records
            .into_iter()
            .filter(|r| !guard.contains(&ItemKey::new(&r.platform, &r.post_id)))
            .collect();
        let removed = before - kept.len();
        (kept, removed)
    }

    /// Single write-back at run end.
    pub fn commit<I>(&self, new_keys: I) -> Result<()>
    where
        I: IntoIterator<Item = ItemKey>,
    {
        let mut guard = self
            .keys
            .write()
            .map_err(|_| anyhow::anyhow!("seen cache lock poisoned"))?;
        guard.extend(new_keys);
        if let Some(path) = &self.path {
            write_atomic(path, &serde_json::to_string(&*guard)?)?;
        }
        Ok(())
    }
}

fn write_atomic(path: &Path, body: &str) -> Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
    }
    let tmp = path.with_extension("json.tmp");
    let mut f = fs::File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?;
    f.write_all(body.as_bytes())?;
    f.sync_all()?;
    fs::rename(&tmp, path).with_context(|| format!("renaming into {}", path.display()))?;
    Ok(())
}
