// src/bot/autosave.rs - Dirty-tracked keyed store flushed to a line-oriented text file

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::fs;
use tokio::time::Duration;

use crate::bot::scheduler::{PeriodicTask, TaskScheduler};

/// How often registered stores are flushed
pub const AUTOSAVE_INTERVAL: Duration = Duration::from_secs(300);

/// A value that can be stored as one line of a human-editable text file
pub trait Record: Clone + Send + Sync + 'static {
    fn encode(key: &str, value: &Self) -> String;

    fn decode(line: &str) -> Option<(String, Self)>;
}

/// Plain key sets: one key per line
impl Record for () {
    fn encode(key: &str, _value: &Self) -> String {
        key.to_string()
    }

    fn decode(line: &str) -> Option<(String, Self)> {
        let key = line.trim();
        if key.is_empty() {
            None
        } else {
            Some((key.to_string(), ()))
        }
    }
}

struct StoreState<V> {
    entries: BTreeMap<String, V>,
    dirty: bool,
}

/// Thread-safe keyed collection with deferred persistence.
///
/// Every mutation marks the store dirty; `save` writes a snapshot only when dirty.
/// The snapshot is taken under the lock and written without it, so writers on other
/// tasks never wait on file I/O. Writes that land during a flush keep the store dirty
/// for the next cycle.
pub struct AutosaveStore<V: Record> {
    name: String,
    path: PathBuf,
    state: Mutex<StoreState<V>>,
    generation: AtomicU64,
    loaded: AtomicBool,
    /// The backing file exists but could not be read; saves go to the recovery file
    load_failed: AtomicBool,
}

impl<V: Record> AutosaveStore<V> {
    /// Create an empty store that is neither loaded from disk nor scheduled
    pub fn new(name: &str, path: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self::build(name, path.into(), true))
    }

    /// Create a store, register it with the scheduler and start loading it in the background
    pub fn open(name: &str, path: impl Into<PathBuf>, scheduler: &TaskScheduler) -> Arc<Self> {
        let store = Arc::new(Self::build(name, path.into(), false));
        scheduler.add(store.clone());

        let loader = store.clone();
        tokio::spawn(async move {
            match loader.load().await {
                Ok(count) => info!(target: "autosave", "Loaded {} entries into '{}'", count, loader.name),
                Err(e) => error!(target: "autosave", "Failed to load '{}': {:#}", loader.name, e),
            }
        });

        store
    }

    fn build(name: &str, path: PathBuf, loaded: bool) -> Self {
        Self {
            name: name.to_string(),
            path,
            state: Mutex::new(StoreState {
                entries: BTreeMap::new(),
                dirty: false,
            }),
            generation: AtomicU64::new(0),
            loaded: AtomicBool::new(loaded),
            load_failed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.state.lock().entries.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state.lock().entries.contains_key(key)
    }

    /// Insert or replace an entry, returning the previous value
    pub fn set(&self, key: &str, value: V) -> Option<V> {
        let previous = {
            let mut state = self.state.lock();
            state.dirty = true;
            state.entries.insert(key.to_string(), value)
        };
        self.bump();
        previous
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        let removed = {
            let mut state = self.state.lock();
            let removed = state.entries.remove(key);
            if removed.is_some() {
                state.dirty = true;
            }
            removed
        };
        if removed.is_some() {
            self.bump();
        }
        removed
    }

    pub fn keys(&self) -> Vec<String> {
        self.state.lock().entries.keys().cloned().collect()
    }

    pub fn entries(&self) -> Vec<(String, V)> {
        self.state
            .lock()
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_dirty(&self) -> bool {
        self.state.lock().dirty
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    /// Changes on every mutation and after loading; lets readers cache derived data
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn bump(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Where saves go when the backing file could not be read
    pub fn recovery_path(&self) -> PathBuf {
        self.path.with_extension("recovered")
    }

    /// Merge the backing file into memory. Entries written before the load finished win.
    /// Lines that are not valid UTF-8 or do not decode are skipped with a warning.
    pub async fn load(&self) -> Result<usize> {
        let content = match fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(target: "autosave", "No file for '{}' at {}", self.name, self.path.display());
                self.loaded.store(true, Ordering::SeqCst);
                return Ok(0);
            }
            Err(e) => {
                self.load_failed.store(true, Ordering::SeqCst);
                error!(
                    target: "autosave",
                    "Cannot read '{}' from {}, changes will be saved to {}: {}",
                    self.name, self.path.display(), self.recovery_path().display(), e
                );
                return Err(e).with_context(|| format!("Failed to read {}", self.path.display()));
            }
        };

        let mut count = 0;
        {
            let mut state = self.state.lock();
            for (number, bytes) in content.split(|b| *b == b'\n').enumerate() {
                let line = match std::str::from_utf8(bytes) {
                    Ok(line) => line.trim_end_matches('\r'),
                    Err(_) => {
                        warn!(
                            target: "autosave",
                            "Skipping line {} in {}: not valid UTF-8", number + 1, self.path.display()
                        );
                        continue;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match V::decode(line) {
                    Some((key, value)) => {
                        state.entries.entry(key).or_insert(value);
                        count += 1;
                    }
                    None => warn!(
                        target: "autosave",
                        "Skipping malformed line {} in {}", number + 1, self.path.display()
                    ),
                }
            }
        }

        self.loaded.store(true, Ordering::SeqCst);
        self.bump();
        Ok(count)
    }

    /// Write the store to disk if anything changed since the last save.
    /// Returns whether a write happened.
    ///
    /// The snapshot is a clone of the map taken under the lock, which costs O(n) while
    /// held but leaves the live map untouched for readers during the write.
    pub async fn save(&self) -> Result<bool> {
        let target = if self.is_loaded() {
            self.path.clone()
        } else if self.load_failed.load(Ordering::SeqCst) {
            self.recovery_path()
        } else {
            debug!(target: "autosave", "'{}' not loaded yet, deferring save", self.name);
            return Ok(false);
        };

        let snapshot = {
            let mut state = self.state.lock();
            if !state.dirty {
                return Ok(false);
            }
            state.dirty = false;
            state.entries.clone()
        };

        let mut body = String::new();
        for (key, value) in &snapshot {
            body.push_str(&V::encode(key, value));
            body.push('\n');
        }

        if let Err(e) = write_file(&target, &body).await {
            self.state.lock().dirty = true;
            return Err(e);
        }

        if target == self.path {
            debug!(target: "autosave", "Saved {} entries of '{}'", snapshot.len(), self.name);
        } else {
            warn!(
                target: "autosave",
                "'{}' was never loaded, saved {} entries to {} instead of {}",
                self.name, snapshot.len(), target.display(), self.path.display()
            );
        }
        Ok(true)
    }
}

async fn write_file(path: &Path, body: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    let tmp = path.with_extension("tmp");
    fs::write(&tmp, body)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

#[async_trait]
impl<V: Record> PeriodicTask for AutosaveStore<V> {
    fn name(&self) -> &str {
        &self.name
    }

    fn interval(&self) -> Duration {
        AUTOSAVE_INTERVAL
    }

    async fn run(&self) {
        if let Err(e) = self.save().await {
            error!(target: "autosave", "Failed to save '{}': {:#}", self.name, e);
        }
    }
}
