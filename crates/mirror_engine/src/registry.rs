use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use mirror_core::{disambiguate, AssetKind};
use tokio::sync::OnceCell;
use url::Url;

/// Final outcome of fetching one absolute URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    Saved { local_path: String, final_url: Url },
    Failed(String),
}

/// A transfer stopped by its own task's token. Never stored in a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferCancelled;

/// Absolute URL → local file, shared by every task of a run.
///
/// Each URL owns a [`OnceCell`]: the first task to reach it performs the
/// fetch, every later task waits for and reuses that outcome. This keeps a
/// single writer per URL and gives all references to it the same local path.
/// A cancelled transfer leaves the cell empty, so the next waiting task
/// fetches the URL itself.
#[derive(Debug, Default)]
pub struct AssetRegistry {
    slots: Mutex<HashMap<String, Arc<OnceCell<Slot>>>>,
    reserved: Mutex<HashSet<String>>,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slot(&self, url: &Url) -> Arc<OnceCell<Slot>> {
        lock(&self.slots)
            .entry(url.as_str().to_string())
            .or_default()
            .clone()
    }

    /// Outcome for `url`, if a fetch for it already finished.
    pub fn lookup(&self, url: &Url) -> Option<Slot> {
        lock(&self.slots)
            .get(url.as_str())
            .and_then(|cell| cell.get().cloned())
    }

    /// Claims a free `{folder}/{name}` path, adding `-2`, `-3`… on collisions.
    pub fn reserve_path(&self, kind: AssetKind, file_name: &str) -> String {
        let mut reserved = lock(&self.reserved);
        let mut n = 1;
        loop {
            let candidate = format!("{}/{}", kind.folder(), disambiguate(file_name, n));
            if reserved.insert(candidate.to_ascii_lowercase()) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Frees a path reserved for a download that did not complete.
    pub fn release_path(&self, local_path: &str) {
        lock(&self.reserved).remove(&local_path.to_ascii_lowercase());
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
