//! Bounded cache of file descriptors.
//!
//! Entries are keyed by path and modification time, so an edited file simply
//! misses and gets a fresh entry. The stale entry ages out through the
//! least-recently-used eviction once the cache is full.

use crate::classify::{FormatLabel, classify};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;
use tracing::{debug, error};

pub const DEFAULT_CAPACITY: usize = 1000;

/// What a listing shows for a single file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDescriptor {
    pub name: String,
    pub size: String,
    pub size_bytes: u64,
    pub type_label: FormatLabel,
    pub is_text: bool,
    pub is_readable_in_app: bool,
}

impl FileDescriptor {
    fn unreadable(path: &Path) -> Self {
        Self {
            name: file_name(path),
            size: "Unknown".to_string(),
            size_bytes: 0,
            type_label: FormatLabel::Error,
            is_text: false,
            is_readable_in_app: false,
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Human readable size: bytes below 1 KiB, then one decimal of KB or MB.
pub fn format_size(size: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * 1024;
    if size < KIB {
        format!("{size} B")
    } else if size < MIB {
        format!("{:.1} KB", size as f64 / KIB as f64)
    } else {
        format!("{:.1} MB", size as f64 / MIB as f64)
    }
}

type CacheKey = (PathBuf, SystemTime);

#[derive(Debug, Default)]
struct LruState {
    entries: HashMap<CacheKey, (FileDescriptor, u64)>,
    order: BTreeMap<u64, CacheKey>,
    tick: u64,
}

impl LruState {
    fn get(&mut self, key: &CacheKey) -> Option<FileDescriptor> {
        self.tick += 1;
        let tick = self.tick;
        let (descriptor, last_used) = self.entries.get_mut(key)?;
        self.order.remove(&*last_used);
        *last_used = tick;
        self.order.insert(tick, key.clone());
        Some(descriptor.clone())
    }

    fn insert(&mut self, key: CacheKey, descriptor: FileDescriptor, capacity: usize) {
        self.tick += 1;
        if let Some((_, old_tick)) = self.entries.remove(&key) {
            self.order.remove(&old_tick);
        }
        while self.entries.len() >= capacity {
            let Some((_, evicted)) = self.order.pop_first() else {
                break;
            };
            self.entries.remove(&evicted);
        }
        self.order.insert(self.tick, key.clone());
        self.entries.insert(key, (descriptor, self.tick));
    }
}

/// Thread-safe, fixed-capacity LRU cache of [`FileDescriptor`]s.
#[derive(Debug)]
pub struct FileInfoCache {
    capacity: usize,
    state: Mutex<LruState>,
}

impl FileInfoCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(LruState::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Describe a file, using the cached descriptor when the file has not
    /// been modified since it was computed. Stat failures produce an
    /// `ERROR` descriptor instead of an error.
    pub fn describe(&self, path: &Path) -> FileDescriptor {
        let modified = match fs::metadata(path).and_then(|meta| meta.modified()) {
            Ok(modified) => modified,
            Err(err) => {
                error!(path = %path.display(), "Error getting file info: {err}");
                return FileDescriptor::unreadable(path);
            }
        };
        let key = (path.to_path_buf(), modified);

        if let Some(hit) = self.lock().get(&key) {
            return hit;
        }

        let descriptor = match compute_descriptor(path) {
            Some(descriptor) => descriptor,
            None => return FileDescriptor::unreadable(path),
        };
        debug!(path = %path.display(), "Caching file descriptor");
        self.lock().insert(key, descriptor.clone(), self.capacity);
        descriptor
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruState> {
        // Poisoning is ignored, the maps stay usable.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for FileInfoCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

fn compute_descriptor(path: &Path) -> Option<FileDescriptor> {
    let meta = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(err) => {
            error!(path = %path.display(), "Error getting file info: {err}");
            return None;
        }
    };
    let classification = classify(path);
    Some(FileDescriptor {
        name: file_name(path),
        size: format_size(meta.len()),
        size_bytes: meta.len(),
        type_label: classification.label,
        is_text: classification.is_text_like,
        is_readable_in_app: classification.is_readable_in_app,
    })
}
