// src/watch/store.rs

//! Watch store contract and an in-memory implementation.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::errors::{Result, WatcherError};
use crate::types::BoxFuture;

use super::Watch;

/// What the execution engine needs from the watch store.
pub trait WatchStore: Send + Sync + Debug {
    /// Current definition of the watch, if it still exists.
    fn get(&self, id: &str) -> Option<Watch>;

    /// Persist the watch's status.
    ///
    /// Fails with [`WatcherError::VersionConflict`] if the stored watch was
    /// modified or deleted since `watch` was read.
    fn update_status<'a>(&'a self, watch: &'a Watch) -> BoxFuture<'a, Result<()>>;
}

/// Watch store keeping everything in a map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryWatchStore {
    watches: Arc<Mutex<BTreeMap<String, Watch>>>,
}

impl InMemoryWatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Watch>> {
        self.watches.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create or overwrite a watch. Returns the stored copy with its new
    /// version, and the previous definition if there was one.
    pub fn put(&self, mut watch: Watch) -> (Watch, Option<Watch>) {
        let mut map = self.map();
        let previous = map.get(&watch.id).cloned();
        if let Some(previous) = &previous {
            watch.inherit_nonce(previous);
        }
        watch.version = previous.as_ref().map_or(1, |p| p.version + 1);
        watch.status.reset_dirty();
        map.insert(watch.id.clone(), watch.clone());
        debug!(watch_id = %watch.id, version = watch.version, "stored watch");
        (watch, previous)
    }

    pub fn delete(&self, id: &str) -> Option<Watch> {
        let removed = self.map().remove(id);
        if removed.is_some() {
            debug!(watch_id = %id, "deleted watch");
        }
        removed
    }

    /// Acknowledge actions of a stored watch. See [`super::WatchStatus::ack`].
    pub fn ack(&self, id: &str, action_ids: &[String]) -> Result<bool> {
        let mut map = self.map();
        let watch = map
            .get_mut(id)
            .ok_or_else(|| WatcherError::WatchNotFound(id.to_string()))?;
        let changed = watch.status.ack(action_ids);
        if changed {
            watch.version += 1;
            watch.status.reset_dirty();
        }
        Ok(changed)
    }

    pub fn watches(&self) -> Vec<Watch> {
        self.map().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }
}

impl WatchStore for InMemoryWatchStore {
    fn get(&self, id: &str) -> Option<Watch> {
        self.map().get(id).cloned()
    }

    fn update_status<'a>(&'a self, watch: &'a Watch) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if !watch.status.dirty() {
                return Ok(());
            }
            let mut map = self.map();
            match map.get_mut(&watch.id) {
                Some(stored) if stored.version == watch.version => {
                    stored.status = watch.status.clone();
                    stored.status.reset_dirty();
                    stored.version += 1;
                    debug!(watch_id = %watch.id, version = stored.version, "updated watch status");
                    Ok(())
                }
                Some(stored) => {
                    warn!(
                        watch_id = %watch.id,
                        expected = watch.version,
                        actual = stored.version,
                        "version conflict while updating watch status"
                    );
                    Err(WatcherError::VersionConflict {
                        watch_id: watch.id.clone(),
                    })
                }
                None => Err(WatcherError::VersionConflict {
                    watch_id: watch.id.clone(),
                }),
            }
        })
    }
}
