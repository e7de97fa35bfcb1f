//! Bounded segment cache with single-flight miss handling.
//!
//! The LRU map and the in-flight table are guarded by separate short-lived
//! locks; no lock is held while a segment decodes. Concurrent requests for
//! the same key share one computation (the followers block on the leader's
//! slot); requests for different keys never wait on each other, and an
//! eviction is just an LRU map operation under its own lock.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Condvar, Mutex};

use lru::LruCache;
use tracing::debug;

use uttale_core::{Error, Result};

use crate::format::SegmentFormat;

/// Exact-match cache key. Times are millisecond integers so the key hashes;
/// the extractor derives them from the requested fractional seconds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SegmentKey {
    pub file: String,
    pub start_ms: u64,
    pub end_ms: u64,
    pub format: SegmentFormat,
}

struct Flight {
    slot: Mutex<Option<std::result::Result<Arc<Vec<u8>>, String>>>,
    ready: Condvar,
}

pub struct SegmentCache {
    entries: Mutex<LruCache<SegmentKey, Arc<Vec<u8>>>>,
    inflight: Mutex<HashMap<SegmentKey, Arc<Flight>>>,
}

enum Role {
    Leader(Arc<Flight>),
    Follower(Arc<Flight>),
}

impl SegmentCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity is non-zero");
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Cached bytes for an exact key, refreshing its recency. No I/O.
    pub fn get(&self, key: &SegmentKey) -> Option<Arc<Vec<u8>>> {
        self.entries.lock().expect("cache lock poisoned").get(key).cloned()
    }

    /// Return the cached value or run `compute` exactly once across all
    /// concurrent callers of this key. A failed computation is not cached;
    /// the error reaches the leader as-is and the followers as `Extraction`.
    pub fn get_or_compute<F>(&self, key: SegmentKey, compute: F) -> Result<Arc<Vec<u8>>>
    where
        F: FnOnce() -> Result<Vec<u8>>,
    {
        if let Some(hit) = self.get(&key) {
            return Ok(hit);
        }
        let role = {
            let mut inflight = self.inflight.lock().expect("inflight lock poisoned");
            match inflight.get(&key) {
                Some(flight) => Role::Follower(flight.clone()),
                None => {
                    let flight = Arc::new(Flight {
                        slot: Mutex::new(None),
                        ready: Condvar::new(),
                    });
                    inflight.insert(key.clone(), flight.clone());
                    Role::Leader(flight)
                }
            }
        };
        match role {
            Role::Leader(flight) => self.lead(key, &flight, compute),
            Role::Follower(flight) => Self::wait(&flight),
        }
    }

    fn lead<F>(&self, key: SegmentKey, flight: &Flight, compute: F) -> Result<Arc<Vec<u8>>>
    where
        F: FnOnce() -> Result<Vec<u8>>,
    {
        // The previous leader may have published this key between our cache
        // miss and winning the in-flight slot; recheck before decoding.
        let outcome = match self.get(&key) {
            Some(hit) => Ok(hit),
            None => {
                debug!(file = %key.file, start_ms = key.start_ms, end_ms = key.end_ms, "decoding segment");
                compute().map(Arc::new)
            }
        };
        if let Ok(bytes) = &outcome {
            self.entries
                .lock()
                .expect("cache lock poisoned")
                .put(key.clone(), bytes.clone());
        }
        {
            let mut slot = flight.slot.lock().expect("flight lock poisoned");
            *slot = Some(match &outcome {
                Ok(bytes) => Ok(bytes.clone()),
                Err(e) => Err(e.to_string()),
            });
        }
        flight.ready.notify_all();
        self.inflight
            .lock()
            .expect("inflight lock poisoned")
            .remove(&key);
        outcome
    }

    fn wait(flight: &Flight) -> Result<Arc<Vec<u8>>> {
        let mut slot = flight.slot.lock().expect("flight lock poisoned");
        while slot.is_none() {
            slot = flight.ready.wait(slot).expect("flight lock poisoned");
        }
        match slot.as_ref().expect("slot filled") {
            Ok(bytes) => Ok(bytes.clone()),
            Err(message) => Err(Error::Extraction(message.clone())),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
