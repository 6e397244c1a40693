//! Part size and part count discovery.
//!
//! A live object grows one part at a time, and nothing on the origin says how
//! many parts exist right now. The locator finds out by probing: first the
//! part size, then the last existing part via a doubling search followed by
//! bisection. Results are cached per URL; concurrent lookups for the same URL
//! share one probe sequence.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Notify;

use super::PartSource;
use crate::config::LocatorConfig;
use crate::{Error, Result};

/// How a live object is split into parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PartLayout {
    /// Fixed part size in bytes (0 when the object is not part-based).
    pub part_size: u64,
    /// Highest part known to exist (0 when there are none).
    pub last_part: u64,
}

impl PartLayout {
    /// Layout of an object that is not being written live.
    pub const NOT_LIVE: Self = Self {
        part_size: 0,
        last_part: 0,
    };

    pub fn is_live(&self) -> bool {
        self.part_size > 0 && self.last_part > 0
    }

    /// Lower bound on the object size (every part but the last is full).
    pub fn approximate_size(&self) -> u64 {
        self.part_size.saturating_mul(self.last_part)
    }

    /// Part a live stream should start from, staying `margin` parts behind
    /// the last one to avoid racing a part that is still being uploaded.
    pub fn start_part(&self, margin: u64) -> u64 {
        self.last_part.saturating_sub(margin).max(1)
    }
}

/// Highest part index the search will consider for `part_size`.
pub fn part_ceiling(upper_bound_bytes: u64, part_size: u64) -> u64 {
    upper_bound_bytes.div_ceil(part_size.max(1)).max(1)
}

/// Ask the origin for the part size of `url`.
pub async fn discover_part_size(source: &dyn PartSource, url: &str) -> Result<Option<u64>> {
    let part_size = source.part_size(url).await?;
    match part_size {
        Some(size) => tracing::debug!(url, part_size = size, "Object is part-based"),
        None => tracing::debug!(url, "Object is not part-based"),
    }
    Ok(part_size)
}

/// Find the highest existing part of `url`.
///
/// Returns 0 without further probes when part 1 does not exist. Otherwise
/// doubles the candidate index until a missing part (or the ceiling) is
/// reached, then bisects between the highest existing and the lowest missing
/// index until they are adjacent. Fails with
/// [`Error::PartCeilingExceeded`] if the ceiling itself exists.
pub async fn discover_last_part(
    source: &dyn PartSource,
    url: &str,
    part_size: u64,
    ceiling: u64,
) -> Result<u64> {
    if !source.part_exists(url, part_size, 1).await? {
        return Ok(0);
    }

    // Invariant from here on: `low` exists, `high` does not.
    let mut low = 1u64;
    let mut high = loop {
        if low >= ceiling {
            return Err(Error::PartCeilingExceeded {
                url: url.to_string(),
                ceiling,
            });
        }
        let candidate = low.saturating_mul(2).min(ceiling);
        if source.part_exists(url, part_size, candidate).await? {
            low = candidate;
        } else {
            break candidate;
        }
    };

    while low + 1 < high {
        let mid = low + (high - low) / 2;
        tracing::trace!(url, low, mid, high, "Bisecting part count");
        if source.part_exists(url, part_size, mid).await? {
            low = mid;
        } else {
            high = mid;
        }
    }

    Ok(low)
}

struct CacheEntry {
    layout: PartLayout,
    discovered_at: Instant,
}

/// Per-URL memoized part discovery.
pub struct PartLocator {
    source: Arc<dyn PartSource>,
    upper_bound_bytes: u64,
    entries: DashMap<String, CacheEntry>,
    loading: DashMap<String, Arc<Notify>>,
    max_entries: usize,
    ttl: Duration,
}

impl PartLocator {
    pub fn new(source: Arc<dyn PartSource>, config: &LocatorConfig) -> Self {
        Self {
            source,
            upper_bound_bytes: config.upper_bound_bytes,
            entries: DashMap::new(),
            loading: DashMap::new(),
            max_entries: config.cache_max_entries.max(1),
            ttl: Duration::from_secs(config.cache_ttl_secs),
        }
    }

    /// Get the part layout of `url`, probing the origin if it is not cached.
    ///
    /// Concurrent calls for the same URL are coalesced: one caller probes,
    /// the others wait for its result. A failed probe is not cached, so a
    /// waiter that finds no entry takes over as the prober.
    pub async fn locate(&self, url: &str) -> Result<PartLayout> {
        if let Some(layout) = self.cached(url) {
            return Ok(layout);
        }

        loop {
            match self.loading.entry(url.to_string()) {
                Entry::Occupied(e) => {
                    let notify = e.get().clone();
                    // Register before releasing the map entry so a wakeup
                    // between the two cannot be missed.
                    let notified = notify.notified();
                    drop(e);
                    notified.await;

                    if let Some(layout) = self.cached(url) {
                        return Ok(layout);
                    }
                }
                Entry::Vacant(e) => {
                    let notify = Arc::new(Notify::new());
                    e.insert(notify.clone());
                    let _guard = LoadingGuard {
                        loading: &self.loading,
                        url,
                        notify,
                    };

                    // The previous prober may have finished between the
                    // cache miss and claiming the slot.
                    if let Some(layout) = self.cached(url) {
                        return Ok(layout);
                    }

                    let result = self.discover(url).await;
                    if let Ok(layout) = &result {
                        self.insert(url, *layout);
                    }
                    return result;
                }
            }
        }
    }

    /// Forget what is known about `url`.
    pub fn invalidate(&self, url: &str) {
        self.entries.remove(url);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    async fn discover(&self, url: &str) -> Result<PartLayout> {
        let source = self.source.as_ref();
        let Some(part_size) = discover_part_size(source, url).await? else {
            return Ok(PartLayout::NOT_LIVE);
        };

        let ceiling = part_ceiling(self.upper_bound_bytes, part_size);
        let last_part = discover_last_part(source, url, part_size, ceiling).await?;
        tracing::info!(url, part_size, last_part, "Discovered live object layout");

        Ok(PartLayout {
            part_size,
            last_part,
        })
    }

    fn cached(&self, url: &str) -> Option<PartLayout> {
        let entry = self.entries.get(url)?;
        if entry.discovered_at.elapsed() < self.ttl {
            return Some(entry.layout);
        }
        drop(entry);
        self.entries.remove(url);
        None
    }

    fn insert(&self, url: &str, layout: PartLayout) {
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(url) {
            self.evict_oldest();
        }
        self.entries.insert(
            url.to_string(),
            CacheEntry {
                layout,
                discovered_at: Instant::now(),
            },
        );
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.discovered_at)
            .map(|entry| entry.key().clone());

        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}

/// Releases a URL's loading slot and wakes its waiters when the prober
/// finishes or its future is dropped.
struct LoadingGuard<'a> {
    loading: &'a DashMap<String, Arc<Notify>>,
    url: &'a str,
    notify: Arc<Notify>,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.loading.remove(self.url);
        self.notify.notify_waiters();
    }
}
