//! In-memory [`PartSource`] for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;

use super::PartSource;
use crate::{Error, Result};

/// A live object held in memory as a list of parts.
pub struct MemorySource {
    part_size: Option<u64>,
    parts: Mutex<Vec<Bytes>>,
    /// Pretend parts beyond this many exist when probed (for locator tests
    /// that never fetch).
    claimed_parts: Mutex<Option<u64>>,
    probes: Mutex<Vec<u64>>,
    size_probes: AtomicUsize,
    fetches: Mutex<Vec<u64>>,
    failing_fetches: AtomicUsize,
    latency: Option<Duration>,
}

impl MemorySource {
    pub fn new(part_size: Option<u64>) -> Self {
        Self {
            part_size,
            parts: Mutex::new(Vec::new()),
            claimed_parts: Mutex::new(None),
            probes: Mutex::new(Vec::new()),
            size_probes: AtomicUsize::new(0),
            fetches: Mutex::new(Vec::new()),
            failing_fetches: AtomicUsize::new(0),
            latency: None,
        }
    }

    /// Split `data` into parts of `part_size` bytes.
    pub fn from_bytes(data: &[u8], part_size: usize) -> Self {
        let source = Self::new(Some(part_size as u64));
        for chunk in data.chunks(part_size) {
            source.push_part(chunk.to_vec());
        }
        source
    }

    /// Answer existence probes as if `count` parts existed.
    pub fn with_claimed_parts(self, count: u64) -> Self {
        *self.claimed_parts.lock().unwrap() = Some(count);
        self
    }

    /// Delay every call, so concurrent callers overlap.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn push_part(&self, data: impl Into<Bytes>) {
        self.parts.lock().unwrap().push(data.into());
    }

    /// Make the next `count` fetches report the part as unavailable.
    pub fn fail_next_fetches(&self, count: usize) {
        self.failing_fetches.store(count, Ordering::SeqCst);
    }

    pub fn probes(&self) -> Vec<u64> {
        self.probes.lock().unwrap().clone()
    }

    pub fn size_probes(&self) -> usize {
        self.size_probes.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> Vec<u64> {
        self.fetches.lock().unwrap().clone()
    }

    fn part_count(&self) -> u64 {
        self.claimed_parts
            .lock()
            .unwrap()
            .unwrap_or(self.parts.lock().unwrap().len() as u64)
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait::async_trait]
impl PartSource for MemorySource {
    async fn part_size(&self, _url: &str) -> Result<Option<u64>> {
        self.delay().await;
        self.size_probes.fetch_add(1, Ordering::SeqCst);
        Ok(self.part_size)
    }

    async fn part_exists(&self, _url: &str, _part_size: u64, part: u64) -> Result<bool> {
        self.delay().await;
        self.probes.lock().unwrap().push(part);
        Ok(part >= 1 && part <= self.part_count())
    }

    async fn fetch_part(&self, url: &str, part: u64) -> Result<Bytes> {
        self.delay().await;
        self.fetches.lock().unwrap().push(part);

        let failing = self.failing_fetches.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_fetches.store(failing - 1, Ordering::SeqCst);
            return Err(Error::PartUnavailable {
                url: url.to_string(),
                part,
            });
        }

        let parts = self.parts.lock().unwrap();
        part.checked_sub(1)
            .and_then(|index| parts.get(index as usize))
            .cloned()
            .ok_or_else(|| Error::PartUnavailable {
                url: url.to_string(),
                part,
            })
    }
}
