//! Origin access.
//!
//! Live objects are exposed by the origin as a growing list of fixed-size
//! parts. Everything above this module talks to the origin through
//! [`PartSource`], which has exactly the three operations the live-read
//! protocol offers: ask for the part size, probe whether a part exists, and
//! fetch a whole part.

mod client;
pub mod locator;
#[cfg(test)]
pub(crate) mod testing;

pub use client::OriginClient;
pub use locator::{PartLayout, PartLocator};

use crate::Result;
use bytes::Bytes;

/// Part-addressed access to a remote object.
///
/// Part indices are 1-based.
#[async_trait::async_trait]
pub trait PartSource: Send + Sync {
    /// Part size the origin uses for `url`, or `None` if the object is not
    /// part-based (and therefore not live).
    async fn part_size(&self, url: &str) -> Result<Option<u64>>;

    /// Whether part `part` of `url` exists yet.
    async fn part_exists(&self, url: &str, part_size: u64, part: u64) -> Result<bool>;

    /// Fetch the raw bytes of part `part`.
    ///
    /// A part that has not been written yet is [`crate::Error::PartUnavailable`].
    async fn fetch_part(&self, url: &str, part: u64) -> Result<Bytes>;
}
