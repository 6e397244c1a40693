//! Live-tail streaming.
//!
//! Turns a growing fragmented MP4 on the origin into one continuous stream
//! that a player can start at the live edge.
//!
//! - `reader` - box-aligned reads across parts, with polling for parts that
//!   do not exist yet
//! - `pipeline` - per-response session: baseline capture, fragment
//!   renumbering, the body stream
//!
//! [`LiveStreamer`] ties them to the part locator: it decides whether a URL
//! is live and, if so, where in the object a new session should start.

mod pipeline;
mod reader;

pub use pipeline::LiveSession;
pub use reader::{BoxReader, ReaderOptions};

use std::sync::Arc;

use crate::config::Config;
use crate::origin::{PartLayout, PartLocator, PartSource};
use crate::Result;

/// Opens live sessions for URLs on one origin.
pub struct LiveStreamer {
    source: Arc<dyn PartSource>,
    locator: PartLocator,
    options: ReaderOptions,
    safety_margin: u64,
}

impl LiveStreamer {
    pub fn new(source: Arc<dyn PartSource>, config: &Config) -> Self {
        Self {
            locator: PartLocator::new(source.clone(), &config.locator),
            source,
            options: ReaderOptions::from(&config.reader),
            safety_margin: config.reader.safety_margin_parts,
        }
    }

    pub fn locator(&self) -> &PartLocator {
        &self.locator
    }

    /// Start a live session for `url`.
    ///
    /// Returns `None` when the object is not being written part by part (or
    /// has no parts yet); such requests are served by plain forwarding.
    pub async fn open(&self, url: &str) -> Result<Option<LiveSession>> {
        let layout = self.locator.locate(url).await?;
        if !layout.is_live() {
            tracing::debug!(url, "Object is not live");
            return Ok(None);
        }

        let start_part = self.start_part(&layout);
        let session =
            LiveSession::open(self.source.clone(), url, start_part, self.options.clone()).await?;
        Ok(Some(session))
    }

    fn start_part(&self, layout: &PartLayout) -> u64 {
        layout.start_part(self.safety_margin)
    }
}
