//! Per-response rewrite pipeline.
//!
//! A [`LiveSession`] reads the real header and first fragment of an object
//! once, then follows the live tail and renumbers every fragment it reads so
//! that the output looks like one continuous recording starting at the
//! first fragment.

use std::sync::Arc;

use bytes::Bytes;
use futures::Stream;
use livetail_media::{AtomType, FragmentMetadata};

use super::reader::{BoxReader, ReaderOptions};
use crate::origin::PartSource;
use crate::Result;

/// State of one outgoing live stream.
pub struct LiveSession {
    url: String,
    header: Bytes,
    track_count: usize,
    baseline: FragmentMetadata,
    /// Metadata of the first live fragment, once one has been read.
    starting: Option<FragmentMetadata>,
    reader: BoxReader,
    /// The first rewritten pair, read while opening.
    pending: Option<(Bytes, Bytes)>,
    fragments: u64,
}

impl LiveSession {
    /// Read the baseline from part 1, then find and rewrite the first live
    /// fragment at or after `start_part`.
    ///
    /// Nothing has been emitted when this fails, so the caller can still
    /// answer with an error status.
    pub async fn open(
        source: Arc<dyn PartSource>,
        url: &str,
        start_part: u64,
        options: ReaderOptions,
    ) -> Result<Self> {
        let mut head = BoxReader::new(source.clone(), url, 1, options.clone());
        let (header, movie, first) = head.read_header_and_first_fragment().await?;
        first.expect_tracks(movie.track_count)?;
        let baseline = first.metadata()?;

        tracing::info!(
            url,
            start_part,
            tracks = movie.track_count,
            baseline_sequence = baseline.sequence_number,
            "Opened live session"
        );

        let mut session = Self {
            url: url.to_string(),
            header,
            track_count: movie.track_count,
            baseline,
            starting: None,
            reader: BoxReader::new(source, url, start_part, options),
            pending: None,
            fragments: 0,
        };
        session.pending = Some(session.read_pair().await?);
        Ok(session)
    }

    /// The `ftyp` + `moov` bytes every stream starts with.
    pub fn header(&self) -> &Bytes {
        &self.header
    }

    pub fn track_count(&self) -> usize {
        self.track_count
    }

    pub fn baseline(&self) -> &FragmentMetadata {
        &self.baseline
    }

    /// Read the next live fragment and its `mdat`, renumbered.
    ///
    /// The first fragment read becomes the starting point: it is given the
    /// baseline values exactly, and every later fragment keeps its distance
    /// from it. Nothing is returned unless both boxes were read.
    pub async fn next_pair(&mut self) -> Result<(Bytes, Bytes)> {
        let pair = match self.pending.take() {
            Some(pair) => pair,
            None => self.read_pair().await?,
        };
        self.fragments += 1;
        Ok(pair)
    }

    async fn read_pair(&mut self) -> Result<(Bytes, Bytes)> {
        let mut fragment = self.reader.next_fragment().await?;
        fragment.expect_tracks(self.track_count)?;

        let live = fragment.metadata()?;
        let starting = self.starting.get_or_insert_with(|| {
            tracing::debug!(
                url = %self.url,
                live_sequence = live.sequence_number,
                "Captured starting fragment"
            );
            live.clone()
        });
        let rebased = live.rebase(starting, &self.baseline)?;
        fragment.apply(&rebased)?;

        let mdat = self.reader.next_box_of(AtomType::MDAT).await?;

        tracing::trace!(
            url = %self.url,
            live_sequence = live.sequence_number,
            sequence_number = rebased.sequence_number,
            mdat_len = mdat.len(),
            "Rewrote fragment"
        );

        Ok((fragment.into_bytes(), mdat))
    }

    /// Fragments emitted so far.
    pub fn fragments(&self) -> u64 {
        self.fragments
    }

    /// The response body: the header, then `moof`, `mdat`, `moof`, ...
    ///
    /// Pull-driven; the next pair is read only when the stream is polled.
    /// The first error ends the stream.
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes>> + Send + 'static {
        async_stream::try_stream! {
            let mut session = self;
            yield session.header.clone();

            loop {
                let (moof, mdat) = session.next_pair().await.inspect_err(|e| {
                    tracing::warn!(
                        url = %session.url,
                        fragments = session.fragments,
                        error = %e,
                        "Live stream ended"
                    );
                })?;
                yield moof;
                yield mdat;
            }
        }
    }
}
