//! Box-aligned reading across the parts of a live object.
//!
//! [`BoxReader`] keeps the unread bytes of the parts fetched so far in one
//! buffer. Reads are always served from the front of that buffer; when a box
//! is longer than what is buffered, the next part is fetched and appended.
//! A part that does not exist yet is polled for with a fixed delay.

use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use livetail_media::mp4::{read_box_header, AtomType, MovieHeader, BOX_HEADER_LEN};
use livetail_media::Fragment;

use crate::config::ReaderConfig;
use crate::origin::PartSource;
use crate::{Error, Result};

/// `mfhd` is a full box holding only the sequence number.
const MFHD_LEN: usize = 16;

/// Bytes needed to confirm a `moof`: its header, the `mfhd` and the header of
/// the following sibling.
const MIN_CONFIRM_LEN: usize = BOX_HEADER_LEN + MFHD_LEN + BOX_HEADER_LEN;

/// Retry policy for fetching parts.
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    /// Delay between attempts to fetch a part that is not available yet.
    pub retry_delay: Duration,
    /// Give up after this many attempts per part; `None` polls forever.
    pub max_fetch_attempts: Option<u32>,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self::from(&ReaderConfig::default())
    }
}

impl From<&ReaderConfig> for ReaderOptions {
    fn from(config: &ReaderConfig) -> Self {
        Self {
            retry_delay: config.retry_delay(),
            max_fetch_attempts: config.max_fetch_attempts,
        }
    }
}

/// Outcome of scanning the buffer for a fragment start.
enum Scan {
    Found(usize),
    /// Nothing confirmed; bytes before `keep_from` can never start one.
    Missing { keep_from: usize },
}

/// Sequential reader over the parts of one object.
pub struct BoxReader {
    source: Arc<dyn PartSource>,
    url: String,
    next_part: u64,
    buffer: BytesMut,
    /// Stream offset of `buffer[0]`, counted from the first fetched part.
    position: u64,
    options: ReaderOptions,
}

impl BoxReader {
    pub fn new(
        source: Arc<dyn PartSource>,
        url: impl Into<String>,
        first_part: u64,
        options: ReaderOptions,
    ) -> Self {
        Self {
            source,
            url: url.into(),
            next_part: first_part.max(1),
            buffer: BytesMut::new(),
            position: 0,
            options,
        }
    }

    /// The next `n` bytes, without consuming them.
    pub async fn peek(&mut self, n: usize) -> Result<&[u8]> {
        while self.buffer.len() < n {
            self.fetch_next_part().await?;
        }
        Ok(&self.buffer[..n])
    }

    /// Consume and return the next `n` bytes.
    pub async fn read(&mut self, n: usize) -> Result<Bytes> {
        Ok(self.take(n).await?.freeze())
    }

    /// Consume the next box, whatever its type.
    pub async fn next_box(&mut self) -> Result<Bytes> {
        let header = read_box_header(self.peek(BOX_HEADER_LEN).await?, 0)?;
        self.read(header.size).await
    }

    /// Consume the next box, failing if it is not of type `expected`.
    pub async fn next_box_of(&mut self, expected: AtomType) -> Result<Bytes> {
        Ok(self.take_box_of(expected).await?.freeze())
    }

    /// Read the `ftyp` + `moov` header and the `moof` that follows it.
    ///
    /// Returns the raw header bytes, the parsed header and the first
    /// fragment. The fragment's `mdat` is left unread.
    pub async fn read_header_and_first_fragment(
        &mut self,
    ) -> Result<(Bytes, MovieHeader, Fragment)> {
        let ftyp = self.take_box_of(AtomType::FTYP).await?;
        let moov = self.take_box_of(AtomType::MOOV).await?;

        let mut header = BytesMut::with_capacity(ftyp.len() + moov.len());
        header.extend_from_slice(&ftyp);
        header.extend_from_slice(&moov);
        let movie = MovieHeader::parse(&header)?;

        let moof = self.take_box_of(AtomType::MOOF).await?;
        let fragment = Fragment::parse(moof)?;

        tracing::debug!(
            url = %self.url,
            header_len = header.len(),
            tracks = movie.track_count,
            "Read movie header"
        );

        Ok((header.freeze(), movie, fragment))
    }

    /// Find and consume the next `moof`, skipping anything before it.
    ///
    /// A candidate only counts if its first child is `mfhd` and the box after
    /// that is `traf`, so stray `moof` bytes inside media data are ignored.
    /// When the buffer holds no confirmed fragment, the tail that might
    /// still start one is kept, one more part is fetched and the scan runs
    /// once more before giving up with [`Error::FragmentNotFound`].
    pub async fn next_fragment(&mut self) -> Result<Fragment> {
        if self.buffer.is_empty() {
            self.fetch_next_part().await?;
        }

        let mut extended = false;
        loop {
            match self.scan_for_fragment() {
                Scan::Found(offset) => {
                    self.skip(offset);
                    let header = read_box_header(&self.buffer, 0)?;
                    let moof = self.take(header.size).await?;
                    return Ok(Fragment::parse(moof)?);
                }
                Scan::Missing { .. } if extended => {
                    return Err(Error::FragmentNotFound {
                        url: self.url.clone(),
                        part: self.next_part - 1,
                    });
                }
                Scan::Missing { keep_from } => {
                    tracing::debug!(
                        url = %self.url,
                        kept = self.buffer.len() - keep_from,
                        "No fragment in buffer, reading next part"
                    );
                    self.skip(keep_from);
                    self.fetch_next_part().await?;
                    extended = true;
                }
            }
        }
    }

    async fn take(&mut self, n: usize) -> Result<BytesMut> {
        self.peek(n).await?;
        self.position += n as u64;
        Ok(self.buffer.split_to(n))
    }

    async fn take_box_of(&mut self, expected: AtomType) -> Result<BytesMut> {
        let header = read_box_header(self.peek(BOX_HEADER_LEN).await?, 0)?;
        if header.atom_type != expected {
            return Err(livetail_media::Error::UnexpectedBox {
                offset: self.position as usize,
                expected,
                found: header.atom_type,
            }
            .into());
        }
        self.take(header.size).await
    }

    fn skip(&mut self, n: usize) {
        self.buffer.advance(n);
        self.position += n as u64;
    }

    fn scan_for_fragment(&self) -> Scan {
        let buf = &self.buffer[..];
        let mut unconfirmed = None;

        let last_start = buf.len().saturating_sub(BOX_HEADER_LEN);
        for offset in 0..=last_start {
            if buf.len() < offset + BOX_HEADER_LEN || &buf[offset + 4..offset + 8] != b"moof" {
                continue;
            }
            if buf.len() < offset + MIN_CONFIRM_LEN {
                unconfirmed.get_or_insert(offset);
                continue;
            }

            let (Ok(moof), Ok(mfhd)) = (
                read_box_header(buf, offset),
                read_box_header(buf, offset + BOX_HEADER_LEN),
            ) else {
                continue;
            };
            if mfhd.atom_type != AtomType::MFHD || mfhd.size != MFHD_LEN {
                continue;
            }

            let sibling = offset + BOX_HEADER_LEN + MFHD_LEN;
            if moof.size >= MIN_CONFIRM_LEN && &buf[sibling + 4..sibling + 8] == b"traf" {
                return Scan::Found(offset);
            }
        }

        // A header cut off by the end of the buffer can start in the last
        // seven bytes.
        let keep_from = unconfirmed.unwrap_or(buf.len().saturating_sub(BOX_HEADER_LEN - 1));
        Scan::Missing { keep_from }
    }

    async fn fetch_next_part(&mut self) -> Result<()> {
        let part = self.next_part;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            match self.source.fetch_part(&self.url, part).await {
                Ok(bytes) => {
                    self.buffer.extend_from_slice(&bytes);
                    self.next_part += 1;
                    tracing::debug!(
                        url = %self.url,
                        part,
                        size = bytes.len(),
                        buffered = self.buffer.len(),
                        "Appended part"
                    );
                    return Ok(());
                }
                Err(e) if e.is_retryable() => {
                    if self
                        .options
                        .max_fetch_attempts
                        .is_some_and(|max| attempts >= max)
                    {
                        return Err(e);
                    }
                    if attempts == 1 {
                        tracing::warn!(url = %self.url, part, error = %e, "Part not available, polling");
                    } else {
                        tracing::debug!(url = %self.url, part, attempts, "Still waiting for part");
                    }
                    tokio::time::sleep(self.options.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::origin::testing::MemorySource;
    use livetail_media::fmp4::{HeaderBuilder, MoofBuilder, TrackFragment};

    const URL: &str = "http://origin/bucket/live.mp4";

    fn options() -> ReaderOptions {
        ReaderOptions {
            retry_delay: Duration::from_millis(1),
            max_fetch_attempts: Some(3),
        }
    }

    fn moof(sequence_number: u32) -> MoofBuilder {
        MoofBuilder::new(sequence_number)
            .track(TrackFragment::new(1).samples(vec![4, 4]))
            .track(TrackFragment::new(2).samples(vec![2]))
    }

    fn reader(source: MemorySource, first_part: u64) -> (Arc<MemorySource>, BoxReader) {
        let source = Arc::new(source);
        let reader = BoxReader::new(source.clone(), URL, first_part, options());
        (source, reader)
    }

    #[tokio::test]
    async fn reads_header_and_first_fragment() {
        let header = HeaderBuilder::new().moov_size(500).build();
        let fragment = moof(1);
        let mut data = header.clone();
        data.extend(fragment.build_with_mdat(&[7; 10]));

        let (_, mut reader) = reader(MemorySource::from_bytes(&data, data.len()), 1);
        let (header_bytes, movie, first) = reader.read_header_and_first_fragment().await.unwrap();

        assert_eq!(header_bytes.len(), 532);
        assert_eq!(&header_bytes[..], &header[..]);
        assert_eq!(movie.track_count, 2);
        assert_eq!(first.as_bytes(), &fragment.build()[..]);

        let mdat = reader.next_box_of(AtomType::MDAT).await.unwrap();
        assert_eq!(&mdat[8..], &[7; 10]);
    }

    #[tokio::test]
    async fn header_spanning_parts() {
        let mut data = HeaderBuilder::new().moov_size(300).build();
        let fragment = moof(1);
        data.extend(fragment.build_with_mdat(&[1; 64]));

        let (source, mut reader) = reader(MemorySource::from_bytes(&data, 100), 1);
        let (header, _, first) = reader.read_header_and_first_fragment().await.unwrap();

        assert_eq!(header.len(), 332);
        assert_eq!(first.as_bytes(), &fragment.build()[..]);
        assert_eq!(source.fetches(), vec![1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn header_requires_ftyp() {
        let data = moof(1).build_with_mdat(&[0; 4]);
        let (_, mut reader) = reader(MemorySource::from_bytes(&data, data.len()), 1);

        let err = reader.read_header_and_first_fragment().await.unwrap_err();
        assert!(matches!(
            err,
            Error::Media(livetail_media::Error::UnexpectedBox {
                expected: AtomType::FTYP,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn moof_header_split_at_every_offset() {
        let junk = vec![0xAB; 40];
        let fragment = moof(9);

        for split in 1..BOX_HEADER_LEN {
            let mut data = junk.clone();
            data.extend(fragment.build_with_mdat(&[3; 6]));

            let source = MemorySource::new(Some(1_000));
            source.push_part(data[..junk.len() + split].to_vec());
            source.push_part(data[junk.len() + split..].to_vec());

            let (source, mut reader) = reader(source, 1);
            let found = reader.next_fragment().await.unwrap();
            assert_eq!(found.as_bytes(), &fragment.build()[..], "split at {}", split);
            assert_eq!(found.metadata().unwrap().sequence_number, 9);
            assert_eq!(source.fetches(), vec![1, 2]);

            let mdat = reader.next_box_of(AtomType::MDAT).await.unwrap();
            assert_eq!(&mdat[8..], &[3; 6]);
        }
    }

    #[tokio::test]
    async fn moof_split_inside_mfhd() {
        let junk = vec![0xCD; 20];
        let fragment = moof(4);
        let mut data = junk.clone();
        data.extend(fragment.build_with_mdat(&[0; 2]));

        let source = MemorySource::new(Some(1_000));
        source.push_part(data[..junk.len() + 12].to_vec());
        source.push_part(data[junk.len() + 12..].to_vec());

        let (_, mut reader) = reader(source, 1);
        let found = reader.next_fragment().await.unwrap();
        assert_eq!(found.as_bytes(), &fragment.build()[..]);
    }

    #[tokio::test]
    async fn stray_moof_bytes_are_skipped() {
        // An mdat whose payload happens to contain "moof".
        let mut payload = vec![0u8; 4];
        payload.extend_from_slice(b"moof");
        payload.extend_from_slice(&[0u8; 32]);
        let fragment = moof(2);

        let mut data = livetail_media::fmp4::mdat(&payload);
        data.extend(fragment.build_with_mdat(&[5; 5]));

        let (_, mut reader) = reader(MemorySource::from_bytes(&data, data.len()), 1);
        let found = reader.next_fragment().await.unwrap();
        assert_eq!(found.as_bytes(), &fragment.build()[..]);
    }

    #[tokio::test]
    async fn gives_up_after_one_extra_part() {
        let source = MemorySource::new(Some(64));
        source.push_part(vec![0u8; 64]);
        source.push_part(vec![0u8; 64]);
        source.push_part(vec![0u8; 64]);

        let (source, mut reader) = reader(source, 1);
        let err = reader.next_fragment().await.unwrap_err();
        assert!(matches!(err, Error::FragmentNotFound { part: 2, .. }));
        assert_eq!(source.fetches(), vec![1, 2]);
    }

    #[tokio::test]
    async fn starts_mid_object() {
        let mut data = Vec::new();
        for seq in 10..15 {
            data.extend(moof(seq).build_with_mdat(&[seq as u8; 16]));
        }

        // Part 2 begins inside fragment 11; fragment 12 is the first to start
        // within it.
        let (_, mut reader) = reader(MemorySource::from_bytes(&data, 250), 2);
        for expected in [12, 13, 14] {
            let fragment = reader.next_fragment().await.unwrap();
            assert_eq!(fragment.metadata().unwrap().sequence_number, expected);
            let mdat = reader.next_box_of(AtomType::MDAT).await.unwrap();
            assert_eq!(&mdat[8..], &[expected as u8; 16]);
        }
    }

    #[tokio::test]
    async fn retries_unavailable_parts() {
        let data = moof(1).build_with_mdat(&[0; 8]);
        let source = MemorySource::from_bytes(&data, data.len());
        source.fail_next_fetches(2);

        let (source, mut reader) = reader(source, 1);
        let moof_box = reader.next_box().await.unwrap();
        assert_eq!(&moof_box[4..8], b"moof");
        assert_eq!(source.fetches(), vec![1, 1, 1]);
    }

    #[tokio::test]
    async fn bounded_attempts_surface_the_error() {
        let (source, mut reader) = reader(MemorySource::new(Some(1_000)), 1);

        let err = reader.next_box().await.unwrap_err();
        assert!(matches!(err, Error::PartUnavailable { part: 1, .. }));
        assert_eq!(source.fetches().len(), 3);
    }

    #[tokio::test]
    async fn peek_does_not_consume() {
        let data = moof(1).build_with_mdat(&[0; 8]);
        let (_, mut reader) = reader(MemorySource::from_bytes(&data, 10), 1);

        let peeked = reader.peek(12).await.unwrap().to_vec();
        let read = reader.read(12).await.unwrap();
        assert_eq!(&peeked[..], &read[..]);
        assert_eq!(&read[..], &data[..12]);
    }

    #[tokio::test]
    async fn unexpected_box_reports_stream_offset() {
        let data = moof(1).build_with_mdat(&[0; 8]);
        let (_, mut reader) = reader(MemorySource::from_bytes(&data, data.len()), 1);

        reader.next_box_of(AtomType::MOOF).await.unwrap();
        let err = reader.next_box_of(AtomType::MOOF).await.unwrap_err();
        match err {
            Error::Media(livetail_media::Error::UnexpectedBox { offset, found, .. }) => {
                assert_eq!(offset, moof(1).build().len());
                assert_eq!(found, AtomType::MDAT);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
