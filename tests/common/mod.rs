//! Shared test harness for integration tests.
//!
//! Provides [`LiveOrigin`], a wiremock responder that speaks the live-read
//! protocol for a synthetic recording, and helpers that build recordings and
//! a [`Config`] pointed at a mock server.

#![allow(dead_code)]

use livetail::config::Config;
use livetail_media::fmp4::{HeaderBuilder, MoofBuilder, TrackFragment};
use wiremock::{Request, Respond, ResponseTemplate};

pub const CAPABILITY_HEADER: &str = "x-backblaze-live-read-enabled";
pub const PART_SIZE_HEADER: &str = "x-backblaze-live-read-part-size";
pub const PART_SIZE: u64 = 1_000_000;

/// A recording split into parts: part 1 holds the header and the first
/// fragment, every later part holds one fragment.
pub struct Recording {
    pub header: Vec<u8>,
    pub parts: Vec<Vec<u8>>,
}

impl Recording {
    /// Build a two-track recording whose live fragments carry the given
    /// sequence numbers.
    pub fn new(live_sequence: &[u32]) -> Self {
        let header = HeaderBuilder::new().tracks(2).build();
        let mut first = header.clone();
        first.extend(fragment(1).build_with_mdat(&[0; 16]));

        let mut parts = vec![first];
        for &seq in live_sequence {
            parts.push(fragment(seq).build_with_mdat(&[seq as u8; 16]));
        }
        Self { header, parts }
    }

    pub fn concat(&self) -> Vec<u8> {
        self.parts.concat()
    }
}

pub fn fragment(seq: u32) -> MoofBuilder {
    let time = seq as u64 * 3000;
    MoofBuilder::new(seq)
        .track(
            TrackFragment::new(1)
                .base_media_decode_time(time)
                .samples(vec![10]),
        )
        .track(
            TrackFragment::new(2)
                .base_media_decode_time(time / 2)
                .samples(vec![6]),
        )
}

/// Serves a [`Recording`] the way a live-read capable origin does.
pub struct LiveOrigin {
    parts: Vec<Vec<u8>>,
}

impl LiveOrigin {
    pub fn new(recording: &Recording) -> Self {
        Self {
            parts: recording.parts.clone(),
        }
    }

    /// An object that claims to be part-based but holds `data` in part 1.
    pub fn raw(data: Vec<u8>) -> Self {
        Self { parts: vec![data] }
    }
}

impl Respond for LiveOrigin {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        if request.headers.get(CAPABILITY_HEADER).is_none() {
            return ResponseTemplate::new(200).set_body_bytes(self.parts.concat());
        }

        if let Some((_, number)) = request.url.query_pairs().find(|(k, _)| k == "partNumber") {
            let index = number.parse::<usize>().unwrap_or(0);
            return match index.checked_sub(1).and_then(|i| self.parts.get(i)) {
                Some(part) => ResponseTemplate::new(200).set_body_bytes(part.clone()),
                None => ResponseTemplate::new(404),
            };
        }

        let start = request
            .headers
            .get("range")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("bytes="))
            .and_then(|v| v.split('-').next())
            .and_then(|v| v.parse::<u64>().ok());

        match start {
            Some(start) if ((start / PART_SIZE) as usize) < self.parts.len() => {
                ResponseTemplate::new(206)
                    .insert_header(PART_SIZE_HEADER, PART_SIZE.to_string().as_str())
                    .set_body_bytes(vec![0u8, 0])
            }
            Some(_) => ResponseTemplate::new(416),
            None => ResponseTemplate::new(200).set_body_bytes(self.parts.concat()),
        }
    }
}

/// Config pointed at `base_url`, with fast, bounded retries.
pub fn test_config(base_url: &str) -> Config {
    let mut config = Config::default();
    config.origin.base_url = Some(base_url.to_string());
    config.reader.retry_delay_ms = 1;
    config.reader.max_fetch_attempts = Some(2);
    config
}
