//! Error type for live-tail streaming.
//!
//! Box-level failures come from `livetail-media`; this adds everything that
//! can go wrong talking to the origin and walking its parts.

use thiserror::Error;

/// Result type for livetail operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for livetail operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Broken container structure.
    #[error(transparent)]
    Media(#[from] livetail_media::Error),

    /// The origin does not (yet) have this part.
    #[error("Part {part} of {url} is not available")]
    PartUnavailable { url: String, part: u64 },

    /// No fragment boundary could be found, even after reading one more part.
    #[error("No fragment found in {url} up to part {part}")]
    FragmentNotFound { url: String, part: u64 },

    /// The object has at least as many parts as the locator is allowed to search.
    #[error("{url} has at least {ceiling} parts; raise locator.upper_bound_bytes")]
    PartCeilingExceeded { url: String, ceiling: u64 },

    /// The origin answered with a status we cannot treat as "not yet".
    #[error("Origin returned HTTP {status} for {url}")]
    OriginStatus { url: String, status: u16 },

    /// Transport failure talking to the origin.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The incoming request cannot be forwarded as is.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The proxy itself is unable to reach or relay the origin.
    #[error("Proxy error: {0}")]
    Proxy(String),
}

impl Error {
    /// Whether reading the live tail should wait and try again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::PartUnavailable { .. } | Error::Http(_) => true,
            Error::OriginStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Status code for the proxy's response when a stream cannot be opened.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::Media(_) => 502,
            Error::PartUnavailable { .. } => 404,
            Error::FragmentNotFound { .. } => 502,
            Error::PartCeilingExceeded { .. } => 507,
            Error::OriginStatus { .. } => 502,
            Error::Http(_) => 502,
            Error::BadRequest(_) => 400,
            Error::Proxy(_) => 502,
        }
    }
}
