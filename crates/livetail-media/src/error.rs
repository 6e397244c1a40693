//! Error types for livetail-media.

use crate::mp4::AtomType;
use thiserror::Error;

/// Result type for livetail-media operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for livetail-media operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A box header is unreadable or declares an impossible length.
    #[error("Malformed box at offset {offset}: {reason}")]
    MalformedBox { offset: usize, reason: String },

    /// A read or write would run past the end of the buffer.
    #[error("Truncated box: need {need} bytes at offset {offset}, have {have}")]
    TruncatedBox {
        offset: usize,
        need: usize,
        have: usize,
    },

    /// A box of one type was found where another was required.
    #[error("Unexpected box at offset {offset}: expected {expected}, found {found}")]
    UnexpectedBox {
        offset: usize,
        expected: AtomType,
        found: AtomType,
    },

    /// A fragment carries a different number of tracks than the header declares.
    #[error("Track count mismatch: expected {expected}, found {found}")]
    TrackCountMismatch { expected: usize, found: usize },
}

impl Error {
    /// Create a malformed box error.
    pub fn malformed(offset: usize, reason: impl Into<String>) -> Self {
        Self::MalformedBox {
            offset,
            reason: reason.into(),
        }
    }
}
