//! Livetail-Media: box codec and fragment rewriting for fragmented MP4
//!
//! This crate holds the pure, I/O-free half of livetail. It knows how to
//! find boxes inside a byte buffer and how to patch the handful of fields
//! that have to change when a fragment from the live tail of a recording is
//! spliced after the fragments a player has already seen.
//!
//! # Modules
//!
//! - `mp4` - Box headers, child lookup, big-endian field accessors, the
//!   `ftyp` + `moov` header
//! - `fmp4` - Movie fragments (`moof`) as an owned buffer plus an offset
//!   table, their metadata, and the rebasing arithmetic
//!
//! # Rewriting
//!
//! Only three fields are ever written:
//!
//! 1. `mfhd` sequence number
//! 2. `tfhd` base data offset (per track, when present)
//! 3. `tfdt` base media decode time (per track)
//!
//! Every other byte of a fragment passes through untouched.

pub mod error;
pub mod fmp4;
pub mod mp4;

pub use error::{Error, Result};
pub use fmp4::{Fragment, FragmentMetadata, TrackTiming};
pub use mp4::{AtomType, BoxHeader, BoxRange, MovieHeader};
