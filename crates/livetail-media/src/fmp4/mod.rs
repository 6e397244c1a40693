//! Fragmented MP4 (fMP4) fragments.
//!
//! - [`Fragment`] - a `moof` buffer with resolved field offsets
//! - [`FragmentMetadata`] - the sequence number and per-track timing that
//!   get rewritten
//! - [`MoofBuilder`] / [`HeaderBuilder`] - writers for synthetic recordings

mod builder;
mod fragment;
mod metadata;

pub use builder::{mdat, HeaderBuilder, MoofBuilder, TrackFragment};
pub use fragment::Fragment;
pub use metadata::{FragmentMetadata, TrackTiming};
