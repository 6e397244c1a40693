//! MP4 box codec.
//!
//! Stateless helpers that locate boxes inside a raw buffer and read or write
//! fields at fixed offsets inside them.

mod atoms;
pub mod fields;
mod header;

pub use atoms::{
    expect_box, find_child_box, read_box_header, AtomType, BoxHeader, BoxRange, BOX_HEADER_LEN,
};
pub use header::MovieHeader;
