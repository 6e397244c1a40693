//! The `ftyp` + `moov` prologue of a fragmented file.

use super::atoms::{expect_box, find_child_box, AtomType, BoxRange};
use crate::Result;

/// Header of a fragmented MP4: an `ftyp` box immediately followed by `moov`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovieHeader {
    /// The `ftyp` box, always at offset 0.
    pub ftyp: BoxRange,
    /// The `moov` box, directly after `ftyp`.
    pub moov: BoxRange,
    /// Number of `trak` children of `moov`.
    pub track_count: usize,
}

impl MovieHeader {
    /// Parse the header at the start of `buf`.
    ///
    /// `buf` must hold both boxes completely; anything after `moov` is
    /// ignored.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let ftyp = expect_box(buf, 0, AtomType::FTYP)?;
        let moov = expect_box(buf, ftyp.end(), AtomType::MOOV)?;

        let mut track_count = 0;
        let mut resume = None;
        while let Some(trak) = find_child_box(buf, moov.offset, AtomType::TRAK, resume)? {
            track_count += 1;
            resume = Some(trak.end());
        }

        Ok(Self {
            ftyp,
            moov,
            track_count,
        })
    }

    /// Total header length: `ftyp` plus `moov`.
    pub fn len(&self) -> usize {
        self.moov.end()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
