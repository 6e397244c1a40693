//! Movie fragment (`moof`) held as one buffer plus an offset table.

use bytes::{Bytes, BytesMut};

use super::{FragmentMetadata, TrackTiming};
use crate::mp4::fields::{
    self, MFHD_SEQUENCE_NUMBER, TFDT_BASE_MEDIA_DECODE_TIME, TFDT_VERSION,
    TFHD_BASE_DATA_OFFSET, TFHD_BASE_DATA_OFFSET_PRESENT, TFHD_FLAGS,
};
use crate::mp4::{expect_box, find_child_box, AtomType, BoxRange};
use crate::{Error, Result};

/// Location and width of a `tfdt` decode time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeTimeField {
    /// Version 1: 64-bit.
    Wide(usize),
    /// Version 0: 32-bit.
    Narrow(usize),
}

/// Absolute offsets of one track's mutable fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TrackFields {
    base_data_offset: Option<usize>,
    base_media_decode_time: DecodeTimeField,
}

/// A parsed `moof` box.
///
/// The raw bytes stay in a single owned buffer. Parsing resolves where the
/// sequence number and per-track fields live; reads and writes then go
/// through the bounds-checked accessors in [`crate::mp4::fields`].
#[derive(Debug, Clone)]
pub struct Fragment {
    data: BytesMut,
    sequence_number: usize,
    tracks: Vec<TrackFields>,
}

impl Fragment {
    /// Parse a buffer holding exactly one `moof` box.
    pub fn parse(data: impl Into<BytesMut>) -> Result<Self> {
        let data = data.into();
        let moof = expect_box(&data, 0, AtomType::MOOF)?;
        if moof.size != data.len() {
            return Err(Error::malformed(
                0,
                format!("moof declares {} bytes, buffer holds {}", moof.size, data.len()),
            ));
        }

        let mfhd = find_child_box(&data, 0, AtomType::MFHD, None)?
            .ok_or_else(|| Error::malformed(0, "moof has no mfhd"))?;
        let sequence_number = field_in(&mfhd, MFHD_SEQUENCE_NUMBER, 4)?;

        let mut tracks = Vec::new();
        let mut resume = None;
        while let Some(traf) = find_child_box(&data, 0, AtomType::TRAF, resume)? {
            tracks.push(parse_traf(&data, &traf)?);
            resume = Some(traf.end());
        }
        if tracks.is_empty() {
            return Err(Error::malformed(0, "moof has no traf"));
        }

        Ok(Self {
            data,
            sequence_number,
            tracks,
        })
    }

    /// Number of `traf` boxes.
    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Fail unless the fragment carries exactly `expected` tracks.
    pub fn expect_tracks(&self, expected: usize) -> Result<()> {
        if self.tracks.len() != expected {
            return Err(Error::TrackCountMismatch {
                expected,
                found: self.tracks.len(),
            });
        }
        Ok(())
    }

    /// Read the mutable fields.
    pub fn metadata(&self) -> Result<FragmentMetadata> {
        let sequence_number = fields::read_u32(&self.data, self.sequence_number)?;
        let tracks = self
            .tracks
            .iter()
            .map(|track| {
                let base_data_offset = track
                    .base_data_offset
                    .map(|at| fields::read_u64(&self.data, at))
                    .transpose()?;
                let base_media_decode_time = match track.base_media_decode_time {
                    DecodeTimeField::Wide(at) => fields::read_u64(&self.data, at)?,
                    DecodeTimeField::Narrow(at) => fields::read_u32(&self.data, at)? as u64,
                };
                Ok(TrackTiming {
                    base_data_offset,
                    base_media_decode_time,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(FragmentMetadata {
            sequence_number,
            tracks,
        })
    }

    /// Overwrite the mutable fields in place.
    ///
    /// A base data offset is only written where the fragment has the field.
    /// Version 0 decode times keep the low 32 bits.
    pub fn apply(&mut self, metadata: &FragmentMetadata) -> Result<()> {
        self.expect_tracks(metadata.tracks.len())?;

        fields::write_u32(&mut self.data, self.sequence_number, metadata.sequence_number)?;
        for (track, timing) in self.tracks.iter().zip(&metadata.tracks) {
            if let (Some(at), Some(value)) = (track.base_data_offset, timing.base_data_offset) {
                fields::write_u64(&mut self.data, at, value)?;
            }
            match track.base_media_decode_time {
                DecodeTimeField::Wide(at) => {
                    fields::write_u64(&mut self.data, at, timing.base_media_decode_time)?
                }
                DecodeTimeField::Narrow(at) => {
                    fields::write_u32(&mut self.data, at, timing.base_media_decode_time as u32)?
                }
            }
        }
        Ok(())
    }

    /// The raw `moof` bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Consume the fragment, returning its bytes.
    pub fn into_bytes(self) -> Bytes {
        self.data.freeze()
    }
}

fn parse_traf(data: &[u8], traf: &BoxRange) -> Result<TrackFields> {
    let tfhd = find_child_box(data, traf.offset, AtomType::TFHD, None)?
        .ok_or_else(|| Error::malformed(traf.offset, "traf has no tfhd"))?;
    let flags = fields::read_u32(data, field_in(&tfhd, TFHD_FLAGS, 4)?)? & 0x00FF_FFFF;
    let base_data_offset = if flags & TFHD_BASE_DATA_OFFSET_PRESENT != 0 {
        Some(field_in(&tfhd, TFHD_BASE_DATA_OFFSET, 8)?)
    } else {
        None
    };

    let tfdt = find_child_box(data, traf.offset, AtomType::TFDT, None)?
        .ok_or_else(|| Error::malformed(traf.offset, "traf has no tfdt"))?;
    let base_media_decode_time = match fields::read_u8(data, field_in(&tfdt, TFDT_VERSION, 4)?)? {
        0 => DecodeTimeField::Narrow(field_in(&tfdt, TFDT_BASE_MEDIA_DECODE_TIME, 4)?),
        1 => DecodeTimeField::Wide(field_in(&tfdt, TFDT_BASE_MEDIA_DECODE_TIME, 8)?),
        version => {
            return Err(Error::malformed(
                tfdt.offset,
                format!("unknown tfdt version {}", version),
            ))
        }
    };

    Ok(TrackFields {
        base_data_offset,
        base_media_decode_time,
    })
}

/// Absolute offset of a `len`-byte field at `relative` within `range`,
/// checked against the box's declared length.
fn field_in(range: &BoxRange, relative: usize, len: usize) -> Result<usize> {
    if relative + len > range.size {
        return Err(Error::malformed(
            range.offset,
            format!(
                "{} of length {} has no room for a {}-byte field at {}",
                range.atom_type, range.size, len, relative
            ),
        ));
    }
    Ok(range.offset + relative)
}
