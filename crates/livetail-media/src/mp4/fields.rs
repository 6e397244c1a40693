//! Big-endian field accessors at fixed offsets.
//!
//! All field reads and writes go through these functions so that bounds
//! checking lives in one place. Offsets are absolute within the buffer;
//! writes never reallocate.

use crate::{Error, Result};

/// `mfhd`: sequence number, after the 8-byte header and version/flags word.
pub const MFHD_SEQUENCE_NUMBER: usize = 12;

/// `tfhd`: version/flags word.
pub const TFHD_FLAGS: usize = 8;

/// `tfhd`: base data offset, after version/flags and the 32-bit track id.
pub const TFHD_BASE_DATA_OFFSET: usize = 16;

/// `tfhd` flag: base data offset field is present.
pub const TFHD_BASE_DATA_OFFSET_PRESENT: u32 = 0x000001;

/// `tfdt`: version/flags word.
pub const TFDT_VERSION: usize = 8;

/// `tfdt`: base media decode time.
pub const TFDT_BASE_MEDIA_DECODE_TIME: usize = 12;

fn field(buf: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    offset
        .checked_add(len)
        .and_then(|end| buf.get(offset..end))
        .ok_or(Error::TruncatedBox {
            offset,
            need: len,
            have: buf.len().saturating_sub(offset),
        })
}

fn field_mut(buf: &mut [u8], offset: usize, len: usize) -> Result<&mut [u8]> {
    let have = buf.len().saturating_sub(offset);
    offset
        .checked_add(len)
        .and_then(|end| buf.get_mut(offset..end))
        .ok_or(Error::TruncatedBox {
            offset,
            need: len,
            have,
        })
}

/// Read a byte.
pub fn read_u8(buf: &[u8], offset: usize) -> Result<u8> {
    Ok(field(buf, offset, 1)?[0])
}

/// Read a big-endian `u32`.
pub fn read_u32(buf: &[u8], offset: usize) -> Result<u32> {
    let b = field(buf, offset, 4)?;
    Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

/// Read a big-endian `u64`.
pub fn read_u64(buf: &[u8], offset: usize) -> Result<u64> {
    let b = field(buf, offset, 8)?;
    Ok(u64::from_be_bytes([
        b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
    ]))
}

/// Write a big-endian `u32` in place.
pub fn write_u32(buf: &mut [u8], offset: usize, value: u32) -> Result<()> {
    field_mut(buf, offset, 4)?.copy_from_slice(&value.to_be_bytes());
    Ok(())
}

/// Write a big-endian `u64` in place.
pub fn write_u64(buf: &mut [u8], offset: usize, value: u64) -> Result<()> {
    field_mut(buf, offset, 8)?.copy_from_slice(&value.to_be_bytes());
    Ok(())
}
