//! Box (atom) headers and child lookup.

use crate::{Error, Result};

/// Size of a compact box header: 32-bit length plus four-character type.
pub const BOX_HEADER_LEN: usize = 8;

/// Four-character atom type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AtomType(pub [u8; 4]);

impl AtomType {
    pub const FTYP: Self = Self(*b"ftyp");
    pub const MOOV: Self = Self(*b"moov");
    pub const MVHD: Self = Self(*b"mvhd");
    pub const TRAK: Self = Self(*b"trak");
    pub const TKHD: Self = Self(*b"tkhd");
    pub const MVEX: Self = Self(*b"mvex");
    pub const MOOF: Self = Self(*b"moof");
    pub const MFHD: Self = Self(*b"mfhd");
    pub const TRAF: Self = Self(*b"traf");
    pub const TFHD: Self = Self(*b"tfhd");
    pub const TFDT: Self = Self(*b"tfdt");
    pub const TRUN: Self = Self(*b"trun");
    pub const MDAT: Self = Self(*b"mdat");
    pub const FREE: Self = Self(*b"free");

    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Get the 4-char code as a string.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("????")
    }
}

impl std::fmt::Display for AtomType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parsed box header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxHeader {
    /// Declared box length including the 8-byte header.
    pub size: usize,
    /// Box type code.
    pub atom_type: AtomType,
}

/// Location of a box inside a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxRange {
    /// Offset of the first header byte.
    pub offset: usize,
    /// Declared box length including the header.
    pub size: usize,
    /// Box type code.
    pub atom_type: AtomType,
}

impl BoxRange {
    /// Offset one past the last byte of the box.
    pub fn end(&self) -> usize {
        self.offset + self.size
    }

    /// Offset of the first payload byte.
    pub fn payload_offset(&self) -> usize {
        self.offset + BOX_HEADER_LEN
    }
}

/// Read the box header starting at `offset`.
///
/// Fails with [`Error::MalformedBox`] if fewer than 8 bytes remain or the
/// declared length is shorter than the header itself. The 64-bit
/// (`size == 1`) and to-end-of-file (`size == 0`) forms are not used by the
/// fragment layout and are rejected the same way.
pub fn read_box_header(buf: &[u8], offset: usize) -> Result<BoxHeader> {
    let header = buf
        .get(offset..)
        .filter(|rest| rest.len() >= BOX_HEADER_LEN)
        .ok_or_else(|| {
            Error::malformed(
                offset,
                format!(
                    "need {} header bytes, have {}",
                    BOX_HEADER_LEN,
                    buf.len().saturating_sub(offset)
                ),
            )
        })?;

    let size = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let atom_type = AtomType::from_bytes([header[4], header[5], header[6], header[7]]);

    if size < BOX_HEADER_LEN {
        return Err(Error::malformed(
            offset,
            format!("{} declares length {}", atom_type, size),
        ));
    }

    Ok(BoxHeader { size, atom_type })
}

/// Read the header at `offset` and require it to be of type `expected`.
pub fn expect_box(buf: &[u8], offset: usize, expected: AtomType) -> Result<BoxRange> {
    let header = read_box_header(buf, offset)?;
    if header.atom_type != expected {
        return Err(Error::UnexpectedBox {
            offset,
            expected,
            found: header.atom_type,
        });
    }
    Ok(BoxRange {
        offset,
        size: header.size,
        atom_type: header.atom_type,
    })
}

/// Find the first immediate child of the container at `container_offset`
/// whose type is `atom_type`.
///
/// The scan starts at the container's first child, or at `resume_from` when
/// continuing a previous scan (pass the previous match's [`BoxRange::end`]).
/// The whole container must lie inside `buf`; a child that overruns its
/// container is malformed.
pub fn find_child_box(
    buf: &[u8],
    container_offset: usize,
    atom_type: AtomType,
    resume_from: Option<usize>,
) -> Result<Option<BoxRange>> {
    let container = read_box_header(buf, container_offset)?;
    let end = container_offset + container.size;
    if end > buf.len() {
        return Err(Error::TruncatedBox {
            offset: container_offset,
            need: container.size,
            have: buf.len() - container_offset,
        });
    }

    let bounded = &buf[..end];
    let mut pos = resume_from.unwrap_or(container_offset + BOX_HEADER_LEN);

    while pos < end {
        let child = read_box_header(bounded, pos)?;
        if pos + child.size > end {
            return Err(Error::malformed(
                pos,
                format!(
                    "{} of length {} overruns {} ending at {}",
                    child.atom_type, child.size, container.atom_type, end
                ),
            ));
        }

        if child.atom_type == atom_type {
            return Ok(Some(BoxRange {
                offset: pos,
                size: child.size,
                atom_type,
            }));
        }

        pos += child.size;
    }

    Ok(None)
}
