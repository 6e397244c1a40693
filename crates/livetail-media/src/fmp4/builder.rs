//! Builders for fragmented MP4 structures.
//!
//! These write just enough of `ftyp`/`moov` and `moof`/`mdat` for the
//! rewriting code to operate on; sample tables and codec configuration are
//! left out. Used to synthesize recordings in tests and tooling.

use bytes::{BufMut, BytesMut};

use crate::mp4::fields::TFHD_BASE_DATA_OFFSET_PRESENT;

/// tfhd flag: default-base-is-moof.
const TFHD_DEFAULT_BASE_IS_MOOF: u32 = 0x020000;

/// trun flags: data-offset-present | sample-size-present.
const TRUN_FLAGS: u32 = 0x000001 | 0x000200;

fn patch_size(buf: &mut BytesMut, start: usize) {
    let size = (buf.len() - start) as u32;
    buf[start..start + 4].copy_from_slice(&size.to_be_bytes());
}

/// Builder for the `ftyp` + `moov` header of a fragmented file.
#[derive(Debug, Clone)]
pub struct HeaderBuilder {
    tracks: u32,
    timescale: u32,
    moov_size: Option<usize>,
}

impl Default for HeaderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HeaderBuilder {
    /// Create a builder for a two-track (video + audio) header.
    pub fn new() -> Self {
        Self {
            tracks: 2,
            timescale: 1000,
            moov_size: None,
        }
    }

    /// Set the number of `trak` boxes.
    pub fn tracks(mut self, tracks: u32) -> Self {
        self.tracks = tracks;
        self
    }

    /// Set the movie timescale.
    pub fn timescale(mut self, timescale: u32) -> Self {
        self.timescale = timescale;
        self
    }

    /// Pad `moov` with a `free` child up to `size` bytes.
    ///
    /// Ignored when `size` is smaller than the natural size plus a `free`
    /// header.
    pub fn moov_size(mut self, size: usize) -> Self {
        self.moov_size = Some(size);
        self
    }

    /// Build the header. The `ftyp` box is always 32 bytes.
    pub fn build(self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(512);
        self.write_ftyp(&mut buf);
        self.write_moov(&mut buf);
        buf.to_vec()
    }

    fn write_ftyp(&self, buf: &mut BytesMut) {
        let brands = [b"isom", b"iso5", b"dash", b"mp42"];
        let size = 8 + 4 + 4 + brands.len() * 4;

        buf.put_u32(size as u32);
        buf.put_slice(b"ftyp");
        buf.put_slice(b"isom"); // major brand
        buf.put_u32(0x200); // minor version
        for brand in &brands {
            buf.put_slice(*brand);
        }
    }

    fn write_moov(&self, buf: &mut BytesMut) {
        let moov_start = buf.len();
        buf.put_u32(0); // placeholder size
        buf.put_slice(b"moov");

        self.write_mvhd(buf);
        for track_id in 1..=self.tracks {
            self.write_trak(buf, track_id);
        }

        if let Some(target) = self.moov_size {
            let natural = buf.len() - moov_start;
            if target >= natural + 8 {
                let pad = target - natural;
                buf.put_u32(pad as u32);
                buf.put_slice(b"free");
                buf.put_bytes(0, pad - 8);
            }
        }

        patch_size(buf, moov_start);
    }

    fn write_mvhd(&self, buf: &mut BytesMut) {
        buf.put_u32(32);
        buf.put_slice(b"mvhd");
        buf.put_u32(0); // version 0, flags
        buf.put_u32(0); // creation time
        buf.put_u32(0); // modification time
        buf.put_u32(self.timescale);
        buf.put_u32(0); // duration: unknown while recording
        buf.put_u32(self.tracks + 1); // next track ID
    }

    fn write_trak(&self, buf: &mut BytesMut, track_id: u32) {
        let trak_start = buf.len();
        buf.put_u32(0);
        buf.put_slice(b"trak");

        buf.put_u32(32);
        buf.put_slice(b"tkhd");
        buf.put_u32(0x000003); // version 0, enabled | in movie
        buf.put_u32(0); // creation time
        buf.put_u32(0); // modification time
        buf.put_u32(track_id);
        buf.put_u32(0); // reserved
        buf.put_u32(0); // duration

        patch_size(buf, trak_start);
    }
}

/// One track's entry in a movie fragment.
#[derive(Debug, Clone)]
pub struct TrackFragment {
    track_id: u32,
    base_data_offset: Option<u64>,
    base_media_decode_time: u64,
    narrow_decode_time: bool,
    sample_sizes: Vec<u32>,
}

impl TrackFragment {
    /// Create a track fragment with an explicit base data offset of 0.
    pub fn new(track_id: u32) -> Self {
        Self {
            track_id,
            base_data_offset: Some(0),
            base_media_decode_time: 0,
            narrow_decode_time: false,
            sample_sizes: Vec::new(),
        }
    }

    /// Set the `tfhd` base data offset.
    pub fn base_data_offset(mut self, offset: u64) -> Self {
        self.base_data_offset = Some(offset);
        self
    }

    /// Leave the base data offset out of `tfhd`.
    pub fn without_base_data_offset(mut self) -> Self {
        self.base_data_offset = None;
        self
    }

    /// Set base media decode time.
    pub fn base_media_decode_time(mut self, time: u64) -> Self {
        self.base_media_decode_time = time;
        self
    }

    /// Write `tfdt` as version 0 with a 32-bit decode time.
    pub fn narrow_decode_time(mut self) -> Self {
        self.narrow_decode_time = true;
        self
    }

    /// Set the sample sizes listed in `trun`.
    pub fn samples(mut self, sizes: Vec<u32>) -> Self {
        self.sample_sizes = sizes;
        self
    }

    fn data_size(&self) -> u64 {
        self.sample_sizes.iter().map(|s| *s as u64).sum()
    }
}

/// Builder for `moof` boxes (and optionally the `mdat` that follows).
#[derive(Debug, Clone)]
pub struct MoofBuilder {
    sequence_number: u32,
    tracks: Vec<TrackFragment>,
}

impl MoofBuilder {
    /// Create a new moof builder.
    pub fn new(sequence_number: u32) -> Self {
        Self {
            sequence_number,
            tracks: Vec::new(),
        }
    }

    /// Append a track fragment (`traf`).
    pub fn track(mut self, track: TrackFragment) -> Self {
        self.tracks.push(track);
        self
    }

    /// Build just the moof box.
    pub fn build(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(256);
        self.write_moof(&mut buf);
        buf.to_vec()
    }

    /// Build moof followed by an mdat holding `payload`.
    pub fn build_with_mdat(&self, payload: &[u8]) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(256 + payload.len());
        self.write_moof(&mut buf);
        buf.put_slice(&mdat(payload));
        buf.to_vec()
    }

    fn write_moof(&self, buf: &mut BytesMut) {
        let moof_start = buf.len();
        buf.put_u32(0); // placeholder
        buf.put_slice(b"moof");

        buf.put_u32(16);
        buf.put_slice(b"mfhd");
        buf.put_u32(0); // version/flags
        buf.put_u32(self.sequence_number);

        let mut data_offset_fields = Vec::with_capacity(self.tracks.len());
        for track in &self.tracks {
            data_offset_fields.push(Self::write_traf(buf, track));
        }

        patch_size(buf, moof_start);

        // trun data offsets are relative to the moof start; samples of each
        // track follow the previous track's inside the single mdat.
        let moof_size = buf.len() - moof_start;
        let mut data_offset = moof_size as u64 + 8;
        for (pos, track) in data_offset_fields.into_iter().zip(&self.tracks) {
            buf[pos..pos + 4].copy_from_slice(&(data_offset as u32).to_be_bytes());
            data_offset += track.data_size();
        }
    }

    /// Returns the position of the trun data offset placeholder.
    fn write_traf(buf: &mut BytesMut, track: &TrackFragment) -> usize {
        let traf_start = buf.len();
        buf.put_u32(0);
        buf.put_slice(b"traf");

        match track.base_data_offset {
            Some(offset) => {
                buf.put_u32(24);
                buf.put_slice(b"tfhd");
                buf.put_u32(TFHD_DEFAULT_BASE_IS_MOOF | TFHD_BASE_DATA_OFFSET_PRESENT);
                buf.put_u32(track.track_id);
                buf.put_u64(offset);
            }
            None => {
                buf.put_u32(16);
                buf.put_slice(b"tfhd");
                buf.put_u32(TFHD_DEFAULT_BASE_IS_MOOF);
                buf.put_u32(track.track_id);
            }
        }

        if track.narrow_decode_time {
            buf.put_u32(16);
            buf.put_slice(b"tfdt");
            buf.put_u32(0); // version 0
            buf.put_u32(track.base_media_decode_time as u32);
        } else {
            buf.put_u32(20);
            buf.put_slice(b"tfdt");
            buf.put_u32(0x01000000); // version 1
            buf.put_u64(track.base_media_decode_time);
        }

        buf.put_u32((20 + track.sample_sizes.len() * 4) as u32);
        buf.put_slice(b"trun");
        buf.put_u32(TRUN_FLAGS);
        buf.put_u32(track.sample_sizes.len() as u32);
        let data_offset_pos = buf.len();
        buf.put_u32(0); // placeholder
        for size in &track.sample_sizes {
            buf.put_u32(*size);
        }

        patch_size(buf, traf_start);
        data_offset_pos
    }
}

/// Serialize an mdat box around `payload`.
pub fn mdat(payload: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(payload.len() + 8);
    buf.put_u32((payload.len() + 8) as u32);
    buf.put_slice(b"mdat");
    buf.put_slice(payload);
    buf.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mp4::{find_child_box, read_box_header, AtomType};

    #[test]
    fn test_moof_builder_layout() {
        let data = MoofBuilder::new(7)
            .track(TrackFragment::new(1).samples(vec![100, 200]))
            .track(TrackFragment::new(2).samples(vec![50]))
            .build_with_mdat(&[0u8; 350]);

        let moof = read_box_header(&data, 0).unwrap();
        assert_eq!(moof.atom_type, AtomType::MOOF);
        let mdat = read_box_header(&data, moof.size).unwrap();
        assert_eq!(mdat.atom_type, AtomType::MDAT);
        assert_eq!(mdat.size, 358);
        assert_eq!(moof.size + mdat.size, data.len());

        let mfhd = find_child_box(&data, 0, AtomType::MFHD, None)
            .unwrap()
            .unwrap();
        assert_eq!(mfhd.offset, 8);
        let first = find_child_box(&data, 0, AtomType::TRAF, None)
            .unwrap()
            .unwrap();
        assert_eq!(first.offset, mfhd.end());
    }

    #[test]
    fn test_header_builder_default_tracks() {
        let data = HeaderBuilder::new().build();
        assert_eq!(&data[4..8], b"ftyp");
        assert_eq!(&data[36..40], b"moov");
    }

    #[test]
    fn test_moov_padding_too_small_is_ignored() {
        let natural = HeaderBuilder::new().build();
        let padded = HeaderBuilder::new().moov_size(natural.len() - 32 + 4).build();
        assert_eq!(natural, padded);
    }
}
