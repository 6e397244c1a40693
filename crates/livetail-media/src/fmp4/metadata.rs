//! Fragment metadata and rebasing.

use crate::{Error, Result};

/// Per-track timing fields of a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackTiming {
    /// `tfhd` base data offset, if the fragment carries one.
    pub base_data_offset: Option<u64>,
    /// `tfdt` base media decode time.
    pub base_media_decode_time: u64,
}

/// The mutable fields of a fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentMetadata {
    /// `mfhd` sequence number.
    pub sequence_number: u32,
    /// One entry per `traf`, in box order.
    pub tracks: Vec<TrackTiming>,
}

impl FragmentMetadata {
    /// Move this fragment's fields from the live numbering onto the baseline
    /// numbering.
    ///
    /// Each field becomes `(self - starting) + baseline`, computed with
    /// wrapping arithmetic, so a fragment equal to `starting` maps exactly to
    /// `baseline` and later fragments keep their distance from it. A base
    /// data offset is only rebased when all three fragments carry one;
    /// otherwise the live value is kept.
    pub fn rebase(&self, starting: &Self, baseline: &Self) -> Result<Self> {
        for other in [starting, baseline] {
            if other.tracks.len() != self.tracks.len() {
                return Err(Error::TrackCountMismatch {
                    expected: other.tracks.len(),
                    found: self.tracks.len(),
                });
            }
        }

        let tracks = self
            .tracks
            .iter()
            .zip(&starting.tracks)
            .zip(&baseline.tracks)
            .map(|((live, start), base)| TrackTiming {
                base_data_offset: match (
                    live.base_data_offset,
                    start.base_data_offset,
                    base.base_data_offset,
                ) {
                    (Some(live), Some(start), Some(base)) => {
                        Some(live.wrapping_sub(start).wrapping_add(base))
                    }
                    (live, _, _) => live,
                },
                base_media_decode_time: live
                    .base_media_decode_time
                    .wrapping_sub(start.base_media_decode_time)
                    .wrapping_add(base.base_media_decode_time),
            })
            .collect();

        Ok(Self {
            sequence_number: self
                .sequence_number
                .wrapping_sub(starting.sequence_number)
                .wrapping_add(baseline.sequence_number),
            tracks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(sequence_number: u32, offset: u64, time: u64) -> FragmentMetadata {
        FragmentMetadata {
            sequence_number,
            tracks: vec![
                TrackTiming {
                    base_data_offset: Some(offset),
                    base_media_decode_time: time,
                },
                TrackTiming {
                    base_data_offset: Some(offset * 2),
                    base_media_decode_time: time * 48,
                },
            ],
        }
    }

    #[test]
    fn test_starting_fragment_maps_to_baseline() {
        let baseline = metadata(1, 600, 0);
        let starting = metadata(500, 9_000_000, 450_000);
        assert_eq!(starting.rebase(&starting, &baseline).unwrap(), baseline);
    }

    #[test]
    fn test_sequence_continuity() {
        let baseline = metadata(1, 600, 0);
        let live: Vec<FragmentMetadata> = [500u32, 501, 503, 510]
            .iter()
            .map(|s| metadata(*s, 0, 0))
            .collect();

        let emitted: Vec<u32> = live
            .iter()
            .map(|m| m.rebase(&live[0], &baseline).unwrap().sequence_number)
            .collect();
        assert_eq!(emitted, vec![1, 2, 4, 11]);
    }

    #[test]
    fn test_timing_keeps_live_deltas() {
        let baseline = metadata(1, 1_000, 10);
        let starting = metadata(20, 50_000, 90_000);
        let later = metadata(21, 53_000, 93_000);

        let rebased = later.rebase(&starting, &baseline).unwrap();
        assert_eq!(rebased.sequence_number, 2);
        assert_eq!(rebased.tracks[0].base_data_offset, Some(4_000));
        assert_eq!(rebased.tracks[0].base_media_decode_time, 3_010);
        assert_eq!(rebased.tracks[1].base_data_offset, Some(8_000));
        assert_eq!(
            rebased.tracks[1].base_media_decode_time,
            93_000 * 48 - 90_000 * 48 + 480
        );
    }

    #[test]
    fn test_wrapping_sequence_number() {
        let baseline = metadata(u32::MAX, 0, 0);
        let starting = metadata(10, 0, 0);
        let later = metadata(12, 0, 0);
        assert_eq!(
            later.rebase(&starting, &baseline).unwrap().sequence_number,
            1
        );
    }

    #[test]
    fn test_missing_data_offset_keeps_live_value() {
        let mut baseline = metadata(1, 100, 0);
        baseline.tracks[0].base_data_offset = None;
        let starting = metadata(5, 700, 0);
        let rebased = metadata(6, 900, 0).rebase(&starting, &baseline).unwrap();
        assert_eq!(rebased.tracks[0].base_data_offset, Some(900));
        assert_eq!(rebased.tracks[1].base_data_offset, Some(600));
    }

    #[test]
    fn test_track_count_mismatch() {
        let baseline = metadata(1, 0, 0);
        let mut live = metadata(2, 0, 0);
        live.tracks.pop();
        assert!(matches!(
            live.rebase(&live.clone(), &baseline),
            Err(Error::TrackCountMismatch {
                expected: 2,
                found: 1
            })
        ));
    }
}
