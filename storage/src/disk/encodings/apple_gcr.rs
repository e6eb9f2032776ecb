//! Apple group-coded recording: the 6-and-2 nibble translation plus the
//! Macintosh (Sony drive) sector layout, which is what GCR Macintosh disk
//! images are expanded with.

use crate::disk::pcm::PCMSegment;
use clocking::Time;

const SIX_AND_TWO: [u8; 64] = [
    0x96, 0x97, 0x9a, 0x9b, 0x9d, 0x9e, 0x9f, 0xa6, //
    0xa7, 0xab, 0xac, 0xad, 0xae, 0xaf, 0xb2, 0xb3, //
    0xb4, 0xb5, 0xb6, 0xb7, 0xb9, 0xba, 0xbb, 0xbc, //
    0xbd, 0xbe, 0xbf, 0xcb, 0xcd, 0xce, 0xcf, 0xd3, //
    0xd6, 0xd7, 0xd9, 0xda, 0xdb, 0xdc, 0xdd, 0xde, //
    0xdf, 0xe5, 0xe6, 0xe7, 0xe9, 0xea, 0xeb, 0xec, //
    0xed, 0xee, 0xef, 0xf2, 0xf3, 0xf4, 0xf5, 0xf6, //
    0xf7, 0xf9, 0xfa, 0xfb, 0xfc, 0xfd, 0xfe, 0xff, //
];

#[must_use]
pub fn six_and_two(value: u8) -> u8 {
    SIX_AND_TWO[(value & 0x3f) as usize]
}

/// Produces `length` sync bytes, each an 0xff aligned to the start of a
/// nine-bit window, the window size 6-and-2 encoding uses; the trailing
/// window bit is left clear, which is exactly the self-synchronising
/// property the drive relies on.
#[must_use]
pub fn six_and_two_sync(length: usize) -> PCMSegment {
    const BIT_SIZE: u32 = 9;

    let mut segment = PCMSegment::new(Time::ONE);
    segment
        .data
        .resize((length * BIT_SIZE as usize).div_ceil(8), 0);

    for _ in 0..length {
        let bits = segment.number_of_bits;
        segment.data[(bits >> 3) as usize] |= 0xff >> (bits & 7);
        if bits & 7 != 0 {
            segment.data[(1 + (bits >> 3)) as usize] |= 0xff << (8 - (bits & 7));
        }
        segment.number_of_bits += BIT_SIZE;
    }

    segment
}

/// The Macintosh 400/800K layout: 80 tracks in five speed zones of
/// sixteen, carrying 12 down to 8 sectors per track per side.
pub mod macintosh {
    use super::*;

    pub const SECTOR_PLUS_TAGS_SIZE: usize = 524;

    /// The range of sector indices a given head position covers within a
    /// single side's sequential sector numbering.
    #[must_use]
    pub fn sectors_in_track(position: i32) -> (i32, i32) {
        let zone = (position >> 4).clamp(0, 4);
        let length = 12 - zone;

        let mut start = 0;
        for earlier_zone in 0..zone {
            start += 16 * (12 - earlier_zone);
        }
        start += (position - (zone << 4)) * length;

        (start, length)
    }

    /// A sector header: prologue, four 6-and-2 encoded fields, checksum
    /// and epilogue.
    #[must_use]
    pub fn header(format: u8, track: u8, sector: u8, is_side_two: bool) -> PCMSegment {
        let side = ((track >> 6) & 1) | if is_side_two { 0x20 } else { 0x00 };
        let checksum = (track ^ sector ^ side ^ format) & 0x3f;

        PCMSegment::from_data(
            vec![
                0xd5,
                0xaa,
                0x96,
                six_and_two(track),
                six_and_two(sector),
                six_and_two(side),
                six_and_two(format),
                six_and_two(checksum),
                0xde,
                0xaa,
            ],
            Time::ONE,
        )
    }

    /// A sector body: 12 tag bytes plus 512 data bytes, 6-and-2 encoded
    /// three at a time under the Sony rolling checksum.
    #[must_use]
    pub fn data(sector: u8, contents: &[u8; SECTOR_PLUS_TAGS_SIZE]) -> PCMSegment {
        let mut bytes = Vec::with_capacity(710);
        bytes.extend_from_slice(&[0xd5, 0xaa, 0xad, six_and_two(sector)]);

        let mut c1: u32 = 0;
        let mut c2: u32 = 0;
        let mut c3: u32 = 0;
        let mut index = 0;

        while index < SECTOR_PLUS_TAGS_SIZE {
            c1 = (c1 << 1) & 0x1ff;
            if c1 & 0x100 != 0 {
                c1 += 1;
            }

            let v1 = u32::from(contents[index]);
            c3 += v1;
            if c1 & 0x100 != 0 {
                c3 += 1;
                c1 &= 0xff;
            }
            let o1 = (v1 ^ c1) as u8;

            let v2 = u32::from(contents[index + 1]);
            c2 += v2;
            if c3 > 0xff {
                c2 += 1;
                c3 &= 0xff;
            }
            let o2 = (v2 ^ c3) as u8;
            index += 2;

            let o3 = if index < SECTOR_PLUS_TAGS_SIZE {
                let v3 = u32::from(contents[index]);
                c1 += v3;
                if c2 > 0xff {
                    c1 += 1;
                    c2 &= 0xff;
                }
                index += 1;
                Some((v3 ^ c2) as u8)
            } else {
                None
            };

            let top = ((o1 & 0xc0) >> 2)
                | ((o2 & 0xc0) >> 4)
                | (o3.map_or(0, |o3| (o3 & 0xc0) >> 6));
            bytes.push(six_and_two(top));
            bytes.push(six_and_two(o1));
            bytes.push(six_and_two(o2));
            if let Some(o3) = o3 {
                bytes.push(six_and_two(o3));
            }
        }

        let top = (((c1 & 0xc0) >> 2) | ((c2 & 0xc0) >> 4) | ((c3 & 0xc0) >> 6)) as u8;
        bytes.push(six_and_two(top));
        bytes.push(six_and_two(c1 as u8));
        bytes.push(six_and_two(c2 as u8));
        bytes.push(six_and_two(c3 as u8));

        bytes.extend_from_slice(&[0xde, 0xaa]);
        PCMSegment::from_data(bytes, Time::ONE)
    }
}
