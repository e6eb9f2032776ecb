//! Commodore G64 images: raw GCR byte streams at half-track positions,
//! with optional per-byte speed zones. Read-only.

use super::DiskImage;
use crate::disk::pcm::{PCMSegment, PCMTrack};
use crate::disk::{HeadPosition, Track, TrackAddress};
use crate::Error;
use byteorder::{LittleEndian, ReadBytesExt};
use clocking::Time;
use log::debug;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

pub struct G64Image {
    file: File,
    number_of_tracks: u8,
    maximum_track_size: u16,
}

/// Cell length per speed zone, in quarter-microseconds: zone 3 is the
/// fastest at 3.25 µs per bit, zone 0 the slowest at 4 µs.
fn cell_length_for_zone(zone: u8) -> Time {
    Time::new(16 - u32::from(zone & 3), 4_000_000)
}

impl G64Image {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let mut file = File::open(path)?;

        let mut signature = [0u8; 8];
        file.read_exact(&mut signature)?;
        if &signature != b"GCR-1541" {
            return Err(Error::InvalidFormat);
        }

        let version = file.read_u8()?;
        if version != 0 {
            return Err(Error::UnknownVersion);
        }

        let number_of_tracks = file.read_u8()?;
        let maximum_track_size = file.read_u16::<LittleEndian>()?;

        Ok(G64Image {
            file,
            number_of_tracks,
            maximum_track_size,
        })
    }
}

impl DiskImage for G64Image {
    fn maximum_head_position(&self) -> HeadPosition {
        // At least the normal 84 half-track geometry; more if present.
        HeadPosition::from_quarters(i32::from(self.number_of_tracks.max(84)) * 2)
    }

    fn track_at(&mut self, address: TrackAddress) -> Option<Box<dyn Track>> {
        // G64 positions are half tracks.
        let index = address.position.as_quarters() / 2;
        if address.head != 0 || index < 0 || index >= i32::from(self.number_of_tracks) {
            return None;
        }
        let index = index as u32;

        // The track offset table sits at 0xc; zero means absent.
        self.file
            .seek(SeekFrom::Start(u64::from(index) * 4 + 0xc))
            .ok()?;
        let track_offset = self.file.read_u32::<LittleEndian>().ok()?;
        if track_offset == 0 {
            return None;
        }

        self.file.seek(SeekFrom::Start(u64::from(track_offset))).ok()?;
        let track_length = self.file.read_u16::<LittleEndian>().ok()?;
        if track_length == 0 || track_length > self.maximum_track_size {
            return None;
        }

        let mut contents = vec![0u8; usize::from(track_length)];
        self.file.read_exact(&mut contents).ok()?;

        // The speed zone table sits at 0x15c. Values of three or less name
        // a constant zone; larger values point at a per-byte zone map, two
        // bits per track byte.
        self.file
            .seek(SeekFrom::Start(u64::from(index) * 4 + 0x15c))
            .ok()?;
        let speed_zone_offset = self.file.read_u32::<LittleEndian>().ok()?;

        if speed_zone_offset > 3 {
            let map_length = (usize::from(track_length) + 3) >> 2;
            let mut zone_map = vec![0u8; map_length];
            self.file
                .seek(SeekFrom::Start(u64::from(speed_zone_offset)))
                .ok()?;
            self.file.read_exact(&mut zone_map).ok()?;

            // Group consecutive bytes of equal zone into segments.
            let mut segments: Vec<PCMSegment> = Vec::new();
            for (byte_index, byte) in contents.iter().enumerate() {
                let zone = (zone_map[byte_index >> 2] >> (6 - 2 * (byte_index & 3))) & 3;
                let cell = cell_length_for_zone(zone);
                match segments.last_mut() {
                    Some(segment) if segment.length_of_a_bit == cell => {
                        segment.data.push(*byte);
                        segment.number_of_bits += 8;
                    }
                    _ => segments.push(PCMSegment::from_data(vec![*byte], cell)),
                }
            }
            debug!(
                "half-track {index}: byte-resolution speed zones, {} segments",
                segments.len()
            );
            Some(Box::new(PCMTrack::new(segments)))
        } else {
            Some(Box::new(PCMTrack::from_segment(PCMSegment::from_data(
                contents,
                cell_length_for_zone(speed_zone_offset as u8),
            ))))
        }
    }
}
