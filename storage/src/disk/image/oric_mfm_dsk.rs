//! Oric MFM_DISK images: a decoded MFM byte stream per track, clock bits
//! omitted, with 0xA1/0xC2 bytes standing in for the sync runs. Clock bits
//! are re-synthesised on read; writes flatten the track back to bytes.

use super::DiskImage;
use crate::disk::encodings::mfm::{
    Encoder, MfmEncoder, Shifter, TokenKind, MFM_BIT_LENGTH, MFM_INDEX_SYNC, MFM_SYNC,
};
use crate::disk::pcm::{track_serialisation, PCMSegment, PCMTrack};
use crate::disk::{HeadPosition, Track, TrackAddress};
use crate::Error;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

const TRACK_PAYLOAD: usize = 6250;
const TRACK_STRIDE: u64 = 6400;

pub struct OricMfmDskImage {
    file: std::fs::File,
    head_count: u32,
    track_count: u32,
    geometry_type: u32,
    is_read_only: bool,
}

impl OricMfmDskImage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let (mut file, is_read_only) = super::ssd::open_read_write(path.as_ref())?;

        let mut signature = [0u8; 8];
        file.read_exact(&mut signature)?;
        if &signature != b"MFM_DISK" {
            return Err(Error::InvalidFormat);
        }

        let head_count = file.read_u32::<LittleEndian>()?;
        let track_count = file.read_u32::<LittleEndian>()?;
        let geometry_type = file.read_u32::<LittleEndian>()?;
        if !(1..=2).contains(&geometry_type) || head_count == 0 {
            return Err(Error::InvalidFormat);
        }

        Ok(OricMfmDskImage {
            file,
            head_count,
            track_count,
            geometry_type,
            is_read_only,
        })
    }

    fn file_offset(&self, address: TrackAddress) -> u64 {
        let head = u64::from(address.head);
        let position = address.position.as_int() as u64;
        let index = match self.geometry_type {
            1 => head * u64::from(self.track_count) + position,
            _ => position * u64::from(self.track_count) * u64::from(self.head_count) + head,
        };
        index * TRACK_STRIDE + 256
    }
}

impl DiskImage for OricMfmDskImage {
    fn maximum_head_position(&self) -> HeadPosition {
        HeadPosition::new(self.track_count as i32)
    }

    fn head_count(&self) -> u8 {
        self.head_count.min(255) as u8
    }

    fn track_at(&mut self, address: TrackAddress) -> Option<Box<dyn Track>> {
        if address.position.as_int() as u32 >= self.track_count
            || u32::from(address.head) >= self.head_count
        {
            return None;
        }

        self.file
            .seek(SeekFrom::Start(self.file_offset(address)))
            .ok()?;
        let mut bytes = vec![0u8; TRACK_PAYLOAD];
        self.file.read_exact(&mut bytes).ok()?;

        // The file stores decoded bytes, so control marks must be guessed
        // contextually: an FE after a sync introduces a six-byte header, an
        // FB the sector body whose length the last header declared.
        let mut data = Vec::with_capacity(TRACK_PAYLOAD * 2);
        let mut encoder = MfmEncoder::new(&mut data);
        let mut last_header = [0u8; 6];
        let mut did_sync = false;

        let mut offset = 0usize;
        while offset < TRACK_PAYLOAD {
            let next_byte = bytes[offset];
            offset += 1;

            match next_byte {
                0xa1 => {
                    encoder.output_short(MFM_SYNC);
                    did_sync = true;
                }
                0xc2 => {
                    encoder.output_short(MFM_INDEX_SYNC);
                }
                _ => {
                    encoder.add_byte(next_byte);
                    if did_sync {
                        match next_byte {
                            0xfe => {
                                for byte in 0..6 {
                                    if offset == TRACK_PAYLOAD {
                                        break;
                                    }
                                    last_header[byte] = bytes[offset];
                                    encoder.add_byte(bytes[offset]);
                                    offset += 1;
                                }
                            }
                            0xfb => {
                                let length = (128usize << (last_header[3] & 7)) + 2;
                                for _ in 0..length {
                                    if offset == TRACK_PAYLOAD {
                                        break;
                                    }
                                    encoder.add_byte(bytes[offset]);
                                    offset += 1;
                                }
                            }
                            _ => {}
                        }
                    }
                    did_sync = false;
                }
            }
        }

        Some(Box::new(PCMTrack::from_segment(PCMSegment::from_data(
            data,
            MFM_BIT_LENGTH,
        ))))
    }

    fn store_track_at(&mut self, address: TrackAddress, track: &mut dyn Track) {
        let segment = track_serialisation(track, MFM_BIT_LENGTH);

        // Flatten back to decoded bytes, passing sector bodies through with
        // sync detection off so data can't re-frame the stream.
        let mut shifter = Shifter::new();
        shifter.set_is_double_density(true);
        let mut parsed_track: Vec<u8> = Vec::with_capacity(TRACK_PAYLOAD);
        let mut size: usize = 0;
        let mut body_remaining: usize = 0;
        let mut capture_size = false;

        for bit in 0..segment.number_of_bits {
            shifter.add_input_bit(segment.bit(bit));
            let Some(token) = shifter.take_token() else {
                continue;
            };
            parsed_track.push(token.byte_value);

            if body_remaining > 0 {
                body_remaining -= 1;
                if body_remaining == 0 {
                    shifter.set_should_obey_syncs(true);
                }
                if capture_size && body_remaining == 2 {
                    size = usize::from(*parsed_track.last().unwrap());
                    capture_size = false;
                }
            }

            match token.kind {
                TokenKind::Data | TokenKind::DeletedData => {
                    body_remaining = (128 << (size & 7)) + 2;
                    shifter.set_should_obey_syncs(false);
                }
                TokenKind::Id => {
                    body_remaining = 6;
                    shifter.set_should_obey_syncs(false);
                    capture_size = true;
                }
                _ => {}
            }
        }

        let offset = self.file_offset(address);
        parsed_track.truncate(TRACK_PAYLOAD + 150);
        if self.file.seek(SeekFrom::Start(offset)).is_ok() {
            if let Err(error) = self.file.write_all(&parsed_track) {
                log::error!("track write-back failed: {error}");
            }
        }
    }

    fn is_read_only(&self) -> bool {
        self.is_read_only
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::parser::SectorParser;

    fn temp_path(name: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("emu-oricdsk-{}-{}", std::process::id(), name));
        path
    }

    fn build_image() -> Vec<u8> {
        let mut image = vec![0u8; 256 + 6400];
        image[..8].copy_from_slice(b"MFM_DISK");
        image[8..12].copy_from_slice(&1u32.to_le_bytes()); // heads
        image[12..16].copy_from_slice(&1u32.to_le_bytes()); // tracks
        image[16..20].copy_from_slice(&1u32.to_le_bytes()); // geometry

        // One sector: gap, sync run, header, gap, sync run, 256-byte body.
        let mut track = Vec::with_capacity(6250);
        track.extend_from_slice(&[0x4e; 32]);
        track.extend_from_slice(&[0x00; 12]);
        track.extend_from_slice(&[0xa1, 0xa1, 0xa1, 0xfe]);
        // track 0, side 0, sector 1, size 1, then the header CRC.
        let mut crc = crate::disk::encodings::crc::Crc16::new();
        crc.add_bytes(&[0xa1, 0xa1, 0xa1, 0xfe, 0x00, 0x00, 0x01, 0x01]);
        track.extend_from_slice(&[0x00, 0x00, 0x01, 0x01]);
        track.extend_from_slice(&crc.value().to_be_bytes());

        track.extend_from_slice(&[0x4e; 22]);
        track.extend_from_slice(&[0x00; 12]);
        track.extend_from_slice(&[0xa1, 0xa1, 0xa1, 0xfb]);
        let body: Vec<u8> = (0..256).map(|index| index as u8).collect();
        let mut crc = crate::disk::encodings::crc::Crc16::new();
        crc.add_bytes(&[0xa1, 0xa1, 0xa1, 0xfb]);
        crc.add_bytes(&body);
        track.extend_from_slice(&body);
        track.extend_from_slice(&crc.value().to_be_bytes());
        track.resize(6250, 0x4e);

        image[256..256 + 6250].copy_from_slice(&track);
        image
    }

    #[test]
    fn resynthesises_clock_bits_on_read() {
        let path = temp_path("read.dsk");
        std::fs::write(&path, build_image()).unwrap();

        let mut image = OricMfmDskImage::open(&path).unwrap();
        let track = image
            .track_at(TrackAddress::new(0, HeadPosition::new(0)))
            .expect("no track");

        let mut parser = SectorParser::with_track(true, track);
        let sector = parser.next_sector().expect("no sector");
        assert_eq!(sector.sector, 1);
        assert_eq!(sector.data.len(), 256);
        assert_eq!(sector.data[0x40], 0x40);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn flattens_tracks_on_write() {
        let path = temp_path("write.dsk");
        std::fs::write(&path, build_image()).unwrap();

        let mut image = OricMfmDskImage::open(&path).unwrap();
        let address = TrackAddress::new(0, HeadPosition::new(0));
        let mut track = image.track_at(address).expect("no track");
        image.store_track_at(address, track.as_mut());

        // Rewriting the unmodified track must preserve its sector.
        let track = image.track_at(address).expect("no track");
        let mut parser = SectorParser::with_track(true, track);
        let sector = parser.next_sector().expect("no sector");
        assert_eq!(sector.data[0x40], 0x40);

        let _ = std::fs::remove_file(&path);
    }
}
