//! Macintosh disk images: raw 400/800K sector dumps and DiskCopy 4.2
//! archives, expanded to GCR (or MFM) tracks on demand. Read-only.

use super::DiskImage;
use crate::disk::encodings::apple_gcr::{self, macintosh};
use crate::disk::encodings::mfm::{mfm_track_with_sectors, Sector};
use crate::disk::pcm::PCMTrack;
use crate::disk::{HeadPosition, Track, TrackAddress};
use crate::Error;
use byteorder::{BigEndian, ReadBytesExt};
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Encoding {
    Gcr400,
    Gcr800,
    Mfm720,
    Mfm1440,
}

pub struct MacintoshImgImage {
    data: Vec<u8>,
    tags: Vec<u8>,
    encoding: Encoding,
    format: u8,
}

/// The DiskCopy 4.2 checksum: each big-endian word is added to a 32-bit
/// accumulator, which is then rotated right one bit.
fn checksum(data: &[u8], bytes_to_skip: usize) -> u32 {
    let mut result: u32 = 0;
    let mut index = bytes_to_skip;
    while index + 1 < data.len() {
        let word = u32::from(u16::from_be_bytes([data[index], data[index + 1]]));
        result = result.wrapping_add(word);
        result = (result >> 1) | (result << 31);
        index += 2;
    }
    result
}

impl MacintoshImgImage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let mut file = std::fs::File::open(path)?;
        let file_size = file.metadata()?.len();

        // A raw sector dump starts with the boot-block magic 0x4C4B6000 and
        // is exactly one or two sides of 409600 bytes. 0x4c is an invalid
        // name length for DiskCopy 4.2, so the two cannot be confused.
        let name_length = file.read_u8()?;
        if name_length == 0x4c {
            if file_size != 819_200 && file_size != 409_600 {
                return Err(Error::InvalidFormat);
            }
            if file.read_u24::<BigEndian>()? != 0x4b_6000 {
                return Err(Error::InvalidFormat);
            }

            file.seek(SeekFrom::Start(0))?;
            let mut data = Vec::with_capacity(file_size as usize);
            file.read_to_end(&mut data)?;

            let (encoding, format) = if file_size == 819_200 {
                (Encoding::Gcr800, 0x22)
            } else {
                (Encoding::Gcr400, 0x02)
            };
            return Ok(MacintoshImgImage {
                data,
                tags: Vec::new(),
                encoding,
                format,
            });
        }

        // DiskCopy 4.2: a 64-byte Pascal-string name, then block lengths,
        // checksums, encoding, format and the 0x0100 magic word.
        if name_length > 64 {
            return Err(Error::InvalidFormat);
        }

        file.seek(SeekFrom::Start(64))?;
        let data_block_length = file.read_u32::<BigEndian>()? as usize;
        let tag_block_length = file.read_u32::<BigEndian>()? as usize;
        let data_checksum = file.read_u32::<BigEndian>()?;
        let tag_checksum = file.read_u32::<BigEndian>()?;

        if data_block_length == 0 {
            return Err(Error::InvalidFormat);
        }

        let encoding = match file.read_u8()? {
            0 => Encoding::Gcr400,
            1 => Encoding::Gcr800,
            2 => Encoding::Mfm720,
            3 => Encoding::Mfm1440,
            _ => return Err(Error::InvalidFormat),
        };
        let format = file.read_u8()?;

        if file.read_u16::<BigEndian>()? != 0x0100 {
            return Err(Error::InvalidFormat);
        }

        let mut data = vec![0u8; data_block_length];
        file.read_exact(&mut data).map_err(|_| Error::InvalidFormat)?;
        let mut tags = vec![0u8; tag_block_length];
        file.read_exact(&mut tags).map_err(|_| Error::InvalidFormat)?;

        // Both checksums must match; tags skip the first sector's worth.
        if checksum(&data, 0) != data_checksum || checksum(&tags, 12) != tag_checksum {
            return Err(Error::InvalidFormat);
        }

        Ok(MacintoshImgImage {
            data,
            tags,
            encoding,
            format,
        })
    }

    fn gcr_track(&self, address: TrackAddress) -> Option<PCMTrack> {
        let position = address.position.as_int();
        let (start, length) = macintosh::sectors_in_track(position);
        let start_sector =
            (start * i32::from(self.head_count()) + length * i32::from(address.head)) as usize;

        if start_sector * 512 >= self.data.len() {
            return None;
        }

        let mut segment = apple_gcr::six_and_two_sync(24);

        for index in 0..length as usize {
            let sector_id = index as u8;
            let offset = (start_sector + index) * 512;

            let mut sector_plus_tags = [0u8; macintosh::SECTOR_PLUS_TAGS_SIZE];
            let tag_offset = (start_sector + index) * 12;
            if self.tags.len() >= tag_offset + 12 {
                sector_plus_tags[..12].copy_from_slice(&self.tags[tag_offset..tag_offset + 12]);
            }
            sector_plus_tags[12..].copy_from_slice(&self.data[offset..offset + 512]);

            segment.extend(&macintosh::header(
                self.format,
                position as u8,
                sector_id,
                address.head != 0,
            ));
            segment.extend(&apple_gcr::six_and_two_sync(7));
            segment.extend(&macintosh::data(sector_id, &sector_plus_tags));
            segment.extend(&apple_gcr::six_and_two_sync(20));
        }

        Some(PCMTrack::from_segment(segment))
    }

    fn mfm_track(&self, address: TrackAddress) -> Option<PCMTrack> {
        let sectors_per_track = if self.encoding == Encoding::Mfm1440 { 18 } else { 9 };
        let position = address.position.as_int();
        let start_sector = (position as usize * usize::from(self.head_count())
            + usize::from(address.head))
            * sectors_per_track;
        if (start_sector + sectors_per_track) * 512 > self.data.len() {
            return None;
        }

        let sectors: Vec<Sector> = (0..sectors_per_track)
            .map(|index| Sector {
                track: position as u8,
                side: address.head,
                sector: index as u8 + 1,
                is_deleted: false,
                data: self.data[(start_sector + index) * 512..][..512].to_vec(),
            })
            .collect();
        Some(mfm_track_with_sectors(&sectors))
    }

    fn build_track(&self, address: TrackAddress) -> Option<PCMTrack> {
        if address.head >= self.head_count() || !(0..80).contains(&address.position.as_int()) {
            return None;
        }
        match self.encoding {
            Encoding::Gcr400 | Encoding::Gcr800 => self.gcr_track(address),
            Encoding::Mfm720 | Encoding::Mfm1440 => self.mfm_track(address),
        }
    }
}

impl DiskImage for MacintoshImgImage {
    fn maximum_head_position(&self) -> HeadPosition {
        HeadPosition::new(80)
    }

    fn head_count(&self) -> u8 {
        // Bit 5 of the format byte means double sided, GCR or MFM alike.
        1 + ((self.format & 0x20) >> 5)
    }

    fn track_at(&mut self, address: TrackAddress) -> Option<Box<dyn Track>> {
        self.build_track(address)
            .map(|track| Box::new(track) as Box<dyn Track>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("emu-macimg-{}-{}", std::process::id(), name));
        path
    }

    fn raw_800k_image() -> Vec<u8> {
        let mut data = vec![0u8; 819_200];
        data[0] = 0x4c;
        data[1] = 0x4b;
        data[2] = 0x60;
        data[3] = 0x00;
        data
    }

    /// The GCR size of one track: a leading sync run plus, per sector, a
    /// header, an inter-field sync, a 709-byte data field and a trailing
    /// sync run.
    fn expected_track_bits(sectors: u64) -> u64 {
        24 * 9 + sectors * (10 * 8 + 7 * 9 + 709 * 8 + 20 * 9)
    }

    #[test]
    fn format_0x22_raw_dump_is_gcr_with_twelve_sectors_at_track_zero() {
        let path = temp_path("raw.img");
        std::fs::write(&path, raw_800k_image()).unwrap();

        let image = MacintoshImgImage::open(&path).unwrap();
        assert_eq!(image.format, 0x22);
        assert_eq!(image.head_count(), 2);

        let track = image
            .build_track(TrackAddress::new(0, HeadPosition::new(0)))
            .expect("no track");
        assert_eq!(track.number_of_bits(), expected_track_bits(12));

        // The innermost zone drops to eight sectors per track.
        let track = image
            .build_track(TrackAddress::new(1, HeadPosition::new(79)))
            .expect("no track");
        assert_eq!(track.number_of_bits(), expected_track_bits(8));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn diskcopy_42_header_is_validated_with_checksums() {
        let data_block: Vec<u8> = (0..409_600u32).map(|index| index as u8).collect();
        let mut image = vec![0u8; 84];
        image[0] = 4;
        image[1..5].copy_from_slice(b"test");
        image[64..68].copy_from_slice(&(data_block.len() as u32).to_be_bytes());
        image[68..72].copy_from_slice(&0u32.to_be_bytes()); // no tags
        image[72..76].copy_from_slice(&checksum(&data_block, 0).to_be_bytes());
        image[76..80].copy_from_slice(&0u32.to_be_bytes()); // empty tag checksum
        image[80] = 0; // GCR 400K
        image[81] = 0x02;
        image[82..84].copy_from_slice(&0x0100u16.to_be_bytes());
        image.extend_from_slice(&data_block);

        let path = temp_path("dc42.img");
        std::fs::write(&path, &image).unwrap();
        let opened = MacintoshImgImage::open(&path).unwrap();
        assert_eq!(opened.head_count(), 1);
        assert_eq!(opened.encoding, Encoding::Gcr400);

        // Corrupt one data byte: the checksum must now fail the load.
        let mut broken = image.clone();
        broken[100] ^= 0x80;
        std::fs::write(&path, &broken).unwrap();
        assert!(matches!(
            MacintoshImgImage::open(&path),
            Err(Error::InvalidFormat)
        ));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn diskcopy_checksum_is_a_rotating_word_sum() {
        assert_eq!(checksum(&[0x00, 0x01], 0), 0x8000_0000);
        assert_eq!(checksum(&[0x00, 0x01, 0x00, 0x01], 0), 0xc000_0000);
        // Skipping leading bytes skips whole words.
        assert_eq!(checksum(&[0xff, 0xff, 0x00, 0x01], 2), 0x8000_0000);
    }

    #[test]
    fn rejects_truncated_raw_dumps() {
        let path = temp_path("short.img");
        let mut data = raw_800k_image();
        data.truncate(100_000);
        std::fs::write(&path, data).unwrap();
        assert!(matches!(
            MacintoshImgImage::open(&path),
            Err(Error::InvalidFormat)
        ));
        let _ = std::fs::remove_file(&path);
    }
}
