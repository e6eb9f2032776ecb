//! Acorn ADFS sector dumps: 80 tracks of sixteen 256-byte MFM sectors.

use super::DiskImage;
use crate::disk::encodings::mfm::{mfm_track_with_sectors, Sector};
use crate::disk::parser::SectorParser;
use crate::disk::{HeadPosition, Track, TrackAddress};
use crate::Error;
use log::warn;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

const SECTORS_PER_TRACK: u64 = 16;
const SECTOR_SIZE: u64 = 256;
const TRACK_BYTES: u64 = SECTORS_PER_TRACK * SECTOR_SIZE;

pub struct AdfImage {
    file: File,
    track_count: u32,
    is_read_only: bool,
}

impl AdfImage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let (mut file, is_read_only) = super::ssd::open_read_write(path.as_ref())?;

        let size = file.metadata()?.len();
        if size == 0 || size % SECTOR_SIZE != 0 {
            return Err(Error::InvalidFormat);
        }

        // ADFS volumes carry 'Hugo' at the start of the old directory,
        // one byte into sector 2.
        let mut hugo = [0u8; 4];
        file.seek(SeekFrom::Start(0x201))?;
        file.read_exact(&mut hugo)?;
        if &hugo != b"Hugo" {
            return Err(Error::InvalidFormat);
        }

        let track_count = size.div_ceil(TRACK_BYTES) as u32;
        Ok(AdfImage {
            file,
            track_count,
            is_read_only,
        })
    }

    fn file_offset(&self, address: TrackAddress) -> u64 {
        address.position.as_int() as u64 * TRACK_BYTES
    }
}

impl DiskImage for AdfImage {
    fn maximum_head_position(&self) -> HeadPosition {
        HeadPosition::new(80)
    }

    fn track_at(&mut self, address: TrackAddress) -> Option<Box<dyn Track>> {
        if address.head != 0 || address.position.as_int() as u32 >= self.track_count {
            return None;
        }

        let offset = self.file_offset(address);
        let mut data = vec![0u8; TRACK_BYTES as usize];
        self.file.seek(SeekFrom::Start(offset)).ok()?;
        if let Err(error) = self.file.read_exact(&mut data) {
            warn!("short read of track data at {offset:#x}: {error}");
            return None;
        }

        let sectors: Vec<Sector> = (0..SECTORS_PER_TRACK as usize)
            .map(|index| Sector {
                track: address.position.as_int() as u8,
                side: 0,
                sector: index as u8,
                is_deleted: false,
                data: data[index * SECTOR_SIZE as usize..(index + 1) * SECTOR_SIZE as usize]
                    .to_vec(),
            })
            .collect();

        Some(Box::new(mfm_track_with_sectors(&sectors)))
    }

    fn store_track_at(&mut self, address: TrackAddress, track: &mut dyn Track) {
        let mut parser = SectorParser::with_track(true, track.clone_track());
        let sectors = parser.track_sectors();
        let base = self.file_offset(address);

        for sector in sectors {
            if u64::from(sector.sector) >= SECTORS_PER_TRACK || sector.data.len() != 256 {
                warn!(
                    "ignoring out-of-geometry sector {} on write-back",
                    sector.sector
                );
                continue;
            }
            let offset = base + u64::from(sector.sector) * SECTOR_SIZE;
            if self.file.seek(SeekFrom::Start(offset)).is_ok() {
                if let Err(error) = self.file.write_all(&sector.data) {
                    log::error!("sector write-back failed: {error}");
                }
            }
        }
    }

    fn is_read_only(&self) -> bool {
        self.is_read_only
    }
}
