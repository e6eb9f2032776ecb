//! Acorn DFS sector dumps: SSD (single sided) and DSD (double sided,
//! track-interleaved). Ten 256-byte FM sectors per track.

use super::DiskImage;
use crate::disk::encodings::mfm::{fm_track_with_sectors, Sector};
use crate::disk::parser::SectorParser;
use crate::disk::{HeadPosition, Track, TrackAddress};
use crate::Error;
use byteorder::ReadBytesExt;
use log::warn;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

const SECTORS_PER_TRACK: u64 = 10;
const SECTOR_SIZE: u64 = 256;
const TRACK_BYTES: u64 = SECTORS_PER_TRACK * SECTOR_SIZE;

pub struct SsdImage {
    file: File,
    head_count: u8,
    track_count: u32,
    is_read_only: bool,
}

pub(super) fn open_read_write(path: &Path) -> Result<(File, bool), std::io::Error> {
    match OpenOptions::new().read(true).write(true).open(path) {
        Ok(file) => Ok((file, false)),
        Err(_) => File::open(path).map(|file| (file, true)),
    }
}

impl SsdImage {
    /// Opens an SSD or DSD file; `is_double_sided` distinguishes the two,
    /// the file layouts being otherwise identical.
    pub fn open(path: impl AsRef<Path>, is_double_sided: bool) -> Result<Self, Error> {
        let (mut file, is_read_only) = open_read_write(path.as_ref())?;

        let head_count = if is_double_sided { 2 } else { 1 };
        let size = file.metadata()?.len();

        // DFS images are bare dumps; the only structural check available is
        // that the size is sector-aligned and small enough for the format.
        if size == 0
            || size % SECTOR_SIZE != 0
            || size > TRACK_BYTES * 80 * u64::from(head_count)
        {
            return Err(Error::InvalidFormat);
        }

        // A catalogue sanity check: byte 0x106 holds the option byte, whose
        // top nibble only uses its low two bits.
        file.seek(SeekFrom::Start(0x106))?;
        let options = file.read_u8()?;
        if options & 0xcc != 0 {
            return Err(Error::InvalidFormat);
        }

        let track_count = (size / (TRACK_BYTES * u64::from(head_count))) as u32;
        Ok(SsdImage {
            file,
            head_count,
            track_count,
            is_read_only,
        })
    }

    fn file_offset(&self, address: TrackAddress) -> u64 {
        let position = address.position.as_int() as u64;
        (position * u64::from(self.head_count) + u64::from(address.head)) * TRACK_BYTES
    }
}

impl DiskImage for SsdImage {
    fn maximum_head_position(&self) -> HeadPosition {
        HeadPosition::new(if self.track_count > 40 { 80 } else { 40 })
    }

    fn head_count(&self) -> u8 {
        self.head_count
    }

    fn track_at(&mut self, address: TrackAddress) -> Option<Box<dyn Track>> {
        if address.head >= self.head_count
            || address.position.as_int() as u32 >= self.track_count
        {
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

        Some(Box::new(fm_track_with_sectors(&sectors)))
    }

    fn store_track_at(&mut self, address: TrackAddress, track: &mut dyn Track) {
        let mut parser = SectorParser::with_track(false, track.clone_track());
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::image::{Disk, DiskImageHolder};

    fn write_catalogue(data: &mut [u8]) {
        // Minimal valid DFS catalogue: name, cycle count, file count 0,
        // options 0, sector count 0x190 hi/lo.
        data[0x104] = 0; // cycle
        data[0x105] = 0; // file count * 8
        data[0x106] = 0x01; // top bits of sector count + option
        data[0x107] = 0x90;
    }

    fn temp_path(name: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("emu-ssd-{}-{}", std::process::id(), name));
        path
    }

    #[test]
    fn round_trips_a_written_track() {
        let path = temp_path("roundtrip.ssd");
        let mut data = vec![0u8; (TRACK_BYTES * 40) as usize];
        write_catalogue(&mut data);
        for (index, byte) in data[TRACK_BYTES as usize..][..256].iter_mut().enumerate() {
            *byte = index as u8;
        }
        File::create(&path).unwrap().write_all(&data).unwrap();

        let image = SsdImage::open(&path, false).unwrap();
        assert!(!image.is_read_only());
        let holder = DiskImageHolder::new(image);

        // Read track 1, overwrite sector 0's first bytes via a fresh track,
        // and verify the file content after a flush.
        let address = TrackAddress::new(0, HeadPosition::new(1));
        let track = holder.track_at(address).expect("no track");

        let mut parser = SectorParser::with_track(false, track);
        let mut sectors = parser.track_sectors();
        sectors.sort_by_key(|sector| sector.sector);
        assert_eq!(sectors.len(), 10);
        assert_eq!(sectors[0].data[..4], [0, 1, 2, 3]);

        sectors[0].data[0] = 0xde;
        let rewritten = fm_track_with_sectors(&sectors);
        holder.set_track_at(address, Box::new(rewritten));
        holder.flush_tracks();
        drop(holder);

        let mut reread = Vec::new();
        File::open(&path).unwrap().read_to_end(&mut reread).unwrap();
        assert_eq!(reread[TRACK_BYTES as usize], 0xde);
        assert_eq!(reread[TRACK_BYTES as usize + 1], 1);

        let _ = std::fs::remove_file(&path);
    }
}
