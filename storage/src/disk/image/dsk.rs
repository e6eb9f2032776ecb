//! Amstrad CPC DSK images, standard and extended. Each track is stored as
//! a "Track-Info" block followed by sector data; extended images add a
//! per-track size table and per-sector actual lengths, which the copy
//! protections of the era exploit.

use super::DiskImage;
use crate::disk::encodings::mfm::{mfm_track_with_sectors, Sector};
use crate::disk::parser::SectorParser;
use crate::disk::{HeadPosition, Track, TrackAddress};
use crate::Error;
use byteorder::{LittleEndian, ReadBytesExt};
use log::warn;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

const FDC_765_STAT2_CONTROL_MARK: u8 = 1 << 6;

#[derive(Clone, Debug)]
struct SectorInfo {
    track: u8,
    side: u8,
    sector: u8,
    size: u8,
    is_deleted: bool,
    file_offset: u64,
    stored_length: usize,
}

#[derive(Clone, Debug, Default)]
struct TrackLayout {
    sectors: Vec<SectorInfo>,
}

pub struct DskImage {
    file: std::fs::File,
    head_count: u8,
    cylinder_count: u8,
    // Indexed cylinder-major, sides interleaved; unformatted tracks are
    // present but empty.
    layouts: Vec<TrackLayout>,
    is_read_only: bool,
}

impl DskImage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let (mut file, is_read_only) = super::ssd::open_read_write(path.as_ref())?;

        let mut contents = Vec::new();
        file.read_to_end(&mut contents)?;
        if contents.len() < 0x100 {
            return Err(Error::InvalidFormat);
        }

        let information_block = &contents[..0x100];
        let extended = match &information_block[0..34] {
            b"MV - CPCEMU Disk-File\r\nDisk-Info\r\n" => false,
            b"EXTENDED CPC DSK File\r\nDisk-Info\r\n" => true,
            _ => return Err(Error::InvalidFormat),
        };

        let cylinder_count = information_block[0x30];
        let head_count = information_block[0x31];
        if head_count == 0 || head_count > 2 {
            return Err(Error::InvalidFormat);
        }
        let track_count = usize::from(cylinder_count) * usize::from(head_count);

        // The per-track size table exists only in the extended variant; the
        // standard variant records one size for every track.
        let track_size_table = if extended {
            contents
                .get(0x34..0x34 + track_count)
                .ok_or(Error::InvalidFormat)?
                .to_vec()
        } else {
            Vec::new()
        };
        let uniform_track_size =
            u64::from(u16::from_le_bytes([information_block[0x32], information_block[0x33]]));

        let mut layouts = Vec::with_capacity(track_count);
        let mut file_offset: u64 = 0x100;

        for track_index in 0..track_count {
            // Zero-sized tracks are unformatted; they consume no file space.
            if extended && track_size_table[track_index] == 0 {
                layouts.push(TrackLayout::default());
                continue;
            }

            let block_start = file_offset as usize;
            let track_block = contents
                .get(block_start..)
                .ok_or(Error::InvalidFormat)?;
            if track_block.len() < 0x100 || &track_block[0..12] != b"Track-Info\r\n" {
                return Err(Error::InvalidFormat);
            }

            let mut header = Cursor::new(&track_block[0x10..0x18]);
            let _track_number = header.read_u8()?;
            let _side_number = header.read_u8()?;
            let _unused = header.read_u16::<LittleEndian>()?;
            let _sector_size = header.read_u8()?;
            let number_of_sectors = usize::from(header.read_u8()?);

            let mut sector_info = Cursor::new(
                track_block
                    .get(0x18..0x18 + number_of_sectors * 8)
                    .ok_or(Error::InvalidFormat)?,
            );

            // Sector data begins 0x100 bytes into the track block.
            let mut data_offset = file_offset + 0x100;
            let mut layout = TrackLayout::default();

            for _ in 0..number_of_sectors {
                let sector_track = sector_info.read_u8()?;
                let sector_side = sector_info.read_u8()?;
                let sector_id = sector_info.read_u8()?;
                let sector_size = sector_info.read_u8()?;
                let _fdc_status1 = sector_info.read_u8()?;
                let fdc_status2 = sector_info.read_u8()?;
                let declared_length = sector_info.read_u16::<LittleEndian>()?;

                let stored_length = if extended {
                    usize::from(declared_length)
                } else {
                    128usize << (sector_size & 7)
                };

                layout.sectors.push(SectorInfo {
                    track: sector_track,
                    side: sector_side,
                    sector: sector_id,
                    size: sector_size,
                    is_deleted: fdc_status2 & FDC_765_STAT2_CONTROL_MARK != 0,
                    file_offset: data_offset,
                    stored_length,
                });

                data_offset += stored_length as u64;
            }

            if extended {
                file_offset += u64::from(track_size_table[track_index]) * 0x100;
            } else {
                file_offset += uniform_track_size;
            }

            layouts.push(layout);
        }

        Ok(DskImage {
            file,
            head_count,
            cylinder_count,
            layouts,
            is_read_only,
        })
    }

    fn layout_index(&self, address: TrackAddress) -> Option<usize> {
        let cylinder = address.position.as_int();
        if cylinder < 0
            || cylinder >= i32::from(self.cylinder_count)
            || address.head >= self.head_count
        {
            return None;
        }
        Some(cylinder as usize * usize::from(self.head_count) + usize::from(address.head))
    }
}

impl DiskImage for DskImage {
    fn maximum_head_position(&self) -> HeadPosition {
        HeadPosition::new(i32::from(self.cylinder_count))
    }

    fn head_count(&self) -> u8 {
        self.head_count
    }

    fn track_at(&mut self, address: TrackAddress) -> Option<Box<dyn Track>> {
        let layout = self.layouts.get(self.layout_index(address)?)?.clone();
        if layout.sectors.is_empty() {
            return None;
        }

        let mut sectors = Vec::with_capacity(layout.sectors.len());
        for info in &layout.sectors {
            let declared_length = 128usize << (info.size & 7);
            let mut data = vec![0u8; info.stored_length];
            self.file.seek(SeekFrom::Start(info.file_offset)).ok()?;
            self.file.read_exact(&mut data).ok()?;
            // Weak-sector protections store more data than the declared
            // size; the declared size is what the drive sees per pass.
            data.resize(declared_length, 0x00);

            sectors.push(Sector {
                track: info.track,
                side: info.side,
                sector: info.sector,
                is_deleted: info.is_deleted,
                data,
            });
        }

        Some(Box::new(mfm_track_with_sectors(&sectors)))
    }

    fn store_track_at(&mut self, address: TrackAddress, track: &mut dyn Track) {
        let Some(index) = self.layout_index(address) else {
            return;
        };
        let layout = self.layouts[index].clone();

        let mut parser = SectorParser::with_track(true, track.clone_track());
        for sector in parser.track_sectors() {
            let Some(info) = layout.sectors.iter().find(|info| info.sector == sector.sector)
            else {
                warn!("dropping sector {} absent from the image layout", sector.sector);
                continue;
            };

            let length = sector.data.len().min(info.stored_length);
            if self.file.seek(SeekFrom::Start(info.file_offset)).is_ok() {
                if let Err(error) = self.file.write_all(&sector.data[..length]) {
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

    fn temp_path(name: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("emu-dsk-{}-{}", std::process::id(), name));
        path
    }

    /// A one-cylinder, one-side standard DSK with nine 512-byte sectors
    /// numbered from `first_sector`.
    pub(crate) fn build_dsk(first_sector: u8, fill: impl Fn(u8, usize) -> u8) -> Vec<u8> {
        let mut image = Vec::new();

        let mut information = vec![0u8; 0x100];
        information[..34].copy_from_slice(b"MV - CPCEMU Disk-File\r\nDisk-Info\r\n");
        information[0x30] = 1; // cylinders
        information[0x31] = 1; // sides
        let track_size = (0x100 + 9 * 512) as u16;
        information[0x32..0x34].copy_from_slice(&track_size.to_le_bytes());
        image.extend_from_slice(&information);

        let mut track_block = vec![0u8; 0x100];
        track_block[..12].copy_from_slice(b"Track-Info\r\n");
        track_block[0x10] = 0; // track
        track_block[0x11] = 0; // side
        track_block[0x14] = 2; // sector size code
        track_block[0x15] = 9; // sectors
        for sector in 0..9u8 {
            let info = 0x18 + usize::from(sector) * 8;
            track_block[info] = 0; // track
            track_block[info + 1] = 0; // side
            track_block[info + 2] = first_sector + sector;
            track_block[info + 3] = 2; // size code
        }
        image.extend_from_slice(&track_block);

        for sector in 0..9u8 {
            let data: Vec<u8> = (0..512).map(|index| fill(sector, index)).collect();
            image.extend_from_slice(&data);
        }

        image
    }

    #[test]
    fn parses_a_standard_image() {
        let path = temp_path("standard.dsk");
        std::fs::write(&path, build_dsk(0xc1, |sector, index| sector ^ index as u8)).unwrap();

        let mut image = DskImage::open(&path).unwrap();
        assert_eq!(image.head_count(), 1);
        assert_eq!(image.maximum_head_position(), HeadPosition::new(1));

        let track = image
            .track_at(TrackAddress::new(0, HeadPosition::new(0)))
            .expect("no track");
        let mut parser = SectorParser::with_track(true, track);
        let mut sectors = parser.track_sectors();
        sectors.sort_by_key(|sector| sector.sector);

        assert_eq!(sectors.len(), 9);
        assert_eq!(sectors[0].sector, 0xc1);
        assert_eq!(sectors[8].sector, 0xc9);
        assert!(sectors
            .iter()
            .enumerate()
            .all(|(id, sector)| sector.data
                == (0..512).map(|index| id as u8 ^ index as u8).collect::<Vec<_>>()));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn boot_sector_reads_through_the_whole_pipeline() {
        // A CP/M-style boot sector at track 0, sector 0x41, read through
        // the caching holder, drive rotation, PLL and shift register.
        let path = temp_path("boot.dsk");
        let fill = |sector: u8, index: usize| {
            if sector == 0 {
                (index as u8).wrapping_mul(3).wrapping_add(1)
            } else {
                0xe5
            }
        };
        std::fs::write(&path, build_dsk(0x41, fill)).unwrap();

        let image = DskImage::open(&path).unwrap();
        let holder = std::sync::Arc::new(crate::disk::image::DiskImageHolder::new(image));

        let mut parser = SectorParser::with_disk(true, holder);
        let sector = parser.sector(0, 0x41).expect("boot sector not found");
        assert_eq!(sector.data.len(), 512);
        let expected: Vec<u8> = (0..512).map(|index| fill(0, index)).collect();
        assert_eq!(sector.data, expected);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn rejects_other_files() {
        let path = temp_path("not-a.dsk");
        std::fs::write(&path, vec![0u8; 0x400]).unwrap();
        assert!(matches!(DskImage::open(&path), Err(Error::InvalidFormat)));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn writes_sectors_back_in_place() {
        let path = temp_path("write.dsk");
        std::fs::write(&path, build_dsk(0x41, |_, _| 0)).unwrap();

        {
            let mut image = DskImage::open(&path).unwrap();
            let address = TrackAddress::new(0, HeadPosition::new(0));
            let track = image.track_at(address).expect("no track");

            let mut parser = SectorParser::with_track(true, track);
            let mut sectors = parser.track_sectors();
            sectors.sort_by_key(|sector| sector.sector);
            sectors[2].data = vec![0x5a; 512];

            let mut rewritten: Box<dyn Track> = Box::new(mfm_track_with_sectors(&sectors));
            image.store_track_at(address, rewritten.as_mut());
        }

        let contents = std::fs::read(&path).unwrap();
        let data_start = 0x200 + 2 * 512;
        assert!(contents[data_start..data_start + 512]
            .iter()
            .all(|byte| *byte == 0x5a));
        assert!(contents[0x200..0x200 + 512].iter().all(|byte| *byte == 0));

        let _ = std::fs::remove_file(&path);
    }
}
