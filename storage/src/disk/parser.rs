//! A sector-level reader over the MFM controller: seeks, watches the token
//! stream, and extracts CRC-checked sectors. Used by write-capable disk
//! images to recover sector data from a patched track, and convenient for
//! tests.

use super::encodings::mfm::{Sector, TokenKind};
use super::image::Disk;
use super::mfm_controller::{ControllerEvent, DataMode, MfmController};
use super::{HeadPosition, Track};
use clocking::Cycles;
use std::collections::VecDeque;
use std::sync::Arc;

pub struct SectorParser {
    controller: MfmController,
    events: VecDeque<ControllerEvent>,
    scratch: Vec<ControllerEvent>,
    index_count: usize,
    track: u8,
}

impl SectorParser {
    fn new(is_double_density: bool) -> Self {
        let mut controller = MfmController::new(4_000_000, 1, 300);
        controller.set_is_double_density(is_double_density);
        controller.controller_mut().drive_mut().set_motor_on(true);
        SectorParser {
            controller,
            events: VecDeque::new(),
            scratch: Vec::new(),
            index_count: 0,
            track: 0,
        }
    }

    #[must_use]
    pub fn with_disk(is_double_density: bool, disk: Arc<dyn Disk>) -> Self {
        let mut parser = Self::new(is_double_density);
        parser
            .controller
            .controller_mut()
            .drive_mut()
            .set_disk(disk);
        parser
    }

    #[must_use]
    pub fn with_track(is_double_density: bool, track: Box<dyn Track>) -> Self {
        let mut parser = Self::new(is_double_density);
        parser
            .controller
            .controller_mut()
            .drive_mut()
            .set_disk_with_track(track);
        parser
    }

    pub fn set_head(&mut self, head: u8) {
        self.controller.controller_mut().drive_mut().set_head(head);
        self.events.clear();
    }

    pub fn seek_to_track(&mut self, track: u8) {
        let difference = i32::from(track) - i32::from(self.track);
        self.track = track;
        if difference != 0 {
            self.controller
                .controller_mut()
                .drive_mut()
                .step(HeadPosition::new(difference));
            self.events.clear();
        }
    }

    fn next_event(&mut self) -> ControllerEvent {
        loop {
            if let Some(event) = self.events.pop_front() {
                return event;
            }
            // Short chunks keep data-mode switches ahead of the bit stream:
            // four cycles is under half a bit at either density.
            self.scratch.clear();
            self.controller.run_for(Cycles(4), &mut self.scratch);
            self.events.extend(self.scratch.drain(..));
        }
    }

    /// Reads `count` data bytes, which must arrive as plain byte tokens.
    fn read_bytes(&mut self, count: usize) -> Option<Vec<u8>> {
        let mut result = Vec::with_capacity(count);
        while result.len() < count {
            match self.next_event() {
                ControllerEvent::Token(token) if token.kind == TokenKind::Byte => {
                    result.push(token.byte_value);
                }
                ControllerEvent::IndexHole => {
                    self.index_count += 1;
                    if self.index_count >= 3 {
                        return None;
                    }
                }
                _ => return None,
            }
        }
        Some(result)
    }

    /// Hunts for the next CRC-valid sector, giving up once `index_limit`
    /// index-hole passes have accumulated in `self.index_count`.
    fn scan_sector(&mut self, index_limit: usize) -> Option<Sector> {
        loop {
            // Find a sector header.
            loop {
                match self.next_event() {
                    ControllerEvent::Token(token) if token.kind == TokenKind::Id => break,
                    ControllerEvent::IndexHole => {
                        self.index_count += 1;
                        if self.index_count >= index_limit {
                            return None;
                        }
                    }
                    _ => {}
                }
            }

            // Header bytes are read with sync detection off; real data can
            // contain sync lookalikes.
            self.controller.set_data_mode(DataMode::Reading);
            let header = self.read_bytes(6);
            self.controller.set_data_mode(DataMode::Scanning);
            let header = match header {
                Some(header) => header,
                None => continue,
            };
            if self.controller.crc() != 0 {
                continue;
            }

            // Find the matching data mark; another header first means the
            // sector body was missing.
            let mark = loop {
                match self.next_event() {
                    ControllerEvent::Token(token) => match token.kind {
                        TokenKind::Data => break Some(false),
                        TokenKind::DeletedData => break Some(true),
                        TokenKind::Id => break None,
                        _ => {}
                    },
                    ControllerEvent::IndexHole => {
                        self.index_count += 1;
                        if self.index_count >= index_limit {
                            return None;
                        }
                    }
                    _ => {}
                }
            };
            let is_deleted = match mark {
                Some(is_deleted) => is_deleted,
                None => continue,
            };

            let data_size = 128usize << (header[3] & 7);
            self.controller.set_data_mode(DataMode::Reading);
            let data = self.read_bytes(data_size + 2);
            self.controller.set_data_mode(DataMode::Scanning);
            let mut data = match data {
                Some(data) => data,
                None => continue,
            };
            if self.controller.crc() != 0 {
                continue;
            }

            data.truncate(data_size);
            return Some(Sector {
                track: header[0],
                side: header[1],
                sector: header[2],
                is_deleted,
                data,
            });
        }
    }

    /// The next CRC-valid sector under the head, or `None` if two index
    /// holes pass without one.
    pub fn next_sector(&mut self) -> Option<Sector> {
        self.index_count = 0;
        self.scan_sector(2)
    }

    /// Finds the sector numbered `sector` on track `track`.
    pub fn sector(&mut self, track: u8, sector: u8) -> Option<Sector> {
        self.seek_to_track(track);
        self.index_count = 0;
        while let Some(found) = self.scan_sector(3) {
            if found.sector == sector {
                return Some(found);
            }
        }
        None
    }

    /// Every distinct CRC-valid sector on the current track.
    pub fn track_sectors(&mut self) -> Vec<Sector> {
        let mut sectors: Vec<Sector> = Vec::new();
        self.index_count = 0;
        while let Some(found) = self.scan_sector(3) {
            if !sectors.iter().any(|sector| sector.sector == found.sector) {
                sectors.push(found);
            }
        }
        sectors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::encodings::mfm::{
        fm_track_with_sectors, mfm_track_with_sectors, Sector,
    };
    use rstest::rstest;

    fn test_sectors(count: u8, size: usize) -> Vec<Sector> {
        (0..count)
            .map(|index| Sector {
                track: 3,
                side: 0,
                sector: index + 1,
                is_deleted: false,
                data: (0..size).map(|byte| (byte as u8) ^ (index * 3)).collect(),
            })
            .collect()
    }

    #[rstest]
    #[case(true, 5, 512)] // standard double density
    #[case(true, 9, 512)] // a full 720K-style track
    #[case(true, 16, 256)] // ADFS-style geometry
    #[case(false, 10, 256)] // DFS-style single density
    fn reads_back_a_full_track(
        #[case] double_density: bool,
        #[case] count: u8,
        #[case] size: usize,
    ) {
        let sectors = test_sectors(count, size);
        let track = if double_density {
            mfm_track_with_sectors(&sectors)
        } else {
            fm_track_with_sectors(&sectors)
        };

        let mut parser = SectorParser::with_track(double_density, Box::new(track));
        let mut read = parser.track_sectors();
        read.sort_by_key(|sector| sector.sector);
        assert_eq!(read, sectors);
    }

    #[test]
    fn fetches_a_single_sector_by_number() {
        let sectors = test_sectors(3, 256);
        let track = mfm_track_with_sectors(&sectors);

        let mut parser = SectorParser::with_track(true, Box::new(track));
        let sector = parser.sector(0, 2).expect("sector not found");
        assert_eq!(sector.data, sectors[1].data);

        assert!(parser.sector(0, 9).is_none());
    }
}
