//! Compressed Square Wave tapes, versions 1 and 2: run-length-encoded
//! single-bit sampling, optionally deflated (the v2 "Z-RLE" scheme).

use crate::tape::{Pulse, PulseKind, Tape};
use crate::Error;
use byteorder::{LittleEndian, ReadBytesExt};
use clocking::Time;
use flate2::read::ZlibDecoder;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::Path;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CompressionType {
    Rle,
    Zrle,
}

pub struct CswTape {
    source_data: Vec<u8>,
    source_pointer: usize,

    sampling_rate: u32,
    number_of_waves: u32,
    compression_type: CompressionType,
    current_kind: PulseKind,
    initial_kind: PulseKind,
}

impl CswTape {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let contents = std::fs::read(path)?;
        if contents.len() < 0x20 {
            return Err(Error::InvalidFormat);
        }
        let mut reader = Cursor::new(&contents);

        let mut signature = [0u8; 22];
        reader.read_exact(&mut signature)?;
        if &signature != b"Compressed Square Wave" {
            return Err(Error::InvalidFormat);
        }
        if reader.read_u8()? != 0x1a {
            return Err(Error::InvalidFormat);
        }

        let major_version = reader.read_u8()?;
        let minor_version = reader.read_u8()?;
        if major_version == 0 || major_version > 2 || minor_version > 1 {
            return Err(Error::UnknownVersion);
        }

        let sampling_rate;
        let mut number_of_waves = 0;
        let compression_type;
        let initial_kind;

        if major_version == 1 {
            sampling_rate = u32::from(reader.read_u16::<LittleEndian>()?);
            if reader.read_u8()? != 1 {
                return Err(Error::InvalidFormat);
            }
            compression_type = CompressionType::Rle;
            initial_kind = if reader.read_u8()? & 1 != 0 {
                PulseKind::High
            } else {
                PulseKind::Low
            };
            reader.seek(SeekFrom::Start(0x20))?;
        } else {
            sampling_rate = reader.read_u32::<LittleEndian>()?;
            number_of_waves = reader.read_u32::<LittleEndian>()?;
            compression_type = match reader.read_u8()? {
                1 => CompressionType::Rle,
                2 => CompressionType::Zrle,
                _ => return Err(Error::InvalidFormat),
            };
            initial_kind = if reader.read_u8()? & 1 != 0 {
                PulseKind::High
            } else {
                PulseKind::Low
            };
            let extension_length = u64::from(reader.read_u8()?);
            if (contents.len() as u64) < 0x34 + extension_length {
                return Err(Error::InvalidFormat);
            }
            reader.seek(SeekFrom::Start(0x34 + extension_length))?;
        }
        if sampling_rate == 0 {
            return Err(Error::InvalidFormat);
        }

        let start = reader.position() as usize;
        let source_data = match compression_type {
            CompressionType::Rle => contents[start..].to_vec(),
            CompressionType::Zrle => {
                let mut decoder = ZlibDecoder::new(&contents[start..]);
                let mut decompressed = Vec::new();
                decoder
                    .read_to_end(&mut decompressed)
                    .map_err(|_| Error::InvalidFormat)?;
                decompressed
            }
        };

        Ok(CswTape {
            source_data,
            source_pointer: 0,
            sampling_rate,
            number_of_waves,
            compression_type,
            // The first returned pulse carries the header's polarity.
            current_kind: invert(initial_kind),
            initial_kind,
        })
    }

    /// The wave count the v2 header advertises; zero for v1.
    #[must_use]
    pub fn number_of_waves(&self) -> u32 {
        self.number_of_waves
    }

    #[must_use]
    pub fn sampling_rate(&self) -> u32 {
        self.sampling_rate
    }

    #[must_use]
    pub fn is_zrle(&self) -> bool {
        self.compression_type == CompressionType::Zrle
    }

    fn next_byte(&mut self) -> u8 {
        let byte = self
            .source_data
            .get(self.source_pointer)
            .copied()
            .unwrap_or(0xff);
        self.source_pointer += 1;
        byte
    }

    fn next_u32(&mut self) -> u32 {
        let mut value = 0u32;
        for shift in 0..4 {
            value |= u32::from(self.next_byte()) << (shift * 8);
        }
        value
    }
}

fn invert(kind: PulseKind) -> PulseKind {
    match kind {
        PulseKind::High => PulseKind::Low,
        _ => PulseKind::High,
    }
}

impl Tape for CswTape {
    fn next_pulse(&mut self) -> Pulse {
        self.current_kind = invert(self.current_kind);

        // A zero length escapes to a 32-bit sample count.
        let mut length = u32::from(self.next_byte());
        if length == 0 {
            length = self.next_u32();
        }
        Pulse::new(self.current_kind, Time::new(length, self.sampling_rate))
    }

    fn at_end(&self) -> bool {
        self.source_pointer >= self.source_data.len()
    }

    fn reset(&mut self) {
        self.source_pointer = 0;
        self.current_kind = invert(self.initial_kind);
    }
}
