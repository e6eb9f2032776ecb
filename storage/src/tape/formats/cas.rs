//! MSX .CAS archives: files delimited by the eight-byte header signature,
//! replayed as 1200 baud FSK with long and short header tones.

use crate::tape::{Pulse, PulseKind, Tape};
use crate::Error;
use clocking::Time;
use std::path::Path;

const HEADER_SIGNATURE: [u8; 8] = [0x1f, 0xa6, 0xde, 0xba, 0xcc, 0x13, 0x7d, 0x74];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Block {
    Csave,
    Bsave,
    Ascii,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Header,
    Bytes,
    Gap,
    EndOfFile,
}

struct CasFile {
    block_type: Block,
    chunks: Vec<Vec<u8>>,
}

pub struct CasTape {
    files: Vec<CasFile>,

    phase: Phase,
    file_pointer: usize,
    chunk_pointer: usize,
    distance_into_phase: usize,
    distance_into_bit: usize,
}

impl CasTape {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let contents = std::fs::read(path)?;
        if contents.len() < 16 || contents[..8] != HEADER_SIGNATURE {
            return Err(Error::InvalidFormat);
        }

        // Split at each signature occurrence (signatures are eight-byte
        // aligned in practice, but scanning is safer), then group chunks
        // into files by their identification blocks.
        let mut chunks: Vec<Vec<u8>> = Vec::new();
        let mut offset = 0;
        while offset < contents.len() {
            if contents.len() - offset >= 8 && contents[offset..offset + 8] == HEADER_SIGNATURE {
                chunks.push(Vec::new());
                offset += 8;
            } else {
                if let Some(chunk) = chunks.last_mut() {
                    chunk.push(contents[offset]);
                }
                offset += 1;
            }
        }

        let mut files: Vec<CasFile> = Vec::new();
        let mut active_file: Option<CasFile> = None;

        for chunk in chunks {
            let mut current = match active_file.take() {
                Some(file) => file,
                None => {
                    // This chunk must be an identification block.
                    let block_type = match chunk.first() {
                        Some(0xd3) => Block::Csave,
                        Some(0xd0) => Block::Bsave,
                        Some(0xea) => Block::Ascii,
                        _ => return Err(Error::InvalidFormat),
                    };
                    CasFile {
                        block_type,
                        chunks: Vec::new(),
                    }
                }
            };
            current.chunks.push(chunk);

            let complete = match current.block_type {
                // ASCII files run chunk after chunk until one ends with an
                // 0x1a back-fill.
                Block::Ascii => {
                    current.chunks.len() >= 2
                        && current.chunks.last().and_then(|chunk| chunk.last()) == Some(&0x1a)
                }
                // CSAVE and BSAVE are an identification block plus data.
                _ => current.chunks.len() == 2,
            };

            if complete {
                files.push(current);
            } else {
                active_file = Some(current);
            }
        }
        if let Some(file) = active_file {
            files.push(file);
        }

        Ok(CasTape {
            files,
            phase: Phase::Header,
            file_pointer: 0,
            chunk_pointer: 0,
            distance_into_phase: 0,
            distance_into_bit: 0,
        })
    }
}

impl Tape for CasTape {
    fn next_pulse(&mut self) -> Pulse {
        // A gap terminates a file; after the last file, gaps forever.
        if self.phase == Phase::Gap || self.phase == Phase::EndOfFile {
            if self.phase == Phase::Gap {
                self.phase = Phase::Header;
                self.file_pointer += 1;
                self.chunk_pointer = 0;
                self.distance_into_phase = 0;
            }
            return Pulse::new(PulseKind::Zero, Time::new(4800, 4800));
        }

        let mut bit = 1;
        match self.phase {
            Phase::Header => {
                self.distance_into_bit += 1;
                if self.distance_into_bit == 2 {
                    self.distance_into_bit = 0;
                    self.distance_into_phase += 1;
                    // A long tone before an identification block, a short
                    // one before data.
                    let tone_length = if self.chunk_pointer == 0 { 15_360 } else { 3_840 };
                    if self.distance_into_phase == tone_length {
                        self.phase = Phase::Bytes;
                        self.distance_into_phase = 0;
                        self.distance_into_bit = 0;
                    }
                }
            }

            Phase::Bytes => {
                let chunk =
                    &self.files[self.file_pointer].chunks[self.chunk_pointer];
                let byte_value = chunk[self.distance_into_phase / 11];
                let bit_offset = self.distance_into_phase % 11;
                bit = match bit_offset {
                    0 => 0,
                    9 | 10 => 1,
                    _ => (byte_value >> (bit_offset - 1)) & 1,
                };

                self.distance_into_bit += 1;
                if self.distance_into_bit == if bit != 0 { 4 } else { 2 } {
                    self.distance_into_bit = 0;
                    self.distance_into_phase += 1;
                    if self.distance_into_phase == chunk.len() * 11 {
                        self.distance_into_phase = 0;
                        self.chunk_pointer += 1;
                        if self.chunk_pointer
                            == self.files[self.file_pointer].chunks.len()
                        {
                            self.chunk_pointer = 0;
                            self.file_pointer += 1;
                            self.phase = if self.file_pointer == self.files.len() {
                                Phase::EndOfFile
                            } else {
                                Phase::Gap
                            };
                        } else {
                            // A short tone separates the chunks of a file.
                            self.phase = Phase::Header;
                        }
                    }
                }
            }

            Phase::Gap | Phase::EndOfFile => unreachable!(),
        }

        Pulse::new(
            if self.distance_into_bit & 1 != 0 {
                PulseKind::High
            } else {
                PulseKind::Low
            },
            Time::new(2 - u32::from(bit), 4800),
        )
    }

    fn at_end(&self) -> bool {
        self.phase == Phase::EndOfFile
    }

    fn reset(&mut self) {
        self.phase = Phase::Header;
        self.file_pointer = 0;
        self.chunk_pointer = 0;
        self.distance_into_phase = 0;
        self.distance_into_bit = 0;
    }
}
