//! Commodore .PRG files replayed as tape: the ROM loader's lead-in,
//! countdown bytes, 192-byte blocks with an XOR check digit, and the
//! repeat copy distinguished by the countdown's top bit.

use crate::tape::{Pulse, PulseKind, Tape};
use crate::Error;
use clocking::Time;
use std::path::Path;

// Microseconds per pole.
const LEADER_ZERO_LENGTH: u32 = 179;
const ZERO_LENGTH: u32 = 169;
const ONE_LENGTH: u32 = 247;
const MARKER_LENGTH: u32 = 328;

const BLOCK_LENGTH: usize = 192;
const COUNTDOWN_BYTES: usize = 9;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FilePhase {
    LeadIn,
    Header,
    HeaderDataGap,
    Data,
    AtEnd,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum OutputToken {
    Leader,
    Zero,
    One,
    WordMarker,
    EndOfBlock,
}

pub struct PrgTape {
    data: Vec<u8>,
    load_address: u16,
    length: u16,

    data_pointer: usize,
    bit_phase: u8,
    file_phase: FilePhase,
    phase_offset: usize,
    copy_mask: u8,
    output_token: OutputToken,
    output_byte: u8,
    check_digit: u8,
}

impl PrgTape {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let contents = std::fs::read(path)?;

        // Nothing to validate beyond plausibility: the file is a load
        // address plus up to 64K of payload that must fit below 0x10000.
        if contents.len() < 3 || contents.len() >= 65_538 {
            return Err(Error::InvalidFormat);
        }
        let load_address = u16::from(contents[0]) | (u16::from(contents[1]) << 8);
        let length = (contents.len() - 2) as u16;
        if u32::from(load_address) + u32::from(length) >= 65_536 {
            return Err(Error::InvalidFormat);
        }

        Ok(PrgTape {
            data: contents[2..].to_vec(),
            load_address,
            length,
            data_pointer: 0,
            bit_phase: 3,
            file_phase: FilePhase::LeadIn,
            phase_offset: 0,
            copy_mask: 0x80,
            output_token: OutputToken::Leader,
            output_byte: 0,
            check_digit: 0,
        })
    }

    fn next_output_token(&mut self) {
        // The lead-in is 20000 leader pairs; later phases open with 5000ish
        // before their data.
        if matches!(self.file_phase, FilePhase::LeadIn | FilePhase::HeaderDataGap)
            || self.phase_offset < 50
        {
            self.output_token = OutputToken::Leader;
            self.phase_offset += 1;
            if (self.file_phase == FilePhase::LeadIn && self.phase_offset == 20_000)
                || (self.file_phase == FilePhase::HeaderDataGap && self.phase_offset == 5_586)
            {
                self.phase_offset = 0;
                self.file_phase = if self.file_phase == FilePhase::LeadIn {
                    FilePhase::Header
                } else {
                    FilePhase::Data
                };
            }
            return;
        }

        let block_offset = self.phase_offset - 50;
        let bit_offset = block_offset % 10;
        let byte_offset = block_offset / 10;
        self.phase_offset += 1;

        // After the checksum byte, the block ends.
        if byte_offset == BLOCK_LENGTH + COUNTDOWN_BYTES + 1 {
            self.output_token = OutputToken::EndOfBlock;
            self.phase_offset = 0;

            match self.file_phase {
                FilePhase::Header => {
                    self.copy_mask ^= 0x80;
                    if self.copy_mask != 0 {
                        self.file_phase = FilePhase::HeaderDataGap;
                    }
                }
                FilePhase::Data => {
                    if self.data_pointer >= self.data.len() {
                        self.copy_mask ^= 0x80;
                        self.data_pointer = 0;
                        if self.copy_mask != 0 {
                            // Both copies sent; that's the tape.
                            self.file_phase = FilePhase::AtEnd;
                        }
                    }
                }
                _ => {}
            }
            return;
        }

        if bit_offset == 0 {
            // Nine countdown bytes open each block, high bit set on the
            // first copy.
            if byte_offset < COUNTDOWN_BYTES {
                self.output_byte = (COUNTDOWN_BYTES - byte_offset) as u8 | self.copy_mask;
            } else if byte_offset == COUNTDOWN_BYTES + BLOCK_LENGTH {
                self.output_byte = self.check_digit;
            } else {
                if byte_offset == COUNTDOWN_BYTES {
                    self.check_digit = 0;
                }
                if self.file_phase == FilePhase::Header {
                    let end_address = self.load_address.wrapping_add(self.length);
                    self.output_byte = match byte_offset - COUNTDOWN_BYTES {
                        0 => 0x03,
                        1 => (self.load_address & 0xff) as u8,
                        2 => (self.load_address >> 8) as u8,
                        3 => (end_address & 0xff) as u8,
                        4 => (end_address >> 8) as u8,
                        5 => b'P',
                        6 => b'R',
                        7 => b'G',
                        _ => 0x20,
                    };
                } else {
                    self.output_byte = self.data.get(self.data_pointer).copied().unwrap_or(0);
                    self.data_pointer += 1;
                }
                self.check_digit ^= self.output_byte;
            }
        }

        self.output_token = match bit_offset {
            0 => OutputToken::WordMarker,
            9 => {
                let mut parity = self.output_byte;
                parity ^= parity >> 4;
                parity ^= parity >> 2;
                parity ^= parity >> 1;
                if parity & 1 != 0 {
                    OutputToken::Zero
                } else {
                    OutputToken::One
                }
            }
            _ => {
                if self.output_byte & (1 << (bit_offset - 1)) != 0 {
                    OutputToken::One
                } else {
                    OutputToken::Zero
                }
            }
        };
    }
}

impl Tape for PrgTape {
    fn next_pulse(&mut self) -> Pulse {
        self.bit_phase = (self.bit_phase + 1) & 3;
        if self.bit_phase == 0 {
            self.next_output_token();
        }

        let length = match self.output_token {
            OutputToken::Leader => LEADER_ZERO_LENGTH,
            OutputToken::Zero => {
                if self.bit_phase & 2 != 0 {
                    ONE_LENGTH
                } else {
                    ZERO_LENGTH
                }
            }
            OutputToken::One => {
                if self.bit_phase & 2 != 0 {
                    ZERO_LENGTH
                } else {
                    ONE_LENGTH
                }
            }
            OutputToken::WordMarker => {
                if self.bit_phase & 2 != 0 {
                    ONE_LENGTH
                } else {
                    MARKER_LENGTH
                }
            }
            OutputToken::EndOfBlock => {
                if self.bit_phase & 2 != 0 {
                    ZERO_LENGTH
                } else {
                    MARKER_LENGTH
                }
            }
        };

        Pulse::new(
            if self.bit_phase & 1 != 0 {
                PulseKind::High
            } else {
                PulseKind::Low
            },
            Time::new(length, 1_000_000),
        )
    }

    fn at_end(&self) -> bool {
        self.file_phase == FilePhase::AtEnd
    }

    fn reset(&mut self) {
        self.bit_phase = 3;
        self.data_pointer = 0;
        self.file_phase = FilePhase::LeadIn;
        self.phase_offset = 0;
        self.copy_mask = 0x80;
        self.check_digit = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("emu-prg-{}-{}", std::process::id(), name));
        path
    }

    fn write_prg(name: &str, payload: &[u8]) -> std::path::PathBuf {
        let path = temp_path(name);
        let mut contents = vec![0x01, 0x08]; // load at 0x0801
        contents.extend_from_slice(payload);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn rejects_overflowing_load_ranges() {
        let path = temp_path("overflow.prg");
        let mut contents = vec![0x00, 0xff]; // load at 0xff00
        contents.extend_from_slice(&vec![0u8; 0x200]);
        std::fs::write(&path, contents).unwrap();
        assert!(matches!(PrgTape::open(&path), Err(Error::InvalidFormat)));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn lead_in_is_twenty_thousand_leader_pairs() {
        let path = write_prg("leadin.prg", &[0x60]);
        let mut tape = PrgTape::open(&path).unwrap();

        // 20000 lead-in pairs, then 50 more opening the header block.
        for _ in 0..(20_000 + 50) * 4 {
            let pulse = tape.next_pulse();
            assert_eq!(pulse.length, Time::new(LEADER_ZERO_LENGTH, 1_000_000));
        }
        // The next token is the first block's opening word marker.
        let pulse = tape.next_pulse();
        assert_eq!(pulse.length, Time::new(MARKER_LENGTH, 1_000_000));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn header_carries_addresses_and_check_digit() {
        let path = write_prg("header.prg", &[0xaa, 0xbb]);
        let mut tape = PrgTape::open(&path).unwrap();

        // Decode tokens directly: every four pulses is one token.
        let mut bytes = Vec::new();
        let mut bit_index = 0;
        let mut value = 0u8;
        // Skip the lead-in and the block's own leader run.
        for _ in 0..(20_000 + 50) * 4 {
            tape.next_pulse();
        }
        // Read the header block: (countdown + block + checksum) tokens of
        // 10 bits each.
        for _ in 0..(COUNTDOWN_BYTES + BLOCK_LENGTH + 1) * 10 {
            let first = tape.next_pulse();
            for _ in 0..3 {
                tape.next_pulse();
            }
            let is_marker = first.length == Time::new(MARKER_LENGTH, 1_000_000);
            let is_one = first.length == Time::new(ONE_LENGTH, 1_000_000);
            if is_marker {
                bit_index = 0;
                value = 0;
            } else if bit_index < 8 {
                if is_one {
                    value |= 1 << bit_index;
                }
                bit_index += 1;
                if bit_index == 8 {
                    bytes.push(value);
                }
            } else {
                bit_index += 1;
            }
        }

        // Countdown 0x89..0x81, then the header contents.
        assert_eq!(bytes[..9], [0x89, 0x88, 0x87, 0x86, 0x85, 0x84, 0x83, 0x82, 0x81]);
        assert_eq!(bytes[9], 0x03);
        assert_eq!(bytes[10], 0x01); // load low
        assert_eq!(bytes[11], 0x08); // load high
        assert_eq!(bytes[12], 0x03); // end low: 0x0801 + 2
        assert_eq!(bytes[13], 0x08); // end high

        let _ = std::fs::remove_file(&path);
    }
}
