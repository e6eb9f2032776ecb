//! Acorn UEF tape images: a gzip-wrapped chunk stream describing carrier
//! tones, gaps and byte data at a configurable base frequency.

use crate::tape::{Pulse, PulseKind, Tape};
use crate::Error;
use byteorder::{LittleEndian, ReadBytesExt};
use clocking::Time;
use flate2::read::GzDecoder;
use log::debug;
use std::collections::VecDeque;
use std::io::{Cursor, Read};
use std::path::Path;

pub struct UefTape {
    contents: Vec<u8>,
    chunk_pointer: usize,

    time_base: u32,
    queued_pulses: VecDeque<Pulse>,
}

impl UefTape {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let raw = std::fs::read(path)?;

        // UEFs are conventionally gzipped; accept bare ones too.
        let mut contents = Vec::new();
        if raw.len() >= 2 && raw[0] == 0x1f && raw[1] == 0x8b {
            GzDecoder::new(raw.as_slice())
                .read_to_end(&mut contents)
                .map_err(|_| Error::InvalidFormat)?;
        } else {
            contents = raw;
        }

        if contents.len() < 12 || &contents[..10] != b"UEF File!\0" {
            return Err(Error::InvalidFormat);
        }
        let minor_version = contents[10];
        let major_version = contents[11];
        if major_version > 0 || minor_version > 10 {
            return Err(Error::UnknownVersion);
        }

        Ok(UefTape {
            contents,
            chunk_pointer: 12,
            time_base: 1200,
            queued_pulses: VecDeque::new(),
        })
    }

    fn queue_bit(&mut self, bit: u8) {
        // A zero is one full cycle at the base frequency; a one is two full
        // cycles at twice the base frequency.
        let (cycles, rate) = if bit != 0 {
            (2, self.time_base * 4)
        } else {
            (1, self.time_base * 2)
        };
        for _ in 0..cycles {
            self.queued_pulses
                .push_back(Pulse::new(PulseKind::Low, Time::new(1, rate)));
            self.queued_pulses
                .push_back(Pulse::new(PulseKind::High, Time::new(1, rate)));
        }
    }

    fn queue_implicit_byte(&mut self, byte: u8) {
        self.queue_bit(0);
        for bit in 0..8 {
            self.queue_bit((byte >> bit) & 1);
        }
        self.queue_bit(1);
    }

    fn queue_carrier_cycles(&mut self, count: u32) {
        for _ in 0..count {
            self.queued_pulses
                .push_back(Pulse::new(PulseKind::Low, Time::new(1, self.time_base * 4)));
            self.queued_pulses
                .push_back(Pulse::new(PulseKind::High, Time::new(1, self.time_base * 4)));
        }
    }

    fn queue_gap(&mut self, length: Time) {
        if !length.is_zero() {
            self.queued_pulses
                .push_back(Pulse::new(PulseKind::Zero, length));
        }
    }

    fn parse_next_chunk(&mut self) {
        if self.chunk_pointer + 6 > self.contents.len() {
            self.chunk_pointer = self.contents.len();
            return;
        }

        let mut reader = Cursor::new(&self.contents[self.chunk_pointer..]);
        let id = reader.read_u16::<LittleEndian>().unwrap_or(0);
        let length = reader.read_u32::<LittleEndian>().unwrap_or(0) as usize;

        let body_start = self.chunk_pointer + 6;
        let body_end = body_start + length;
        if body_end > self.contents.len() {
            self.chunk_pointer = self.contents.len();
            return;
        }
        self.chunk_pointer = body_end;

        let body = self.contents[body_start..body_end].to_vec();
        let mut reader = Cursor::new(body.as_slice());

        match id {
            // Implicit bit pattern: bytes framed as 0 + 8 bits + 1.
            0x0100 => {
                for byte in &body {
                    self.queue_implicit_byte(*byte);
                }
            }

            // Explicit bit pattern: raw bits, LSB of each byte first; the
            // final byte's count of spare bits is not recorded, so all
            // eight are taken.
            0x0102 => {
                for byte in &body {
                    for bit in 0..8 {
                        self.queue_bit((byte >> bit) & 1);
                    }
                }
            }

            // Defined-format data: explicit framing description.
            0x0104 => {
                let data_bits = reader.read_u8().unwrap_or(8);
                let parity = reader.read_u8().unwrap_or(b'N');
                let stop_bits = reader.read_i8().unwrap_or(1);

                for byte in body.get(3..).unwrap_or(&[]) {
                    self.queue_bit(0);
                    let mut ones = 0;
                    for bit in 0..data_bits.min(8) {
                        let value = (byte >> bit) & 1;
                        ones += value;
                        self.queue_bit(value);
                    }
                    match parity {
                        b'E' => self.queue_bit(ones & 1),
                        b'O' => self.queue_bit(1 ^ (ones & 1)),
                        _ => {}
                    }
                    for _ in 0..stop_bits.max(0) {
                        self.queue_bit(1);
                    }
                }
            }

            // Carrier tone, in cycles.
            0x0110 => {
                let cycles = u32::from(reader.read_u16::<LittleEndian>().unwrap_or(0));
                self.queue_carrier_cycles(cycles);
            }

            // Carrier tone with a dummy byte between two runs.
            0x0111 => {
                let before = u32::from(reader.read_u16::<LittleEndian>().unwrap_or(0));
                let after = u32::from(reader.read_u16::<LittleEndian>().unwrap_or(0));
                self.queue_carrier_cycles(before);
                self.queue_implicit_byte(0xaa);
                self.queue_carrier_cycles(after);
            }

            // Integer gap, in 1/(2 × base) seconds.
            0x0112 => {
                let length = u32::from(reader.read_u16::<LittleEndian>().unwrap_or(0));
                self.queue_gap(Time::new(length, self.time_base * 2));
            }

            // Change of base frequency.
            0x0113 => {
                let frequency = read_float(&mut reader);
                if frequency > 0.0 {
                    self.time_base = frequency as u32;
                }
            }

            // Security cycles: a cycle count plus leading/trailing pulse
            // markers; the cycles themselves are ordinary carrier cycles.
            0x0114 => {
                let cycles = reader.read_u24::<LittleEndian>().unwrap_or(0);
                let first = reader.read_u8().unwrap_or(b'W');
                let last = reader.read_u8().unwrap_or(b'W');

                let mut remaining = cycles;
                if first == b'P' && remaining > 0 {
                    self.queued_pulses.push_back(Pulse::new(
                        PulseKind::High,
                        Time::new(1, self.time_base * 4),
                    ));
                    remaining -= 1;
                }
                let trailing_half = last == b'P' && remaining > 0;
                if trailing_half {
                    remaining -= 1;
                }
                self.queue_carrier_cycles(remaining);
                if trailing_half {
                    self.queued_pulses.push_back(Pulse::new(
                        PulseKind::Low,
                        Time::new(1, self.time_base * 4),
                    ));
                }
            }

            // Floating-point gap, in seconds.
            0x0116 => {
                let seconds = read_float(&mut reader);
                if seconds > 0.0 {
                    self.queue_gap(Time::from_ratio(
                        (seconds * 1_000_000.0) as u64,
                        1_000_000,
                    ));
                }
            }

            _ => {
                debug!("skipping unhandled UEF chunk {id:#06x}");
            }
        }
    }
}

/// UEF floats are IEEE 754 single precision, little endian.
fn read_float(reader: &mut Cursor<&[u8]>) -> f32 {
    let mut bytes = [0u8; 4];
    if reader.read_exact(&mut bytes).is_err() {
        return 0.0;
    }
    f32::from_le_bytes(bytes)
}

impl Tape for UefTape {
    fn next_pulse(&mut self) -> Pulse {
        while self.queued_pulses.is_empty() && self.chunk_pointer < self.contents.len() {
            self.parse_next_chunk();
        }
        self.queued_pulses
            .pop_front()
            .unwrap_or(Pulse::new(PulseKind::Zero, Time::ONE))
    }

    fn at_end(&self) -> bool {
        self.queued_pulses.is_empty() && self.chunk_pointer >= self.contents.len()
    }

    fn reset(&mut self) {
        self.chunk_pointer = 12;
        self.time_base = 1200;
        self.queued_pulses.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tape::parsers::acorn::AcornParser;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn temp_path(name: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("emu-uef-{}-{}", std::process::id(), name));
        path
    }

    fn chunk(id: u16, body: &[u8]) -> Vec<u8> {
        let mut result = Vec::new();
        result.extend_from_slice(&id.to_le_bytes());
        result.extend_from_slice(&(body.len() as u32).to_le_bytes());
        result.extend_from_slice(body);
        result
    }

    fn write_uef(name: &str, chunks: &[Vec<u8>]) -> std::path::PathBuf {
        let mut contents = Vec::new();
        contents.extend_from_slice(b"UEF File!\0");
        contents.push(10); // minor
        contents.push(0); // major
        for chunk in chunks {
            contents.extend_from_slice(chunk);
        }

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&contents).unwrap();
        let path = temp_path(name);
        std::fs::write(&path, encoder.finish().unwrap()).unwrap();
        path
    }

    #[test]
    fn implicit_data_decodes_through_the_acorn_parser() {
        let path = write_uef(
            "implicit.uef",
            &[
                chunk(0x0100, &[0x12, 0x34, 0xf0]),
                chunk(0x0112, &120u16.to_le_bytes()), // trailing gap
            ],
        );

        let mut tape = UefTape::open(&path).unwrap();
        let mut parser = AcornParser::new();

        assert_eq!(parser.next_byte(&mut tape), Some(0x12));
        assert_eq!(parser.next_byte(&mut tape), Some(0x34));
        assert_eq!(parser.next_byte(&mut tape), Some(0xf0));
        assert!(!parser.error_flag());

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn carrier_tone_counts_cycles() {
        let path = write_uef("carrier.uef", &[chunk(0x0110, &100u16.to_le_bytes())]);
        let mut tape = UefTape::open(&path).unwrap();

        let mut pulses = 0;
        while !tape.at_end() {
            let pulse = tape.next_pulse();
            assert_eq!(pulse.length, Time::new(1, 4800));
            pulses += 1;
        }
        assert_eq!(pulses, 200);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn base_frequency_chunk_rescales_later_output() {
        let path = write_uef(
            "rebase.uef",
            &[
                chunk(0x0113, &2400.0f32.to_le_bytes()),
                chunk(0x0110, &1u16.to_le_bytes()),
            ],
        );
        let mut tape = UefTape::open(&path).unwrap();
        assert_eq!(tape.next_pulse().length, Time::new(1, 9600));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn accepts_only_the_uef_signature() {
        let path = temp_path("bad.uef");
        std::fs::write(&path, b"not a UEF at all").unwrap();
        assert!(matches!(UefTape::open(&path), Err(Error::InvalidFormat)));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn float_gaps_queue_silence() {
        let path = write_uef("gap.uef", &[chunk(0x0116, &0.5f32.to_le_bytes())]);
        let mut tape = UefTape::open(&path).unwrap();

        let pulse = tape.next_pulse();
        assert_eq!(pulse.kind, PulseKind::Zero);
        assert_eq!(pulse.length, Time::new(1, 2));

        let _ = std::fs::remove_file(&path);
    }
}
