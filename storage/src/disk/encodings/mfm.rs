//! FM and MFM bit packing: the shift-register decoder shared by disk
//! controllers, and byte encoders capable of laying out whole tracks.

use super::crc::Crc16;
use crate::disk::pcm::{PCMSegment, PCMTrack};
use clocking::Time;

/*
 MFM sync word 0x4489
 Data  1 0 1 0 0 0 0 1   0xA1
 Clock  0 0 0 0 1 1 1 0
 MFM   0100010010101001  0x44A9 as correct encoding
 Sync  0100010010001001  0x4489, clock bit deliberately missing
*/
pub const MFM_SYNC: u16 = 0x4489;
pub const MFM_INDEX_SYNC: u16 = 0x5224;
pub const MFM_SYNC_BYTE_VALUE: u8 = 0xa1;
pub const MFM_INDEX_SYNC_BYTE_VALUE: u8 = 0xc2;

/// CRC residue after the three A1 bytes an MFM sync run stands for.
pub const MFM_POST_SYNC_CRC_VALUE: u16 = 0xcdb4;

pub const FM_ID_ADDRESS_MARK: u16 = 0xf57e;
pub const FM_DATA_ADDRESS_MARK: u16 = 0xf56f;
pub const FM_DELETED_DATA_ADDRESS_MARK: u16 = 0xf56a;
pub const FM_INDEX_ADDRESS_MARK: u16 = 0xf56b;

pub const INDEX_ADDRESS_BYTE: u8 = 0xfc;
pub const ID_ADDRESS_BYTE: u8 = 0xfe;
pub const DATA_ADDRESS_BYTE: u8 = 0xfb;
pub const DELETED_DATA_ADDRESS_BYTE: u8 = 0xf8;

/// Cell length of one raw FM bit as a fraction of a rotation: 6250 bytes
/// per track, i.e. 250 kbps at 300 rpm including clock bits.
pub const FM_BIT_LENGTH: Time = Time { length: 1, clock_rate: 50_000 };

/// Cell length of one raw MFM bit as a fraction of a rotation: 12500 bytes
/// per track, i.e. 500 kbps at 300 rpm including clock bits.
pub const MFM_BIT_LENGTH: Time = Time { length: 1, clock_rate: 100_000 };

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    /// An ordinary data byte with expected timing bits.
    Byte,
    /// The mark nominally present at the index hole position.
    Index,
    /// The mark that opens a sector header.
    Id,
    /// The mark that opens sector contents.
    Data,
    /// The mark that opens deleted sector contents.
    DeletedData,
    /// MFM only: an A1/C2 run with a missing clock bit; the byte following
    /// one of these announces which of the above it introduces.
    Sync,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub byte_value: u8,
}

fn byte_from_shift(shift: u16) -> u8 {
    // Data lives in every other bit, starting at bit 0.
    ((shift & 0x0001)
        | ((shift & 0x0004) >> 1)
        | ((shift & 0x0010) >> 2)
        | ((shift & 0x0040) >> 3)
        | ((shift & 0x0100) >> 4)
        | ((shift & 0x0400) >> 5)
        | ((shift & 0x1000) >> 6)
        | ((shift & 0x4000) >> 7)) as u8
}

/// The FM/MFM decoding shift register: accepts one bit per PLL clock,
/// watches for sync patterns and address marks, and produces a [`Token`]
/// stream with a continuously-maintained CRC.
#[derive(Clone, Debug)]
pub struct Shifter {
    shift_register: u32,
    bits_since_token: u32,
    is_double_density: bool,
    should_obey_syncs: bool,
    is_awaiting_marker_value: bool,
    token: Option<Token>,
    crc: Crc16,
}

impl Shifter {
    #[must_use]
    pub fn new() -> Self {
        Shifter {
            shift_register: 0,
            bits_since_token: 0,
            is_double_density: false,
            should_obey_syncs: true,
            is_awaiting_marker_value: false,
            token: None,
            crc: Crc16::new(),
        }
    }

    pub fn set_is_double_density(&mut self, is_double_density: bool) {
        self.is_double_density = is_double_density;
        if !is_double_density {
            self.is_awaiting_marker_value = false;
        }
    }

    #[must_use]
    pub fn is_double_density(&self) -> bool {
        self.is_double_density
    }

    /// While obeying syncs, any sync pattern re-frames the byte stream,
    /// even mid-byte; with syncs ignored, a byte is produced every sixteen
    /// bits regardless, which is what sector-content reads want.
    pub fn set_should_obey_syncs(&mut self, should_obey_syncs: bool) {
        self.should_obey_syncs = should_obey_syncs;
    }

    pub fn crc(&self) -> u16 {
        self.crc.value()
    }

    pub fn crc_mut(&mut self) -> &mut Crc16 {
        &mut self.crc
    }

    /// Takes the token completed by the most recent input bit, if any.
    pub fn take_token(&mut self) -> Option<Token> {
        self.token.take()
    }

    pub fn add_input_bit(&mut self, bit: bool) {
        self.shift_register = (self.shift_register << 1) | u32::from(bit);
        self.bits_since_token += 1;

        if self.should_obey_syncs {
            let low_sixteen = (self.shift_register & 0xffff) as u16;
            if !self.is_double_density {
                let mark = match low_sixteen {
                    FM_INDEX_ADDRESS_MARK => Some((TokenKind::Index, INDEX_ADDRESS_BYTE)),
                    FM_ID_ADDRESS_MARK => Some((TokenKind::Id, ID_ADDRESS_BYTE)),
                    FM_DATA_ADDRESS_MARK => Some((TokenKind::Data, DATA_ADDRESS_BYTE)),
                    FM_DELETED_DATA_ADDRESS_MARK => {
                        Some((TokenKind::DeletedData, DELETED_DATA_ADDRESS_BYTE))
                    }
                    _ => None,
                };
                if let Some((kind, byte_value)) = mark {
                    self.crc.reset();
                    self.crc.add(byte_value);
                    self.bits_since_token = 0;
                    self.token = Some(Token { kind, byte_value });
                    return;
                }
            } else {
                match low_sixteen {
                    MFM_INDEX_SYNC => {
                        self.bits_since_token = 0;
                        self.is_awaiting_marker_value = true;
                        self.token = Some(Token {
                            kind: TokenKind::Sync,
                            byte_value: MFM_INDEX_SYNC_BYTE_VALUE,
                        });
                        return;
                    }
                    MFM_SYNC => {
                        self.bits_since_token = 0;
                        self.is_awaiting_marker_value = true;
                        self.crc.set_value(MFM_POST_SYNC_CRC_VALUE);
                        self.token = Some(Token {
                            kind: TokenKind::Sync,
                            byte_value: MFM_SYNC_BYTE_VALUE,
                        });
                        return;
                    }
                    _ => {}
                }
            }
        }

        if self.bits_since_token == 16 {
            self.bits_since_token = 0;
            let byte_value = byte_from_shift((self.shift_register & 0xffff) as u16);

            let mut kind = TokenKind::Byte;
            if self.is_awaiting_marker_value && self.is_double_density {
                self.is_awaiting_marker_value = false;
                kind = match byte_value {
                    INDEX_ADDRESS_BYTE => TokenKind::Index,
                    ID_ADDRESS_BYTE => TokenKind::Id,
                    DATA_ADDRESS_BYTE => TokenKind::Data,
                    DELETED_DATA_ADDRESS_BYTE => TokenKind::DeletedData,
                    _ => TokenKind::Byte,
                };
            }

            self.crc.add(byte_value);
            self.token = Some(Token { kind, byte_value });
        }
    }
}

impl Default for Shifter {
    fn default() -> Self {
        Shifter::new()
    }
}

/// Writes correctly-clocked FM or MFM shorts into a byte buffer, keeping
/// the running CRC that sector framing requires.
pub trait Encoder {
    fn add_byte(&mut self, byte: u8);
    fn add_index_address_mark(&mut self);
    fn add_id_address_mark(&mut self);
    fn add_data_address_mark(&mut self);
    fn add_deleted_data_address_mark(&mut self);
    fn output_short(&mut self, value: u16);

    fn crc(&self) -> u16;
    fn set_crc(&mut self, value: u16);
    fn reset_crc(&mut self);

    /// Appends the current CRC, high byte first. The CRC bytes pass through
    /// `add_byte` and therefore fold into the continuing CRC themselves.
    fn add_crc(&mut self) {
        let value = self.crc();
        self.add_byte((value >> 8) as u8);
        self.add_byte((value & 0xff) as u8);
    }
}

pub struct MfmEncoder<'a> {
    target: &'a mut Vec<u8>,
    crc: Crc16,
    last_output: u16,
}

impl<'a> MfmEncoder<'a> {
    pub fn new(target: &'a mut Vec<u8>) -> Self {
        MfmEncoder {
            target,
            crc: Crc16::new(),
            last_output: 0,
        }
    }

    fn output_sync(&mut self) {
        for _ in 0..3 {
            self.output_short(MFM_SYNC);
        }
        self.crc.set_value(MFM_POST_SYNC_CRC_VALUE);
    }
}

impl Encoder for MfmEncoder<'_> {
    fn add_byte(&mut self, byte: u8) {
        self.crc.add(byte);
        let spread = spread_bits(byte);
        // A clock bit fills each cell that has a 0 on both sides.
        let or_bits = (spread << 1) | (spread >> 1) | (self.last_output << 15);
        let output = spread | (!or_bits & 0xaaaa);
        self.output_short(output);
    }

    fn add_index_address_mark(&mut self) {
        for _ in 0..3 {
            self.output_short(MFM_INDEX_SYNC);
        }
        self.add_byte(INDEX_ADDRESS_BYTE);
    }

    fn add_id_address_mark(&mut self) {
        self.output_sync();
        self.add_byte(ID_ADDRESS_BYTE);
    }

    fn add_data_address_mark(&mut self) {
        self.output_sync();
        self.add_byte(DATA_ADDRESS_BYTE);
    }

    fn add_deleted_data_address_mark(&mut self) {
        self.output_sync();
        self.add_byte(DELETED_DATA_ADDRESS_BYTE);
    }

    fn output_short(&mut self, value: u16) {
        self.last_output = value;
        self.target.push((value >> 8) as u8);
        self.target.push((value & 0xff) as u8);
    }

    fn crc(&self) -> u16 {
        self.crc.value()
    }

    fn set_crc(&mut self, value: u16) {
        self.crc.set_value(value);
    }

    fn reset_crc(&mut self) {
        self.crc.reset();
    }
}

pub struct FmEncoder<'a> {
    target: &'a mut Vec<u8>,
    crc: Crc16,
}

impl<'a> FmEncoder<'a> {
    pub fn new(target: &'a mut Vec<u8>) -> Self {
        FmEncoder {
            target,
            crc: Crc16::new(),
        }
    }

    fn add_mark(&mut self, mark: u16, byte_value: u8) {
        self.crc.reset();
        self.crc.add(byte_value);
        self.output_short(mark);
    }
}

impl Encoder for FmEncoder<'_> {
    fn add_byte(&mut self, byte: u8) {
        self.crc.add(byte);
        // Every clock bit is present in FM.
        self.output_short(spread_bits(byte) | 0xaaaa);
    }

    fn add_index_address_mark(&mut self) {
        self.add_mark(FM_INDEX_ADDRESS_MARK, INDEX_ADDRESS_BYTE);
    }

    fn add_id_address_mark(&mut self) {
        self.add_mark(FM_ID_ADDRESS_MARK, ID_ADDRESS_BYTE);
    }

    fn add_data_address_mark(&mut self) {
        self.add_mark(FM_DATA_ADDRESS_MARK, DATA_ADDRESS_BYTE);
    }

    fn add_deleted_data_address_mark(&mut self) {
        self.add_mark(FM_DELETED_DATA_ADDRESS_MARK, DELETED_DATA_ADDRESS_BYTE);
    }

    fn output_short(&mut self, value: u16) {
        self.target.push((value >> 8) as u8);
        self.target.push((value & 0xff) as u8);
    }

    fn crc(&self) -> u16 {
        self.crc.value()
    }

    fn set_crc(&mut self, value: u16) {
        self.crc.set_value(value);
    }

    fn reset_crc(&mut self) {
        self.crc.reset();
    }
}

fn spread_bits(byte: u8) -> u16 {
    let byte = u16::from(byte);
    (byte & 0x01)
        | ((byte & 0x02) << 1)
        | ((byte & 0x04) << 2)
        | ((byte & 0x08) << 3)
        | ((byte & 0x10) << 4)
        | ((byte & 0x20) << 5)
        | ((byte & 0x40) << 6)
        | ((byte & 0x80) << 7)
}

/// A sector to be laid out on a track.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sector {
    pub track: u8,
    pub side: u8,
    pub sector: u8,
    pub is_deleted: bool,
    pub data: Vec<u8>,
}

fn logarithmic_size_for_size(size: usize) -> u8 {
    match size {
        256 => 1,
        512 => 2,
        1024 => 3,
        2048 => 4,
        4096 => 5,
        _ => 0,
    }
}

#[allow(clippy::too_many_arguments)]
fn fill_track(
    encoder: &mut dyn Encoder,
    sectors: &[Sector],
    post_index_address_mark_bytes: usize,
    post_index_address_mark_value: u8,
    pre_address_mark_bytes: usize,
    post_address_mark_bytes: usize,
    pre_data_mark_bytes: usize,
    post_data_bytes: usize,
    inter_sector_gap: usize,
) {
    encoder.add_index_address_mark();
    for _ in 0..post_index_address_mark_bytes {
        encoder.add_byte(post_index_address_mark_value);
    }

    for sector in sectors {
        for _ in 0..pre_address_mark_bytes {
            encoder.add_byte(0x00);
        }

        encoder.add_id_address_mark();
        encoder.add_byte(sector.track);
        encoder.add_byte(sector.side);
        encoder.add_byte(sector.sector);
        encoder.add_byte(logarithmic_size_for_size(sector.data.len()));
        encoder.add_crc();

        for _ in 0..post_address_mark_bytes {
            encoder.add_byte(0x4e);
        }
        for _ in 0..pre_data_mark_bytes {
            encoder.add_byte(0x00);
        }

        if sector.is_deleted {
            encoder.add_deleted_data_address_mark();
        } else {
            encoder.add_data_address_mark();
        }
        for byte in &sector.data {
            encoder.add_byte(*byte);
        }
        encoder.add_crc();

        for _ in 0..post_data_bytes {
            encoder.add_byte(0x00);
        }
        for _ in 0..inter_sector_gap {
            encoder.add_byte(0x4e);
        }
    }
}

/// Builds a complete single-density track: 250 kbps including clocks at
/// 300 rpm gives 6250 encoded bytes per rotation.
#[must_use]
pub fn fm_track_with_sectors(sectors: &[Sector]) -> PCMTrack {
    const EXPECTED_TRACK_BYTES: usize = 6250;

    let mut data = Vec::with_capacity(EXPECTED_TRACK_BYTES);
    {
        let mut encoder = FmEncoder::new(&mut data);
        fill_track(&mut encoder, sectors, 16, 0x00, 6, 0, 17, 14, 0);
        while encoder.target.len() < EXPECTED_TRACK_BYTES {
            encoder.add_byte(0x00);
        }
    }

    PCMTrack::from_segment(PCMSegment::from_data(data, FM_BIT_LENGTH))
}

/// Builds a complete double-density track: 500 kbps including clocks at
/// 300 rpm gives 12500 encoded bytes per rotation.
#[must_use]
pub fn mfm_track_with_sectors(sectors: &[Sector]) -> PCMTrack {
    const EXPECTED_TRACK_BYTES: usize = 12500;

    let mut data = Vec::with_capacity(EXPECTED_TRACK_BYTES);
    {
        let mut encoder = MfmEncoder::new(&mut data);
        fill_track(&mut encoder, sectors, 50, 0x4e, 12, 22, 12, 18, 32);
        while encoder.target.len() < EXPECTED_TRACK_BYTES {
            encoder.add_byte(0x00);
        }
    }

    PCMTrack::from_segment(PCMSegment::from_data(data, MFM_BIT_LENGTH))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shift_bytes_into(shifter: &mut Shifter, data: &[u8]) -> Vec<Token> {
        let mut tokens = Vec::new();
        for byte in data {
            for bit in (0..8).rev() {
                shifter.add_input_bit((byte >> bit) & 1 != 0);
                if let Some(token) = shifter.take_token() {
                    tokens.push(token);
                }
            }
        }
        tokens
    }

    #[test]
    fn mfm_byte_encoding_inserts_clock_bits() {
        let mut data = Vec::new();
        let mut encoder = MfmEncoder::new(&mut data);
        // 0x00 after a 0 data bit: alternating clock bits, 0xaaaa.
        encoder.add_byte(0x00);
        assert_eq!(data, vec![0xaa, 0xaa]);

        data.clear();
        let mut encoder = MfmEncoder::new(&mut data);
        encoder.add_byte(0xff);
        assert_eq!(data, vec![0x55, 0x55]);
    }

    #[test]
    fn fm_byte_encoding_keeps_all_clocks() {
        let mut data = Vec::new();
        let mut encoder = FmEncoder::new(&mut data);
        encoder.add_byte(0x00);
        assert_eq!(data, vec![0xaa, 0xaa]);

        data.clear();
        let mut encoder = FmEncoder::new(&mut data);
        encoder.add_byte(0xff);
        assert_eq!(data, vec![0xff, 0xff]);
    }

    #[test]
    fn mfm_sync_is_recognised_and_reframes() {
        let mut shifter = Shifter::new();
        shifter.set_is_double_density(true);

        // A deliberately misframing run of gap bytes, then a sync triple
        // and an ID mark.
        let mut data = Vec::new();
        {
            let mut encoder = MfmEncoder::new(&mut data);
            for _ in 0..4 {
                encoder.add_byte(0x4e);
            }
            encoder.add_id_address_mark();
            encoder.add_byte(0x02);
        }

        let tokens = shift_bytes_into(&mut shifter, &data);
        let relevant: Vec<&Token> = tokens
            .iter()
            .filter(|token| token.kind != TokenKind::Byte)
            .collect();
        assert_eq!(relevant.len(), 4);
        assert!(relevant[..3]
            .iter()
            .all(|token| token.kind == TokenKind::Sync && token.byte_value == 0xa1));
        assert_eq!(relevant[3].kind, TokenKind::Id);
        assert_eq!(relevant[3].byte_value, 0xfe);

        // And the byte after the promoted marker is an ordinary byte.
        assert_eq!(
            tokens.last().map(|token| (token.kind, token.byte_value)),
            Some((TokenKind::Byte, 0x02))
        );
    }

    #[test]
    fn fm_address_marks_are_recognised_directly() {
        let mut shifter = Shifter::new();
        shifter.set_is_double_density(false);

        let mut data = Vec::new();
        {
            let mut encoder = FmEncoder::new(&mut data);
            for _ in 0..3 {
                encoder.add_byte(0xff);
            }
            encoder.add_data_address_mark();
            encoder.add_byte(0x55);
        }

        let tokens = shift_bytes_into(&mut shifter, &data);
        let mark_index = tokens
            .iter()
            .position(|token| token.kind == TokenKind::Data)
            .expect("data mark not seen");
        assert_eq!(tokens[mark_index].byte_value, 0xfb);
        assert_eq!(tokens[mark_index + 1].kind, TokenKind::Byte);
        assert_eq!(tokens[mark_index + 1].byte_value, 0x55);
    }

    #[test]
    fn crc_survives_an_encode_decode_round_trip() {
        // Encode a sector header; the decoder's running CRC must be zero
        // after consuming the two CRC bytes.
        let mut data = Vec::new();
        {
            let mut encoder = MfmEncoder::new(&mut data);
            encoder.add_byte(0x4e);
            encoder.add_id_address_mark();
            encoder.add_byte(0x01);
            encoder.add_byte(0x00);
            encoder.add_byte(0x05);
            encoder.add_byte(0x02);
            encoder.add_crc();
        }

        let mut shifter = Shifter::new();
        shifter.set_is_double_density(true);
        let tokens = shift_bytes_into(&mut shifter, &data);

        assert!(tokens.iter().any(|token| token.kind == TokenKind::Id));
        assert_eq!(shifter.crc(), 0);
    }

    #[test]
    fn reading_mode_suppresses_syncs() {
        // A 0x4489 pattern inside sector data must not reframe the stream
        // once syncs are being ignored.
        let mut shifter = Shifter::new();
        shifter.set_is_double_density(true);
        shifter.set_should_obey_syncs(false);

        let tokens = shift_bytes_into(&mut shifter, &[0x44, 0x89, 0x44, 0x89]);
        assert_eq!(tokens.len(), 2);
        assert!(tokens.iter().all(|token| token.kind == TokenKind::Byte));
    }
}
