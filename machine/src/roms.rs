use thiserror::Error;

/// One ROM a machine needs the host to supply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RomRequest {
    /// The machine asking, e.g. "Electron".
    pub machine: &'static str,
    /// The conventional file name, e.g. "os.rom".
    pub file_name: &'static str,
    pub size: usize,
    /// CRC32 of a known-good dump, where one is on record.
    pub crc32: Option<u32>,
}

impl RomRequest {
    #[must_use]
    pub fn new(machine: &'static str, file_name: &'static str, size: usize) -> Self {
        RomRequest {
            machine,
            file_name,
            size,
            crc32: None,
        }
    }

    #[must_use]
    pub fn with_crc32(mut self, crc32: u32) -> Self {
        self.crc32 = Some(crc32);
        self
    }

    /// Whether `data` plausibly satisfies this request; the CRC, if known,
    /// is the host's concern to verify.
    #[must_use]
    pub fn accepts(&self, data: &[u8]) -> bool {
        data.len() == self.size
    }
}

/// Construction-time failure: the host could not supply every ROM the
/// machine requires.
#[derive(Debug, Error)]
#[error("missing ROMs: {}", describe(.0))]
pub struct MissingRoms(pub Vec<RomRequest>);

fn describe(requests: &[RomRequest]) -> String {
    requests
        .iter()
        .map(|request| format!("{}/{}", request.machine, request.file_name))
        .collect::<Vec<_>>()
        .join(", ")
}
