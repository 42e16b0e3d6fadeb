//! EXOS file headers.
//!
//! Loadable EXOS files start with a 16-byte header: a zero byte, the file
//! type, the little-endian length of the data that follows and twelve
//! reserved zero bytes.

use std::fmt;

/// Size of an EXOS file header.
pub const HEADER_LEN: usize = 16;

/// EXOS loadable file type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExosFileType {
    /// New application program, loaded at 0x0100.
    Program,
    /// Relocatable system extension, loaded at 0xC00A.
    Extension,
}

impl ExosFileType {
    /// Decode a header type byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            5 => Some(Self::Program),
            6 => Some(Self::Extension),
            _ => None,
        }
    }

    /// Header type byte.
    pub fn to_byte(self) -> u8 {
        match self {
            Self::Program => 5,
            Self::Extension => 6,
        }
    }

    /// Address the file contents are loaded at.
    pub fn load_address(self) -> u16 {
        match self {
            Self::Program => 0x0100,
            Self::Extension => 0xC00A,
        }
    }
}

impl fmt::Display for ExosFileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Program => write!(f, "program"),
            Self::Extension => write!(f, "extension"),
        }
    }
}

/// A parsed EXOS header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExosHeader {
    /// File type.
    pub file_type: ExosFileType,
    /// Declared length of the data after the header.
    pub length: u16,
}

impl ExosHeader {
    /// Create a header.
    pub fn new(file_type: ExosFileType, length: u16) -> Self {
        Self { file_type, length }
    }

    /// Parse the header at the start of `data`.
    ///
    /// The declared length must be non-zero and fit in the bytes that
    /// follow the header.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() <= HEADER_LEN || data[0] != 0 {
            return None;
        }
        let file_type = ExosFileType::from_byte(data[1])?;
        let length = u16::from_le_bytes([data[2], data[3]]);
        if length == 0 || length as usize > data.len() - HEADER_LEN {
            return None;
        }
        Some(Self { file_type, length })
    }

    /// Serialize the header.
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[1] = self.file_type.to_byte();
        out[2..4].copy_from_slice(&self.length.to_le_bytes());
        out
    }
}

/// Split off an EXOS header if `data` starts with a valid one.
///
/// The returned data is cut to the declared length.
pub fn strip_header(data: &[u8]) -> (Option<ExosHeader>, &[u8]) {
    match ExosHeader::parse(data) {
        Some(header) => (Some(header), &data[HEADER_LEN..HEADER_LEN + header.length as usize]),
        None => (None, data),
    }
}
