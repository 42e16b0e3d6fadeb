//! Error types for epcompress operations.
//!
//! Errors fall into three groups: caller contract violations (rejected before
//! anything is written), corrupted compressed data found while decoding, and
//! internal invariant violations that indicate an engine defect. Cancellation
//! through a progress callback is not an error; see
//! [`CompressStatus`](crate::traits::CompressStatus).

use std::io;
use thiserror::Error;

/// The main error type for epcompress operations.
#[derive(Debug, Error)]
pub enum EpError {
    /// I/O error from an underlying reader or writer.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The caller passed arguments the operation cannot accept.
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// Description of the contract violation.
        message: String,
    },

    /// Unknown compression profile identifier.
    #[error("Invalid compression type: {id}")]
    InvalidProfile {
        /// The rejected profile id.
        id: i32,
    },

    /// The compressed stream ended before decoding was complete.
    #[error("Unexpected end of compressed data at byte {offset}")]
    UnexpectedEnd {
        /// Input position where more data was required.
        offset: usize,
    },

    /// Checksum verification failed.
    #[error("Checksum mismatch: expected {expected:#04x}, computed {computed:#04x}")]
    ChecksumMismatch {
        /// Value the checksum recurrence must reach.
        expected: u8,
        /// Value actually computed.
        computed: u8,
    },

    /// Corrupted data in the compressed stream.
    #[error("Error in compressed data at byte {offset}: {message}")]
    CorruptedData {
        /// Input position where corruption was detected.
        offset: usize,
        /// Description of the corruption.
        message: String,
    },

    /// A back-reference points outside the data decoded so far.
    #[error("Invalid back-reference distance: {distance} exceeds {available} decoded bytes")]
    InvalidDistance {
        /// The invalid distance value.
        distance: usize,
        /// Bytes available for reference.
        available: usize,
    },

    /// A decoded block writes or reads an address it may not touch.
    #[error("Invalid address {address:#06x}: {message}")]
    InvalidAddress {
        /// The offending address.
        address: usize,
        /// What was wrong with it.
        message: String,
    },

    /// A decode table in a block header is malformed.
    #[error("Invalid decode table: {message}")]
    InvalidTable {
        /// Description of the table error.
        message: String,
    },

    /// The self-extracting image would exceed a target machine limit.
    #[error("SFX image too large: {message}")]
    SfxLimit {
        /// Which limit was exceeded.
        message: String,
    },

    /// The data is not a recognizable self-extracting program.
    #[error("Input data is not an SFX program: {message}")]
    NotSfx {
        /// Why the data was rejected.
        message: String,
    },

    /// An internal invariant was violated.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the violated invariant.
        message: String,
    },
}

/// Result type alias for epcompress operations.
pub type Result<T> = std::result::Result<T, EpError>;

impl EpError {
    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an invalid profile error.
    pub fn invalid_profile(id: i32) -> Self {
        Self::InvalidProfile { id }
    }

    /// Create an unexpected end of data error.
    pub fn unexpected_end(offset: usize) -> Self {
        Self::UnexpectedEnd { offset }
    }

    /// Create a checksum mismatch error.
    pub fn checksum_mismatch(expected: u8, computed: u8) -> Self {
        Self::ChecksumMismatch { expected, computed }
    }

    /// Create a corrupted data error.
    pub fn corrupted(offset: usize, message: impl Into<String>) -> Self {
        Self::CorruptedData {
            offset,
            message: message.into(),
        }
    }

    /// Create an invalid distance error.
    pub fn invalid_distance(distance: usize, available: usize) -> Self {
        Self::InvalidDistance {
            distance,
            available,
        }
    }

    /// Create an invalid address error.
    pub fn invalid_address(address: usize, message: impl Into<String>) -> Self {
        Self::InvalidAddress {
            address,
            message: message.into(),
        }
    }

    /// Create an invalid decode table error.
    pub fn invalid_table(message: impl Into<String>) -> Self {
        Self::InvalidTable {
            message: message.into(),
        }
    }

    /// Create an SFX size limit error.
    pub fn sfx_limit(message: impl Into<String>) -> Self {
        Self::SfxLimit {
            message: message.into(),
        }
    }

    /// Create a not-an-SFX-program error.
    pub fn not_sfx(message: impl Into<String>) -> Self {
        Self::NotSfx {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this error describes damaged or foreign compressed data.
    ///
    /// Auto-detection uses this to decide whether another profile is worth
    /// trying.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            Self::UnexpectedEnd { .. }
                | Self::ChecksumMismatch { .. }
                | Self::CorruptedData { .. }
                | Self::InvalidDistance { .. }
                | Self::InvalidAddress { .. }
                | Self::InvalidTable { .. }
        )
    }
}
