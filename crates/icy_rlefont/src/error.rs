//! Error types for icy_rlefont

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RleFontError {
    // === Packing Errors ===
    #[error("Packed blob of {len} bytes does not fit the 16-bit offset space")]
    CapacityExceeded { len: usize },

    #[error("Character range starting at {first_char} packs to {len} bytes (maximum {max})")]
    RangeOverflow { first_char: u32, len: usize, max: usize },

    #[error("Dictionary needs {count} entries, only {max} fit the code space")]
    TooManyEntries { count: usize, max: usize },

    #[error("Character set needs {count} ranges, only {max} are supported")]
    TooManyRanges { count: usize, max: usize },

    #[error("Character code {code:#x} does not fit the 16-bit character field")]
    CharOutOfRange { code: u32 },

    // === Decoding Errors ===
    #[error("Invalid pixel value {value} (must be 0-15)")]
    InvalidPixel { value: u8 },

    #[error("Invalid code {code:#04x} at byte {position}")]
    InvalidCode { code: u8, position: usize },

    #[error("Glyph has {actual} pixels, expected {expected}")]
    PixelCountMismatch { expected: usize, actual: usize },

    #[error("Offset table of {len} entries does not describe {data_len} bytes of data")]
    InvalidOffsets { len: usize, data_len: usize },

    #[error("Font data truncated")]
    Truncated,

    #[error("Unsupported font format version {version}")]
    VersionMismatch { version: u8 },

    // === PSF Import Errors ===
    #[error("Invalid PSF file: magic number mismatch")]
    PsfMagicMismatch,

    #[error("Unsupported PSF version: {version}")]
    UnsupportedPsfVersion { version: u32 },

    #[error("Unknown font format ({size} bytes)")]
    UnknownFontFormat { size: usize },

    // === External Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Glyph store format error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Generic(String),
}

impl RleFontError {
    /// Create a generic error from any displayable type
    pub fn generic(msg: impl std::fmt::Display) -> Self {
        Self::Generic(msg.to_string())
    }

    /// Errors that mean the data could not be represented at all, as opposed
    /// to a malformed input. The optimizer rejects edits producing these.
    pub fn is_capacity_error(&self) -> bool {
        matches!(
            self,
            Self::CapacityExceeded { .. } | Self::RangeOverflow { .. } | Self::TooManyEntries { .. } | Self::TooManyRanges { .. }
        )
    }
}

