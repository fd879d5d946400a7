//! Byte blob addressed by a 16-bit offset table.
//!
//! `offsets[i]` is the start of entry `i`, the last offset is a sentinel equal
//! to the blob length. Entry lengths are never stored.

use crate::{Result, RleFontError};

/// Largest blob whose sentinel offset still fits 16 bits.
pub const MAX_BLOB_LEN: usize = u16::MAX as usize;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackedBlob {
    pub data: Vec<u8>,
    pub offsets: Vec<u16>,
}

impl PackedBlob {
    /// Packs `entries` in order, one offset per entry plus the sentinel.
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a [u8]>) -> Result<Self> {
        let mut builder = PackedBlobBuilder::new();
        for entry in entries {
            builder.push_entry(entry)?;
        }
        builder.finish()
    }

    /// Checks the offset invariant on data read from elsewhere.
    pub fn from_parts(data: Vec<u8>, offsets: Vec<u16>) -> Result<Self> {
        let valid = offsets.first() == Some(&0)
            && offsets.windows(2).all(|w| w[0] <= w[1])
            && offsets.last().map(|&o| o as usize) == Some(data.len());
        if !valid {
            return Err(RleFontError::InvalidOffsets {
                len: offsets.len(),
                data_len: data.len(),
            });
        }
        Ok(Self { data, offsets })
    }

    pub fn entry_count(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    pub fn entry(&self, index: usize) -> Option<&[u8]> {
        let start = *self.offsets.get(index)? as usize;
        let end = *self.offsets.get(index + 1)? as usize;
        self.data.get(start..end)
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        (0..self.entry_count()).filter_map(|i| self.entry(i))
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Incremental builder. Offsets may be pushed without data to let several
/// entries share one stored copy.
#[derive(Debug, Default)]
pub struct PackedBlobBuilder {
    data: Vec<u8>,
    offsets: Vec<u16>,
}

impl PackedBlobBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current data length as an offset.
    pub fn position(&self) -> Result<u16> {
        u16::try_from(self.data.len()).map_err(|_| RleFontError::CapacityExceeded { len: self.data.len() })
    }

    pub fn data_len(&self) -> usize {
        self.data.len()
    }

    /// Appends a new entry and returns its offset.
    pub fn push_entry(&mut self, bytes: &[u8]) -> Result<u16> {
        let offset = self.begin_entry()?;
        self.data.extend_from_slice(bytes);
        Ok(offset)
    }

    /// Records an offset at the current position without appending data.
    /// The caller appends the entry bytes with [`Self::extend`].
    pub fn begin_entry(&mut self) -> Result<u16> {
        let offset = self.position()?;
        self.offsets.push(offset);
        Ok(offset)
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub fn push(&mut self, byte: u8) {
        self.data.push(byte);
    }

    /// Records an entry that reuses already stored data.
    pub fn push_offset(&mut self, offset: u16) {
        self.offsets.push(offset);
    }

    /// Appends the sentinel. Fails if the blob outgrew the offset space.
    pub fn finish(mut self) -> Result<PackedBlob> {
        let sentinel = self.position()?;
        self.offsets.push(sentinel);
        Ok(PackedBlob {
            data: self.data,
            offsets: self.offsets,
        })
    }
}
