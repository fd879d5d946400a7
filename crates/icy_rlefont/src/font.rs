//! Font assembly and the binary font object read by the firmware renderer.
//!
//! Layout (little-endian):
//!
//! ```text
//! u8  version (4)
//! u8  width, height, min_x_advance, max_x_advance
//! i8  baseline_x
//! u8  baseline_y, line_height, flags
//! u16 fallback_character
//! u8  rle_entry_count, dict_entry_count
//! u16 dictionary data length, data, (rle + dict + 1) u16 offsets
//! u8  range count
//!     per range: u16 first_char, u16 char_count,
//!                u32 glyph data length, data, (char_count + 1) u16 offsets
//! ```

use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::blob::{MAX_BLOB_LEN, PackedBlob};
use crate::char_range::{
    MAX_CHAR_RANGES, MAX_RANGE_BYTES, PackedCharRange, PartitionOptions, compute_char_ranges, encode_character_range,
};
use crate::dictionary::pack_dictionary;
use crate::encoder::encode_font;
use crate::glyph_store::{FLAG_BW, GlyphStore};
use crate::{Result, RleFontError};

pub const RLEFONT_FORMAT_VERSION: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FontMetrics {
    pub width: u8,
    pub height: u8,
    pub min_x_advance: u8,
    pub max_x_advance: u8,
    pub baseline_x: i8,
    pub baseline_y: u8,
    pub line_height: u8,
    pub flags: u8,
    pub fallback_character: u16,
}

/// The assembled font. Read-only once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RleFont {
    pub metrics: FontMetrics,
    pub version: u8,
    pub dictionary: PackedBlob,
    pub rle_entry_count: u8,
    pub dict_entry_count: u8,
    pub char_ranges: Vec<PackedCharRange>,
}

impl RleFont {
    /// Assembles the font with the default partitioning limits.
    pub fn from_store(store: &GlyphStore) -> Result<Self> {
        assemble_font(store, &PartitionOptions::default())
    }

    pub fn char_range_for(&self, code: u32) -> Option<&PackedCharRange> {
        self.char_ranges.iter().find(|r| r.contains(code))
    }

    /// Size of the serialized font object.
    pub fn data_size(&self) -> usize {
        let header = 11 + 2;
        let dictionary = 2 + self.dictionary.data.len() + 2 * self.dictionary.offsets.len();
        let ranges: usize = self
            .char_ranges
            .iter()
            .map(|r| 8 + r.glyph_data.len() + 2 * r.glyph_offsets.len())
            .sum();
        header + dictionary + 1 + ranges
    }

    /// Writes the font object. Nothing reaches `writer` unless every field
    /// fits its wire width.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.to_bytes()?)?;
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let m = &self.metrics;
        let mut result = Vec::with_capacity(self.data_size());
        result.write_u8(self.version)?;
        result.write_u8(m.width)?;
        result.write_u8(m.height)?;
        result.write_u8(m.min_x_advance)?;
        result.write_u8(m.max_x_advance)?;
        result.write_i8(m.baseline_x)?;
        result.write_u8(m.baseline_y)?;
        result.write_u8(m.line_height)?;
        result.write_u8(m.flags)?;
        result.write_u16::<LittleEndian>(m.fallback_character)?;

        result.write_u8(self.rle_entry_count)?;
        result.write_u8(self.dict_entry_count)?;
        let dictionary_len = u16::try_from(self.dictionary.data.len()).map_err(|_| RleFontError::CapacityExceeded {
            len: self.dictionary.data.len(),
        })?;
        result.write_u16::<LittleEndian>(dictionary_len)?;
        result.extend_from_slice(&self.dictionary.data);
        for &offset in &self.dictionary.offsets {
            result.write_u16::<LittleEndian>(offset)?;
        }

        let range_count = u8::try_from(self.char_ranges.len()).map_err(|_| RleFontError::TooManyRanges {
            count: self.char_ranges.len(),
            max: u8::MAX as usize,
        })?;
        result.write_u8(range_count)?;
        for range in &self.char_ranges {
            let first_char = u16::try_from(range.first_char).map_err(|_| RleFontError::CharOutOfRange { code: range.first_char })?;
            let char_count = u16::try_from(range.char_count).map_err(|_| RleFontError::CharOutOfRange {
                code: range.first_char.saturating_add(range.char_count).saturating_sub(1),
            })?;
            if range.glyph_offsets.len() != range.char_count as usize + 1 {
                return Err(RleFontError::InvalidOffsets {
                    len: range.glyph_offsets.len(),
                    data_len: range.glyph_data.len(),
                });
            }
            let data_len = u32::try_from(range.glyph_data.len()).map_err(|_| RleFontError::RangeOverflow {
                first_char: range.first_char,
                len: range.glyph_data.len(),
                max: MAX_RANGE_BYTES,
            })?;
            result.write_u16::<LittleEndian>(first_char)?;
            result.write_u16::<LittleEndian>(char_count)?;
            result.write_u32::<LittleEndian>(data_len)?;
            result.extend_from_slice(&range.glyph_data);
            for &offset in &range.glyph_offsets {
                result.write_u16::<LittleEndian>(offset)?;
            }
        }
        Ok(result)
    }

    pub fn read(data: &[u8]) -> Result<Self> {
        read_font(&mut Cursor::new(data)).map_err(|err| match err {
            RleFontError::Io(io) if io.kind() == std::io::ErrorKind::UnexpectedEof => RleFontError::Truncated,
            err => err,
        })
    }
}

fn read_font(br: &mut Cursor<&[u8]>) -> Result<RleFont> {
    let version = br.read_u8()?;
    if version != RLEFONT_FORMAT_VERSION {
        return Err(RleFontError::VersionMismatch { version });
    }

    let metrics = FontMetrics {
        width: br.read_u8()?,
        height: br.read_u8()?,
        min_x_advance: br.read_u8()?,
        max_x_advance: br.read_u8()?,
        baseline_x: br.read_i8()?,
        baseline_y: br.read_u8()?,
        line_height: br.read_u8()?,
        flags: br.read_u8()?,
        fallback_character: br.read_u16::<LittleEndian>()?,
    };

    let rle_entry_count = br.read_u8()?;
    let dict_entry_count = br.read_u8()?;
    let dictionary_len = br.read_u16::<LittleEndian>()? as usize;
    let dictionary_data = read_bytes(br, dictionary_len)?;
    let dictionary_offsets = read_offsets(br, rle_entry_count as usize + dict_entry_count as usize + 1)?;
    let dictionary = PackedBlob::from_parts(dictionary_data, dictionary_offsets)?;

    let range_count = br.read_u8()?;
    let mut char_ranges = Vec::with_capacity(range_count as usize);
    for _ in 0..range_count {
        let first_char = u32::from(br.read_u16::<LittleEndian>()?);
        let char_count = u32::from(br.read_u16::<LittleEndian>()?);
        let data_len = br.read_u32::<LittleEndian>()? as usize;
        if data_len > MAX_RANGE_BYTES {
            return Err(RleFontError::RangeOverflow {
                first_char,
                len: data_len,
                max: MAX_RANGE_BYTES,
            });
        }
        let glyph_data = read_bytes(br, data_len)?;
        let glyph_offsets = read_offsets(br, char_count as usize + 1)?;
        if glyph_offsets.iter().any(|&o| o as usize > glyph_data.len()) || glyph_offsets.last().map(|&o| o as usize) != Some(glyph_data.len()) {
            return Err(RleFontError::InvalidOffsets {
                len: glyph_offsets.len(),
                data_len: glyph_data.len(),
            });
        }
        char_ranges.push(PackedCharRange {
            first_char,
            char_count,
            glyph_data,
            glyph_offsets,
        });
    }

    Ok(RleFont {
        metrics,
        version,
        dictionary,
        rle_entry_count,
        dict_entry_count,
        char_ranges,
    })
}

fn read_bytes(br: &mut Cursor<&[u8]>, len: usize) -> Result<Vec<u8>> {
    let mut data = vec![0; len];
    br.read_exact(&mut data)?;
    Ok(data)
}

fn read_offsets(br: &mut Cursor<&[u8]>, count: usize) -> Result<Vec<u16>> {
    let mut offsets = Vec::with_capacity(count);
    for _ in 0..count {
        offsets.push(br.read_u16::<LittleEndian>()?);
    }
    Ok(offsets)
}

/// Builds the font object from the store's current state. Deterministic and
/// read-only; no partial font is returned on error.
pub fn assemble_font(store: &GlyphStore, options: &PartitionOptions) -> Result<RleFont> {
    let info = store.info();
    let char_to_glyph = store.char_to_glyph();
    if let Some((&code, _)) = char_to_glyph.range(u32::from(u16::MAX) + 1..).next() {
        return Err(RleFontError::CharOutOfRange { code });
    }
    let fallback = store.fallback_char();

    let metrics = FontMetrics {
        width: info.max_width,
        height: info.max_height,
        min_x_advance: store.min_x_advance(),
        max_x_advance: store.max_x_advance(),
        baseline_x: info.baseline_x,
        baseline_y: info.baseline_y,
        line_height: info.line_height,
        flags: info.flags | FLAG_BW,
        fallback_character: u16::try_from(fallback).map_err(|_| RleFontError::CharOutOfRange { code: fallback })?,
    };

    let encoded = encode_font(store);
    let dictionary = pack_dictionary(&encoded.dictionary)?;
    let rle_entry_count = count_u8(encoded.dictionary.rle_count())?;
    let dict_entry_count = count_u8(encoded.dictionary.ref_count())?;

    // caller limits may only tighten what the format can hold
    let limits = PartitionOptions {
        max_range_bytes: options.max_range_bytes.min(MAX_BLOB_LEN),
        max_ranges: options.max_ranges.min(MAX_CHAR_RANGES),
        minimum_gap: options.minimum_gap,
    };
    let ranges = compute_char_ranges(&char_to_glyph, |i| encoded.glyph(i).len() + 1, &limits)?;
    let mut char_ranges = Vec::with_capacity(ranges.len());
    for range in &ranges {
        let packed = encode_character_range(range, &encoded, store)?;
        if packed.glyph_data.len() > limits.max_range_bytes {
            return Err(RleFontError::RangeOverflow {
                first_char: packed.first_char,
                len: packed.glyph_data.len(),
                max: limits.max_range_bytes,
            });
        }
        char_ranges.push(packed);
    }

    log::info!(
        "assembled font '{}': {} dictionary bytes, {} ranges, {} glyph bytes",
        info.name,
        dictionary.len(),
        char_ranges.len(),
        char_ranges.iter().map(|r| r.glyph_data.len()).sum::<usize>()
    );

    Ok(RleFont {
        metrics,
        version: RLEFONT_FORMAT_VERSION,
        dictionary,
        rle_entry_count,
        dict_entry_count,
        char_ranges,
    })
}

fn count_u8(count: usize) -> Result<u8> {
    u8::try_from(count).map_err(|_| RleFontError::TooManyEntries {
        count,
        max: u8::MAX as usize,
    })
}
