//! Character ranges: partitioning the character set into blocks that fit the
//! 16-bit offset tables, and packing the glyphs of one block.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::blob::{MAX_BLOB_LEN, PackedBlobBuilder};
use crate::encoder::EncodedFont;
use crate::glyph_store::GlyphStore;
use crate::{Result, RleFontError};

/// Upper bound on the packed glyph data of one range.
pub const MAX_RANGE_BYTES: usize = 65536;
/// Upper bound on the number of ranges in a font.
pub const MAX_CHAR_RANGES: usize = 16;
/// Upper bound on the codes covered by one range, set by its 16-bit count.
pub const MAX_RANGE_CHARS: u32 = u16::MAX as u32;

/// A contiguous block of character codes and the glyph each one maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharRange {
    pub first_char: u32,
    pub char_count: u32,
    /// One entry per code, `None` for codes without a glyph.
    pub glyph_indices: Vec<Option<usize>>,
}

impl CharRange {
    pub fn contains(&self, code: u32) -> bool {
        code >= self.first_char && code - self.first_char < self.char_count
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionOptions {
    /// Payload ceiling per range (sum of glyph sizes).
    pub max_range_bytes: usize,
    pub max_ranges: usize,
    /// A run of this many unmapped codes starts a new range.
    pub minimum_gap: u32,
}

impl Default for PartitionOptions {
    fn default() -> Self {
        Self {
            // One byte below MAX_RANGE_BYTES keeps the sentinel offset in 16 bits.
            max_range_bytes: MAX_BLOB_LEN,
            max_ranges: MAX_CHAR_RANGES,
            minimum_gap: 16,
        }
    }
}

/// Splits the mapped characters into ordered, disjoint ranges.
///
/// `glyph_size` returns the stored size of a glyph including its width
/// byte. Each range's payload, counted without deduplication, stays at or
/// below `max_range_bytes`. When more than `max_ranges` ranges come out the
/// gap threshold is doubled until they fit or the whole set forms one run.
pub fn compute_char_ranges(
    char_to_glyph: &BTreeMap<u32, usize>,
    glyph_size: impl Fn(usize) -> usize,
    options: &PartitionOptions,
) -> Result<Vec<CharRange>> {
    let chars: Vec<(u32, usize)> = char_to_glyph.iter().map(|(&c, &g)| (c, g)).collect();
    let span = match (chars.first(), chars.last()) {
        (Some(first), Some(last)) => last.0 - first.0,
        _ => return Ok(Vec::new()),
    };

    let mut gap = options.minimum_gap.max(1);
    loop {
        let ranges = split_ranges(&chars, &glyph_size, options.max_range_bytes, gap)?;
        if ranges.len() <= options.max_ranges {
            return Ok(ranges);
        }
        if gap > span || gap == u32::MAX {
            return Err(RleFontError::TooManyRanges {
                count: ranges.len(),
                max: options.max_ranges,
            });
        }
        log::debug!("{} ranges with gap {gap}, widening", ranges.len());
        gap = gap.saturating_mul(2);
    }
}

fn split_ranges(chars: &[(u32, usize)], glyph_size: &impl Fn(usize) -> usize, max_bytes: usize, gap: u32) -> Result<Vec<CharRange>> {
    let mut result = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let first_char = chars[i].0;
        let mut payload = 0usize;
        let mut has_hole = false;
        let mut j = i;

        while j < chars.len() {
            let mut size = glyph_size(chars[j].1);
            if j > i {
                let distance = chars[j].0 - chars[j - 1].0;
                if distance > gap || chars[j].0 - first_char >= MAX_RANGE_CHARS {
                    break;
                }
                // all unmapped codes of a range share one empty entry
                if distance > 1 && !has_hole {
                    size += 1;
                }
            }
            if payload + size > max_bytes {
                if j == i {
                    return Err(RleFontError::RangeOverflow {
                        first_char,
                        len: size,
                        max: max_bytes,
                    });
                }
                break;
            }
            if j > i && chars[j].0 - chars[j - 1].0 > 1 {
                has_hole = true;
            }
            payload += size;
            j += 1;
        }

        let last_char = chars[j - 1].0;
        let char_count = last_char - first_char + 1;
        let mut glyph_indices = vec![None; char_count as usize];
        for &(code, glyph) in &chars[i..j] {
            glyph_indices[(code - first_char) as usize] = Some(glyph);
        }

        result.push(CharRange {
            first_char,
            char_count,
            glyph_indices,
        });
        i = j;
    }
    Ok(result)
}

/// Packed glyphs of one range. Each entry is the advance width byte followed
/// by the glyph's reference string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedCharRange {
    pub first_char: u32,
    pub char_count: u32,
    pub glyph_data: Vec<u8>,
    /// `char_count + 1` offsets, the last one is the sentinel.
    pub glyph_offsets: Vec<u16>,
}

impl PackedCharRange {
    pub fn contains(&self, code: u32) -> bool {
        code >= self.first_char && code - self.first_char < self.char_count
    }

    /// Width and encoded bytes of the entry for `code`.
    pub fn glyph(&self, code: u32) -> Option<(u8, &[u8])> {
        if !self.contains(code) {
            return None;
        }
        let index = (code - self.first_char) as usize;
        let start = *self.glyph_offsets.get(index)? as usize;
        // entries may be shared, so the end is the next larger offset
        let end = self
            .glyph_offsets
            .iter()
            .map(|&o| o as usize)
            .filter(|&o| o > start)
            .min()
            .unwrap_or(self.glyph_data.len());
        let entry = self.glyph_data.get(start..end)?;
        let (&width, bytes) = entry.split_first()?;
        Some((width, bytes))
    }
}

/// Packs one range. Codes sharing a glyph index share one stored entry;
/// nothing is shared across ranges.
pub fn encode_character_range(range: &CharRange, encoded: &EncodedFont, store: &GlyphStore) -> Result<PackedCharRange> {
    let mut builder = PackedBlobBuilder::new();
    let mut already_encoded: HashMap<Option<usize>, u16> = HashMap::new();

    for &glyph_index in &range.glyph_indices {
        if let Some(&offset) = already_encoded.get(&glyph_index) {
            builder.push_offset(offset);
            continue;
        }

        let (width, bytes): (u8, &[u8]) = match glyph_index {
            Some(index) => (store.glyph(index).width, encoded.glyph(index)),
            None => (0, &[]),
        };

        let len = builder.data_len() + 1 + bytes.len();
        if len > MAX_RANGE_BYTES {
            return Err(RleFontError::RangeOverflow {
                first_char: range.first_char,
                len,
                max: MAX_RANGE_BYTES,
            });
        }

        let offset = builder.begin_entry()?;
        already_encoded.insert(glyph_index, offset);
        builder.push(width);
        builder.extend(bytes);
    }

    let blob = builder.finish()?;
    Ok(PackedCharRange {
        first_char: range.first_char,
        char_count: range.char_count,
        glyph_data: blob.data,
        glyph_offsets: blob.offsets,
    })
}
