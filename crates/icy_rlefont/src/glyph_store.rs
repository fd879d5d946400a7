//! The glyph store holds everything the encoder works from: font metrics,
//! the glyph bitmaps together with the characters mapped onto them, the
//! working dictionary and the persisted optimizer seed.
//!
//! Glyph pixels are stored row-major as alpha values (0 = background,
//! 15 = full). Every glyph covers the whole `max_width * max_height` cell.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::encoder::DICTIONARY_SIZE;
use crate::{Result, RleFontError};

/// Font has a fixed advance width for every glyph.
pub const FLAG_MONOSPACE: u8 = 0x01;
/// Font is black & white (monochrome).
pub const FLAG_BW: u8 = 0x02;

/// Highest alpha value a pixel may carry.
pub const MAX_ALPHA: u8 = 15;

/// Row-major pixel alpha values.
pub type Pixels = Vec<u8>;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct FontInfo {
    pub name: String,
    pub max_width: u8,
    pub max_height: u8,
    pub baseline_x: i8,
    pub baseline_y: u8,
    pub line_height: u8,
    #[serde(default)]
    pub flags: u8,
    /// Seed of the optimizer random stream, advanced by every session.
    #[serde(default)]
    pub random_seed: u32,
}

impl FontInfo {
    /// Number of pixels in every glyph bitmap.
    pub fn pixel_count(&self) -> usize {
        self.max_width as usize * self.max_height as usize
    }
}

/// One dictionary slot. An empty replacement marks an unused slot.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default, Hash)]
pub struct DictEntry {
    #[serde(with = "pixel_string")]
    pub replacement: Pixels,
    /// Benefit estimate, refreshed by the optimizer.
    #[serde(default)]
    pub score: i32,
    /// Store the entry as a reference string instead of an RLE string.
    #[serde(default)]
    pub ref_encode: bool,
}

impl DictEntry {
    pub fn new(replacement: Pixels, ref_encode: bool) -> Self {
        Self {
            replacement,
            score: 0,
            ref_encode,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.replacement.is_empty()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct GlyphEntry {
    #[serde(with = "pixel_string")]
    pub data: Pixels,
    /// Character codes rendered with this glyph.
    pub chars: Vec<u32>,
    /// Advance width in pixels.
    pub width: u8,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct GlyphStore {
    info: FontInfo,
    #[serde(default)]
    dictionary: Vec<DictEntry>,
    glyphs: Vec<GlyphEntry>,
}

impl GlyphStore {
    /// Builds a store, validating the bitmaps. Glyphs with identical bitmap
    /// and width are merged into a single entry carrying all their chars.
    pub fn new(info: FontInfo, dictionary: Vec<DictEntry>, glyphs: Vec<GlyphEntry>) -> Result<Self> {
        let mut merged: Vec<GlyphEntry> = Vec::with_capacity(glyphs.len());
        let mut seen: HashMap<(Pixels, u8), usize> = HashMap::new();

        for glyph in glyphs {
            validate_pixels(&glyph.data, info.pixel_count())?;
            match seen.get(&(glyph.data.clone(), glyph.width)) {
                Some(&index) => {
                    log::debug!("merging chars {:?} into glyph {index}", glyph.chars);
                    merged[index].chars.extend(glyph.chars);
                }
                None => {
                    seen.insert((glyph.data.clone(), glyph.width), merged.len());
                    merged.push(glyph);
                }
            }
        }

        for glyph in &mut merged {
            glyph.chars.sort_unstable();
            glyph.chars.dedup();
        }

        let mut store = Self {
            info,
            dictionary: Vec::new(),
            glyphs: merged,
        };
        store.set_dictionary(dictionary)?;
        Ok(store)
    }

    pub fn info(&self) -> &FontInfo {
        &self.info
    }

    pub fn glyph_count(&self) -> usize {
        self.glyphs.len()
    }

    pub fn glyph(&self, index: usize) -> &GlyphEntry {
        &self.glyphs[index]
    }

    pub fn glyphs(&self) -> &[GlyphEntry] {
        &self.glyphs
    }

    /// All dictionary slots, unused ones included.
    pub fn dictionary(&self) -> &[DictEntry] {
        &self.dictionary
    }

    pub fn dictionary_entry(&self, slot: usize) -> &DictEntry {
        &self.dictionary[slot]
    }

    /// Replaces one slot and returns the previous entry.
    pub fn set_dictionary_entry(&mut self, slot: usize, entry: DictEntry) -> Result<DictEntry> {
        if slot >= DICTIONARY_SIZE {
            return Err(RleFontError::TooManyEntries {
                count: slot + 1,
                max: DICTIONARY_SIZE,
            });
        }
        validate_replacement(&entry.replacement)?;
        Ok(std::mem::replace(&mut self.dictionary[slot], entry))
    }

    /// Replaces the whole dictionary, padding it with unused slots.
    pub fn set_dictionary(&mut self, mut dictionary: Vec<DictEntry>) -> Result<()> {
        while dictionary.len() > DICTIONARY_SIZE && dictionary.last().is_some_and(DictEntry::is_empty) {
            dictionary.pop();
        }
        if dictionary.len() > DICTIONARY_SIZE {
            return Err(RleFontError::TooManyEntries {
                count: dictionary.len(),
                max: DICTIONARY_SIZE,
            });
        }
        for entry in &dictionary {
            validate_replacement(&entry.replacement)?;
        }
        dictionary.resize(DICTIONARY_SIZE, DictEntry::default());
        self.dictionary = dictionary;
        Ok(())
    }

    pub(crate) fn set_score(&mut self, slot: usize, score: i32) {
        self.dictionary[slot].score = score;
    }

    pub fn seed(&self) -> u32 {
        self.info.random_seed
    }

    pub fn set_seed(&mut self, seed: u32) {
        self.info.random_seed = seed;
    }

    /// Character code to glyph index, ordered by character code.
    pub fn char_to_glyph(&self) -> BTreeMap<u32, usize> {
        let mut result = BTreeMap::new();
        for (index, glyph) in self.glyphs.iter().enumerate() {
            for &ch in &glyph.chars {
                result.entry(ch).or_insert(index);
            }
        }
        result
    }

    pub fn min_x_advance(&self) -> u8 {
        self.glyphs.iter().map(|g| g.width).min().unwrap_or(0)
    }

    pub fn max_x_advance(&self) -> u8 {
        self.glyphs.iter().map(|g| g.width).max().unwrap_or(0)
    }

    /// Character drawn for codes missing from the font: U+FFFD, '?', space
    /// or the lowest mapped code, whichever exists first.
    pub fn fallback_char(&self) -> u32 {
        let chars = self.char_to_glyph();
        for candidate in [0xFFFD, u32::from('?'), u32::from(' ')] {
            if chars.contains_key(&candidate) {
                return candidate;
            }
        }
        chars.keys().next().copied().unwrap_or(0)
    }

    pub fn load<R: Read>(reader: R) -> Result<Self> {
        let store: GlyphStore = serde_json::from_reader(reader)?;
        Self::new(store.info, store.dictionary, store.glyphs)
    }

    pub fn save<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::load(BufReader::new(file))
    }

    pub fn save_file(&self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.save(&mut writer)?;
        writer.flush()?;
        Ok(())
    }
}

fn validate_replacement(pixels: &[u8]) -> Result<()> {
    match pixels.iter().find(|&&p| p > MAX_ALPHA) {
        Some(&value) => Err(RleFontError::InvalidPixel { value }),
        None => Ok(()),
    }
}

fn validate_pixels(pixels: &[u8], expected: usize) -> Result<()> {
    if pixels.len() != expected {
        return Err(RleFontError::PixelCountMismatch {
            expected,
            actual: pixels.len(),
        });
    }
    validate_replacement(pixels)
}

/// Serializes pixel strings as one hex digit per pixel ("00ff0").
mod pixel_string {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(pixels: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        let text: String = pixels
            .iter()
            .map(|&p| char::from_digit(u32::from(p), 16).unwrap_or('?'))
            .collect();
        serializer.serialize_str(&text)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.chars()
            .map(|c| {
                c.to_digit(16)
                    .map(|d| d as u8)
                    .ok_or_else(|| D::Error::custom(format!("invalid pixel digit '{c}'")))
            })
            .collect()
    }
}
