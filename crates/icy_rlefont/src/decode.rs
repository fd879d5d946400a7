//! Expands packed glyph entries back into pixels. Used to verify that an
//! assembled font reproduces the store's bitmaps.

use crate::encoder::{
    classify_code, DICT_START, EntryKind, REF_FILLZEROS, RLE_64ZEROS, RLE_CODEMASK, RLE_ONES, RLE_VALMASK, RLE_ZEROS,
};
use crate::font::RleFont;
use crate::glyph_store::{MAX_ALPHA, Pixels};
use crate::{Result, RleFontError};

/// A decoded glyph: advance width and `width * height` pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedGlyph {
    pub width: u8,
    pub pixels: Pixels,
}

impl RleFont {
    /// Decodes the glyph of `code`. `None` if the code is outside every
    /// range or maps to no glyph.
    pub fn glyph_pixels(&self, code: u32) -> Result<Option<DecodedGlyph>> {
        let Some((width, bytes)) = self.char_range_for(code).and_then(|r| r.glyph(code)) else {
            return Ok(None);
        };
        if bytes.is_empty() && self.pixel_count() > 0 {
            return Ok(None);
        }
        Ok(Some(DecodedGlyph {
            width,
            pixels: decode_glyph(self, bytes)?,
        }))
    }

    pub fn pixel_count(&self) -> usize {
        self.metrics.width as usize * self.metrics.height as usize
    }
}

/// Decodes the reference string of one glyph (without its width byte).
pub fn decode_glyph(font: &RleFont, bytes: &[u8]) -> Result<Pixels> {
    let mut decoder = GlyphDecoder {
        font,
        pixels: Vec::with_capacity(font.pixel_count()),
        limit: font.pixel_count(),
    };
    for (position, &code) in bytes.iter().enumerate() {
        decoder.write_ref(code, position, true)?;
    }
    if decoder.pixels.len() != decoder.limit {
        return Err(RleFontError::PixelCountMismatch {
            expected: decoder.limit,
            actual: decoder.pixels.len(),
        });
    }
    Ok(decoder.pixels)
}

struct GlyphDecoder<'a> {
    font: &'a RleFont,
    pixels: Pixels,
    limit: usize,
}

impl GlyphDecoder<'_> {
    fn write_ref(&mut self, code: u8, position: usize, is_glyph: bool) -> Result<()> {
        if code <= MAX_ALPHA {
            return self.write_pixels(1, code);
        }
        if code == REF_FILLZEROS && is_glyph {
            let remaining = self.limit.saturating_sub(self.pixels.len());
            return self.write_pixels(remaining, 0);
        }
        if code < DICT_START {
            return Err(RleFontError::InvalidCode { code, position });
        }

        let entry = classify_code(code, self.font.rle_entry_count as usize, self.font.dict_entry_count as usize)
            .ok_or(RleFontError::InvalidCode { code, position })?;
        let index = match entry.kind {
            EntryKind::Rle => entry.index,
            EntryKind::Ref => self.font.rle_entry_count as usize + entry.index,
        };
        let font = self.font;
        let bytes = font.dictionary.entry(index).ok_or(RleFontError::InvalidCode { code, position })?;
        match entry.kind {
            EntryKind::Rle => self.write_rle(bytes),
            // reference entries only point at RLE entries and literals
            EntryKind::Ref if is_glyph => {
                for &inner in bytes {
                    self.write_ref(inner, position, false)?;
                }
                Ok(())
            }
            EntryKind::Ref => Err(RleFontError::InvalidCode { code, position }),
        }
    }

    fn write_rle(&mut self, bytes: &[u8]) -> Result<()> {
        for &b in bytes {
            let value = b & RLE_VALMASK;
            match b & RLE_CODEMASK {
                RLE_ZEROS => self.write_pixels(value as usize, 0)?,
                RLE_64ZEROS => self.write_pixels((value as usize + 1) * 64, 0)?,
                RLE_ONES => self.write_pixels(value as usize + 1, MAX_ALPHA)?,
                // RLE_SHADE
                _ => self.write_pixels(((value >> 4) & 0x03) as usize + 1, value & 0x0F)?,
            }
        }
        Ok(())
    }

    fn write_pixels(&mut self, count: usize, alpha: u8) -> Result<()> {
        if self.pixels.len() + count > self.limit {
            return Err(RleFontError::PixelCountMismatch {
                expected: self.limit,
                actual: self.pixels.len() + count,
            });
        }
        self.pixels.resize(self.pixels.len() + count, alpha);
        Ok(())
    }
}
