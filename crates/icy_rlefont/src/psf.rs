//! PC Screen Font import (PSF1 and PSF2).
//!
//! PSF1 Format:
//! - 4 byte header: magic (0x36, 0x04), mode, charsize
//! - 256 or 512 glyphs (8 pixels wide)
//! - Optional Unicode table of u16 values, 0xFFFF ends a glyph
//!
//! PSF2 Format:
//! - 32 byte header with magic, version, header size, flags, glyph count, char size, height, width
//! - Variable number of glyphs, rows padded to whole bytes
//! - Optional Unicode table of UTF-8 strings, 0xFF ends a glyph
//!
//! Sequences (0xFFFE / 0xFE) in the Unicode tables describe combining
//! forms; only the single code points are imported.

use crate::glyph_store::{FLAG_BW, FLAG_MONOSPACE, FontInfo, GlyphEntry, GlyphStore, MAX_ALPHA, Pixels};
use crate::{Result, RleFontError};

/// PSF1 magic number (little-endian: 0x0436)
pub const PSF1_MAGIC: u16 = 0x0436;

/// PSF2 magic number (little-endian: 0x864AB572)
pub const PSF2_MAGIC: u32 = 0x864A_B572;

// PSF1 mode flags
const PSF1_MODE512: u8 = 0x01;
const PSF1_MODEHASTAB: u8 = 0x02;
const PSF1_MODESEQ: u8 = 0x04;
const PSF1_SEPARATOR: u16 = 0xFFFF;
const PSF1_STARTSEQ: u16 = 0xFFFE;

// PSF2 flags
const PSF2_HAS_UNICODE_TABLE: u32 = 0x01;
const PSF2_SEPARATOR: u8 = 0xFF;
const PSF2_STARTSEQ: u8 = 0xFE;

/// A parsed PSF file: one bitmap and its character codes per glyph.
#[derive(Debug, Clone)]
pub struct PsfFont {
    pub width: u8,
    pub height: u8,
    pub glyphs: Vec<PsfGlyph>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PsfGlyph {
    pub pixels: Pixels,
    pub chars: Vec<u32>,
}

impl PsfFont {
    /// Parse a PSF font from bytes (auto-detects PSF1 or PSF2).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 4 {
            return Err(RleFontError::UnknownFontFormat { size: bytes.len() });
        }

        let magic16 = u16::from_le_bytes([bytes[0], bytes[1]]);
        if magic16 == PSF1_MAGIC {
            return Self::parse_psf1(bytes);
        }

        let magic32 = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if magic32 == PSF2_MAGIC {
            return Self::parse_psf2(bytes);
        }

        Err(RleFontError::PsfMagicMismatch)
    }

    fn parse_psf1(bytes: &[u8]) -> Result<Self> {
        let mode = bytes[2];
        let char_size = bytes[3] as usize;

        if char_size == 0 {
            return Err(RleFontError::generic("PSF1: zero charsize not allowed"));
        }

        let glyph_count = if mode & PSF1_MODE512 != 0 { 512 } else { 256 };
        let bitmap_start = 4;
        let bitmap_end = bitmap_start + glyph_count * char_size;
        if bytes.len() < bitmap_end {
            return Err(RleFontError::Truncated);
        }

        let mut glyphs: Vec<PsfGlyph> = (0..glyph_count)
            .map(|i| {
                let offset = bitmap_start + i * char_size;
                PsfGlyph {
                    pixels: rows_to_pixels(&bytes[offset..offset + char_size], 8, char_size, 1),
                    chars: Vec::new(),
                }
            })
            .collect();

        if mode & (PSF1_MODEHASTAB | PSF1_MODESEQ) != 0 {
            read_psf1_table(&bytes[bitmap_end..], &mut glyphs);
        } else {
            assign_positions(&mut glyphs);
        }

        Ok(Self {
            width: 8,
            height: char_size.min(u8::MAX as usize) as u8,
            glyphs,
        })
    }

    fn parse_psf2(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 32 {
            return Err(RleFontError::Truncated);
        }
        let word = |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);

        let version = word(4);
        if version > 0 {
            return Err(RleFontError::UnsupportedPsfVersion { version });
        }

        let header_size = word(8) as usize;
        let flags = word(12);
        let glyph_count = word(16) as usize;
        let char_size = word(20) as usize;
        let height = word(24) as usize;
        let width = word(28) as usize;

        if width == 0 || height == 0 || char_size == 0 {
            return Err(RleFontError::generic("PSF2: invalid dimensions"));
        }
        if width > u8::MAX as usize || height > u8::MAX as usize {
            return Err(RleFontError::generic(format!("PSF2: glyph size {width}x{height} too large")));
        }

        let bytes_per_row = width.div_ceil(8);
        let expected_char_size = height * bytes_per_row;
        if expected_char_size != char_size {
            return Err(RleFontError::generic(format!(
                "PSF2: char_size mismatch, header {char_size}, computed {expected_char_size}"
            )));
        }

        let bitmap_end = glyph_count
            .checked_mul(char_size)
            .and_then(|len| len.checked_add(header_size))
            .ok_or(RleFontError::Truncated)?;
        if bytes.len() < bitmap_end {
            return Err(RleFontError::Truncated);
        }

        let mut glyphs: Vec<PsfGlyph> = (0..glyph_count)
            .map(|i| {
                let offset = header_size + i * char_size;
                PsfGlyph {
                    pixels: rows_to_pixels(&bytes[offset..offset + char_size], width, height, bytes_per_row),
                    chars: Vec::new(),
                }
            })
            .collect();

        if flags & PSF2_HAS_UNICODE_TABLE != 0 {
            read_psf2_table(&bytes[bitmap_end..], &mut glyphs);
        } else {
            assign_positions(&mut glyphs);
        }

        Ok(Self {
            width: width as u8,
            height: height as u8,
            glyphs,
        })
    }

    /// Converts the font into a glyph store with an empty dictionary.
    /// Glyphs without any character code are dropped.
    pub fn into_store(self, name: &str) -> Result<GlyphStore> {
        let info = FontInfo {
            name: name.to_string(),
            max_width: self.width,
            max_height: self.height,
            baseline_x: 0,
            baseline_y: self.height - self.height / 4,
            line_height: self.height,
            flags: FLAG_MONOSPACE | FLAG_BW,
            random_seed: 0,
        };
        let width = self.width;
        let glyphs = self
            .glyphs
            .into_iter()
            .filter(|g| !g.chars.is_empty())
            .map(|g| GlyphEntry {
                data: g.pixels,
                chars: g.chars,
                width,
            })
            .collect();
        GlyphStore::new(info, Vec::new(), glyphs)
    }
}

/// Parses a PSF font and builds a glyph store from it.
pub fn import_psf(bytes: &[u8], name: &str) -> Result<GlyphStore> {
    let font = PsfFont::from_bytes(bytes)?;
    log::info!("imported PSF font {}x{} with {} glyphs", font.width, font.height, font.glyphs.len());
    font.into_store(name)
}

fn rows_to_pixels(data: &[u8], width: usize, height: usize, bytes_per_row: usize) -> Pixels {
    let mut pixels = Vec::with_capacity(width * height);
    for row in data.chunks(bytes_per_row).take(height) {
        for x in 0..width {
            let set = row[x / 8] & (0x80 >> (x % 8)) != 0;
            pixels.push(if set { MAX_ALPHA } else { 0 });
        }
    }
    pixels
}

fn assign_positions(glyphs: &mut [PsfGlyph]) {
    for (i, glyph) in glyphs.iter_mut().enumerate() {
        glyph.chars.push(i as u32);
    }
}

fn read_psf1_table(table: &[u8], glyphs: &mut [PsfGlyph]) {
    let mut glyph = 0;
    let mut in_sequence = false;
    for pair in table.chunks_exact(2) {
        if glyph >= glyphs.len() {
            break;
        }
        match u16::from_le_bytes([pair[0], pair[1]]) {
            PSF1_SEPARATOR => {
                glyph += 1;
                in_sequence = false;
            }
            PSF1_STARTSEQ => in_sequence = true,
            code if !in_sequence => glyphs[glyph].chars.push(u32::from(code)),
            _ => {}
        }
    }
}

fn read_psf2_table(table: &[u8], glyphs: &mut [PsfGlyph]) {
    let mut glyph = 0;
    let mut pos = 0;
    let mut in_sequence = false;
    while pos < table.len() && glyph < glyphs.len() {
        match table[pos] {
            PSF2_SEPARATOR => {
                glyph += 1;
                in_sequence = false;
                pos += 1;
            }
            PSF2_STARTSEQ => {
                in_sequence = true;
                pos += 1;
            }
            lead => {
                let len = utf8_len(lead);
                let end = (pos + len).min(table.len());
                let decoded = std::str::from_utf8(&table[pos..end]).ok().and_then(|s| s.chars().next());
                match decoded {
                    Some(ch) if !in_sequence => glyphs[glyph].chars.push(u32::from(ch)),
                    Some(_) => {}
                    None => log::warn!("PSF2: invalid UTF-8 in unicode table at byte {pos}"),
                }
                pos = end;
            }
        }
    }
}

fn utf8_len(lead: u8) -> usize {
    match lead {
        0x00..=0x7F => 1,
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF7 => 4,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn psf2_header(glyph_count: u32, width: u32, height: u32, flags: u32) -> Vec<u8> {
        let char_size = width.div_ceil(8) * height;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&PSF2_MAGIC.to_le_bytes()); // magic
        bytes.extend_from_slice(&0u32.to_le_bytes()); // version
        bytes.extend_from_slice(&32u32.to_le_bytes()); // header_size
        bytes.extend_from_slice(&flags.to_le_bytes());
        bytes.extend_from_slice(&glyph_count.to_le_bytes());
        bytes.extend_from_slice(&char_size.to_le_bytes());
        bytes.extend_from_slice(&height.to_le_bytes());
        bytes.extend_from_slice(&width.to_le_bytes());
        bytes
    }

    #[test]
    fn test_psf1_parse() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&PSF1_MAGIC.to_le_bytes());
        bytes.push(0); // mode
        bytes.push(8); // charsize (8 bytes per glyph = 8 rows)
        bytes.extend_from_slice(&vec![0u8; 256 * 8]);
        bytes[4 + 65 * 8] = 0b1000_0001;

        let font = PsfFont::from_bytes(&bytes).unwrap();
        assert_eq!(font.width, 8);
        assert_eq!(font.height, 8);
        assert_eq!(font.glyphs.len(), 256);
        assert_eq!(font.glyphs[65].chars, vec![65]);
        assert_eq!(&font.glyphs[65].pixels[..8], &[15, 0, 0, 0, 0, 0, 0, 15]);
    }

    #[test]
    fn test_psf1_unicode_table() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&PSF1_MAGIC.to_le_bytes());
        bytes.push(PSF1_MODEHASTAB);
        bytes.push(1);
        bytes.extend_from_slice(&vec![0u8; 256]);
        bytes[4 + 1] = 0xFF;
        // glyph 0: U+0020, glyph 1: U+2588 U+0041 plus a sequence, rest unmapped
        for v in [0x0020u16, 0xFFFF, 0x2588, 0x0041, 0xFFFE, 0x0045, 0x0301, 0xFFFF] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        for _ in 2..256 {
            bytes.extend_from_slice(&0xFFFFu16.to_le_bytes());
        }

        let font = PsfFont::from_bytes(&bytes).unwrap();
        assert_eq!(font.glyphs[0].chars, vec![0x20]);
        assert_eq!(font.glyphs[1].chars, vec![0x2588, 0x41]);
        assert!(font.glyphs[2].chars.is_empty());

        let store = font.into_store("tab").unwrap();
        assert_eq!(store.glyph_count(), 2);
        assert_eq!(store.char_to_glyph().len(), 3);
    }

    #[test]
    fn test_psf2_wide_glyphs() {
        let mut bytes = psf2_header(2, 10, 2, 0);
        // glyph 0: first row has pixel 0 and pixel 9 set
        bytes.extend_from_slice(&[0x80, 0x40, 0x00, 0x00]);
        bytes.extend_from_slice(&[0x00, 0x00, 0xFF, 0xC0]);

        let font = PsfFont::from_bytes(&bytes).unwrap();
        assert_eq!((font.width, font.height), (10, 2));
        let mut expected = vec![0u8; 20];
        expected[0] = 15;
        expected[9] = 15;
        assert_eq!(font.glyphs[0].pixels, expected);
        assert_eq!(font.glyphs[1].pixels[10..], [15u8; 10]);
        assert_eq!(font.glyphs[1].chars, vec![1]);
    }

    #[test]
    fn test_psf2_unicode_table() {
        let mut bytes = psf2_header(2, 8, 1, PSF2_HAS_UNICODE_TABLE);
        bytes.extend_from_slice(&[0xF0, 0x0F]);
        bytes.extend_from_slice("A".as_bytes());
        bytes.push(PSF2_SEPARATOR);
        bytes.extend_from_slice("€a".as_bytes());
        bytes.push(PSF2_STARTSEQ);
        bytes.extend_from_slice("e\u{301}".as_bytes());
        bytes.push(PSF2_SEPARATOR);

        let font = PsfFont::from_bytes(&bytes).unwrap();
        assert_eq!(font.glyphs[0].chars, vec![0x41]);
        assert_eq!(font.glyphs[1].chars, vec![0x20AC, 0x61]);
    }

    #[test]
    fn test_import_metrics_and_merge() {
        let mut bytes = psf2_header(3, 8, 8, 0);
        bytes.extend_from_slice(&[0x18; 8]);
        bytes.extend_from_slice(&[0x3C; 8]);
        bytes.extend_from_slice(&[0x18; 8]);

        let store = import_psf(&bytes, "tiny").unwrap();
        let info = store.info();
        assert_eq!(info.name, "tiny");
        assert_eq!(info.max_width, 8);
        assert_eq!(info.baseline_y, 6);
        assert_eq!(info.line_height, 8);
        assert_eq!(info.flags, FLAG_MONOSPACE | FLAG_BW);
        assert_eq!(store.glyph_count(), 2);
        assert_eq!(store.glyph(0).chars, vec![0, 2]);
    }

    #[test]
    fn test_bad_input() {
        assert!(matches!(PsfFont::from_bytes(&[1, 2]), Err(RleFontError::UnknownFontFormat { size: 2 })));
        assert!(matches!(PsfFont::from_bytes(&[1, 2, 3, 4]), Err(RleFontError::PsfMagicMismatch)));

        let mut bytes = psf2_header(4, 8, 8, 0);
        bytes.extend_from_slice(&[0; 8]);
        assert!(matches!(PsfFont::from_bytes(&bytes), Err(RleFontError::Truncated)));

        let mut bytes = psf2_header(1, 8, 8, 0);
        bytes[4] = 1;
        assert!(matches!(
            PsfFont::from_bytes(&bytes),
            Err(RleFontError::UnsupportedPsfVersion { version: 1 })
        ));
    }
}
