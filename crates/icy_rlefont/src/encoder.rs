//! Glyph and dictionary string encoder.
//!
//! Every byte of a glyph or reference string is a code:
//!
//! | code            | meaning                                        |
//! |-----------------|------------------------------------------------|
//! | `0..=15`        | one pixel with that alpha                      |
//! | `16`            | zeros up to the end of the glyph               |
//! | `17..=23`       | reserved                                       |
//! | `24..`          | dictionary entry, RLE entries first            |
//!
//! RLE strings use the `RLE_*` codes below, the two high bits select the
//! run type.

use crate::glyph_store::{DictEntry, GlyphStore, MAX_ALPHA};

/// Number of reserved codes before the dictionary entries.
pub const DICT_START: u8 = 24;
/// Reference code meaning "fill with zeros to the end of the glyph".
pub const REF_FILLZEROS: u8 = 16;
/// Dictionary entries addressable by a one byte code.
pub const DICTIONARY_SIZE: usize = 256 - DICT_START as usize;

pub const RLE_CODEMASK: u8 = 0xC0;
pub const RLE_VALMASK: u8 = 0x3F;
/// 0 to 63 zeros
pub const RLE_ZEROS: u8 = 0x00;
/// (1 to 64) * 64 zeros
pub const RLE_64ZEROS: u8 = 0x40;
/// 1 to 64 full alphas
pub const RLE_ONES: u8 = 0x80;
/// 1 to 4 partial alphas
pub const RLE_SHADE: u8 = 0xC0;

pub type RleString = Vec<u8>;
pub type RefString = Vec<u8>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Rle,
    Ref,
}

/// A dictionary entry as it is stored in the font.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodedEntry {
    Rle(RleString),
    Ref(RefString),
}

impl EncodedEntry {
    pub fn kind(&self) -> EntryKind {
        match self {
            EncodedEntry::Rle(_) => EntryKind::Rle,
            EncodedEntry::Ref(_) => EntryKind::Ref,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        match self {
            EncodedEntry::Rle(bytes) | EncodedEntry::Ref(bytes) => bytes,
        }
    }
}

/// Position of an entry inside its own table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryRef {
    pub kind: EntryKind,
    pub index: usize,
}

/// The two dictionary tables. RLE entries always precede reference
/// entries in code space and on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodedDictionary {
    rle: Vec<RleString>,
    refs: Vec<RefString>,
}

impl EncodedDictionary {
    pub fn new(rle: Vec<RleString>, refs: Vec<RefString>) -> Self {
        Self { rle, refs }
    }

    pub fn rle_entries(&self) -> &[RleString] {
        &self.rle
    }

    pub fn ref_entries(&self) -> &[RefString] {
        &self.refs
    }

    pub fn rle_count(&self) -> usize {
        self.rle.len()
    }

    pub fn ref_count(&self) -> usize {
        self.refs.len()
    }

    pub fn len(&self) -> usize {
        self.rle.len() + self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries in wire order.
    pub fn iter(&self) -> impl Iterator<Item = (EntryKind, &[u8])> {
        self.rle
            .iter()
            .map(|e| (EntryKind::Rle, e.as_slice()))
            .chain(self.refs.iter().map(|e| (EntryKind::Ref, e.as_slice())))
    }

    /// Code that references `entry`, `None` if it lies outside the code space.
    pub fn code(&self, entry: EntryRef) -> Option<u8> {
        let position = match entry.kind {
            EntryKind::Rle if entry.index < self.rle.len() => entry.index,
            EntryKind::Ref if entry.index < self.refs.len() => self.rle.len() + entry.index,
            _ => return None,
        };
        u8::try_from(DICT_START as usize + position).ok()
    }

    /// Entry addressed by a dictionary code.
    pub fn lookup(&self, code: u8) -> Option<EntryRef> {
        classify_code(code, self.rle.len(), self.refs.len())
    }

    pub fn get(&self, entry: EntryRef) -> Option<EncodedEntry> {
        match entry.kind {
            EntryKind::Rle => self.rle.get(entry.index).cloned().map(EncodedEntry::Rle),
            EntryKind::Ref => self.refs.get(entry.index).cloned().map(EncodedEntry::Ref),
        }
    }
}

/// Maps a dictionary code to its table and index, given the table sizes.
pub fn classify_code(code: u8, rle_count: usize, ref_count: usize) -> Option<EntryRef> {
    let position = code.checked_sub(DICT_START)? as usize;
    if position < rle_count {
        Some(EntryRef {
            kind: EntryKind::Rle,
            index: position,
        })
    } else if position < rle_count + ref_count {
        Some(EntryRef {
            kind: EntryKind::Ref,
            index: position - rle_count,
        })
    } else {
        None
    }
}

/// Output of one encoder run over the whole store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFont {
    pub dictionary: EncodedDictionary,
    /// Reference string of every glyph, indexed like the store's glyphs.
    pub glyphs: Vec<RefString>,
    slot_codes: Vec<Option<u8>>,
}

impl EncodedFont {
    /// Total size: all string bytes plus two offset table bytes per
    /// non-empty dictionary entry and per glyph.
    pub fn encoded_size(&self) -> usize {
        let dictionary: usize = self.dictionary.iter().map(|(_, e)| if e.is_empty() { 0 } else { e.len() + 2 }).sum();
        let glyphs: usize = self.glyphs.iter().map(|g| g.len() + 2).sum();
        dictionary + glyphs
    }

    pub fn glyph(&self, index: usize) -> &[u8] {
        &self.glyphs[index]
    }

    /// Code assigned to a store dictionary slot, `None` for unused slots.
    pub fn slot_code(&self, slot: usize) -> Option<u8> {
        self.slot_codes.get(slot).copied().flatten()
    }

    /// How often each store dictionary slot is referenced, by glyphs and by
    /// reference entries.
    pub fn slot_usage(&self) -> Vec<usize> {
        let mut code_hits = [0usize; 256];
        for string in self.glyphs.iter().chain(self.dictionary.ref_entries()) {
            for &code in string {
                code_hits[code as usize] += 1;
            }
        }
        self.slot_codes
            .iter()
            .map(|code| code.map_or(0, |c| code_hits[c as usize]))
            .collect()
    }
}

/// Pixel trie over dictionary replacements, used to find every entry that
/// matches at a position in one walk.
#[derive(Debug, Clone)]
pub struct DictionaryTrie {
    nodes: Vec<TrieNode>,
}

#[derive(Debug, Clone, Default)]
struct TrieNode {
    children: [u32; 16],
    code: Option<u8>,
}

impl Default for DictionaryTrie {
    fn default() -> Self {
        Self::new()
    }
}

impl DictionaryTrie {
    pub fn new() -> Self {
        Self {
            nodes: vec![TrieNode::default()],
        }
    }

    /// Adds a replacement; the first code inserted for a pixel string wins.
    pub fn insert(&mut self, pixels: &[u8], code: u8) {
        let mut node = 0usize;
        for &pixel in pixels {
            let pixel = (pixel & MAX_ALPHA) as usize;
            let child = self.nodes[node].children[pixel];
            node = if child == 0 {
                self.nodes.push(TrieNode::default());
                let new_node = self.nodes.len() - 1;
                self.nodes[node].children[pixel] = new_node as u32;
                new_node
            } else {
                child as usize
            };
        }
        if node != 0 && self.nodes[node].code.is_none() {
            self.nodes[node].code = Some(code);
        }
    }

    /// Calls `found(length, code)` for every entry that is a prefix of `pixels`.
    pub fn for_each_match(&self, pixels: &[u8], mut found: impl FnMut(usize, u8)) {
        let mut node = 0usize;
        for (i, &pixel) in pixels.iter().enumerate() {
            let child = self.nodes[node].children[(pixel & MAX_ALPHA) as usize];
            if child == 0 {
                return;
            }
            node = child as usize;
            if let Some(code) = self.nodes[node].code {
                found(i + 1, code);
            }
        }
    }
}

/// Run-length encodes a pixel string.
pub fn encode_rle(pixels: &[u8]) -> RleString {
    let mut result = Vec::new();
    let mut pos = 0;
    while pos < pixels.len() {
        let pixel = pixels[pos];
        let mut count = 1;
        pos += 1;
        while pos < pixels.len() && pixels[pos] == pixel {
            count += 1;
            pos += 1;
        }

        if pixel == 0 {
            while count >= 64 {
                let blocks = (count / 64).min(64);
                result.push(RLE_64ZEROS | (blocks - 1) as u8);
                count -= blocks * 64;
            }
            if count > 0 {
                result.push(RLE_ZEROS | count as u8);
            }
        } else if pixel >= MAX_ALPHA {
            while count > 0 {
                let run = count.min(64);
                result.push(RLE_ONES | (run - 1) as u8);
                count -= run;
            }
        } else {
            while count > 0 {
                let run = count.min(4);
                result.push(RLE_SHADE | (((run - 1) as u8) << 4) | pixel);
                count -= run;
            }
        }
    }
    result
}

/// Shortest reference encoding of `pixels`. Literal pixels are always
/// available; `REF_FILLZEROS` only when encoding a whole glyph.
pub fn encode_ref(pixels: &[u8], trie: &DictionaryTrie, is_glyph: bool) -> RefString {
    let n = pixels.len();
    let fill_from = if is_glyph {
        n - pixels.iter().rev().take_while(|&&p| p == 0).count()
    } else {
        usize::MAX
    };

    // cost[i]: codes needed for pixels[i..], choice[i]: (code, pixels consumed)
    let mut cost = vec![0usize; n + 1];
    let mut choice = vec![(0u8, 0usize); n + 1];
    for i in (0..n).rev() {
        let mut best = (cost[i + 1] + 1, (pixels[i], 1));
        if i >= fill_from && best.0 > 1 {
            best = (1, (REF_FILLZEROS, n - i));
        }
        trie.for_each_match(&pixels[i..], |len, code| {
            let c = cost[i + len] + 1;
            if c < best.0 {
                best = (c, (code, len));
            }
        });
        cost[i] = best.0;
        choice[i] = best.1;
    }

    let mut result = Vec::with_capacity(cost[0]);
    let mut i = 0;
    while i < n {
        let (code, len) = choice[i];
        result.push(code);
        i += len;
    }
    result
}

/// Encodes the whole store with its current dictionary.
pub fn encode_font(store: &GlyphStore) -> EncodedFont {
    let dictionary = store.dictionary();
    let rle_slots: Vec<usize> = (0..dictionary.len()).filter(|&i| is_kind(&dictionary[i], EntryKind::Rle)).collect();
    let ref_slots: Vec<usize> = (0..dictionary.len()).filter(|&i| is_kind(&dictionary[i], EntryKind::Ref)).collect();

    let mut slot_codes = vec![None; dictionary.len()];
    let mut rle_trie = DictionaryTrie::new();
    for (index, &slot) in rle_slots.iter().enumerate() {
        let code = DICT_START as usize + index;
        if let Ok(code) = u8::try_from(code) {
            slot_codes[slot] = Some(code);
            rle_trie.insert(&dictionary[slot].replacement, code);
        }
    }

    let mut full_trie = rle_trie.clone();
    for (index, &slot) in ref_slots.iter().enumerate() {
        let code = DICT_START as usize + rle_slots.len() + index;
        if let Ok(code) = u8::try_from(code) {
            slot_codes[slot] = Some(code);
            full_trie.insert(&dictionary[slot].replacement, code);
        }
    }

    let rle = rle_slots.iter().map(|&slot| encode_rle(&dictionary[slot].replacement)).collect();
    let refs = ref_slots
        .iter()
        .map(|&slot| encode_ref(&dictionary[slot].replacement, &rle_trie, false))
        .collect();
    let glyphs = store.glyphs().iter().map(|g| encode_ref(&g.data, &full_trie, true)).collect();

    EncodedFont {
        dictionary: EncodedDictionary::new(rle, refs),
        glyphs,
        slot_codes,
    }
}

/// Total encoded size of the store with its current dictionary.
pub fn get_encoded_size(store: &GlyphStore) -> usize {
    encode_font(store).encoded_size()
}

fn is_kind(entry: &DictEntry, kind: EntryKind) -> bool {
    !entry.is_empty()
        && match kind {
            EntryKind::Rle => !entry.ref_encode,
            EntryKind::Ref => entry.ref_encode,
        }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::glyph_store::{FontInfo, GlyphEntry};
    use pretty_assertions::assert_eq;

    fn store(width: u8, height: u8, dictionary: Vec<DictEntry>, glyphs: &[&[u8]]) -> GlyphStore {
        let info = FontInfo {
            name: "enc".into(),
            max_width: width,
            max_height: height,
            baseline_x: 0,
            baseline_y: height,
            line_height: height,
            flags: 0,
            random_seed: 1,
        };
        let glyphs = glyphs
            .iter()
            .enumerate()
            .map(|(i, data)| GlyphEntry {
                data: data.to_vec(),
                chars: vec![0x41 + i as u32],
                width,
            })
            .collect();
        GlyphStore::new(info, dictionary, glyphs).unwrap()
    }

    #[test]
    fn test_encode_rle_runs() {
        assert_eq!(encode_rle(&[0, 0, 0]), vec![RLE_ZEROS | 3]);
        assert_eq!(encode_rle(&[15; 5]), vec![RLE_ONES | 4]);
        assert_eq!(encode_rle(&[15; 70]), vec![RLE_ONES | 63, RLE_ONES | 5]);
        assert_eq!(encode_rle(&[0; 130]), vec![RLE_64ZEROS | 1, RLE_ZEROS | 2]);
        assert_eq!(encode_rle(&[7; 5]), vec![RLE_SHADE | (3 << 4) | 7, RLE_SHADE | 7]);
        assert_eq!(encode_rle(&[0, 15, 0]), vec![RLE_ZEROS | 1, RLE_ONES, RLE_ZEROS | 1]);
        assert!(encode_rle(&[]).is_empty());
    }

    #[test]
    fn test_encode_ref_literals_and_fill() {
        let trie = DictionaryTrie::new();
        assert_eq!(encode_ref(&[15, 0, 3], &trie, false), vec![15, 0, 3]);
        assert_eq!(encode_ref(&[15, 0, 0, 0], &trie, true), vec![15, REF_FILLZEROS]);
        assert_eq!(encode_ref(&[0, 0], &trie, true), vec![REF_FILLZEROS]);
        // a single trailing zero costs the same either way
        assert_eq!(encode_ref(&[15, 0], &trie, false), vec![15, 0]);
    }

    #[test]
    fn test_encode_ref_prefers_longest_saving() {
        let mut trie = DictionaryTrie::new();
        trie.insert(&[15, 15], 24);
        trie.insert(&[15, 15, 15, 15], 25);
        // on equal cost the literal is taken first
        assert_eq!(encode_ref(&[15, 15, 15, 15, 15], &trie, false), vec![15, 25]);
        assert_eq!(encode_ref(&[15, 15, 15], &trie, false), vec![15, 24]);
        assert_eq!(encode_ref(&[15, 15, 15, 15], &trie, false), vec![25]);
    }

    #[test]
    fn test_trie_first_code_wins() {
        let mut trie = DictionaryTrie::new();
        trie.insert(&[1, 2], 30);
        trie.insert(&[1, 2], 31);
        let mut found = Vec::new();
        trie.for_each_match(&[1, 2, 3], |len, code| found.push((len, code)));
        assert_eq!(found, vec![(2, 30)]);
    }

    #[test]
    fn test_encode_font_orders_rle_before_ref() {
        let dictionary = vec![
            DictEntry::new(vec![15, 15, 0, 0], true),
            DictEntry::new(vec![15, 15], false),
            DictEntry::default(),
            DictEntry::new(vec![0, 15, 0], false),
        ];
        let s = store(4, 2, dictionary, &[&[15, 15, 0, 0, 15, 15, 0, 0]]);
        let encoded = encode_font(&s);

        assert_eq!(encoded.dictionary.rle_count(), 2);
        assert_eq!(encoded.dictionary.ref_count(), 1);
        assert_eq!(encoded.slot_code(1), Some(DICT_START));
        assert_eq!(encoded.slot_code(3), Some(DICT_START + 1));
        assert_eq!(encoded.slot_code(0), Some(DICT_START + 2));
        assert_eq!(encoded.slot_code(2), None);

        // the reference entry is built from the RLE entry plus literals
        assert_eq!(encoded.dictionary.ref_entries()[0], vec![DICT_START, 0, 0]);
        // the glyph uses the reference entry twice
        assert_eq!(encoded.glyph(0), &[DICT_START + 2, DICT_START + 2]);

        let usage = encoded.slot_usage();
        assert_eq!(usage[0], 2);
        assert_eq!(usage[1], 1);
        assert_eq!(usage[3], 0);
    }

    #[test]
    fn test_code_lookup_roundtrip() {
        let dictionary = EncodedDictionary::new(vec![vec![1], vec![2]], vec![vec![24]]);
        let entry = EntryRef {
            kind: EntryKind::Ref,
            index: 0,
        };
        assert_eq!(dictionary.code(entry), Some(DICT_START + 2));
        assert_eq!(dictionary.lookup(DICT_START + 2), Some(entry));
        assert_eq!(dictionary.lookup(DICT_START + 3), None);
        assert_eq!(dictionary.lookup(REF_FILLZEROS), None);
        assert_eq!(dictionary.get(entry), Some(EncodedEntry::Ref(vec![24])));
    }

    #[test]
    fn test_identical_bitmaps_encode_identically() {
        let a: &[u8] = &[15, 0, 15, 0, 15, 15];
        let c: &[u8] = &[0, 15, 0, 15, 0, 0];
        let s = store(3, 2, vec![DictEntry::new(vec![15, 0], false)], &[a, c]);
        let encoded = encode_font(&s);
        let trie = {
            let mut t = DictionaryTrie::new();
            t.insert(&[15, 0], DICT_START);
            t
        };
        assert_eq!(encoded.glyph(0), encode_ref(a, &trie, true).as_slice());
        assert_ne!(encoded.glyph(0), encoded.glyph(1));
    }

    #[test]
    fn test_encoded_size_counts_offsets() {
        let s = store(2, 1, vec![DictEntry::new(vec![15, 15], false)], &[&[15, 15], &[15, 0]]);
        let encoded = encode_font(&s);
        // entry: 1 byte + 2, glyph 0: 1 code + 2, glyph 1: two literals + 2
        assert_eq!(encoded.encoded_size(), 3 + 3 + 4);
        assert_eq!(get_encoded_size(&s), 10);
    }
}
