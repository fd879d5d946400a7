use fastrand::Rng;

use super::{Edit, Mutation};
use crate::encoder::DICTIONARY_SIZE;
use crate::glyph_store::{DictEntry, GlyphStore, Pixels};
use crate::Result;

/// Longest substring proposed from glyph data.
pub const MAX_SUBSTRING_LEN: usize = 16;

fn used_slots(store: &GlyphStore) -> Vec<usize> {
    store
        .dictionary()
        .iter()
        .enumerate()
        .filter(|(_, e)| !e.is_empty())
        .map(|(i, _)| i)
        .collect()
}

fn random_used_slot(store: &GlyphStore, rng: &mut Rng) -> Option<usize> {
    let used = used_slots(store);
    if used.is_empty() {
        return None;
    }
    Some(used[rng.usize(..used.len())])
}

fn free_slot(store: &GlyphStore) -> Option<usize> {
    store.dictionary().iter().take(DICTIONARY_SIZE).position(DictEntry::is_empty)
}

/// Lowest scoring used slot; the first one wins ties.
fn worst_slot(store: &GlyphStore) -> Option<usize> {
    let mut worst: Option<(usize, i32)> = None;
    for (slot, entry) in store.dictionary().iter().enumerate() {
        if entry.is_empty() {
            continue;
        }
        if worst.map_or(true, |(_, score)| entry.score < score) {
            worst = Some((slot, entry.score));
        }
    }
    worst.map(|(slot, _)| slot)
}

/// A random run of 2 to 16 pixels out of a random glyph.
fn random_substring(store: &GlyphStore, rng: &mut Rng) -> Option<Pixels> {
    if store.glyph_count() == 0 {
        return None;
    }
    let data = &store.glyph(rng.usize(..store.glyph_count())).data;
    if data.len() < 2 {
        return None;
    }
    let len = rng.usize(2..=MAX_SUBSTRING_LEN.min(data.len()));
    let start = rng.usize(..=data.len() - len);
    Some(data[start..start + len].to_vec())
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Drops one pixel from either end of an entry. A single pixel entry is
/// cleared.
pub struct TrimEntry;

impl Mutation for TrimEntry {
    fn name(&self) -> &'static str {
        "trim"
    }

    fn propose(&self, store: &GlyphStore, rng: &mut Rng) -> Result<Option<Edit>> {
        let Some(slot) = random_used_slot(store, rng) else {
            return Ok(None);
        };
        let mut entry = store.dictionary_entry(slot).clone();
        if rng.bool() {
            entry.replacement.remove(0);
        } else {
            entry.replacement.pop();
        }
        if entry.replacement.len() < 2 {
            entry = DictEntry::default();
        }
        Ok(Some(Edit::replace(slot, entry)))
    }
}

/// Grows an entry by the pixel next to one of its occurrences in a glyph.
pub struct ExpandEntry;

impl Mutation for ExpandEntry {
    fn name(&self) -> &'static str {
        "expand"
    }

    fn propose(&self, store: &GlyphStore, rng: &mut Rng) -> Result<Option<Edit>> {
        let Some(slot) = random_used_slot(store, rng) else {
            return Ok(None);
        };
        if store.glyph_count() == 0 {
            return Ok(None);
        }
        let entry = store.dictionary_entry(slot);
        let data = &store.glyph(rng.usize(..store.glyph_count())).data;
        let Some(start) = find(data, &entry.replacement) else {
            return Ok(None);
        };
        let end = start + entry.replacement.len();

        let (from, to) = match (start > 0, end < data.len()) {
            (true, true) if rng.bool() => (start - 1, end),
            (true, true) => (start, end + 1),
            (true, false) => (start - 1, end),
            (false, true) => (start, end + 1),
            (false, false) => return Ok(None),
        };
        let expanded = DictEntry::new(data[from..to].to_vec(), entry.ref_encode);
        Ok(Some(Edit::replace(slot, expanded)))
    }
}

/// Switches an entry between RLE and reference encoding.
pub struct ToggleRefEncode;

impl Mutation for ToggleRefEncode {
    fn name(&self) -> &'static str {
        "refdict"
    }

    fn propose(&self, store: &GlyphStore, rng: &mut Rng) -> Result<Option<Edit>> {
        let Some(slot) = random_used_slot(store, rng) else {
            return Ok(None);
        };
        let entry = store.dictionary_entry(slot);
        Ok(Some(Edit::replace(
            slot,
            DictEntry::new(entry.replacement.clone(), !entry.ref_encode),
        )))
    }
}

/// Concatenates two entries into a new reference entry.
pub struct CombineEntries;

impl Mutation for CombineEntries {
    fn name(&self) -> &'static str {
        "combine"
    }

    fn propose(&self, store: &GlyphStore, rng: &mut Rng) -> Result<Option<Edit>> {
        let Some(target) = free_slot(store) else {
            return Ok(None);
        };
        let (Some(a), Some(b)) = (random_used_slot(store, rng), random_used_slot(store, rng)) else {
            return Ok(None);
        };
        let mut combined = store.dictionary_entry(a).replacement.clone();
        combined.extend_from_slice(&store.dictionary_entry(b).replacement);
        Ok(Some(Edit::replace(target, DictEntry::new(combined, true))))
    }
}

/// Puts a random glyph substring into a free slot.
pub struct AddSubstring;

impl Mutation for AddSubstring {
    fn name(&self) -> &'static str {
        "add"
    }

    fn propose(&self, store: &GlyphStore, rng: &mut Rng) -> Result<Option<Edit>> {
        let Some(target) = free_slot(store) else {
            return Ok(None);
        };
        let Some(pixels) = random_substring(store, rng) else {
            return Ok(None);
        };
        let ref_encode = rng.bool();
        Ok(Some(Edit::replace(target, DictEntry::new(pixels, ref_encode))))
    }
}

/// Swaps the lowest scoring entry for a random glyph substring.
pub struct ReplaceWorst;

impl Mutation for ReplaceWorst {
    fn name(&self) -> &'static str {
        "replace"
    }

    fn propose(&self, store: &GlyphStore, rng: &mut Rng) -> Result<Option<Edit>> {
        let Some(slot) = worst_slot(store) else {
            return Ok(None);
        };
        let Some(pixels) = random_substring(store, rng) else {
            return Ok(None);
        };
        let ref_encode = rng.bool();
        Ok(Some(Edit::replace(slot, DictEntry::new(pixels, ref_encode))))
    }
}

/// Clears the lowest scoring entry.
pub struct RemoveWorst;

impl Mutation for RemoveWorst {
    fn name(&self) -> &'static str {
        "remove"
    }

    fn propose(&self, store: &GlyphStore, _rng: &mut Rng) -> Result<Option<Edit>> {
        Ok(worst_slot(store).map(|slot| Edit::replace(slot, DictEntry::default())))
    }
}
