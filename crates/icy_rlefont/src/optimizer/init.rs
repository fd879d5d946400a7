use std::collections::HashMap;

use super::mutations::MAX_SUBSTRING_LEN;
use super::update_scores;
use crate::encoder::{DICTIONARY_SIZE, encode_font};
use crate::glyph_store::{DictEntry, GlyphStore};
use crate::Result;

const MIN_SUBSTRING_LEN: usize = 2;

/// Seeds the dictionary with the glyph substrings that promise the largest
/// saving, using at most half of the slots so the optimizer has room left.
/// Entries the encoder ends up not using are cleared again.
pub fn init_dictionary(store: &mut GlyphStore) -> Result<()> {
    let candidates = {
        let mut counts: HashMap<&[u8], usize> = HashMap::new();
        for glyph in store.glyphs() {
            let data = glyph.data.as_slice();
            for len in MIN_SUBSTRING_LEN..=MAX_SUBSTRING_LEN.min(data.len()) {
                for window in data.windows(len) {
                    *counts.entry(window).or_default() += 1;
                }
            }
        }

        let mut scored: Vec<(usize, &[u8])> = counts
            .into_iter()
            .filter(|&(_, count)| count > 1)
            .map(|(pixels, count)| (count * (pixels.len() - 1), pixels))
            .collect();
        // map order is random, break ties on the pixels themselves
        scored.sort_unstable_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));
        scored
            .into_iter()
            .take(DICTIONARY_SIZE / 2)
            .map(|(_, pixels)| DictEntry::new(pixels.to_vec(), false))
            .collect::<Vec<_>>()
    };
    log::debug!("init_dictionary: {} candidates", candidates.len());
    store.set_dictionary(candidates)?;

    let usage = encode_font(store).slot_usage();
    for (slot, hits) in usage.into_iter().enumerate() {
        if hits == 0 && !store.dictionary_entry(slot).is_empty() {
            store.set_dictionary_entry(slot, DictEntry::default())?;
        }
    }
    update_scores(store);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::get_encoded_size;
    use crate::optimizer::tests::sample_store;
    use crate::optimizer::{OptimizerOptions, optimize};

    #[test]
    fn test_init_dictionary_shrinks_font() {
        let mut store = sample_store(21);
        let before = get_encoded_size(&store);
        init_dictionary(&mut store).unwrap();
        let after = get_encoded_size(&store);
        assert!(after < before, "{after} >= {before}");

        let used = store.dictionary().iter().filter(|e| !e.is_empty()).count();
        assert!(used > 0 && used <= DICTIONARY_SIZE / 2);
        assert_eq!(store.seed(), 21);
    }

    #[test]
    fn test_init_then_optimize() {
        let mut store = sample_store(8);
        init_dictionary(&mut store).unwrap();
        let before = get_encoded_size(&store);
        let report = optimize(
            &mut store,
            &OptimizerOptions {
                passes_per_session: 5,
                ..Default::default()
            },
        );
        assert_eq!(report.size_before, before);
        assert!(report.size_after <= before);
    }

    #[test]
    fn test_init_is_deterministic() {
        let mut a = sample_store(1);
        let mut b = sample_store(1);
        init_dictionary(&mut a).unwrap();
        init_dictionary(&mut b).unwrap();
        assert_eq!(a, b);
    }
}
