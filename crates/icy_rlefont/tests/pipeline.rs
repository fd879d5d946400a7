use icy_rlefont::{
    GlyphEntry, GlyphStore, FontInfo, MAX_CHAR_RANGES, OptimizerOptions, PartitionOptions, RleFont, RleFontError, assemble_font, encode_font, get_encoded_size,
    init_dictionary, optimize,
};
use pretty_assertions::assert_eq;

const WIDTH: u8 = 6;
const HEIGHT: u8 = 8;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn info(name: &str) -> FontInfo {
    FontInfo {
        name: name.into(),
        max_width: WIDTH,
        max_height: HEIGHT,
        baseline_x: 0,
        baseline_y: 6,
        line_height: 9,
        flags: 0,
        random_seed: 0x1234_5678,
    }
}

/// Glyphs assembled from a handful of row patterns, so the font has the
/// kind of repetition real bitmap fonts show.
fn generated_glyph(code: u32) -> Vec<u8> {
    const ROWS: [[u8; WIDTH as usize]; 6] = [
        [0, 0, 0, 0, 0, 0],
        [0, 15, 15, 15, 0, 0],
        [15, 0, 0, 0, 15, 0],
        [15, 15, 15, 15, 15, 0],
        [15, 0, 0, 0, 0, 0],
        [0, 0, 15, 0, 0, 0],
    ];
    let mut rng = fastrand::Rng::with_seed(u64::from(code));
    let mut data = Vec::with_capacity(WIDTH as usize * HEIGHT as usize);
    for row in 0..HEIGHT {
        let pattern = if row == 0 || row == HEIGHT - 1 { 0 } else { rng.usize(..ROWS.len()) };
        data.extend_from_slice(&ROWS[pattern]);
    }
    data
}

fn generated_store(chars: impl IntoIterator<Item = u32>) -> GlyphStore {
    let glyphs = chars
        .into_iter()
        .map(|code| GlyphEntry {
            data: generated_glyph(code),
            chars: vec![code],
            width: WIDTH,
        })
        .collect();
    GlyphStore::new(info("generated"), Vec::new(), glyphs).unwrap()
}

fn assert_font_matches_store(font: &RleFont, store: &GlyphStore) {
    for (code, index) in store.char_to_glyph() {
        let decoded = font.glyph_pixels(code).unwrap().unwrap();
        assert_eq!(decoded.width, store.glyph(index).width, "width of {code:#x}");
        assert_eq!(decoded.pixels, store.glyph(index).data, "pixels of {code:#x}");
    }
}

#[test]
fn identical_glyphs_share_one_offset() {
    let a = vec![0, 15, 15, 0, 15, 0, 0, 15, 15, 15, 15, 15, 15, 0, 0, 15];
    let c = vec![15, 15, 15, 15, 15, 0, 0, 0, 15, 0, 0, 0, 15, 15, 15, 15];
    let info = FontInfo {
        max_width: 4,
        max_height: 4,
        ..info("abc")
    };
    let glyphs = vec![
        GlyphEntry {
            data: a.clone(),
            chars: vec![u32::from('A')],
            width: 4,
        },
        GlyphEntry {
            data: a,
            chars: vec![u32::from('B')],
            width: 4,
        },
        GlyphEntry {
            data: c,
            chars: vec![u32::from('C')],
            width: 4,
        },
    ];
    let store = GlyphStore::new(info, Vec::new(), glyphs).unwrap();

    let map = store.char_to_glyph();
    let encoded = encode_font(&store);
    assert_eq!(encoded.glyph(map[&u32::from('A')]), encoded.glyph(map[&u32::from('B')]));
    assert_ne!(encoded.glyph(map[&u32::from('A')]), encoded.glyph(map[&u32::from('C')]));

    let font = RleFont::from_store(&store).unwrap();
    assert_eq!(font.char_ranges.len(), 1);
    let range = &font.char_ranges[0];
    assert_eq!(range.first_char, u32::from('A'));
    assert_eq!(range.char_count, 3);
    assert_eq!(range.glyph_offsets.len(), 4);
    assert_eq!(range.glyph_offsets[0], range.glyph_offsets[1]);
    assert_ne!(range.glyph_offsets[0], range.glyph_offsets[2]);
    assert_eq!(*range.glyph_offsets.last().unwrap() as usize, range.glyph_data.len());

    assert_font_matches_store(&font, &store);
}

#[test]
fn optimized_font_survives_binary_roundtrip() {
    init_logging();
    let mut store = generated_store(0x20..0x7F);
    let initial = get_encoded_size(&store);

    init_dictionary(&mut store).unwrap();
    let report = optimize(
        &mut store,
        &OptimizerOptions {
            passes_per_session: 4,
            ..Default::default()
        },
    );
    assert!(report.size_after <= report.size_before);
    assert!(get_encoded_size(&store) < initial);

    let font = RleFont::from_store(&store).unwrap();
    assert_eq!(font.metrics.line_height, 9);
    assert_eq!(font.metrics.fallback_character, u16::from(b'?'));
    assert_font_matches_store(&font, &store);

    let bytes = font.to_bytes().unwrap();
    assert_eq!(bytes.len(), font.data_size());
    let loaded = RleFont::read(&bytes).unwrap();
    assert_eq!(loaded, font);
    assert_font_matches_store(&loaded, &store);
}

#[test]
fn sparse_character_set_splits_into_ranges() {
    let store = generated_store((0x20..0x7F).chain(0x410..0x450));
    let font = RleFont::from_store(&store).unwrap();

    assert_eq!(font.char_ranges.len(), 2);
    assert_eq!(font.char_ranges[0].first_char, 0x20);
    assert_eq!(font.char_ranges[1].first_char, 0x410);
    assert_eq!(font.char_ranges[1].char_count, 0x40);
    assert!(font.glyph_pixels(0x200).unwrap().is_none());
    assert_font_matches_store(&font, &store);
}

#[test]
fn range_count_ceiling_is_enforced() {
    let store = generated_store(0x20..0x7F);
    let options = PartitionOptions {
        max_range_bytes: 60,
        max_ranges: 2,
        minimum_gap: 16,
    };
    assert!(matches!(
        assemble_font(&store, &options),
        Err(RleFontError::TooManyRanges { max: 2, .. })
    ));

    // a larger ceiling from the caller is capped at what the format holds
    let options = PartitionOptions {
        max_range_bytes: 60,
        max_ranges: 255,
        minimum_gap: 16,
    };
    assert!(matches!(
        assemble_font(&store, &options),
        Err(RleFontError::TooManyRanges { max: MAX_CHAR_RANGES, .. })
    ));

    let options = PartitionOptions {
        max_range_bytes: 1000,
        max_ranges: 255,
        minimum_gap: 16,
    };
    let font = assemble_font(&store, &options).unwrap();
    assert!(font.char_ranges.len() > 2);
    assert!(font.char_ranges.len() <= MAX_CHAR_RANGES);
    for range in &font.char_ranges {
        assert!(range.glyph_data.len() <= 1000);
    }
    assert_font_matches_store(&font, &store);
}

#[test]
fn saved_seed_continues_the_random_stream() {
    let options = OptimizerOptions {
        passes_per_session: 3,
        ..Default::default()
    };

    let mut continuous = generated_store(0x30..0x5B);
    init_dictionary(&mut continuous).unwrap();
    let mut reloaded = continuous.clone();

    optimize(&mut continuous, &options);
    optimize(&mut continuous, &options);

    optimize(&mut reloaded, &options);
    let mut json = Vec::new();
    reloaded.save(&mut json).unwrap();
    let mut reloaded = GlyphStore::load(json.as_slice()).unwrap();
    optimize(&mut reloaded, &options);

    assert_eq!(reloaded, continuous);
}
