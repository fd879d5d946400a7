//! Dictionary based run-length compression of monochrome bitmap fonts.
//!
//! A [`GlyphStore`] is encoded against its dictionary, split into character
//! ranges and assembled into an [`RleFont`], the compact binary object a
//! microcontroller renders from. The [`optimizer`] searches for a dictionary
//! that makes that object smaller.

mod error;
pub use error::*;

pub type Result<T> = std::result::Result<T, RleFontError>;

pub mod blob;
pub mod char_range;
pub mod decode;
pub mod dictionary;
pub mod encoder;
pub mod glyph_store;
pub mod optimizer;
pub mod psf;

pub mod font;
pub use font::*;

pub use blob::PackedBlob;
pub use char_range::{CharRange, MAX_CHAR_RANGES, PackedCharRange, PartitionOptions, compute_char_ranges, encode_character_range};
pub use decode::DecodedGlyph;
pub use dictionary::pack_dictionary;
pub use encoder::{EncodedFont, encode_font, get_encoded_size};
pub use glyph_store::{DictEntry, FontInfo, GlyphEntry, GlyphStore};
pub use optimizer::{AcceptPolicy, OptimizeReport, OptimizerOptions, OptimizerSession, init_dictionary, optimize, update_scores};
pub use psf::import_psf;
