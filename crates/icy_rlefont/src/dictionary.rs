use crate::blob::PackedBlob;
use crate::encoder::EncodedDictionary;
use crate::Result;

/// Flattens both dictionary tables into one blob: every RLE entry, then
/// every reference entry, offsets numbered continuously.
pub fn pack_dictionary(dictionary: &EncodedDictionary) -> Result<PackedBlob> {
    let blob = PackedBlob::from_entries(dictionary.iter().map(|(_, bytes)| bytes))?;
    log::debug!(
        "packed dictionary: {} rle + {} ref entries, {} bytes",
        dictionary.rle_count(),
        dictionary.ref_count(),
        blob.len()
    );
    Ok(blob)
}
