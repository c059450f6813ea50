use anyhow::{Context, Result};
use image::ImageFormat;
use image_hasher::{HashAlg, HasherConfig, ImageHash};

/// Perceptual fingerprint of a PNG frame, base64-encoded.
pub fn compute_phash(png_bytes: &[u8]) -> Result<String> {
    let img = image::load_from_memory_with_format(png_bytes, ImageFormat::Png)
        .context("failed to decode PNG frame")?;
    let hasher = HasherConfig::new()
        .hash_alg(HashAlg::DoubleGradient)
        .hash_size(8, 8)
        .to_hasher();

    Ok(hasher.hash_image(&img).to_base64())
}

/// Bit distance between two fingerprints; unparseable input counts as maximally far.
pub fn hamming_distance(lhs: &str, rhs: &str) -> u32 {
    let (Ok(h1), Ok(h2)) = (
        ImageHash::<Vec<u8>>::from_base64(lhs),
        ImageHash::<Vec<u8>>::from_base64(rhs),
    ) else {
        return u32::MAX;
    };
    h1.dist(&h2)
}

/// Whether the screen moved enough since `previous` to be worth re-reading.
pub fn frame_changed(previous: Option<&str>, current: &str, threshold: u32) -> bool {
    match previous {
        None => true,
        Some(prev) => hamming_distance(prev, current) >= threshold,
    }
}
