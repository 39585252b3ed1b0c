use anyhow::{anyhow, Context, Result};
use image::RgbImage;

/// Decode an uploaded JPEG or PNG into RGB pixels.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage> {
    if bytes.is_empty() {
        return Err(anyhow!("image is empty"));
    }
    let image = image::load_from_memory(bytes).context("failed to decode image")?;
    Ok(image.to_rgb8())
}
