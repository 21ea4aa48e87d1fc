//! Response encoding - PNG serialization and data URLs

pub mod base64;

use image::{DynamicImage, ImageFormat};
use std::io::Cursor;

use crate::error::{AppError, Result};

pub const PNG_MIME: &str = "image/png";

/// Encode an image as PNG bytes
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| AppError::Encoding(e.to_string()))?;
    Ok(bytes)
}

/// Encode an image as a self-contained `data:image/png;base64,...` URL
pub fn png_data_url(image: &DynamicImage) -> Result<String> {
    let bytes = encode_png(image)?;
    Ok(base64::create_data_url(&bytes, PNG_MIME))
}

/// Encode every image; runs on the caller's thread
pub fn png_data_urls(images: &[DynamicImage]) -> Result<Vec<String>> {
    images.iter().map(png_data_url).collect()
}
