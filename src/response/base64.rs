//! Base64 and data URL helpers

use base64::{engine::general_purpose::STANDARD, Engine};
use crate::error::{AppError, Result};

/// Encode binary data to base64 string
pub fn encode(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decode a base64 string or a base64 data URL to binary data
pub fn decode(encoded: &str) -> Result<Vec<u8>> {
    let data = match encoded.split_once(',') {
        Some((header, payload)) if header.starts_with("data:") => payload,
        _ => encoded,
    };

    STANDARD
        .decode(data.trim())
        .map_err(|e| AppError::Validation(format!("Invalid base64 data: {}", e)))
}

/// Create a data URL from binary data with the given MIME type
pub fn create_data_url(data: &[u8], mime_type: &str) -> String {
    format!("data:{};base64,{}", mime_type, encode(data))
}
