//! Response-body decoding with compression sniffing.
//!
//! Some providers serve gzip or deflate bodies without a matching
//! `Content-Encoding` header, so the HTTP client's automatic decompression
//! never fires. Decoding therefore sniffs magic bytes on the raw payload
//! before falling back to plain UTF-8.

use std::io::Read;

use flate2::read::{GzDecoder, ZlibDecoder};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BodyError {
    #[error("body is not valid UTF-8")]
    Utf8,
    #[error("compressed body failed to inflate: {0}")]
    Inflate(String),
    #[error("body is not valid JSON: {0}")]
    Json(String),
}

/// Decodes a body to text, inflating sniffed gzip/deflate payloads first.
///
/// # Errors
///
/// Returns [`BodyError`] when inflation fails or the result is not UTF-8.
pub fn as_text(raw: &[u8]) -> Result<String, BodyError> {
    let decoded = inflate_if_compressed(raw)?;
    String::from_utf8(decoded).map_err(|_| BodyError::Utf8)
}

/// Decodes a body as JSON, with the same compression sniffing as [`as_text`].
///
/// # Errors
///
/// Returns [`BodyError`] on inflate, UTF-8, or JSON parse failure.
pub fn as_json(raw: &[u8]) -> Result<serde_json::Value, BodyError> {
    let text = as_text(raw)?;
    serde_json::from_str(&text).map_err(|error| BodyError::Json(error.to_string()))
}

fn inflate_if_compressed(raw: &[u8]) -> Result<Vec<u8>, BodyError> {
    // gzip: 0x1f 0x8b. zlib-wrapped deflate: 0x78 followed by a valid
    // flag byte (0x01, 0x9c, 0xda cover every common compression level).
    if raw.len() >= 2 && raw[0] == 0x1f && raw[1] == 0x8b {
        let mut decoded = Vec::new();
        GzDecoder::new(raw)
            .read_to_end(&mut decoded)
            .map_err(|error| BodyError::Inflate(error.to_string()))?;
        return Ok(decoded);
    }
    if raw.len() >= 2 && raw[0] == 0x78 && matches!(raw[1], 0x01 | 0x9c | 0xda) {
        let mut decoded = Vec::new();
        ZlibDecoder::new(raw)
            .read_to_end(&mut decoded)
            .map_err(|error| BodyError::Inflate(error.to_string()))?;
        return Ok(decoded);
    }
    Ok(raw.to_vec())
}
