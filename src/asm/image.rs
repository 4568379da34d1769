//! Program image format.
//!
//! A `.um` image is a flat sequence of 32-bit words stored big-endian.
//! Its length must be a multiple of four bytes.

use crate::cpu::decode::Word;
use std::path::Path;
use thiserror::Error;

const WORD_BYTES: usize = 4;

/// Decode raw image bytes into words.
pub fn parse_image(bytes: &[u8]) -> Result<Vec<Word>, ImageError> {
    if bytes.len() % WORD_BYTES != 0 {
        return Err(ImageError::MisalignedLength(bytes.len()));
    }

    Ok(bytes
        .chunks_exact(WORD_BYTES)
        .map(|chunk| Word::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Encode words as image bytes.
pub fn encode_image(words: &[Word]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_be_bytes()).collect()
}

/// Load an image file from disk.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<Vec<Word>, ImageError> {
    let bytes = std::fs::read(path.as_ref())
        .map_err(|e| ImageError::IoError(e.to_string()))?;
    parse_image(&bytes)
}

/// Save words as an image file.
pub fn save_image<P: AsRef<Path>>(path: P, words: &[Word]) -> Result<(), ImageError> {
    std::fs::write(path.as_ref(), encode_image(words))
        .map_err(|e| ImageError::IoError(e.to_string()))
}

/// Errors that can occur while reading or writing images.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("image length {0} is not a multiple of 4 bytes")]
    MisalignedLength(usize),
}
