//! Snappy block-compression byte-handler stage.

use super::ByteHandler;
use crate::error::{Result, StorageError};

/// Wraps `snap`'s raw block codec as a pipeline stage.
#[derive(Default)]
pub struct SnappyHandler;

impl ByteHandler for SnappyHandler {
    fn encode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = snap::raw::Encoder::new();
        encoder
            .compress_vec(input)
            .map_err(|e| StorageError::corrupt(format!("snappy compress: {e}")))
    }

    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = snap::raw::Decoder::new();
        decoder
            .decompress_vec(input)
            .map_err(|e| StorageError::corrupt(format!("snappy decompress: {e}")))
    }
}
