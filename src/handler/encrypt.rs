//! Reversible placeholder encryption stage.
//!
//! Real keyset management lives outside the core; this handler only has
//! to satisfy the byte-handler contract — a pure, reversible transform
//! keyed by bytes the resource configuration supplies via
//! `encryption/encryptionKey.json`.

use super::ByteHandler;
use crate::error::{Result, StorageError};

/// XOR-with-repeating-key stream cipher. Not cryptographically meaningful;
/// stands in for the encryptor slot in the pipeline contract.
pub struct XorHandler {
    key: Vec<u8>,
}

impl XorHandler {
    /// Builds a handler from a hex-encoded key.
    pub fn from_hex(key_hex: &str) -> Result<Self> {
        let key = decode_hex(key_hex)?;
        if key.is_empty() {
            return Err(StorageError::usage("xor handler key must not be empty"));
        }
        Ok(Self { key })
    }

    fn apply(&self, input: &[u8]) -> Vec<u8> {
        input
            .iter()
            .enumerate()
            .map(|(i, b)| b ^ self.key[i % self.key.len()])
            .collect()
    }
}

impl ByteHandler for XorHandler {
    fn encode(&self, input: &[u8]) -> Result<Vec<u8>> {
        Ok(self.apply(input))
    }

    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        // XOR is its own inverse.
        Ok(self.apply(input))
    }
}

fn decode_hex(s: &str) -> Result<Vec<u8>> {
    if s.len() % 2 != 0 {
        return Err(StorageError::usage("odd-length hex key"));
    }
    (0..s.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&s[i..i + 2], 16)
                .map_err(|_| StorageError::usage(format!("invalid hex byte at offset {i}")))
        })
        .collect()
}
