//! Byte-handler pipeline: an ordered, reversible chain of pure transforms
//! applied to every serialized page frame before it reaches storage.

mod compress;
mod encrypt;

pub use compress::SnappyHandler;
pub use encrypt::XorHandler;

use crate::config::ByteHandlerSpec;
use crate::error::Result;

/// One reversible transform stage. Implementations must be pure: the same
/// input always produces the same output, and `decode(encode(x)) == x`.
pub trait ByteHandler: Send + Sync {
    /// Forward transform, applied when writing a page.
    fn encode(&self, input: &[u8]) -> Result<Vec<u8>>;
    /// Inverse transform, applied when reading a page.
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>>;
}

/// No-op stage; the default pipeline when no compression or encryption is
/// configured.
pub struct IdentityHandler;

impl ByteHandler for IdentityHandler {
    fn encode(&self, input: &[u8]) -> Result<Vec<u8>> {
        Ok(input.to_vec())
    }

    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        Ok(input.to_vec())
    }
}

/// An ordered chain of [`ByteHandler`]s. `encode` composes handlers
/// left-to-right; `decode` composes them right-to-left, so the pipeline
/// as a whole is its own reversible transform.
pub struct Pipeline {
    stages: Vec<Box<dyn ByteHandler>>,
}

impl Pipeline {
    /// Builds a pipeline from an ordered list of stages.
    pub fn new(stages: Vec<Box<dyn ByteHandler>>) -> Self {
        Self { stages }
    }

    /// Builds a pipeline from the `ressetting.obj` configuration, so that
    /// the exact inverse pipeline can be reconstructed on open.
    pub fn from_specs(specs: &[ByteHandlerSpec]) -> Result<Self> {
        let mut stages: Vec<Box<dyn ByteHandler>> = Vec::with_capacity(specs.len());
        for spec in specs {
            let stage: Box<dyn ByteHandler> = match spec {
                ByteHandlerSpec::Identity => Box::new(IdentityHandler),
                ByteHandlerSpec::Snappy => Box::new(SnappyHandler::default()),
                ByteHandlerSpec::Xor { key_hex } => Box::new(XorHandler::from_hex(key_hex)?),
            };
            stages.push(stage);
        }
        if stages.is_empty() {
            stages.push(Box::new(IdentityHandler));
        }
        Ok(Self::new(stages))
    }

    /// Runs every stage forward, in configured order.
    pub fn encode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut buf = input.to_vec();
        for stage in &self.stages {
            buf = stage.encode(&buf)?;
        }
        Ok(buf)
    }

    /// Runs every stage in reverse, undoing [`Pipeline::encode`].
    pub fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut buf = input.to_vec();
        for stage in self.stages.iter().rev() {
            buf = stage.decode(&buf)?;
        }
        Ok(buf)
    }
}
