//! `ressetting.obj` configuration — parsed with serde/serde_json.

use serde::{Deserialize, Serialize};

/// Selects the versioning/reconstruction rule a resource reconstructs
/// its revisions with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RevisioningClass {
    Full,
    Incremental,
    Differential,
    SlidingSnapshot,
}

/// Selects the storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageKind {
    FileChannel,
    MemoryMapped,
}

/// Hash strategy passed through to the external node layer; the core
/// never interprets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashKind {
    None,
    Rolling,
    Postorder,
}

/// One named byte-handler stage with its per-handler parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", content = "params", rename_all = "lowercase")]
pub enum ByteHandlerSpec {
    /// No-op passthrough handler.
    Identity,
    /// Snappy block compression.
    Snappy,
    /// Reversible placeholder for an encryption handler; the real keyset
    /// lives in `encryption/encryptionKey.json` next to the resource and
    /// is supplied by the caller, not generated by the core.
    Xor { key_hex: String },
}

/// The full contents of a resource's `ressetting.obj` file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub revisioning_class: RevisioningClass,
    pub numbers_of_revision_to_restore: u32,
    pub byte_handler_classes: Vec<ByteHandlerSpec>,
    pub storage_kind: StorageKind,
    pub hash_kind: HashKind,
    pub path_summary: bool,
    pub dewey_ids_stored: bool,
    pub store_diffs: bool,
    pub custom_commit_timestamps: bool,
    pub resource_id: u64,

    /// Page size in bytes for the on-disk frame format; required to
    /// construct the storage and cache layers at open time.
    pub page_size: u32,
    /// Bounded entry counts for the three buffer-manager tiers.
    pub index_cache_capacity: usize,
    pub record_cache_capacity: usize,
    pub revision_root_cache_capacity: usize,
    /// Read permits (default 512).
    pub max_read_permits: u32,
    /// Timeout for acquiring a read or write permit (default 20s).
    pub permit_timeout_ms: u64,
}

impl ResourceConfig {
    /// Conservative defaults: full versioning, no compression/encryption,
    /// file-backed storage. Mirrors the teacher's own layered preset idiom
    /// (`Config::production`/`balanced`/`benchmark`).
    pub fn default_config(resource_id: u64) -> Self {
        Self {
            revisioning_class: RevisioningClass::Incremental,
            numbers_of_revision_to_restore: 1,
            byte_handler_classes: vec![ByteHandlerSpec::Identity],
            storage_kind: StorageKind::FileChannel,
            hash_kind: HashKind::None,
            path_summary: true,
            dewey_ids_stored: false,
            store_diffs: false,
            custom_commit_timestamps: false,
            resource_id,
            page_size: 8192,
            index_cache_capacity: 512,
            record_cache_capacity: 4096,
            revision_root_cache_capacity: 128,
            max_read_permits: 512,
            permit_timeout_ms: 20_000,
        }
    }

    /// Durability-first preset: sliding-snapshot reconstruction bounded to
    /// a handful of fragments, snappy compression, smaller caches so the
    /// working set stays close to disk.
    pub fn durable(resource_id: u64) -> Self {
        Self {
            revisioning_class: RevisioningClass::SlidingSnapshot,
            numbers_of_revision_to_restore: 4,
            byte_handler_classes: vec![ByteHandlerSpec::Snappy],
            index_cache_capacity: 128,
            record_cache_capacity: 1024,
            revision_root_cache_capacity: 32,
            ..Self::default_config(resource_id)
        }
    }

    /// Throughput-first preset: differential reconstruction, larger
    /// caches, more concurrent readers.
    pub fn fast(resource_id: u64) -> Self {
        Self {
            revisioning_class: RevisioningClass::Differential,
            numbers_of_revision_to_restore: 1,
            index_cache_capacity: 2048,
            record_cache_capacity: 16_384,
            revision_root_cache_capacity: 512,
            max_read_permits: 1024,
            ..Self::default_config(resource_id)
        }
    }

    /// Parses `ressetting.obj` contents.
    pub fn from_json(bytes: &[u8]) -> crate::error::Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| crate::error::StorageError::corrupt(format!("ressetting.obj: {e}")))
    }

    /// Serializes to `ressetting.obj` contents.
    pub fn to_json(&self) -> crate::error::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| crate::error::StorageError::corrupt(format!("ressetting.obj: {e}")))
    }
}
