//! # Strata
//!
//! Strata is a versioned, transactional page store for tree-structured
//! (XML/JSON-shaped) node data. It provides copy-on-write page
//! persistence, snapshot-isolated readers, a single exclusive writer per
//! resource, and pluggable versioning strategies for reconstructing
//! historical revisions from the page tree's accumulated fragments.
//!
//! ## Quick start
//!
//! ```no_run
//! use strata::{PageKind, RecordKind, ResourceConfig, ResourceManager};
//!
//! # fn main() -> strata::Result<()> {
//! let resource = ResourceManager::open("./my-resource", ResourceConfig::default_config(1))?;
//!
//! let mut write = resource.begin_write()?;
//! let key = write.create_entry(PageKind::RecordPage, -1, RecordKind(1), b"hello".to_vec())?;
//! write.commit()?;
//!
//! let read = resource.begin_read(None)?;
//! assert_eq!(read.record(key, PageKind::RecordPage, -1)?.unwrap().payload, b"hello");
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **Storage I/O** ([`io`]): positional file access and the
//!   double-buffered uber-page reference slot.
//! - **Byte handlers** ([`handler`]): a reversible pipeline (compression,
//!   encryption) sitting between the page codec and storage.
//! - **Page format** ([`page`]): the on-disk frame and the tagged page
//!   types that make up the tree.
//! - **Buffer manager** ([`cache`]): a pin-counted, tiered LRU in front of
//!   storage I/O.
//! - **Versioning** ([`versioning`]): the pluggable rules for
//!   reconstructing a logical page from its historical fragments.
//! - **Transactions** ([`read_trx`], [`write_trx`]): snapshot-isolated
//!   readers and the single copy-on-write writer.
//! - **Resource manager** ([`resource`]): ties the above together,
//!   gating concurrent access and driving crash recovery via the
//!   [`wal`] module.

pub mod bytes;
pub mod cache;
pub mod config;
pub mod error;
pub mod handler;
pub mod io;
pub mod logging;
pub mod page;
pub mod read_trx;
pub mod resource;
pub mod versioning;
pub mod wal;
pub mod write_trx;

pub use crate::config::{ByteHandlerSpec, HashKind, ResourceConfig, RevisioningClass, StorageKind};
pub use crate::error::{ConcurrencyError, Result, StorageError};
pub use crate::page::{PageKind, Record, RecordKind};
pub use crate::read_trx::PageReadTrx;
pub use crate::resource::{ResourceManager, ResourceStats};
pub use crate::write_trx::PageWriteTrx;
