//! Durable storage for Encore's record library.
//!
//! Two small pieces, both filesystem-backed:
//! - **kv**: named collections serialized as single documents (one file per key)
//! - **blobs**: captured audio payloads, one object per record id plus a
//!   metadata sidecar carrying the MIME type
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use milkcrate::{BlobStore, FileKvStore, KvStore};
//!
//! let kv = FileKvStore::new("/var/lib/encore/collections").unwrap();
//! kv.set("performances", "[]").unwrap();
//! assert_eq!(kv.get("performances").unwrap().as_deref(), Some("[]"));
//!
//! let blobs = BlobStore::new("/var/lib/encore/blobs").unwrap();
//! blobs.save("performance_1700000000000", b"RIFF...", "audio/wav").unwrap();
//! ```
//!
//! Writers replace whole documents atomically enough for a single-process
//! library; there is no locking and no partial update support.

pub mod blobs;
pub mod kv;

// Re-exports for convenience
pub use blobs::{BlobMeta, BlobStore, StoredBlob};
pub use kv::{FileKvStore, KvStore, MemoryKvStore};
