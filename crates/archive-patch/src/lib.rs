//! # archive_patch - Content-Addressed Archive Patching
//!
//! Brings an installed archive of named byte entries (game data, asset packs)
//! to a target version using a database of binary deltas keyed by *content*
//! rather than by path alone. Several byte-exact "original" variants of the
//! same file may exist in the wild; each is recognised by its fingerprint and
//! patched with the delta built for it.
//!
//! ## Features
//!
//! - Windowed CRC-32 / Adler-32 content fingerprints
//! - bsdiff-compatible deltas over an SA-IS suffix array, with bzip2, LZMA or
//!   uncompressed streams
//! - Sequential and memory-mapped Robin Hood hashed patch stores
//! - Parallel reconciliation with progress reporting, cancellation and a
//!   simulate mode
//!
//! ## Examples
//!
//! ```rust
//! use archive_patch::archive::{Archive, MemoryArchive};
//! use archive_patch::fingerprint::Representation;
//! use archive_patch::reconcile::{EntryStatus, Reconciler};
//! use archive_patch::rename::RenameMap;
//! use archive_patch::store::PatchStoreBuilder;
//! use archive_patch::ReconcileOptions;
//!
//! # fn main() -> Result<(), archive_patch::Error> {
//! let old = MemoryArchive::new().with_entry("a.txt", "abc")?;
//! let target = MemoryArchive::new().with_entry("a.txt", "abcd")?;
//!
//! let mut builder = PatchStoreBuilder::new();
//! let sources: [&dyn Archive; 1] = [&old];
//! builder.add_from_archives(&sources, &target, &RenameMap::new())?;
//! let store = builder.build_sequential();
//!
//! let mut installed = old.clone();
//! let reconciler = Reconciler::new(&store, ReconcileOptions::new().simulate(true));
//! let report = reconciler.run(&mut installed, &mut RenameMap::new(), "unused".as_ref())?;
//!
//! assert_eq!(report.status("a.txt"), Some(EntryStatus::Patched));
//! assert_eq!(installed.read("a.txt", Representation::Live)?, b"abcd");
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod archive;
pub mod config;
pub mod delta;
pub mod error;
pub mod fingerprint;
pub mod hash;
pub mod path;
pub mod reconcile;
pub mod rename;
pub mod store;

// Re-export commonly used types
pub use archive::{Archive, MemoryArchive};
pub use config::{CompressionPolicy, DeltaConfig, PatchConfig, ReconcileOptions};
pub use delta::{Delta, DeltaSignature};
pub use error::{Error, Result};
pub use fingerprint::{Fingerprint, Representation};
pub use reconcile::{EntryStatus, IssueKind, ReconcileReport, Reconciler};
pub use rename::RenameMap;
pub use store::{PatchRecord, PatchStore, PatchStoreBuilder};

/// Build a worker pool, sized to hardware parallelism when `threads` is `None`
pub(crate) fn thread_pool(threads: Option<usize>) -> Result<rayon::ThreadPool> {
    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(threads) = threads {
        builder = builder.num_threads(threads);
    }
    builder
        .build()
        .map_err(|e| Error::ThreadPool(format!("Failed to create thread pool: {e}")))
}
