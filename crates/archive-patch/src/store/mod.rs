//! Patch stores
//!
//! A patch store maps a normalized entry name to a [`PatchRecord`]: the
//! fingerprint of the target content plus every known pre-image of the entry
//! and the delta that turns it into the target.
//!
//! Two on-disk formats are provided:
//!
//! - [`SequentialStore`] - length-prefixed records, decoded fully on open
//! - [`HashedStore`] - a persisted Robin Hood table, indexed on open and
//!   decoded record by record on lookup
//!
//! [`open`] detects the format from the file magic. Stores are built with
//! [`PatchStoreBuilder`].
//!
//! ```no_run
//! use archive_patch::store::{self, PatchStore};
//!
//! let store = store::open("data/patches.psrh")?;
//! if let Some(record) = store.lookup("meshes/armor/helm.nif")? {
//!     println!("{} candidates", record.candidates.len());
//! }
//! # Ok::<(), archive_patch::Error>(())
//! ```

mod builder;
mod hashed;
mod record;
mod robin_hood;
mod sequential;

pub use builder::PatchStoreBuilder;
pub use hashed::{BUCKET_HEADER_SIZE, HASHED_HEADER_SIZE, HashedStore};
pub use record::{Candidate, PatchRecord};
pub use robin_hood::{Bucket, RobinHoodTable};
pub use sequential::SequentialStore;

use crate::{Error, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

/// Version written into both store headers
pub const FORMAT_VERSION: u32 = 1;

/// Read-only view of a patch store
///
/// Implementations are shared by all reconciliation workers and must not
/// require mutable access to look up records.
pub trait PatchStore: Send + Sync + std::fmt::Debug {
    /// Record for `name`, which is normalized before lookup
    fn lookup(&self, name: &str) -> Result<Option<Arc<PatchRecord>>>;

    /// Whether a record exists for `name` without decoding it
    fn contains(&self, name: &str) -> bool;

    /// Every key in name order
    fn names(&self) -> Vec<String>;

    /// Number of records
    fn len(&self) -> usize;

    /// Whether the store has no records
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Open a store file, choosing the format from its magic
///
/// Any failure, including a damaged file, is reported as
/// [`Error::PatchStoreUnavailable`].
pub fn open<P: AsRef<Path>>(path: P) -> Result<Box<dyn PatchStore>> {
    let path = path.as_ref();
    let unavailable = |err: Error| Error::store_unavailable(path, err.to_string());

    let mut magic = [0u8; 4];
    File::open(path)
        .and_then(|mut file| file.read_exact(&mut magic))
        .map_err(|e| unavailable(e.into()))?;

    let store: Box<dyn PatchStore> = match magic {
        SequentialStore::MAGIC => Box::new(SequentialStore::open(path).map_err(unavailable)?),
        HashedStore::MAGIC => Box::new(HashedStore::open(path).map_err(unavailable)?),
        other => {
            log::error!("Unknown patch store magic in {}", path.display());
            return Err(Error::store_unavailable(
                path,
                format!("unknown store magic {}", hex::encode(other)),
            ));
        }
    };
    Ok(store)
}
