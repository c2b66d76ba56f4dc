//! Archive abstraction consumed by the reconciler
//!
//! An archive is a collection of named byte entries grouped into folders.
//! Entry names are normalized (see [`crate::path`]) and carry their folder
//! as a `/`-separated prefix; entries at the root live in folder `""`.
//!
//! Every entry can be read in two forms: [`Representation::Live`] is the
//! decoded content an application reads, [`Representation::Stored`] is how
//! the container keeps it (for example zlib-compressed). The physical
//! container layout is up to the implementation.

mod memory;

pub use memory::MemoryArchive;

use crate::Result;
use crate::fingerprint::Representation;
use std::path::Path;

/// Named collection of byte entries
pub trait Archive: Send + Sync {
    /// Folder names in order, including `""` when root entries exist
    fn folders(&self) -> Vec<String>;

    /// Full names of the entries in `folder`, in order
    fn entries(&self, folder: &str) -> Vec<String>;

    /// Full names of every entry, in order
    fn entry_names(&self) -> Vec<String>;

    /// Whether an entry named `name` exists
    fn contains(&self, name: &str) -> bool;

    /// Read an entry in the given representation
    fn read(&self, name: &str, representation: Representation) -> Result<Vec<u8>>;

    /// Decode stored bytes as they would be decoded for entry `name`
    fn decode(&self, name: &str, stored: &[u8]) -> Result<Vec<u8>>;

    /// Add a new entry from live content, or replace an existing one
    fn add(&mut self, name: &str, live: Vec<u8>) -> Result<()>;

    /// Replace the content of an existing entry
    fn replace(&mut self, name: &str, representation: Representation, data: Vec<u8>)
    -> Result<()>;

    /// Copy entry `source` to `destination`, overwriting it if present
    fn duplicate(&mut self, source: &str, destination: &str) -> Result<()>;

    /// Move entry `from` to `to`
    fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        self.duplicate(from, to)?;
        self.remove(from)
    }

    /// Remove an entry; its folder is kept even if it becomes empty
    fn remove(&mut self, name: &str) -> Result<()>;

    /// Remove a folder and any entries still in it
    fn remove_folder(&mut self, folder: &str) -> Result<()>;

    /// Write the whole archive to `destination`
    fn persist(&self, destination: &Path) -> Result<()>;
}
