//! Configuration values threaded into the codec, archives and reconciler
//!
//! Nothing in the crate reads global state: every knob lives in one of these
//! option structs and is passed in at construction.

use crate::delta::DeltaSignature;
use crate::path::entry_extension;
use std::collections::BTreeMap;

/// Options for delta creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaConfig {
    /// Codec used for the control, diff and extra streams
    pub signature: DeltaSignature,
    /// bzip2 block size level (1-9) when `signature` is bzip2
    pub bzip2_level: u32,
}

impl Default for DeltaConfig {
    fn default() -> Self {
        Self {
            signature: DeltaSignature::Bzip2,
            bzip2_level: 9,
        }
    }
}

impl DeltaConfig {
    /// Create new default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the stream codec
    pub fn signature(mut self, signature: DeltaSignature) -> Self {
        self.signature = signature;
        self
    }

    /// Set the bzip2 level
    pub fn bzip2_level(mut self, level: u32) -> Self {
        self.bzip2_level = level;
        self
    }
}

/// How an archive stores entries, by extension
///
/// A level of `None` means the entry is stored raw, so its stored and live
/// representations are identical.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionPolicy {
    /// zlib level for extensions without an explicit rule
    pub default_level: Option<u32>,
    /// Per-extension zlib levels, keyed by lowercase extension
    pub extension_levels: BTreeMap<String, Option<u32>>,
}

impl Default for CompressionPolicy {
    fn default() -> Self {
        // Audio is already compressed and streamed directly
        let extension_levels = ["ogg", "wav", "mp3", "lip", "fuz"]
            .into_iter()
            .map(|ext| (ext.to_string(), None))
            .collect();

        Self {
            default_level: Some(6),
            extension_levels,
        }
    }
}

impl CompressionPolicy {
    /// A policy that stores every entry raw
    pub fn uncompressed() -> Self {
        Self {
            default_level: None,
            extension_levels: BTreeMap::new(),
        }
    }

    /// Set the fallback level
    pub fn default_level(mut self, level: Option<u32>) -> Self {
        self.default_level = level;
        self
    }

    /// Set the level for one extension
    pub fn extension(mut self, ext: &str, level: Option<u32>) -> Self {
        self.extension_levels.insert(ext.to_ascii_lowercase(), level);
        self
    }

    /// zlib level for an entry name, `None` when it is stored raw
    pub fn level_for(&self, name: &str) -> Option<u32> {
        entry_extension(name)
            .and_then(|ext| self.extension_levels.get(&ext.to_ascii_lowercase()))
            .copied()
            .unwrap_or(self.default_level)
    }
}

/// Options for a reconciliation run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Run the rename, patch and prune phases but skip the commit
    pub simulate: bool,
    /// Number of worker threads (None = hardware parallelism)
    pub threads: Option<usize>,
    /// Report store records whose entry is absent from the archive
    pub report_missing_entries: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            simulate: false,
            threads: None,
            report_missing_entries: true,
        }
    }
}

impl ReconcileOptions {
    /// Create new default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable simulate mode
    pub fn simulate(mut self, simulate: bool) -> Self {
        self.simulate = simulate;
        self
    }

    /// Set the number of worker threads
    pub fn threads(mut self, num: usize) -> Self {
        self.threads = Some(num);
        self
    }

    /// Set whether missing entries are reported
    pub fn report_missing_entries(mut self, report: bool) -> Self {
        self.report_missing_entries = report;
        self
    }
}

/// Aggregate configuration for a patching session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchConfig {
    /// Delta creation options
    pub delta: DeltaConfig,
    /// Entry storage policy for archives
    pub compression: CompressionPolicy,
    /// Reconciliation options
    pub reconcile: ReconcileOptions,
}

impl PatchConfig {
    /// Create new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the delta options
    pub fn delta(mut self, delta: DeltaConfig) -> Self {
        self.delta = delta;
        self
    }

    /// Replace the compression policy
    pub fn compression(mut self, compression: CompressionPolicy) -> Self {
        self.compression = compression;
        self
    }

    /// Replace the reconcile options
    pub fn reconcile(mut self, reconcile: ReconcileOptions) -> Self {
        self.reconcile = reconcile;
        self
    }
}
