//! Archive reconciliation
//!
//! A [`Reconciler`] transforms an old archive into the target version
//! described by a [`PatchStore`], in four phases:
//!
//! 1. **Rename** - entries listed in the [`RenameMap`] are copied from their
//!    old names; unresolved pairs are reported as missing sources
//! 2. **Patch** - every entry with a store record is fingerprinted and, if
//!    it differs from the target, matched against the record's candidates,
//!    patched and verified
//! 3. **Prune** - entries without a store record are removed, then any
//!    folder left empty
//! 4. **Commit** - the archive is persisted (skipped in simulate mode)
//!
//! The patch phase fans entries out to a rayon pool. Workers only read the
//! archive; their results flow over a channel to one collector thread that
//! writes replacements back, updates the report and drives progress.
//!
//! Problems with individual entries never abort a run: they are recorded in
//! the returned [`ReconcileReport`]. Only cancellation and pool creation
//! failures surface as errors.

mod progress;
mod report;

pub use progress::{CancellationToken, Phase, Progress, ProgressCallback, ProgressSnapshot};
pub use report::{EntryStatus, Issue, IssueKind, ReconcileReport};

use crate::archive::Archive;
use crate::config::{PatchConfig, ReconcileOptions};
use crate::delta;
use crate::fingerprint::{Fingerprint, Representation};
use crate::rename::RenameMap;
use crate::store::PatchStore;
use crate::{Error, Result};
use parking_lot::RwLock;
use rayon::prelude::*;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, mpsc};

/// What a worker decided for one entry
#[derive(Debug)]
struct EntryOutcome {
    name: String,
    status: EntryStatus,
    issue: Option<(IssueKind, String)>,
    replacement: Option<(Representation, Vec<u8>)>,
}

impl EntryOutcome {
    fn new(name: &str, status: EntryStatus) -> Self {
        Self {
            name: name.to_string(),
            status,
            issue: None,
            replacement: None,
        }
    }

    fn with_issue(mut self, kind: IssueKind, detail: String) -> Self {
        self.issue = Some((kind, detail));
        self
    }
}

/// Drives reconciliation of one archive against one patch store
pub struct Reconciler<'s> {
    store: &'s dyn PatchStore,
    options: ReconcileOptions,
    progress: Arc<Progress>,
    callback: Option<ProgressCallback>,
    cancel: CancellationToken,
}

impl fmt::Debug for Reconciler<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("store", &self.store)
            .field("options", &self.options)
            .field("progress", &self.progress.snapshot())
            .field("callback", &self.callback.is_some())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl<'s> Reconciler<'s> {
    /// Create a reconciler over `store`
    pub fn new(store: &'s dyn PatchStore, options: ReconcileOptions) -> Self {
        Self {
            store,
            options,
            progress: Arc::new(Progress::new()),
            callback: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Create a reconciler over `store` with the reconcile options of `config`
    pub fn from_config(store: &'s dyn PatchStore, config: &PatchConfig) -> Self {
        Self::new(store, config.reconcile.clone())
    }

    /// Receive a snapshot after each entry and at every phase change
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Use an externally owned cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Options in effect
    pub fn options(&self) -> &ReconcileOptions {
        &self.options
    }

    /// Shared progress counters, readable from any thread
    pub fn progress(&self) -> Arc<Progress> {
        Arc::clone(&self.progress)
    }

    /// Token that cancels this reconciler
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run all phases
    ///
    /// The rename map is consumed: resolved pairs are removed and whatever
    /// remains afterwards names sources that were not found. `destination`
    /// receives the persisted archive unless the run is simulated.
    pub fn run<A: Archive + ?Sized>(
        &self,
        archive: &mut A,
        renames: &mut RenameMap,
        destination: &Path,
    ) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::new(self.options.simulate);
        log::info!(
            "Reconciling {} entries against {} store records{}",
            archive.entry_names().len(),
            self.store.len(),
            if self.options.simulate {
                " (simulate)"
            } else {
                ""
            }
        );

        let result = self.run_phases(archive, renames, destination, &mut report);
        match result {
            Ok(()) => {
                self.notify(self.progress.begin(Phase::Done, 0));
                log::info!(
                    "Reconciliation finished: {} patched, {} up to date, {} issues",
                    report.count(EntryStatus::Patched),
                    report.count(EntryStatus::UpToDate),
                    report.issues.len()
                );
                Ok(report)
            }
            Err(e) => {
                log::error!("Reconciliation aborted: {e}");
                Err(e)
            }
        }
    }

    fn run_phases<A: Archive + ?Sized>(
        &self,
        archive: &mut A,
        renames: &mut RenameMap,
        destination: &Path,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        self.rename_phase(archive, renames, report)?;
        self.patch_phase(archive, report)?;
        self.prune_phase(archive, report)?;

        if self.options.simulate {
            log::info!("Simulate mode: skipping commit");
            return Ok(());
        }
        self.commit_phase(&*archive, destination)?;
        report.committed = true;
        Ok(())
    }

    /// Copy renamed entries from their old names
    pub fn rename_phase<A: Archive + ?Sized>(
        &self,
        archive: &mut A,
        renames: &mut RenameMap,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        self.check_cancelled()?;
        self.notify(self.progress.begin(Phase::Rename, renames.len()));
        log::debug!("Rename phase: {} pairs", renames.len());

        let pairs: Vec<(String, String)> = renames
            .iter()
            .map(|(new, old)| (new.to_string(), old.to_string()))
            .collect();

        for (new_name, old_name) in pairs {
            if archive.contains(&old_name) {
                match archive.duplicate(&old_name, &new_name) {
                    Ok(()) => {
                        renames.resolve(&new_name);
                        report.renamed += 1;
                        log::debug!("Renamed {old_name} -> {new_name}");
                    }
                    Err(e) => report.push_issue(
                        &new_name,
                        IssueKind::PatchFailed,
                        format!("copy from {old_name} failed: {e}"),
                    ),
                }
            }
            self.notify(self.progress.advance(&new_name));
        }

        for (new_name, old_name) in renames.iter() {
            report.push_issue(
                new_name,
                IssueKind::MissingSource,
                format!("rename source {old_name} not found"),
            );
        }
        Ok(())
    }

    /// Fingerprint, match and patch every entry that has a store record
    pub fn patch_phase<A: Archive + ?Sized>(
        &self,
        archive: &mut A,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        self.check_cancelled()?;

        let present: HashSet<String> = archive.entry_names().into_iter().collect();
        let names: Vec<String> = present
            .iter()
            .filter(|name| self.store.contains(name))
            .cloned()
            .collect();

        if self.options.report_missing_entries {
            for name in self.store.names() {
                // Unresolved renames were already reported
                if !present.contains(&name) && !report.has_issue(&name, IssueKind::MissingSource) {
                    report.push_issue(
                        &name,
                        IssueKind::MissingSource,
                        "store has a record but the archive has no such entry",
                    );
                }
            }
        }

        self.notify(self.progress.begin(Phase::Patch, names.len()));
        log::info!("Patch phase: {} entries", names.len());

        let pool = crate::thread_pool(self.options.threads)?;
        let shared = RwLock::new(archive);
        let (tx, rx) = mpsc::channel::<EntryOutcome>();

        std::thread::scope(|scope| {
            let collector = scope.spawn(|| {
                for outcome in rx {
                    self.collect(&shared, outcome, report);
                }
            });

            pool.install(|| {
                names.par_iter().for_each_with(tx, |tx, name| {
                    if self.cancel.is_cancelled() {
                        return;
                    }
                    let outcome = self.process_entry(&shared, name);
                    // The collector only stops once every sender is gone
                    let _ = tx.send(outcome);
                });
            });

            collector
                .join()
                .map_err(|_| Error::ThreadPool("Result collector panicked".to_string()))
        })?;

        self.check_cancelled()
    }

    /// Remove entries without a store record, then empty folders
    pub fn prune_phase<A: Archive + ?Sized>(
        &self,
        archive: &mut A,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        self.check_cancelled()?;

        let orphans: Vec<String> = archive
            .entry_names()
            .into_iter()
            .filter(|name| !self.store.contains(name))
            .collect();
        self.notify(self.progress.begin(Phase::Prune, orphans.len()));
        log::debug!("Prune phase: {} entries without records", orphans.len());

        for name in orphans {
            archive.remove(&name)?;
            report.set_status(&name, EntryStatus::MissingFromStore);
            log::debug!("Pruned {name}");
            self.notify(self.progress.advance(&name));
        }

        for folder in archive.folders() {
            if archive.entries(&folder).is_empty() {
                archive.remove_folder(&folder)?;
                report.pruned_folders += 1;
                log::debug!("Removed empty folder {folder:?}");
            }
        }
        Ok(())
    }

    /// Persist the archive to `destination`
    pub fn commit_phase<A: Archive + ?Sized>(&self, archive: &A, destination: &Path) -> Result<()> {
        self.check_cancelled()?;
        self.notify(self.progress.begin(Phase::Commit, 1));
        log::info!("Committing archive to {}", destination.display());
        archive.persist(destination)?;
        self.notify(self.progress.advance(&destination.display().to_string()));
        Ok(())
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    fn notify(&self, snapshot: ProgressSnapshot) {
        if let Some(callback) = &self.callback {
            callback(&snapshot);
        }
    }

    fn collect<A: Archive + ?Sized>(
        &self,
        archive: &RwLock<&mut A>,
        outcome: EntryOutcome,
        report: &mut ReconcileReport,
    ) {
        let EntryOutcome {
            name,
            mut status,
            mut issue,
            replacement,
        } = outcome;

        if let Some((representation, data)) = replacement {
            if let Err(e) = archive.write().replace(&name, representation, data) {
                status = EntryStatus::PatchFailed;
                issue = Some((IssueKind::PatchFailed, format!("write-back failed: {e}")));
            }
        }

        log::debug!("{name}: {status}");
        report.set_status(&name, status);
        if let Some((kind, detail)) = issue {
            report.push_issue(&name, kind, detail);
        }
        self.notify(self.progress.advance(&name));
    }

    fn process_entry<A: Archive + ?Sized>(
        &self,
        archive: &RwLock<&mut A>,
        name: &str,
    ) -> EntryOutcome {
        match self.match_entry(archive, name) {
            Ok(outcome) => outcome,
            Err(e) => {
                let kind = if e.is_corruption() {
                    IssueKind::CorruptDelta
                } else {
                    IssueKind::PatchFailed
                };
                EntryOutcome::new(name, EntryStatus::PatchFailed).with_issue(kind, e.to_string())
            }
        }
    }

    fn match_entry<A: Archive + ?Sized>(
        &self,
        archive: &RwLock<&mut A>,
        name: &str,
    ) -> Result<EntryOutcome> {
        let Some(record) = self.store.lookup(name)? else {
            return Ok(EntryOutcome::new(name, EntryStatus::MissingFromStore));
        };

        let live = archive.read().read(name, Representation::Live)?;
        let current = Fingerprint::of(&live)?;
        if current == record.target {
            return Ok(EntryOutcome::new(name, EntryStatus::UpToDate));
        }

        let mut live_view = Some((live, current.clone()));
        let mut stored_view: Option<(Vec<u8>, Fingerprint)> = None;

        for (index, candidate) in record.candidates.iter().enumerate() {
            let view = match candidate.representation {
                Representation::Live => &mut live_view,
                Representation::Stored => &mut stored_view,
            };
            if view.is_none() {
                let bytes = archive.read().read(name, candidate.representation)?;
                let fingerprint = Fingerprint::of(&bytes)?;
                *view = Some((bytes, fingerprint));
            }
            let Some((bytes, fingerprint)) = view.as_ref() else {
                continue;
            };
            if *fingerprint != candidate.preimage {
                continue;
            }

            log::debug!(
                "{name}: matched candidate {index} ({:?})",
                candidate.representation
            );
            let Some(delta) = &candidate.delta else {
                return Ok(EntryOutcome::new(name, EntryStatus::UpToDate));
            };

            let patched = delta::apply(bytes, delta)?;
            let result = match candidate.representation {
                Representation::Live => Fingerprint::of(&patched)?,
                Representation::Stored => {
                    Fingerprint::of(&archive.read().decode(name, &patched)?)?
                }
            };

            if result != record.target {
                return Ok(EntryOutcome::new(name, EntryStatus::PatchFailed).with_issue(
                    IssueKind::PatchFailed,
                    format!(
                        "patched content ({result}) does not match target ({})",
                        record.target
                    ),
                ));
            }

            let mut outcome = EntryOutcome::new(name, EntryStatus::Patched);
            outcome.replacement = Some((candidate.representation, patched));
            return Ok(outcome);
        }

        Ok(
            EntryOutcome::new(name, EntryStatus::NoSourceMatch).with_issue(
                IssueKind::NoSourceMatch,
                format!(
                    "installed content ({current}) matches none of {} candidates",
                    record.candidates.len()
                ),
            ),
        )
    }
}
