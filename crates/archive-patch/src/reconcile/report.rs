//! Reconciliation outcomes

use std::collections::BTreeMap;
use std::fmt;

/// Terminal state of one archive entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryStatus {
    /// Content already matched the target
    UpToDate,
    /// A delta was applied and the result verified
    Patched,
    /// A candidate matched but patching did not produce the target
    PatchFailed,
    /// No candidate pre-image matched the installed content
    NoSourceMatch,
    /// The store has no record for the entry; it was pruned
    MissingFromStore,
}

impl EntryStatus {
    /// Whether the entry ended in the target state
    pub fn is_ok(self) -> bool {
        matches!(self, EntryStatus::UpToDate | EntryStatus::Patched)
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EntryStatus::UpToDate => "up to date",
            EntryStatus::Patched => "patched",
            EntryStatus::PatchFailed => "patch failed",
            EntryStatus::NoSourceMatch => "no source match",
            EntryStatus::MissingFromStore => "missing from store",
        };
        f.write_str(label)
    }
}

/// Category of a non-fatal problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IssueKind {
    /// A delta or record failed structural validation
    CorruptDelta,
    /// A rename source or store-listed entry was not in the archive
    MissingSource,
    /// Installed content matched no candidate
    NoSourceMatch,
    /// Patching ran but the result did not verify, or the entry could not
    /// be processed
    PatchFailed,
}

/// One recorded problem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    /// Entry the issue concerns
    pub name: String,
    /// Category
    pub kind: IssueKind,
    /// Human-readable detail
    pub detail: String,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}: {}", self.kind, self.name, self.detail)
    }
}

/// Everything a reconciliation run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Final status of every visited entry
    pub entries: BTreeMap<String, EntryStatus>,
    /// Non-fatal problems in the order they were found
    pub issues: Vec<Issue>,
    /// Entries created from the rename map
    pub renamed: usize,
    /// Folders removed because they were left empty
    pub pruned_folders: usize,
    /// Whether the run skipped the commit phase
    pub simulated: bool,
    /// Whether the archive was persisted
    pub committed: bool,
}

impl ReconcileReport {
    /// Create an empty report
    pub fn new(simulated: bool) -> Self {
        Self {
            simulated,
            ..Self::default()
        }
    }

    /// Status of one entry
    pub fn status(&self, name: &str) -> Option<EntryStatus> {
        self.entries
            .get(&crate::path::normalize_entry_name(name))
            .copied()
    }

    /// Number of entries with `status`
    pub fn count(&self, status: EntryStatus) -> usize {
        self.entries.values().filter(|&&s| s == status).count()
    }

    /// Issues of one kind
    pub fn issues_of(&self, kind: IssueKind) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(move |issue| issue.kind == kind)
    }

    /// Entries that did not end up to date or patched
    pub fn failed_entries(&self) -> impl Iterator<Item = (&str, EntryStatus)> {
        self.entries
            .iter()
            .filter(|(_, status)| !status.is_ok())
            .map(|(name, status)| (name.as_str(), *status))
    }

    /// Whether every entry reached the target and nothing was reported
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty() && self.entries.values().all(|s| s.is_ok())
    }

    /// Whether an issue of `kind` was recorded for `name`
    pub fn has_issue(&self, name: &str, kind: IssueKind) -> bool {
        self.issues
            .iter()
            .any(|issue| issue.kind == kind && issue.name == name)
    }

    pub(crate) fn set_status(&mut self, name: &str, status: EntryStatus) {
        self.entries.insert(name.to_string(), status);
    }

    pub(crate) fn push_issue(&mut self, name: &str, kind: IssueKind, detail: impl Into<String>) {
        let issue = Issue {
            name: name.to_string(),
            kind,
            detail: detail.into(),
        };
        log::warn!("{issue}");
        self.issues.push(issue);
    }
}

impl fmt::Display for ReconcileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} entries: {} up to date, {} patched, {} failed, {} unmatched, {} pruned",
            self.entries.len(),
            self.count(EntryStatus::UpToDate),
            self.count(EntryStatus::Patched),
            self.count(EntryStatus::PatchFailed),
            self.count(EntryStatus::NoSourceMatch),
            self.count(EntryStatus::MissingFromStore),
        )?;
        writeln!(
            f,
            "{} renamed, {} empty folders removed, {}",
            self.renamed,
            self.pruned_folders,
            if self.committed {
                "committed"
            } else if self.simulated {
                "simulated"
            } else {
                "not committed"
            }
        )?;

        for (name, status) in self.failed_entries() {
            writeln!(f, "  {name}: {status}")?;
        }
        if !self.issues.is_empty() {
            writeln!(f, "{} issues:", self.issues.len())?;
            for issue in &self.issues {
                writeln!(f, "  {issue}")?;
            }
        }
        Ok(())
    }
}
