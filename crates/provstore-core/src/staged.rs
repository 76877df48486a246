//! Staged writes handed from the graph and provenance sets to the storer and
//! uploader.

use crate::diff::ChangeSet;
use crate::shard::PathTarget;
use crate::{Iri, Triple};
use std::collections::BTreeSet;

/// How the storer merges a staged entity into its target file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagedKind {
    /// Current-state data: replaces the subject's previous statements.
    Graph,
    /// Snapshot history: appended, never replaced.
    Provenance,
}

/// Everything needed to persist or upload one subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedEntity {
    pub subject: Iri,
    /// Named graph the statements belong to.
    pub graph: Iri,
    pub target: PathTarget,
    pub kind: StagedKind,
    pub deleted: bool,
    /// The subject already exists in storage and its old statements must go.
    pub overwrite: bool,
    /// Full statement set to write.
    pub statements: BTreeSet<Triple>,
    /// Minimal delta against the last committed state.
    pub change: ChangeSet,
}

impl StagedEntity {
    /// Update text for this entity's delta.
    #[must_use]
    pub fn update_text(&self) -> String {
        self.change.update_text(&self.graph)
    }
}
