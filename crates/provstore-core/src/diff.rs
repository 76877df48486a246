//! # Change Detection
//!
//! Computes the minimal insert/delete sets between the statements an entity
//! had when it was last persisted and the statements it has now. Both output
//! forms, textual update requests and graph-tagged quads, are rendered from
//! the same two sets so they cannot disagree.

use crate::primitives::UPDATE_SEPARATOR;
use crate::{EntityType, Iri, Quad, Triple};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Write as _;

/// Statements to add and remove for one entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub to_insert: BTreeSet<Triple>,
    pub to_delete: BTreeSet<Triple>,
}

impl ChangeSet {
    /// Diff `previous` against `current`.
    ///
    /// A deleted entity removes everything it previously had and inserts
    /// nothing. Equal graphs exit early without building either difference.
    #[must_use]
    pub fn compute(
        previous: &BTreeSet<Triple>,
        current: &BTreeSet<Triple>,
        is_deleted: bool,
    ) -> Self {
        if is_deleted {
            return Self {
                to_insert: BTreeSet::new(),
                to_delete: previous.clone(),
            };
        }

        if previous.len() == current.len() && current.difference(previous).next().is_none() {
            return Self::default();
        }

        Self {
            to_insert: current.difference(previous).cloned().collect(),
            to_delete: previous.difference(current).cloned().collect(),
        }
    }

    /// Type-aware diff. Snapshots are append-only, so their diff is every
    /// current statement as an insert.
    #[must_use]
    pub fn compute_for(
        entity_type: EntityType,
        previous: &BTreeSet<Triple>,
        current: &BTreeSet<Triple>,
        is_deleted: bool,
    ) -> Self {
        if entity_type.is_provenance() {
            return Self {
                to_insert: current.clone(),
                to_delete: BTreeSet::new(),
            };
        }
        Self::compute(previous, current, is_deleted)
    }

    #[must_use]
    pub fn n_added(&self) -> usize {
        self.to_insert.len()
    }

    #[must_use]
    pub fn n_removed(&self) -> usize {
        self.to_delete.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_insert.is_empty() && self.to_delete.is_empty()
    }

    /// Update text for this change inside `graph`.
    ///
    /// `DELETE DATA` comes first, then `INSERT DATA`, joined by ` ; `. An
    /// empty change renders as an empty string.
    #[must_use]
    pub fn update_text(&self, graph: &Iri) -> String {
        let mut parts = Vec::with_capacity(2);
        if !self.to_delete.is_empty() {
            parts.push(data_block("DELETE", graph, &self.to_delete));
        }
        if !self.to_insert.is_empty() {
            parts.push(data_block("INSERT", graph, &self.to_insert));
        }
        parts.join(UPDATE_SEPARATOR)
    }

    /// Only the delete half of [`Self::update_text`].
    #[must_use]
    pub fn delete_text(&self, graph: &Iri) -> String {
        if self.to_delete.is_empty() {
            String::new()
        } else {
            data_block("DELETE", graph, &self.to_delete)
        }
    }

    /// Inserted statements tagged with `graph`, for bulk export.
    #[must_use]
    pub fn insert_quads(&self, graph: &Iri) -> Vec<Quad> {
        self.to_insert
            .iter()
            .cloned()
            .map(|t| t.in_graph(graph))
            .collect()
    }

    /// Deleted statements tagged with `graph`.
    #[must_use]
    pub fn delete_quads(&self, graph: &Iri) -> Vec<Quad> {
        self.to_delete
            .iter()
            .cloned()
            .map(|t| t.in_graph(graph))
            .collect()
    }
}

fn data_block(verb: &str, graph: &Iri, triples: &BTreeSet<Triple>) -> String {
    let mut out = format!("{verb} DATA {{ GRAPH {graph} {{ ");
    for triple in triples {
        let _ = write!(out, "{triple} ");
    }
    out.push_str("} }");
    out
}
