//! # Entities
//!
//! An entity is a mutable statement set about one subject, paired with the
//! statements it had when it was last committed. Lifecycle flags record what
//! happened to it since, so the next provenance pass knows which kind of
//! snapshot to emit.
//!
//! Edits that would drop the primary type statement are refused; only the
//! deletion workflow in [`crate::GraphSet`] may take an entity out of the
//! live set.

use crate::diff::ChangeSet;
use crate::iri::EntityIri;
use crate::{EntityType, Iri, ProvstoreError, Term, Triple, vocab};
use std::collections::BTreeSet;

/// Lifecycle state derived from an entity's flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    Live,
    MarkedDeleted,
    /// Restored in this pass; collapses back to `Live` on commit.
    Restored,
}

/// One versioned record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    iri: EntityIri,
    graph: BTreeSet<Triple>,
    preexisting: BTreeSet<Triple>,
    pub(crate) to_be_deleted: bool,
    pub(crate) was_merged: bool,
    pub(crate) was_restored: bool,
    pub(crate) merge_list: Vec<EntityIri>,
}

impl Entity {
    /// A brand-new entity holding only its primary type.
    pub(crate) fn new(iri: EntityIri) -> Self {
        let mut graph = BTreeSet::new();
        graph.insert(primary_type_of(&iri));
        Self {
            iri,
            graph,
            preexisting: BTreeSet::new(),
            to_be_deleted: false,
            was_merged: false,
            was_restored: false,
            merge_list: Vec::new(),
        }
    }

    /// An entity loaded from storage with its last committed statements.
    ///
    /// Statements about other subjects are ignored.
    pub(crate) fn existing(iri: EntityIri, statements: impl IntoIterator<Item = Triple>) -> Self {
        let subject = iri.iri();
        let preexisting: BTreeSet<Triple> = statements
            .into_iter()
            .filter(|t| t.subject == subject)
            .collect();
        let mut graph = preexisting.clone();
        graph.insert(primary_type_of(&iri));
        Self {
            iri,
            graph,
            preexisting,
            to_be_deleted: false,
            was_merged: false,
            was_restored: false,
            merge_list: Vec::new(),
        }
    }

    #[must_use]
    pub fn iri(&self) -> &EntityIri {
        &self.iri
    }

    #[must_use]
    pub fn entity_type(&self) -> EntityType {
        self.iri.entity_type()
    }

    /// Current statements.
    #[must_use]
    pub fn graph(&self) -> &BTreeSet<Triple> {
        &self.graph
    }

    /// Statements as of the last commit.
    #[must_use]
    pub fn preexisting(&self) -> &BTreeSet<Triple> {
        &self.preexisting
    }

    #[must_use]
    pub fn state(&self) -> EntityState {
        if self.to_be_deleted {
            EntityState::MarkedDeleted
        } else if self.was_restored {
            EntityState::Restored
        } else {
            EntityState::Live
        }
    }

    #[must_use]
    pub fn to_be_deleted(&self) -> bool {
        self.to_be_deleted
    }

    #[must_use]
    pub fn was_merged(&self) -> bool {
        self.was_merged
    }

    #[must_use]
    pub fn was_restored(&self) -> bool {
        self.was_restored
    }

    /// Entities absorbed into this one since the last commit, in merge order.
    #[must_use]
    pub fn merge_list(&self) -> &[EntityIri] {
        &self.merge_list
    }

    /// The `rdf:type <base class>` statement every live entity carries.
    #[must_use]
    pub fn primary_type(&self) -> Triple {
        primary_type_of(&self.iri)
    }

    /// The one `rdf:type` other than the base class, if any.
    #[must_use]
    pub fn specific_type(&self) -> Option<&Iri> {
        let base = self.entity_type().base_class();
        self.objects(vocab::RDF_TYPE)
            .filter_map(Term::as_iri)
            .find(|class| class.as_str() != base)
    }

    /// Objects of every statement with `predicate`.
    pub fn objects<'a>(&'a self, predicate: &'a str) -> impl Iterator<Item = &'a Term> + 'a {
        self.graph
            .iter()
            .filter(move |t| t.predicate.as_str() == predicate)
            .map(|t| &t.object)
    }

    /// Predicates used by at least one current statement.
    #[must_use]
    pub fn predicates(&self) -> BTreeSet<Iri> {
        self.graph.iter().map(|t| t.predicate.clone()).collect()
    }

    // =========================================================================
    // EDITS
    // =========================================================================

    /// Add `(self, predicate, object)`.
    pub fn add(&mut self, predicate: &str, object: Term) -> Result<bool, ProvstoreError> {
        self.ensure_editable()?;
        Ok(self
            .graph
            .insert(Triple::new(self.iri.to_string(), predicate, object)))
    }

    /// Remove `(self, predicate, object)`. The primary type cannot be removed.
    pub fn remove(&mut self, predicate: &str, object: &Term) -> Result<bool, ProvstoreError> {
        self.ensure_editable()?;
        let triple = Triple::new(self.iri.to_string(), predicate, object.clone());
        if triple == self.primary_type() {
            return Err(ProvstoreError::InvalidArgument(format!(
                "the primary type of {} can only be removed by deleting it",
                self.iri
            )));
        }
        Ok(self.graph.remove(&triple))
    }

    /// Remove every statement with `predicate`, keeping the primary type.
    ///
    /// Returns how many statements were removed.
    pub fn remove_all(&mut self, predicate: &str) -> Result<usize, ProvstoreError> {
        self.ensure_editable()?;
        let primary = self.primary_type();
        let before = self.graph.len();
        self.graph
            .retain(|t| t.predicate.as_str() != predicate || *t == primary);
        Ok(before - self.graph.len())
    }

    /// Replace the specific type with `class`. The base class stays.
    pub fn set_specific_type(&mut self, class: &str) -> Result<(), ProvstoreError> {
        self.remove_all(vocab::RDF_TYPE)?;
        if class != self.entity_type().base_class() {
            self.graph.insert(Triple::new(
                self.iri.to_string(),
                vocab::RDF_TYPE,
                Term::iri(class),
            ));
        }
        Ok(())
    }

    fn ensure_editable(&self) -> Result<(), ProvstoreError> {
        if self.to_be_deleted {
            return Err(ProvstoreError::InvalidState(format!(
                "{} is marked for deletion",
                self.iri
            )));
        }
        Ok(())
    }

    // =========================================================================
    // LIFECYCLE INTERNALS
    // =========================================================================

    /// Diff between the last commit and now.
    #[must_use]
    pub fn change_set(&self) -> ChangeSet {
        ChangeSet::compute_for(
            self.entity_type(),
            &self.preexisting,
            &self.graph,
            self.to_be_deleted,
        )
    }

    /// Drop every statement whose object is `target`. Returns the count.
    pub(crate) fn strip_references(&mut self, target: &Iri) -> usize {
        let before = self.graph.len();
        self.graph
            .retain(|t| t.object.as_iri() != Some(target));
        before - self.graph.len()
    }

    /// Rewrite every object reference to `from` so it points at `to`.
    pub(crate) fn redirect_references(&mut self, from: &Iri, to: &Iri) -> usize {
        let hits: Vec<Triple> = self
            .graph
            .iter()
            .filter(|t| t.object.as_iri() == Some(from))
            .cloned()
            .collect();
        for triple in &hits {
            self.graph.remove(triple);
            self.graph.insert(Triple {
                subject: triple.subject.clone(),
                predicate: triple.predicate.clone(),
                object: Term::Iri(to.clone()),
            });
        }
        hits.len()
    }

    pub(crate) fn insert_raw(&mut self, triple: Triple) {
        self.graph.insert(triple);
    }

    pub(crate) fn commit(&mut self) {
        self.preexisting = self.graph.clone();
        self.to_be_deleted = false;
        self.was_merged = false;
        self.was_restored = false;
        self.merge_list.clear();
    }
}

fn primary_type_of(iri: &EntityIri) -> Triple {
    Triple::new(
        iri.to_string(),
        vocab::RDF_TYPE,
        Term::iri(iri.entity_type().base_class()),
    )
}
