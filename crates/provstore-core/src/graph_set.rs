//! # Graph Set
//!
//! The registry of every entity touched in a session. It is a single owned
//! arena keyed by identifier; operations with global side effects (deletion
//! strips inbound references, merge redirects them) take `&mut self` and walk
//! the whole arena instead of holding cross-references between entities.

use crate::counter::{CounterKey, CounterStore};
use crate::entity::{Entity, EntityState};
use crate::iri::EntityIri;
use crate::provenance::{ProvSet, SnapshotKind};
use crate::shard::PathTarget;
use crate::staged::{StagedEntity, StagedKind};
use crate::{EntityType, Iri, ProvstoreError, Term, Triple, vocab};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

/// Which specific type survives a merge.
///
/// The shared base class is always kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypePreference {
    /// Keep the target's specific type; fall back to the absorbed one.
    KeepTarget,
    /// Take the absorbed entity's specific type; fall back to the target's.
    TakeAbsorbed,
}

/// Arena of entities sharing one base IRI and counter store.
pub struct GraphSet {
    base_iri: String,
    supplier_prefix: Option<String>,
    counter: Arc<dyn CounterStore>,
    entities: BTreeMap<EntityIri, Entity>,
}

impl std::fmt::Debug for GraphSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphSet")
            .field("base_iri", &self.base_iri)
            .field("supplier_prefix", &self.supplier_prefix)
            .field("entities", &self.entities.len())
            .finish_non_exhaustive()
    }
}

impl GraphSet {
    /// New, empty registry. Minted identifiers carry `supplier_prefix`.
    pub fn new(
        base_iri: impl Into<String>,
        supplier_prefix: Option<&str>,
        counter: Arc<dyn CounterStore>,
    ) -> Self {
        Self {
            base_iri: base_iri.into(),
            supplier_prefix: supplier_prefix
                .filter(|p| !p.is_empty())
                .map(str::to_string),
            counter,
            entities: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn base_iri(&self) -> &str {
        &self.base_iri
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    #[must_use]
    pub fn get(&self, iri: &EntityIri) -> Option<&Entity> {
        self.entities.get(iri)
    }

    /// Mutable access for ordinary edits.
    pub fn entity_mut(&mut self, iri: &EntityIri) -> Result<&mut Entity, ProvstoreError> {
        self.entities
            .get_mut(iri)
            .ok_or_else(|| ProvstoreError::InvalidArgument(format!("unknown entity {iri}")))
    }

    /// Parse `iri` against this set's base.
    pub fn parse_iri(&self, iri: &str) -> Result<EntityIri, ProvstoreError> {
        EntityIri::parse(&self.base_iri, iri)
    }

    // =========================================================================
    // REGISTRATION
    // =========================================================================

    /// Mint a fresh entity of `entity_type`.
    pub fn add(&mut self, entity_type: EntityType) -> Result<EntityIri, ProvstoreError> {
        if entity_type.is_provenance() {
            return Err(ProvstoreError::InvalidArgument(
                "snapshots are created by the provenance set".to_string(),
            ));
        }
        let prefix = self.supplier_prefix.as_deref();
        let number = self
            .counter
            .increment(&CounterKey::entity(entity_type, prefix))?;
        let iri = EntityIri::new(
            self.base_iri.clone(),
            entity_type,
            prefix.unwrap_or_default(),
            number,
        )?;
        debug!(entity = %iri, "Minted entity");
        self.entities.insert(iri.clone(), Entity::new(iri.clone()));
        Ok(iri)
    }

    /// Register an entity read back from storage.
    ///
    /// The entity counter is ratcheted so the loaded number is never minted
    /// again.
    pub fn add_existing(
        &mut self,
        iri: EntityIri,
        statements: impl IntoIterator<Item = Triple>,
    ) -> Result<(), ProvstoreError> {
        if self.entities.contains_key(&iri) {
            return Err(ProvstoreError::InvalidState(format!(
                "{iri} is already registered"
            )));
        }
        let prefix = (!iri.prefix().is_empty()).then(|| iri.prefix());
        self.counter.ratchet(
            &CounterKey::entity(iri.entity_type(), prefix),
            iri.number(),
        )?;
        self.entities
            .insert(iri.clone(), Entity::existing(iri, statements));
        Ok(())
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Flag `iri` for deletion and strip every statement pointing at it.
    ///
    /// Stripping is irreversible; a later restore does not bring the inbound
    /// references back.
    pub fn mark_deleted(&mut self, iri: &EntityIri) -> Result<(), ProvstoreError> {
        if !self.entities.contains_key(iri) {
            return Err(ProvstoreError::InvalidArgument(format!("unknown entity {iri}")));
        }
        let target = iri.iri();
        let mut stripped = 0;
        for entity in self.entities.values_mut().filter(|e| !e.to_be_deleted) {
            stripped += entity.strip_references(&target);
        }
        if let Some(entity) = self.entities.get_mut(iri) {
            entity.to_be_deleted = true;
            entity.was_restored = false;
        }
        debug!(entity = %iri, stripped, "Marked for deletion");
        Ok(())
    }

    /// Absorb `absorbed` into `target`.
    ///
    /// Every reference to `absorbed` anywhere in the arena is redirected to
    /// `target`, statements for predicates the target lacks are copied over,
    /// and `absorbed` ends up marked for deletion and listed in the target's
    /// merge list.
    pub fn merge(
        &mut self,
        target: &EntityIri,
        absorbed: &EntityIri,
        preference: TypePreference,
    ) -> Result<(), ProvstoreError> {
        if target == absorbed {
            return Err(ProvstoreError::InvalidArgument(format!(
                "cannot merge {target} into itself"
            )));
        }
        let (target_entity, absorbed_entity) =
            match (self.entities.get(target), self.entities.get(absorbed)) {
                (Some(t), Some(a)) => (t, a),
                _ => {
                    return Err(ProvstoreError::InvalidArgument(format!(
                        "merge of {absorbed} into {target} names an unknown entity"
                    )));
                }
            };
        if target.entity_type() != absorbed.entity_type() {
            return Err(ProvstoreError::InvalidState(format!(
                "cannot merge a {} into a {}",
                absorbed.entity_type().label(),
                target.entity_type().label()
            )));
        }
        for entity in [target_entity, absorbed_entity] {
            if entity.state() != EntityState::Live {
                return Err(ProvstoreError::InvalidState(format!(
                    "{} is not live",
                    entity.iri()
                )));
            }
        }

        let specific = match preference {
            TypePreference::KeepTarget => target_entity
                .specific_type()
                .or_else(|| absorbed_entity.specific_type()),
            TypePreference::TakeAbsorbed => absorbed_entity
                .specific_type()
                .or_else(|| target_entity.specific_type()),
        }
        .cloned();

        let target_predicates = target_entity.predicates();
        let target_subject = target.iri();
        let absorbed_subject = absorbed.iri();
        let carried: Vec<Triple> = absorbed_entity
            .graph()
            .iter()
            .filter(|t| {
                t.predicate.as_str() != vocab::RDF_TYPE && !target_predicates.contains(&t.predicate)
            })
            .map(|t| Triple {
                subject: target_subject.clone(),
                predicate: t.predicate.clone(),
                object: if t.object.as_iri() == Some(&absorbed_subject) {
                    Term::Iri(target_subject.clone())
                } else {
                    t.object.clone()
                },
            })
            .collect();
        let inherited: Vec<EntityIri> = absorbed_entity.merge_list.clone();

        let mut redirected = 0;
        for (iri, entity) in &mut self.entities {
            if iri != absorbed && !entity.to_be_deleted {
                redirected += entity.redirect_references(&absorbed_subject, &target_subject);
            }
        }

        let entity = self.entity_mut(target)?;
        match specific {
            Some(class) => entity.set_specific_type(class.as_str())?,
            None => {
                entity.remove_all(vocab::RDF_TYPE)?;
            }
        }
        for triple in carried {
            entity.insert_raw(triple);
        }
        for iri in inherited.into_iter().chain(std::iter::once(absorbed.clone())) {
            if !entity.merge_list.contains(&iri) {
                entity.merge_list.push(iri);
            }
        }
        entity.was_merged = true;

        self.mark_deleted(absorbed)?;
        if let Some(absorbed_entity) = self.entities.get_mut(absorbed) {
            absorbed_entity.merge_list.clear();
        }

        debug!(target = %target, absorbed = %absorbed, redirected, "Merged entities");
        Ok(())
    }

    /// Bring back an entity whose last recorded snapshot is a deletion.
    pub fn restore(&mut self, iri: &EntityIri, provenance: &ProvSet) -> Result<(), ProvstoreError> {
        if !self.entities.contains_key(iri) {
            return Err(ProvstoreError::InvalidArgument(format!("unknown entity {iri}")));
        }
        match provenance.last_snapshot_kind(iri)? {
            Some(SnapshotKind::Deletion) => {}
            _ => {
                return Err(ProvstoreError::InvalidState(format!(
                    "{iri} has no recorded deletion to restore from"
                )));
            }
        }
        if let Some(entity) = self.entities.get_mut(iri) {
            entity.to_be_deleted = false;
            entity.was_restored = true;
            let primary = entity.primary_type();
            entity.insert_raw(primary);
        }
        debug!(entity = %iri, "Restored");
        Ok(())
    }

    /// Accept the current state as the new baseline.
    ///
    /// Deleted entities leave the registry; everything else has its
    /// preexisting graph reset to its current graph and its flags cleared.
    pub fn commit_changes(&mut self) {
        self.entities.retain(|_, e| !e.to_be_deleted);
        for entity in self.entities.values_mut() {
            entity.commit();
        }
    }

    // =========================================================================
    // STAGING
    // =========================================================================

    /// One staged write per registered entity.
    #[must_use]
    pub fn staged(&self) -> Vec<StagedEntity> {
        self.entities
            .values()
            .map(|entity| {
                let iri = entity.iri();
                let statements: BTreeSet<Triple> = if entity.to_be_deleted {
                    BTreeSet::new()
                } else {
                    entity.graph().clone()
                };
                StagedEntity {
                    subject: iri.iri(),
                    graph: iri.graph_iri(),
                    target: PathTarget::Entity(iri.clone()),
                    kind: StagedKind::Graph,
                    deleted: entity.to_be_deleted,
                    overwrite: !entity.preexisting().is_empty(),
                    statements,
                    change: entity.change_set(),
                }
            })
            .collect()
    }

    /// Identifiers of every entity referencing `iri`.
    #[must_use]
    pub fn referrers(&self, iri: &EntityIri) -> Vec<EntityIri> {
        let target: Iri = iri.iri();
        self.entities
            .values()
            .filter(|e| e.graph().iter().any(|t| t.object.as_iri() == Some(&target)))
            .map(|e| e.iri().clone())
            .collect()
    }
}

// =============================================================================
// TESTS
// =============================================================================
