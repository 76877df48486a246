//! # Snapshot Provenance
//!
//! Every durable change to an entity is recorded as a snapshot: an immutable
//! record linked to the snapshots it derives from. A subject's snapshots are
//! numbered by its own private counter, so the last snapshot of any entity is
//! found by reading that counter.
//!
//! ## Generation Pass
//!
//! [`ProvSet::generate`] walks the whole registry at one timestamp. Merge
//! targets go first so that the pre-merge snapshots of absorbed entities are
//! captured before those entities get their own deletion snapshots.
//!
//! | Situation                              | Outcome      |
//! |----------------------------------------|--------------|
//! | no snapshot, live                      | Creation     |
//! | no snapshot, marked deleted            | skipped      |
//! | restored                               | Restoration  |
//! | marked deleted                         | Deletion     |
//! | merged with a non-empty merge list     | Merge        |
//! | graph changed                          | Modification |
//! | unchanged                              | skipped      |

use crate::counter::{CounterKey, CounterStore};
use crate::diff::ChangeSet;
use crate::entity::Entity;
use crate::formats::{registry_from_bytes, registry_to_bytes};
use crate::iri::{EntityIri, SnapshotId};
use crate::shard::PathTarget;
use crate::staged::{StagedEntity, StagedKind};
use crate::storer::write_atomic;
use crate::{EntityType, GraphSet, Iri, Literal, ProvstoreError, Term, Triple, vocab};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

// =============================================================================
// RECORDS
// =============================================================================

/// Why a snapshot was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnapshotKind {
    Creation,
    Modification,
    Merge,
    Deletion,
    Restoration,
}

/// One immutable entry in a subject's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub id: SnapshotId,
    pub kind: SnapshotKind,
    pub generated_at: DateTime<Utc>,
    /// `None` while this snapshot is the subject's head.
    pub invalidated_at: Option<DateTime<Utc>>,
    pub derived_from: Vec<SnapshotId>,
    pub primary_source: Option<Iri>,
    pub resp_agent: Option<Iri>,
    pub description: String,
    /// Update text of the change that produced this snapshot.
    pub update_query: Option<String>,
}

impl SnapshotRecord {
    /// Statements describing this snapshot.
    #[must_use]
    pub fn triples(&self) -> BTreeSet<Triple> {
        let se = self.id.to_string();
        let mut out = BTreeSet::new();
        out.insert(Triple::new(&se, vocab::RDF_TYPE, Term::iri(vocab::PROV_ENTITY)));
        out.insert(Triple::new(
            &se,
            vocab::PROV_SPECIALIZATION_OF,
            Term::Iri(self.id.subject.iri()),
        ));
        out.insert(Triple::new(
            &se,
            vocab::PROV_GENERATED_AT_TIME,
            timestamp(self.generated_at),
        ));
        if let Some(at) = self.invalidated_at {
            out.insert(invalidation_triple(&self.id, at));
        }
        for prior in &self.derived_from {
            out.insert(Triple::new(
                &se,
                vocab::PROV_WAS_DERIVED_FROM,
                Term::Iri(prior.iri()),
            ));
        }
        if let Some(source) = &self.primary_source {
            out.insert(Triple::new(
                &se,
                vocab::PROV_HAD_PRIMARY_SOURCE,
                Term::Iri(source.clone()),
            ));
        }
        if let Some(agent) = &self.resp_agent {
            out.insert(Triple::new(
                &se,
                vocab::PROV_WAS_ATTRIBUTED_TO,
                Term::Iri(agent.clone()),
            ));
        }
        out.insert(Triple::new(
            &se,
            vocab::DCTERMS_DESCRIPTION,
            Term::literal(self.description.clone()),
        ));
        if let Some(query) = &self.update_query {
            out.insert(Triple::new(
                &se,
                vocab::OCO_HAS_UPDATE_QUERY,
                Term::literal(query.clone()),
            ));
        }
        out
    }
}

fn timestamp(at: DateTime<Utc>) -> Term {
    Term::Literal(Literal::typed(
        at.to_rfc3339_opts(SecondsFormat::Secs, false),
        vocab::XSD_DATE_TIME,
    ))
}

fn invalidation_triple(id: &SnapshotId, at: DateTime<Utc>) -> Triple {
    Triple::new(id.to_string(), vocab::PROV_INVALIDATED_AT_TIME, timestamp(at))
}

/// What a pass did to one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingDelta {
    Created,
    Invalidated(DateTime<Utc>),
}

/// Counts of snapshots emitted by one generation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerationSummary {
    pub created: usize,
    pub modified: usize,
    pub merged: usize,
    pub deleted: usize,
    pub restored: usize,
    pub skipped: usize,
}

impl GenerationSummary {
    #[must_use]
    pub fn total(&self) -> usize {
        self.created + self.modified + self.merged + self.deleted + self.restored
    }

    fn count(&mut self, kind: SnapshotKind) {
        match kind {
            SnapshotKind::Creation => self.created += 1,
            SnapshotKind::Modification => self.modified += 1,
            SnapshotKind::Merge => self.merged += 1,
            SnapshotKind::Deletion => self.deleted += 1,
            SnapshotKind::Restoration => self.restored += 1,
        }
    }
}

// =============================================================================
// PROVENANCE SET
// =============================================================================

/// Owner of every snapshot record.
pub struct ProvSet {
    counter: Arc<dyn CounterStore>,
    primary_source: Option<Iri>,
    resp_agent: Option<Iri>,
    records: BTreeMap<SnapshotId, SnapshotRecord>,
    pending: BTreeMap<SnapshotId, PendingDelta>,
}

impl std::fmt::Debug for ProvSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvSet")
            .field("records", &self.records.len())
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl ProvSet {
    /// New provenance set sharing `counter` with the graph set.
    pub fn new(
        counter: Arc<dyn CounterStore>,
        primary_source: Option<Iri>,
        resp_agent: Option<Iri>,
    ) -> Self {
        Self {
            counter,
            primary_source,
            resp_agent,
            records: BTreeMap::new(),
            pending: BTreeMap::new(),
        }
    }

    /// Seed the set with records loaded from a previous run.
    pub fn load_records(&mut self, records: impl IntoIterator<Item = SnapshotRecord>) {
        for record in records {
            self.records.insert(record.id.clone(), record);
        }
    }

    /// Persist every known record to `path`.
    pub fn save_registry(&self, path: &Path) -> Result<(), ProvstoreError> {
        let bytes = registry_to_bytes(self.records.values())?;
        write_atomic(path, &bytes)?;
        debug!(path = %path.display(), records = self.records.len(), "Saved snapshot registry");
        Ok(())
    }

    /// Load records saved by [`ProvSet::save_registry`]. A missing file
    /// loads nothing.
    pub fn load_registry(&mut self, path: &Path) -> Result<usize, ProvstoreError> {
        if !path.exists() {
            return Ok(0);
        }
        let records = registry_from_bytes(&std::fs::read(path)?)?;
        let count = records.len();
        self.load_records(records);
        Ok(count)
    }

    pub fn records(&self) -> impl Iterator<Item = &SnapshotRecord> {
        self.records.values()
    }

    #[must_use]
    pub fn record(&self, id: &SnapshotId) -> Option<&SnapshotRecord> {
        self.records.get(id)
    }

    /// Snapshots of `subject`, oldest first.
    pub fn history<'a>(
        &'a self,
        subject: &'a EntityIri,
    ) -> impl Iterator<Item = &'a SnapshotRecord> + 'a {
        self.records
            .values()
            .filter(move |r| &r.id.subject == subject)
    }

    fn snapshot_key(subject: &EntityIri) -> CounterKey {
        let prefix = (!subject.prefix().is_empty()).then(|| subject.prefix());
        CounterKey::snapshot(subject.entity_type(), prefix, subject.number())
    }

    /// Head snapshot of `subject`, from its snapshot counter.
    pub fn last_snapshot(&self, subject: &EntityIri) -> Result<Option<SnapshotId>, ProvstoreError> {
        let last = self.counter.read(&Self::snapshot_key(subject))?;
        Ok((last > 0).then(|| SnapshotId::new(subject.clone(), last)))
    }

    /// Kind of the head snapshot, when its record is known.
    pub fn last_snapshot_kind(
        &self,
        subject: &EntityIri,
    ) -> Result<Option<SnapshotKind>, ProvstoreError> {
        Ok(self
            .last_snapshot(subject)?
            .and_then(|id| self.records.get(&id))
            .map(|r| r.kind))
    }

    // =========================================================================
    // GENERATION
    // =========================================================================

    /// Run one generation pass over `graph_set` at time `at`.
    pub fn generate(
        &mut self,
        graph_set: &GraphSet,
        at: DateTime<Utc>,
    ) -> Result<GenerationSummary, ProvstoreError> {
        let mut summary = GenerationSummary::default();

        let is_merge_target = |e: &&Entity| e.was_merged() && !e.to_be_deleted();
        for entity in graph_set.entities().filter(is_merge_target) {
            self.generate_for(entity, at, &mut summary)?;
        }
        for entity in graph_set.entities().filter(|e| !is_merge_target(e)) {
            self.generate_for(entity, at, &mut summary)?;
        }

        info!(
            created = summary.created,
            modified = summary.modified,
            merged = summary.merged,
            deleted = summary.deleted,
            restored = summary.restored,
            skipped = summary.skipped,
            "Generation pass complete"
        );
        Ok(summary)
    }

    fn generate_for(
        &mut self,
        entity: &Entity,
        at: DateTime<Utc>,
        summary: &mut GenerationSummary,
    ) -> Result<(), ProvstoreError> {
        let subject = entity.iri();
        let graph_iri = subject.graph_iri();

        let Some(prior) = self.last_snapshot(subject)? else {
            if entity.to_be_deleted() {
                debug!(entity = %subject, "Deleted before it was ever recorded, skipping");
                summary.skipped += 1;
            } else {
                let record = self.draft(subject, SnapshotKind::Creation, at, Vec::new(), None)?;
                self.emit(record, summary);
            }
            return Ok(());
        };

        if entity.was_restored() {
            let change = ChangeSet::compute(&BTreeSet::new(), entity.graph(), false);
            let record = self.draft(
                subject,
                SnapshotKind::Restoration,
                at,
                vec![prior],
                Some(change.update_text(&graph_iri)),
            )?;
            self.emit(record, summary);
        } else if entity.to_be_deleted() {
            self.invalidate(&prior, at);
            let change = entity.change_set();
            let mut record = self.draft(
                subject,
                SnapshotKind::Deletion,
                at,
                vec![prior],
                Some(change.update_text(&graph_iri)),
            )?;
            record.invalidated_at = Some(at);
            self.emit(record, summary);
        } else if entity.was_merged() && !entity.merge_list().is_empty() {
            let mut derived_from = vec![prior.clone()];
            for absorbed in entity.merge_list() {
                if let Some(last) = self.last_snapshot(absorbed)? {
                    if !derived_from.contains(&last) {
                        derived_from.push(last);
                    }
                }
            }
            self.invalidate(&prior, at);
            let change = entity.change_set();
            let record = self.draft_merge(
                subject,
                SnapshotKind::Merge,
                at,
                derived_from,
                entity.merge_list(),
                Some(change.update_text(&graph_iri)),
            )?;
            self.emit(record, summary);
        } else {
            let change = entity.change_set();
            if change.is_empty() {
                summary.skipped += 1;
                return Ok(());
            }
            self.invalidate(&prior, at);
            let record = self.draft(
                subject,
                SnapshotKind::Modification,
                at,
                vec![prior],
                Some(change.update_text(&graph_iri)),
            )?;
            self.emit(record, summary);
        }
        Ok(())
    }

    /// Allocate the next snapshot id of `subject` and fill in a record.
    fn draft(
        &self,
        subject: &EntityIri,
        kind: SnapshotKind,
        at: DateTime<Utc>,
        derived_from: Vec<SnapshotId>,
        update_query: Option<String>,
    ) -> Result<SnapshotRecord, ProvstoreError> {
        self.draft_merge(subject, kind, at, derived_from, &[], update_query)
    }

    fn draft_merge(
        &self,
        subject: &EntityIri,
        kind: SnapshotKind,
        at: DateTime<Utc>,
        derived_from: Vec<SnapshotId>,
        merged: &[EntityIri],
        update_query: Option<String>,
    ) -> Result<SnapshotRecord, ProvstoreError> {
        let number = self.counter.increment(&Self::snapshot_key(subject))?;
        let description = match kind {
            SnapshotKind::Creation => format!("The entity '{subject}' has been created."),
            SnapshotKind::Modification => format!("The entity '{subject}' has been modified."),
            SnapshotKind::Deletion => format!("The entity '{subject}' has been deleted."),
            SnapshotKind::Restoration => format!("The entity '{subject}' has been restored."),
            SnapshotKind::Merge => {
                let absorbed: Vec<String> = merged.iter().map(|iri| format!("'{iri}'")).collect();
                format!(
                    "The entity '{subject}' has been merged with {}.",
                    absorbed.join(", ")
                )
            }
        };
        Ok(SnapshotRecord {
            id: SnapshotId::new(subject.clone(), number),
            kind,
            generated_at: at,
            invalidated_at: None,
            derived_from,
            primary_source: self.primary_source.clone(),
            resp_agent: self.resp_agent.clone(),
            description,
            update_query: update_query.filter(|q| !q.is_empty()),
        })
    }

    fn emit(&mut self, record: SnapshotRecord, summary: &mut GenerationSummary) {
        debug!(snapshot = %record.id, kind = ?record.kind, "Snapshot emitted");
        summary.count(record.kind);
        self.pending.insert(record.id.clone(), PendingDelta::Created);
        self.records.insert(record.id.clone(), record);
    }

    /// Close `id` at `at`. A snapshot is only ever invalidated once.
    fn invalidate(&mut self, id: &SnapshotId, at: DateTime<Utc>) {
        if let Some(record) = self.records.get_mut(id) {
            if record.invalidated_at.is_some() {
                return;
            }
            record.invalidated_at = Some(at);
        }
        if !matches!(self.pending.get(id), Some(PendingDelta::Created)) {
            self.pending.insert(id.clone(), PendingDelta::Invalidated(at));
        }
    }

    // =========================================================================
    // STAGING
    // =========================================================================

    /// Snapshot statements produced by passes since the last commit.
    ///
    /// New snapshots contribute all their statements; superseded ones only
    /// their invalidation time.
    #[must_use]
    pub fn staged(&self) -> Vec<StagedEntity> {
        self.pending
            .iter()
            .map(|(id, delta)| {
                let statements = match delta {
                    PendingDelta::Created => self
                        .records
                        .get(id)
                        .map(SnapshotRecord::triples)
                        .unwrap_or_default(),
                    PendingDelta::Invalidated(at) => {
                        std::iter::once(invalidation_triple(id, *at)).collect()
                    }
                };
                StagedEntity {
                    subject: id.iri(),
                    graph: id.subject.prov_graph_iri(),
                    target: PathTarget::History(id.subject.clone()),
                    kind: StagedKind::Provenance,
                    deleted: false,
                    overwrite: false,
                    change: ChangeSet::compute_for(
                        EntityType::Snapshot,
                        &BTreeSet::new(),
                        &statements,
                        false,
                    ),
                    statements,
                }
            })
            .collect()
    }

    /// Forget pending deltas once they are stored or uploaded.
    pub fn commit_changes(&mut self) {
        self.pending.clear();
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

// =============================================================================
// TESTS
// =============================================================================
