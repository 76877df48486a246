//! # Scenario Tier Tests (T0-T3)
//!
//! End-to-end checks across the public API.
//!
//! ## Tiers
//! - T0: Identifier allocation
//! - T1: Path resolution
//! - T2: Entity lifecycle and provenance
//! - T3: Storage and upload

use provstore_core::counter::{FileCounter, MemoryCounter, TableCounter};
use provstore_core::{
    ChangeSet, CounterKey, CounterStore, Dataset, EntityIri, EntityType, GraphSet, Iri,
    OutputFormat, PathTarget, ProvSet, ProvstoreError, ShardConfig, SnapshotId, SnapshotKind,
    Storer, Term, Triple, TypePreference, UpdateClient, UploadOptions, Uploader,
};
use chrono::{DateTime, TimeZone, Utc};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::tempdir;

const BASE: &str = "https://w3id.org/oc/meta/";
const TITLE: &str = "http://purl.org/dc/terms/title";
const PART_OF: &str = "http://purl.org/vocab/frbr/core#partOf";
const AGENT: &str = "https://orcid.org/0000-0002-8420-0696";

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0)
        .single()
        .expect("timestamp")
}

fn sets(counter: Arc<dyn CounterStore>, prefix: Option<&str>) -> (GraphSet, ProvSet) {
    (
        GraphSet::new(BASE, prefix, counter.clone()),
        ProvSet::new(counter, None, Some(Iri::new(AGENT))),
    )
}

// =============================================================================
// TIER T0: IDENTIFIER ALLOCATION
// =============================================================================

mod t0_allocation {
    use super::*;
    use std::thread;

    fn hammer(store: Arc<dyn CounterStore>) -> BTreeSet<u64> {
        let key = CounterKey::entity(EntityType::BibliographicResource, Some("060"));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let key = key.clone();
                thread::spawn(move || {
                    (0..25)
                        .map(|_| store.increment(&key).expect("increment"))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().expect("join"))
            .collect()
    }

    /// T0.1: Concurrent increments never hand out the same number.
    #[test]
    fn concurrent_increments_are_unique() {
        let dir = tempdir().expect("tempdir");
        let stores: Vec<Arc<dyn CounterStore>> = vec![
            Arc::new(MemoryCounter::new()),
            Arc::new(FileCounter::new(dir.path().join("files"))),
            Arc::new(TableCounter::open(dir.path().join("counters.redb")).expect("open")),
        ];
        for store in stores {
            let seen = hammer(store);
            assert_eq!(seen.len(), 200);
            assert_eq!(seen.first(), Some(&1));
            assert_eq!(seen.last(), Some(&200));
        }
    }

    /// T0.2: Two file counters over one directory share state.
    #[test]
    fn file_counters_share_a_directory() {
        let dir = tempdir().expect("tempdir");
        let a = FileCounter::new(dir.path());
        let b = FileCounter::new(dir.path());
        let key = CounterKey::entity(EntityType::Identifier, None);
        assert_eq!(a.increment(&key).expect("a"), 1);
        assert_eq!(b.increment(&key).expect("b"), 2);
        assert_eq!(a.read(&key).expect("read"), 2);
    }

    /// T0.3: Lowering a counter needs force.
    #[test]
    fn regression_requires_force() {
        let store = MemoryCounter::new();
        let key = CounterKey::snapshot(EntityType::Citation, None, 4);
        store.set(&key, 9, false).expect("set");
        assert!(matches!(
            store.set(&key, 3, false),
            Err(ProvstoreError::InvalidArgument(_))
        ));
        store.set(&key, 3, true).expect("forced");
        assert_eq!(store.read(&key).expect("read"), 3);
    }

    /// T0.4: Loading a stored entity keeps its number from being minted again.
    #[test]
    fn loaded_numbers_are_not_reminted() {
        let counter: Arc<dyn CounterStore> = Arc::new(MemoryCounter::new());
        let (mut gs, _) = sets(counter, Some("060"));
        let loaded =
            EntityIri::new(BASE, EntityType::BibliographicResource, "060", 41).expect("iri");
        gs.add_existing(loaded, Vec::new()).expect("load");
        let fresh = gs.add(EntityType::BibliographicResource).expect("add");
        assert_eq!(fresh.number(), 42);
    }
}

// =============================================================================
// TIER T1: PATH RESOLUTION
// =============================================================================

mod t1_resolution {
    use super::*;

    /// T1.1: Entity 1500 lands in the 10000 directory, 2000 file.
    #[test]
    fn entity_in_second_file_bucket() {
        let config = ShardConfig::new("/data/rdf");
        let resolved = config
            .resolve_iri(BASE, "https://w3id.org/oc/meta/br/0601500")
            .expect("resolve");
        assert_eq!(resolved.dir, PathBuf::from("/data/rdf/br/060/10000"));
        assert_eq!(resolved.file, PathBuf::from("/data/rdf/br/060/10000/2000.json"));
    }

    /// T1.2: Snapshots resolve to the subject's history file.
    #[test]
    fn snapshot_goes_to_history() {
        let config = ShardConfig::new("/data/rdf");
        let resolved = config
            .resolve_iri(BASE, "https://w3id.org/oc/meta/br/06010500/prov/se/3")
            .expect("resolve");
        assert_eq!(
            resolved.file,
            PathBuf::from("/data/rdf/br/060/20000/11000/prov/se.json")
        );
    }

    /// T1.3: Unparseable identifiers are rejected.
    #[test]
    fn foreign_iri_rejected() {
        let config = ShardConfig::new("/data/rdf");
        assert!(config.resolve_iri(BASE, "http://example.org/br/1").is_err());
        assert!(config.resolve_iri(BASE, "https://w3id.org/oc/meta/br/abc").is_err());
    }
}

// =============================================================================
// TIER T2: LIFECYCLE AND PROVENANCE
// =============================================================================

mod t2_lifecycle {
    use super::*;

    /// T2.1: Changing a title yields a modification with a two-part update.
    #[test]
    fn title_change_is_a_modification() {
        let counter: Arc<dyn CounterStore> = Arc::new(MemoryCounter::new());
        let (mut gs, mut ps) = sets(counter.clone(), Some("060"));
        let br = EntityIri::new(BASE, EntityType::BibliographicResource, "060", 1).expect("iri");
        counter
            .set(
                &CounterKey::snapshot(EntityType::BibliographicResource, Some("060"), 1),
                1,
                false,
            )
            .expect("seed snapshot counter");
        gs.add_existing(
            br.clone(),
            vec![Triple::new(br.to_string(), TITLE, Term::literal("Old"))],
        )
        .expect("load");

        let entity = gs.entity_mut(&br).expect("entity");
        entity.remove(TITLE, &Term::literal("Old")).expect("remove");
        entity.add(TITLE, Term::literal("New")).expect("add");

        let summary = ps.generate(&gs, at(0)).expect("generate");
        assert_eq!(summary.modified, 1);

        let head = ps.last_snapshot(&br).expect("last").expect("head");
        assert_eq!(head.number, 2);
        let record = ps.record(&head).expect("record");
        assert_eq!(record.kind, SnapshotKind::Modification);
        let query = record.update_query.as_deref().expect("query");
        let delete_at = query.find("DELETE DATA").expect("delete");
        let insert_at = query.find("INSERT DATA").expect("insert");
        assert!(delete_at < insert_at);
        assert!(query.contains("\"Old\""));
        assert!(query.contains("\"New\""));
    }

    /// T2.1b: Creation then a title change form a two-link chain.
    #[test]
    fn title_change_chains_to_creation() {
        let counter: Arc<dyn CounterStore> = Arc::new(MemoryCounter::new());
        let (mut gs, mut ps) = sets(counter, Some("060"));
        let br = gs.add(EntityType::BibliographicResource).expect("add");
        gs.entity_mut(&br)
            .expect("entity")
            .add(TITLE, Term::literal("Old"))
            .expect("title");
        ps.generate(&gs, at(0)).expect("generate");
        gs.commit_changes();
        ps.commit_changes();

        let entity = gs.entity_mut(&br).expect("entity");
        entity.remove(TITLE, &Term::literal("Old")).expect("remove");
        entity.add(TITLE, Term::literal("New")).expect("add");
        let summary = ps.generate(&gs, at(30)).expect("generate");
        assert_eq!(summary.modified, 1);

        let first = ps
            .record(&SnapshotId::new(br.clone(), 1))
            .expect("se/1")
            .clone();
        let second = ps
            .record(&SnapshotId::new(br.clone(), 2))
            .expect("se/2")
            .clone();

        assert_eq!(first.kind, SnapshotKind::Creation);
        assert_eq!(
            first.description,
            format!("The entity '{br}' has been created.")
        );
        assert!(first.derived_from.is_empty());
        assert_eq!(first.invalidated_at, Some(second.generated_at));

        assert_eq!(second.kind, SnapshotKind::Modification);
        assert_eq!(second.derived_from, vec![first.id.clone()]);
        assert!(second.invalidated_at.is_none());

        let query = second.update_query.as_deref().expect("query");
        assert_eq!(query.matches("DELETE DATA").count(), 1);
        assert_eq!(query.matches("INSERT DATA").count(), 1);
        assert_eq!(query.matches(TITLE).count(), 2);
        let (delete, insert) = query.split_at(query.find("INSERT DATA").expect("insert"));
        assert!(delete.contains("\"Old\"") && !delete.contains("\"New\""));
        assert!(insert.contains("\"New\"") && !insert.contains("\"Old\""));
    }

    /// T2.2: A three-way merge derives from every absorbed head.
    #[test]
    fn three_way_merge() {
        let counter: Arc<dyn CounterStore> = Arc::new(MemoryCounter::new());
        let (mut gs, mut ps) = sets(counter, None);
        let a = gs.add(EntityType::ResponsibleAgent).expect("a");
        let b = gs.add(EntityType::ResponsibleAgent).expect("b");
        let c = gs.add(EntityType::ResponsibleAgent).expect("c");
        let role = gs.add(EntityType::AgentRole).expect("role");
        gs.entity_mut(&role)
            .expect("role")
            .add(PART_OF, Term::Iri(c.iri()))
            .expect("edit");
        ps.generate(&gs, at(0)).expect("generate");
        gs.commit_changes();
        ps.commit_changes();

        gs.merge(&a, &b, TypePreference::KeepTarget).expect("merge b");
        gs.merge(&a, &c, TypePreference::KeepTarget).expect("merge c");
        assert_eq!(gs.get(&a).expect("a").merge_list(), &[b.clone(), c.clone()]);
        assert_eq!(
            gs.get(&role).expect("role").objects(PART_OF).collect::<Vec<_>>(),
            vec![&Term::Iri(a.iri())]
        );

        let summary = ps.generate(&gs, at(60)).expect("generate");
        assert_eq!(summary.merged, 1);
        assert_eq!(summary.deleted, 2);

        let head = ps.last_snapshot(&a).expect("last").expect("head");
        let record = ps.record(&head).expect("record");
        assert_eq!(record.kind, SnapshotKind::Merge);
        let derived: BTreeSet<_> = record
            .derived_from
            .iter()
            .map(|id| (id.subject.clone(), id.number))
            .collect();
        assert_eq!(
            derived,
            BTreeSet::from([(a.clone(), 1), (b.clone(), 1), (c.clone(), 1)])
        );
        assert!(record.description.contains(&b.to_string()));
        assert!(record.description.contains(&c.to_string()));

        for absorbed in [&b, &c] {
            let head = ps.last_snapshot(absorbed).expect("last").expect("head");
            assert_eq!(head.number, 2);
            assert_eq!(
                ps.record(&head).expect("record").kind,
                SnapshotKind::Deletion
            );
        }
    }

    /// T2.3: Merging into a deleted entity is refused.
    #[test]
    fn merge_into_deleted_refused() {
        let counter: Arc<dyn CounterStore> = Arc::new(MemoryCounter::new());
        let (mut gs, _) = sets(counter, None);
        let a = gs.add(EntityType::Identifier).expect("a");
        let b = gs.add(EntityType::Identifier).expect("b");
        gs.mark_deleted(&a).expect("delete");
        assert!(matches!(
            gs.merge(&a, &b, TypePreference::KeepTarget),
            Err(ProvstoreError::InvalidState(_))
        ));
    }

    /// T2.4: Diff of a deleted provenance-free entity removes everything.
    #[test]
    fn deletion_diff_removes_all() {
        let prev: BTreeSet<Triple> = [
            Triple::new("http://x/br/1", TITLE, Term::literal("a")),
            Triple::new("http://x/br/1", PART_OF, Term::iri("http://x/br/2")),
        ]
        .into();
        let change = ChangeSet::compute(&prev, &BTreeSet::new(), true);
        assert_eq!(change.n_removed(), 2);
        assert_eq!(change.n_added(), 0);
    }
}

// =============================================================================
// TIER T3: STORAGE AND UPLOAD
// =============================================================================

mod t3_output {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Collecting {
        requests: Mutex<Vec<String>>,
    }

    impl UpdateClient for Collecting {
        fn execute(&self, update: &str) -> Result<(), ProvstoreError> {
            self.requests.lock().push(update.to_string());
            Ok(())
        }
    }

    struct Refusing;

    impl UpdateClient for Refusing {
        fn execute(&self, _update: &str) -> Result<(), ProvstoreError> {
            Err(ProvstoreError::TransportFailure("offline".to_string()))
        }
    }

    /// T3.1: One session stores graphs and history and uploads both.
    #[test]
    fn session_stores_and_uploads() {
        let dir = tempdir().expect("tempdir");
        let counter: Arc<dyn CounterStore> =
            Arc::new(FileCounter::new(dir.path().join("counters")));
        let (mut gs, mut ps) = sets(counter, Some("060"));
        let br = gs.add(EntityType::BibliographicResource).expect("add");
        gs.entity_mut(&br)
            .expect("br")
            .add(TITLE, Term::literal("A title"))
            .expect("edit");
        ps.generate(&gs, at(0)).expect("generate");

        let mut staged = gs.staged();
        staged.extend(ps.staged());

        let mut config = ShardConfig::new(dir.path().join("rdf"));
        config.format = OutputFormat::NQuads;
        let storer = Storer::new(config.clone());
        let files = storer.store_all(&staged).expect("store");
        assert_eq!(files.len(), 2);

        let history = config
            .resolve(&PathTarget::History(br.clone()))
            .expect("history")
            .file;
        let text = std::fs::read_to_string(&history).expect("history file");
        assert!(text.contains("/prov/se/1>"));
        let graph_file = config
            .resolve(&PathTarget::Entity(br.clone()))
            .expect("graph")
            .file;
        assert!(files.contains(&graph_file));
        let dataset = Dataset::from_bytes(
            &std::fs::read(&graph_file).expect("graph file"),
            OutputFormat::NQuads,
            false,
        )
        .expect("parse");
        assert_eq!(dataset.len(), 2);

        let mut options = UploadOptions::new(dir.path().join("pending"));
        options.batch_size = 1;
        let mut uploader = Uploader::new(Collecting::default(), options).expect("uploader");
        assert!(uploader.upload_all(&staged).expect("upload"));
        assert_eq!(uploader.client().requests.lock().len(), 2);
    }

    /// T3.2: An unreachable store leaves a replayable spool file.
    #[test]
    fn failed_batch_is_spooled() {
        let dir = tempdir().expect("tempdir");
        let counter: Arc<dyn CounterStore> = Arc::new(MemoryCounter::new());
        let (mut gs, _) = sets(counter, None);
        gs.add(EntityType::Citation).expect("add");

        let mut options = UploadOptions::new(dir.path().join("pending"));
        options.max_attempts = 2;
        options.retry_delay = std::time::Duration::from_millis(1);
        let mut uploader = Uploader::new(Refusing, options.clone()).expect("uploader");
        assert!(!uploader.upload_all(&gs.staged()).expect("upload"));

        let pending = provstore_core::upload::pending_files(&options.pending_dir).expect("list");
        assert_eq!(pending.len(), 1);
        let name = pending[0]
            .file_name()
            .and_then(|n| n.to_str())
            .expect("name");
        assert!(name.ends_with("_add1_remove0.sparql"));

        let replay = Uploader::new(Collecting::default(), options).expect("uploader");
        let report = replay.replay_pending().expect("replay");
        assert_eq!(report.sent, 1);
        assert!(!pending[0].exists());
    }
}
