//! Tests for argument parsing and the command implementations.

#![allow(clippy::panic)]

use clap::Parser;
use provstore::cli::{
    Cli, Commands, CounterAction, CounterArgs, counter_key, diff_files, history, load_config,
    pending, resolve_path, run_counter,
};
use provstore_core::counter::{FileCounter, MemoryCounter};
use provstore_core::{CounterScope, CounterStore, EntityType, ProvstoreError, SnapshotKind};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::tempdir;

fn args(ty: &str, prefix: Option<&str>, snapshot_of: Option<u64>) -> CounterArgs {
    CounterArgs {
        entity_type: ty.to_string(),
        prefix: prefix.map(str::to_string),
        snapshot_of,
    }
}

// =============================================================================
// PARSING
// =============================================================================

#[test]
fn parses_counter_set() {
    let cli = Cli::try_parse_from([
        "provstore",
        "--json-mode",
        "counter",
        "set",
        "--type",
        "br",
        "--prefix",
        "060",
        "--value",
        "7",
        "--force",
    ])
    .expect("parse");
    assert!(cli.json_mode);
    match cli.command {
        Commands::Counter {
            action:
                CounterAction::Set {
                    target,
                    value,
                    force,
                },
        } => {
            assert_eq!(target.entity_type, "br");
            assert_eq!(target.prefix.as_deref(), Some("060"));
            assert_eq!(value, 7);
            assert!(force);
        }
        other => panic!("unexpected command {other:?}"),
    }
}

#[test]
fn parses_diff_with_global_config() {
    let cli = Cli::try_parse_from([
        "provstore",
        "diff",
        "--previous",
        "a.nq",
        "--current",
        "b.nq",
        "--graph",
        "https://w3id.org/oc/meta/br/",
        "--config",
        "provstore.toml",
    ])
    .expect("parse");
    assert_eq!(cli.config, Some(PathBuf::from("provstore.toml")));
    assert!(matches!(cli.command, Commands::Diff { .. }));
}

#[test]
fn missing_subcommand_is_an_error() {
    assert!(Cli::try_parse_from(["provstore"]).is_err());
}

// =============================================================================
// COUNTER
// =============================================================================

#[test]
fn counter_key_addresses_snapshots() {
    let key = counter_key(&args("br", Some("060"), Some(12))).expect("key");
    assert_eq!(key.entity_type, EntityType::BibliographicResource);
    assert_eq!(key.scope, CounterScope::Snapshot { subject: 12 });

    assert!(matches!(
        counter_key(&args("zz", None, None)),
        Err(ProvstoreError::InvalidArgument(_))
    ));
    assert!(counter_key(&args("se", None, None)).is_err());
    assert!(counter_key(&args("br", None, Some(0))).is_err());
}

#[test]
fn counter_actions_against_file_backend() {
    let dir = tempdir().expect("tempdir");
    let store = FileCounter::new(dir.path());

    let increment = CounterAction::Increment(args("ra", None, None));
    assert_eq!(run_counter(&store, &increment).expect("inc"), 1);
    assert_eq!(run_counter(&store, &increment).expect("inc"), 2);

    let lower = CounterAction::Set {
        target: args("ra", None, None),
        value: 1,
        force: false,
    };
    assert!(run_counter(&store, &lower).is_err());

    let read = CounterAction::Read(args("ra", None, None));
    assert_eq!(run_counter(&store, &read).expect("read"), 2);
    assert!(dir.path().join("_").join("info_file_ra.txt").exists());
}

// =============================================================================
// CONFIG, RESOLVE, DIFF
// =============================================================================

#[test]
fn config_file_drives_resolution() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("provstore.toml");
    std::fs::write(
        &path,
        "[storage]\noutput_dir = \"/srv/rdf\"\nformat = \"nquads\"\n",
    )
    .expect("write config");

    let config = load_config(Some(&path)).expect("config");
    let resolved =
        resolve_path(&config, "https://w3id.org/oc/meta/ra/0601500").expect("resolve");
    assert_eq!(resolved.file, PathBuf::from("/srv/rdf/ra/060/10000/2000.nq"));

    assert!(load_config(None).is_ok());
    assert!(load_config(Some(&dir.path().join("missing.toml"))).is_err());
}

#[test]
fn diff_of_two_files() {
    let dir = tempdir().expect("tempdir");
    let graph = "https://w3id.org/oc/meta/br/";
    let previous = dir.path().join("a.nq");
    let current = dir.path().join("b.nq");
    std::fs::write(
        &previous,
        "<https://w3id.org/oc/meta/br/1> <http://purl.org/dc/terms/title> \"Old\" .\n",
    )
    .expect("write");
    std::fs::write(
        &current,
        "<https://w3id.org/oc/meta/br/1> <http://purl.org/dc/terms/title> \"New\" <https://w3id.org/oc/meta/br/> .\n",
    )
    .expect("write");

    let change = diff_files(&previous, &current, graph).expect("diff");
    assert_eq!(change.n_added(), 1);
    assert_eq!(change.n_removed(), 1);

    let same = diff_files(&previous, &previous, graph).expect("diff");
    assert!(same.is_empty());
}

#[test]
fn pending_lists_nothing_without_spool() {
    let dir = tempdir().expect("tempdir");
    let mut config = load_config(None).expect("config");
    config.upload.pending_dir = dir.path().join("pending");
    assert!(pending(&config).expect("pending").is_empty());
}

#[test]
fn history_reads_configured_registry() {
    let dir = tempdir().expect("tempdir");
    let registry = dir.path().join("registry.bin");
    let path = dir.path().join("provstore.toml");
    std::fs::write(
        &path,
        format!(
            "supplier_prefix = \"060\"\nregistry_path = \"{}\"\n",
            registry.display()
        ),
    )
    .expect("write config");
    let config = load_config(Some(&path)).expect("config");

    let counter: Arc<dyn CounterStore> = Arc::new(MemoryCounter::new());
    let mut gs = config.graph_set(counter.clone());
    let ra = gs.add(EntityType::ResponsibleAgent).expect("add");
    let mut prov = config.prov_set(counter).expect("prov");
    prov.generate(&gs, chrono::Utc::now()).expect("generate");
    prov.save_registry(&registry).expect("save");

    let records = history(&config, &ra.to_string()).expect("history");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind, SnapshotKind::Creation);
    assert!(history(&config, "https://w3id.org/oc/meta/ra/0609").expect("other").is_empty());

    let bare = load_config(None).expect("defaults");
    assert!(matches!(
        history(&bare, &ra.to_string()),
        Err(ProvstoreError::InvalidArgument(_))
    ));
}
