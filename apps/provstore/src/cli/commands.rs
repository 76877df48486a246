//! # CLI Command Implementations
//!
//! Each `cmd_*` function prints its result; the plain functions beside them
//! compute it and are what the tests drive.

use super::{CounterAction, CounterArgs};
use provstore_core::formats::nquads;
use provstore_core::upload::pending_files;
use provstore_core::{
    ChangeSet, Config, CounterKey, CounterStore, EntityType, HttpUpdateClient, Iri,
    ProvstoreError, ReplayReport, ResolvedPath, SnapshotRecord, Triple, Uploader,
};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Maximum size of a file accepted by `diff` (100 MB).
const MAX_DIFF_FILE_SIZE: u64 = 100 * 1024 * 1024;

fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_default()
    );
}

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Load `path`, or fall back to the built-in defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config, ProvstoreError> {
    match path {
        Some(path) => Config::load(path),
        None => Ok(Config::default()),
    }
}

// =============================================================================
// COUNTER COMMAND
// =============================================================================

/// The key addressed by `args`.
pub fn counter_key(args: &CounterArgs) -> Result<CounterKey, ProvstoreError> {
    let entity_type = EntityType::from_short_name(&args.entity_type)?;
    if entity_type.is_provenance() {
        return Err(ProvstoreError::InvalidArgument(
            "snapshot counters are addressed with --snapshot-of on the subject type".to_string(),
        ));
    }
    let prefix = args.prefix.as_deref();
    match args.snapshot_of {
        Some(0) => Err(ProvstoreError::InvalidArgument(
            "entity numbers start at 1".to_string(),
        )),
        Some(subject) => Ok(CounterKey::snapshot(entity_type, prefix, subject)),
        None => Ok(CounterKey::entity(entity_type, prefix)),
    }
}

/// Apply `action` to `store` and return the value afterwards.
pub fn run_counter(store: &dyn CounterStore, action: &CounterAction) -> Result<u64, ProvstoreError> {
    match action {
        CounterAction::Read(args) => store.read(&counter_key(args)?),
        CounterAction::Increment(args) => store.increment(&counter_key(args)?),
        CounterAction::Set {
            target,
            value,
            force,
        } => {
            let key = counter_key(target)?;
            store.set(&key, *value, *force)?;
            Ok(*value)
        }
    }
}

/// Run a counter action against the configured backend.
pub fn cmd_counter(
    config: &Config,
    action: &CounterAction,
    json_mode: bool,
) -> Result<(), ProvstoreError> {
    let backend = config.counter_backend()?;
    let args = match action {
        CounterAction::Read(args) | CounterAction::Increment(args) => args,
        CounterAction::Set { target, .. } => target,
    };
    let key = counter_key(args)?;
    let value = run_counter(&backend, action)?;

    if json_mode {
        print_json(&serde_json::json!({
            "backend": backend.kind(),
            "key": key.storage_key(),
            "value": value,
        }));
    } else {
        println!("{key} = {value}");
    }
    Ok(())
}

// =============================================================================
// RESOLVE COMMAND
// =============================================================================

pub fn resolve_path(config: &Config, iri: &str) -> Result<ResolvedPath, ProvstoreError> {
    config.shard_config().resolve_iri(&config.base_iri, iri)
}

/// Print where `iri` is stored.
pub fn cmd_resolve(config: &Config, iri: &str, json_mode: bool) -> Result<(), ProvstoreError> {
    let resolved = resolve_path(config, iri)?;
    let file = config.shard_config().storage_file(&resolved.file);

    if json_mode {
        print_json(&serde_json::json!({
            "iri": iri,
            "dir": resolved.dir.to_string_lossy(),
            "file": file.to_string_lossy(),
        }));
    } else {
        println!("Directory: {}", resolved.dir.display());
        println!("File:      {}", file.display());
    }
    Ok(())
}

// =============================================================================
// DIFF COMMAND
// =============================================================================

fn read_graph(path: &Path, graph: &Iri) -> Result<BTreeSet<Triple>, ProvstoreError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| ProvstoreError::IoError(format!("cannot read '{}': {e}", path.display())))?;
    if metadata.len() > MAX_DIFF_FILE_SIZE {
        return Err(ProvstoreError::InvalidArgument(format!(
            "'{}' is {} bytes, the limit is {MAX_DIFF_FILE_SIZE}",
            path.display(),
            metadata.len()
        )));
    }
    let text = std::fs::read_to_string(path)?;
    let dataset = nquads::parse(&text, Some(graph))?;
    Ok(dataset.graph(graph).cloned().unwrap_or_default())
}

/// Change set turning the `graph` statements of `previous` into those of
/// `current`.
pub fn diff_files(previous: &Path, current: &Path, graph: &str) -> Result<ChangeSet, ProvstoreError> {
    let graph = Iri::new(graph);
    let before = read_graph(previous, &graph)?;
    let after = read_graph(current, &graph)?;
    Ok(ChangeSet::compute(&before, &after, false))
}

/// Print the update text between two files.
pub fn cmd_diff(
    previous: &Path,
    current: &Path,
    graph: &str,
    json_mode: bool,
) -> Result<(), ProvstoreError> {
    let change = diff_files(previous, current, graph)?;
    let text = change.update_text(&Iri::new(graph));

    if json_mode {
        print_json(&serde_json::json!({
            "added": change.n_added(),
            "removed": change.n_removed(),
            "update": text,
        }));
    } else if text.is_empty() {
        println!("No differences.");
    } else {
        println!("{text}");
    }
    Ok(())
}

// =============================================================================
// UPLOAD COMMANDS
// =============================================================================

/// Resend spooled batches to the configured endpoint.
pub fn replay(config: &Config) -> Result<ReplayReport, ProvstoreError> {
    let endpoint = config.upload.endpoint.clone().ok_or_else(|| {
        ProvstoreError::InvalidArgument("upload.endpoint is not configured".to_string())
    })?;
    let client = HttpUpdateClient::new(
        endpoint,
        config.upload.api_key.clone(),
        Duration::from_secs(config.upload.timeout_secs),
    )?;
    let mut options = config.upload_options();
    options.bulk = None;
    Uploader::new(client, options)?.replay_pending()
}

pub fn cmd_replay(config: &Config, json_mode: bool) -> Result<(), ProvstoreError> {
    let report = replay(config)?;

    if json_mode {
        print_json(&serde_json::json!({
            "sent": report.sent,
            "failed": report.failed,
        }));
    } else {
        println!("Replayed: {} sent, {} still pending", report.sent, report.failed);
    }
    Ok(())
}

pub fn pending(config: &Config) -> Result<Vec<PathBuf>, ProvstoreError> {
    pending_files(&config.upload.pending_dir)
}

/// List spooled batches.
pub fn cmd_pending(config: &Config, json_mode: bool) -> Result<(), ProvstoreError> {
    let files = pending(config)?;

    if json_mode {
        let names: Vec<String> = files
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        print_json(&serde_json::json!({ "pending": names }));
    } else if files.is_empty() {
        println!("No pending batches.");
    } else {
        for file in &files {
            println!("{}", file.display());
        }
    }
    Ok(())
}

// =============================================================================
// HISTORY COMMAND
// =============================================================================

/// Snapshots of `iri` known to the configured registry, oldest first.
pub fn history(config: &Config, iri: &str) -> Result<Vec<SnapshotRecord>, ProvstoreError> {
    if config.registry_path.is_none() {
        return Err(ProvstoreError::InvalidArgument(
            "registry_path is not configured".to_string(),
        ));
    }
    let counter: Arc<dyn CounterStore> = Arc::new(config.counter_backend()?);
    let subject = config.graph_set(counter.clone()).parse_iri(iri)?;
    let prov = config.prov_set(counter)?;
    Ok(prov.history(&subject).cloned().collect())
}

/// Print the snapshot chain of one entity.
pub fn cmd_history(config: &Config, iri: &str, json_mode: bool) -> Result<(), ProvstoreError> {
    let records = history(config, iri)?;

    if json_mode {
        let entries: Vec<serde_json::Value> = records
            .iter()
            .map(|r| {
                serde_json::json!({
                    "snapshot": r.id.to_string(),
                    "kind": format!("{:?}", r.kind),
                    "generated_at": r.generated_at.to_rfc3339(),
                    "invalidated_at": r.invalidated_at.map(|at| at.to_rfc3339()),
                    "derived_from": r.derived_from.iter().map(ToString::to_string).collect::<Vec<_>>(),
                    "description": r.description,
                })
            })
            .collect();
        print_json(&serde_json::json!({ "iri": iri, "snapshots": entries }));
    } else if records.is_empty() {
        println!("No snapshots recorded for {iri}.");
    } else {
        for record in &records {
            let state = if record.invalidated_at.is_some() { "closed" } else { "head" };
            println!("{} [{:?}, {state}] {}", record.id, record.kind, record.description);
        }
    }
    Ok(())
}
