//! # provstore-core
//!
//! Provenance-aware incremental persistence for entity graphs.
//!
//! An in-memory registry of typed entities ([`GraphSet`]) is edited in a
//! session; at commit time every changed entity gets a snapshot in the
//! provenance registry ([`ProvSet`]), and the results are written into a
//! sharded file tree ([`Storer`]) and/or pushed to a remote store as
//! update text ([`Uploader`]).
//!
//! ## Session Flow
//!
//! 1. Allocate or load entities (`GraphSet::add` / `GraphSet::add_existing`)
//! 2. Edit, delete, merge or restore them
//! 3. `ProvSet::generate` records one snapshot per changed entity
//! 4. `staged()` on both sets feeds the storer and the uploader
//! 5. `commit_changes()` on both sets resets the baselines
//!
//! ## Architectural Constraints
//!
//! - Identifiers come from a [`CounterStore`]; a number is never reused
//! - Every ordered output goes through `BTreeMap`/`BTreeSet`
//! - No async runtime; the upload client is blocking

// =============================================================================
// MODULES
// =============================================================================

pub mod config;
pub mod counter;
pub mod diff;
pub mod entity;
pub mod formats;
pub mod graph_set;
pub mod iri;
pub mod lock;
pub mod primitives;
pub mod provenance;
pub mod shard;
pub mod staged;
pub mod storer;
pub mod types;
pub mod upload;
pub mod vocab;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{EntityType, Iri, Literal, ProvstoreError, Quad, Term, Triple};

// =============================================================================
// RE-EXPORTS: Identity and Layout
// =============================================================================

pub use counter::{CounterBackend, CounterKey, CounterScope, CounterStore};
pub use iri::{EntityIri, Identifier, SnapshotId};
pub use shard::{OutputFormat, PathTarget, ResolvedPath, ShardConfig};

// =============================================================================
// RE-EXPORTS: Session
// =============================================================================

pub use config::Config;
pub use diff::ChangeSet;
pub use entity::{Entity, EntityState};
pub use graph_set::{GraphSet, TypePreference};
pub use provenance::{GenerationSummary, ProvSet, SnapshotKind, SnapshotRecord};
pub use staged::{StagedEntity, StagedKind};

// =============================================================================
// RE-EXPORTS: Output
// =============================================================================

pub use formats::Dataset;
pub use storer::Storer;
pub use upload::{HttpUpdateClient, ReplayReport, UpdateClient, UploadOptions, Uploader};
