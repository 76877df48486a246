//! # Sharded Path Resolution
//!
//! Maps an entity's numeric identity to the directory and file that hold it.
//! Numbers are grouped into file buckets of `n_file_item` items and, when
//! `dir_split` is non-zero, into directory buckets of `dir_split` items. A
//! bucket is named after its upper bound: with 1000 items per file, numbers
//! 1..=1000 land in `1000`, 1001..=2000 in `2000`.
//!
//! Resolution is pure. Nothing here touches the filesystem.

use crate::iri::{EntityIri, Identifier};
use crate::primitives::{DATASET_INDEX_STEM, FALLBACK_BUCKET, HISTORY_DIR};
use crate::{EntityType, ProvstoreError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// On-disk format of sharded output files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON array of `{"@id": graph, "@graph": [...]}` objects.
    #[default]
    Json,
    /// Line-oriented N-Quads.
    NQuads,
}

impl OutputFormat {
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::NQuads => "nq",
        }
    }
}

/// Upper bounds of the buckets containing one numeric id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardCoordinate {
    /// `None` when directory bucketing is disabled.
    pub dir_bucket: Option<u64>,
    pub file_bucket: u64,
}

/// Smallest multiple of `step` that is `>= number`.
pub fn bucket(number: u64, step: u64) -> Result<u64, ProvstoreError> {
    if number == 0 {
        return Err(ProvstoreError::InvalidArgument(
            "numeric ids start at 1".to_string(),
        ));
    }
    if step == 0 {
        return Err(ProvstoreError::InvalidArgument(
            "bucket size must be positive".to_string(),
        ));
    }
    number
        .div_ceil(step)
        .checked_mul(step)
        .ok_or_else(|| ProvstoreError::InvalidArgument(format!("id {number} overflows its bucket")))
}

/// Shard coordinate of `numeric_id` under the given split sizes.
pub fn shard_coordinate(
    numeric_id: u64,
    dir_split: u64,
    n_file_item: u64,
) -> Result<ShardCoordinate, ProvstoreError> {
    let file_bucket = bucket(numeric_id, n_file_item)?;
    let dir_bucket = if dir_split > 0 {
        Some(bucket(numeric_id, dir_split)?)
    } else {
        None
    };
    Ok(ShardCoordinate {
        dir_bucket,
        file_bucket,
    })
}

/// What a path is being resolved for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathTarget {
    /// The file holding an entity's current graph.
    Entity(EntityIri),
    /// The file holding an entity's snapshot history.
    History(EntityIri),
    /// A type's dataset root document.
    Dataset(EntityType),
}

/// A resolved `(directory, file)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResolvedPath {
    pub dir: PathBuf,
    pub file: PathBuf,
}

/// Layout parameters shared by the resolver and the storer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardConfig {
    pub base_dir: PathBuf,
    pub dir_split: u64,
    pub n_file_item: u64,
    /// Directory used for entities without a supplier prefix.
    pub default_dir: Option<String>,
    pub format: OutputFormat,
    pub zip_output: bool,
}

impl ShardConfig {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            dir_split: crate::primitives::DEFAULT_DIR_SPLIT,
            n_file_item: crate::primitives::DEFAULT_N_FILE_ITEM,
            default_dir: None,
            format: OutputFormat::default(),
            zip_output: false,
        }
    }

    /// Resolve `target` to its directory and file.
    pub fn resolve(&self, target: &PathTarget) -> Result<ResolvedPath, ProvstoreError> {
        let ext = self.format.extension();
        match target {
            PathTarget::Dataset(entity_type) => {
                let dir = self.base_dir.join(entity_type.short_name());
                let file = dir.join(format!("{DATASET_INDEX_STEM}.{ext}"));
                Ok(ResolvedPath { dir, file })
            }
            PathTarget::Entity(iri) => {
                let coord = shard_coordinate(iri.number(), self.dir_split, self.n_file_item)?;
                let dir = self.bucket_dir(iri, coord);
                let file = dir.join(format!("{}.{ext}", coord.file_bucket));
                Ok(ResolvedPath { dir, file })
            }
            PathTarget::History(iri) => {
                let coord = shard_coordinate(iri.number(), self.dir_split, self.n_file_item)?;
                let dir = self
                    .bucket_dir(iri, coord)
                    .join(coord.file_bucket.to_string())
                    .join(HISTORY_DIR);
                let file = dir.join(format!("{}.{ext}", EntityType::Snapshot.short_name()));
                Ok(ResolvedPath { dir, file })
            }
        }
    }

    /// Parse `iri` against `base_iri` and resolve it.
    ///
    /// Snapshot identifiers resolve to their subject's history file.
    pub fn resolve_iri(&self, base_iri: &str, iri: &str) -> Result<ResolvedPath, ProvstoreError> {
        let target = match Identifier::parse(base_iri, iri)? {
            Identifier::Entity(entity) => PathTarget::Entity(entity),
            Identifier::Snapshot(snapshot) => PathTarget::History(snapshot.subject),
            Identifier::Dataset(entity_type) => PathTarget::Dataset(entity_type),
        };
        self.resolve(&target)
    }

    /// The file actually written for `file`, after zip substitution.
    #[must_use]
    pub fn storage_file(&self, file: &Path) -> PathBuf {
        if self.zip_output {
            file.with_extension("zip")
        } else {
            file.to_path_buf()
        }
    }

    fn prefix_dir<'a>(&'a self, iri: &'a EntityIri) -> &'a str {
        if !iri.prefix().is_empty() {
            iri.prefix()
        } else {
            self.default_dir.as_deref().unwrap_or(FALLBACK_BUCKET)
        }
    }

    fn bucket_dir(&self, iri: &EntityIri, coord: ShardCoordinate) -> PathBuf {
        let dir = self
            .base_dir
            .join(iri.entity_type().short_name())
            .join(self.prefix_dir(iri));
        match coord.dir_bucket {
            Some(dir_bucket) => dir.join(dir_bucket.to_string()),
            None => dir,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
