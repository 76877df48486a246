//! # Storer
//!
//! Writes staged entities into the sharded file layout. Entities bound for
//! the same file are grouped so each file sees a single read-modify-write;
//! independent files are processed in parallel on the rayon pool, each under
//! its own `.lock` marker.

use crate::formats::Dataset;
use crate::lock::FileLockGuard;
use crate::shard::ShardConfig;
use crate::staged::{StagedEntity, StagedKind};
use crate::ProvstoreError;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Persists staged entities under a [`ShardConfig`] layout.
#[derive(Debug, Clone)]
pub struct Storer {
    config: ShardConfig,
}

impl Storer {
    #[must_use]
    pub fn new(config: ShardConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &ShardConfig {
        &self.config
    }

    /// Storage file for each staged entity, grouped.
    fn group<'a>(
        &self,
        staged: &'a [StagedEntity],
    ) -> Result<BTreeMap<PathBuf, Vec<&'a StagedEntity>>, ProvstoreError> {
        let mut groups: BTreeMap<PathBuf, Vec<&StagedEntity>> = BTreeMap::new();
        for entity in staged {
            let resolved = self.config.resolve(&entity.target)?;
            let file = self.config.storage_file(&resolved.file);
            groups.entry(file).or_default().push(entity);
        }
        Ok(groups)
    }

    /// Write every staged entity. Returns the files touched, sorted.
    pub fn store_all(&self, staged: &[StagedEntity]) -> Result<Vec<PathBuf>, ProvstoreError> {
        let groups: Vec<(PathBuf, Vec<&StagedEntity>)> = self.group(staged)?.into_iter().collect();

        let written = groups
            .par_iter()
            .map(|(file, entities)| {
                self.store_file(file, entities)?;
                Ok(file.clone())
            })
            .collect::<Result<Vec<_>, ProvstoreError>>()?;

        info!(
            files = written.len(),
            entities = staged.len(),
            "Stored staged entities"
        );
        Ok(written)
    }

    fn store_file(&self, file: &Path, entities: &[&StagedEntity]) -> Result<(), ProvstoreError> {
        let _guard = FileLockGuard::marker(file)?;

        let mut dataset = if file.exists() {
            Dataset::from_bytes(&fs::read(file)?, self.config.format, self.config.zip_output)?
        } else {
            Dataset::new()
        };

        for entity in entities {
            match entity.kind {
                StagedKind::Graph => {
                    if entity.deleted || entity.overwrite {
                        dataset.remove_subject(&entity.subject);
                    }
                    if !entity.deleted {
                        dataset.extend(&entity.graph, entity.statements.iter().cloned());
                    }
                }
                StagedKind::Provenance => {
                    dataset.extend(&entity.graph, entity.statements.iter().cloned());
                }
            }
        }

        if dataset.is_empty() {
            if file.exists() {
                fs::remove_file(file)?;
                debug!(path = %file.display(), "Removed emptied file");
            }
            return Ok(());
        }

        let entry_name = file
            .with_extension(self.config.format.extension())
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
        let zip_entry = if self.config.zip_output {
            entry_name.as_deref()
        } else {
            None
        };
        let bytes = dataset.to_bytes(self.config.format, zip_entry)?;
        write_atomic(file, &bytes)?;
        debug!(path = %file.display(), statements = dataset.len(), "Wrote file");
        Ok(())
    }
}

/// Write `bytes` to a sibling temp file, then rename over `path`.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ProvstoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut tmp_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
