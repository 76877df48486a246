//! # Configuration
//!
//! TOML-loaded settings with a default for every field. `validate` rejects
//! values that would make resolution or uploading impossible.
//!
//! ```toml
//! base_iri = "https://w3id.org/oc/meta/"
//! supplier_prefix = "060"
//!
//! [storage]
//! output_dir = "rdf"
//! format = "json"
//!
//! [counter]
//! backend = "file"
//! path = "counters"
//!
//! [upload]
//! endpoint = "http://localhost:8890/sparql"
//! batch_size = 10
//! ```

use crate::counter::{
    CounterBackend, CounterStore, FileCounter, MemoryCounter, RemoteCounter, TableCounter,
};
use crate::primitives::{
    DEFAULT_BATCH_SIZE, DEFAULT_BULK_CHUNK_SIZE, DEFAULT_DIR_SPLIT, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_N_FILE_ITEM, DEFAULT_RETRY_DELAY_MS,
};
use crate::shard::{OutputFormat, ShardConfig};
use crate::upload::{BulkTarget, UploadOptions};
use crate::{GraphSet, Iri, ProvSet, ProvstoreError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub base_iri: String,
    pub supplier_prefix: Option<String>,
    /// Responsible agent recorded on every snapshot.
    pub resp_agent: Option<String>,
    /// Primary source recorded on every snapshot.
    pub source: Option<String>,
    /// Where the snapshot registry is kept between runs.
    pub registry_path: Option<PathBuf>,
    pub storage: StorageConfig,
    pub counter: CounterConfig,
    pub upload: UploadConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_iri: "https://w3id.org/oc/meta/".to_string(),
            supplier_prefix: None,
            resp_agent: None,
            source: None,
            registry_path: None,
            storage: StorageConfig::default(),
            counter: CounterConfig::default(),
            upload: UploadConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub output_dir: PathBuf,
    pub dir_split: u64,
    pub n_file_item: u64,
    pub default_dir: Option<String>,
    pub format: OutputFormat,
    pub zip_output: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("rdf"),
            dir_split: DEFAULT_DIR_SPLIT,
            n_file_item: DEFAULT_N_FILE_ITEM,
            default_dir: None,
            format: OutputFormat::Json,
            zip_output: false,
        }
    }
}

/// Which counter backend to build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterBackendKind {
    #[default]
    Memory,
    File,
    Table,
    Remote,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CounterConfig {
    pub backend: CounterBackendKind,
    /// Directory (file backend) or database file (table backend).
    pub path: Option<PathBuf>,
    /// Remote key-value service URL.
    pub url: Option<String>,
    /// Key namespace on the remote service.
    pub namespace: String,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            backend: CounterBackendKind::Memory,
            path: None,
            url: None,
            namespace: "provstore".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub batch_size: usize,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub timeout_secs: u64,
    pub pending_dir: PathBuf,
    pub save_queries: bool,
    /// Enables bulk mode when set.
    pub bulk_dir: Option<PathBuf>,
    pub bulk_chunk_size: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            batch_size: DEFAULT_BATCH_SIZE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            timeout_secs: 30,
            pending_dir: PathBuf::from("pending"),
            save_queries: false,
            bulk_dir: None,
            bulk_chunk_size: DEFAULT_BULK_CHUNK_SIZE,
        }
    }
}

impl Config {
    /// Parse and validate TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ProvstoreError> {
        let config: Self = toml::from_str(text)
            .map_err(|e| ProvstoreError::InvalidArgument(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, ProvstoreError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ProvstoreError> {
        if self.base_iri.is_empty() {
            return Err(ProvstoreError::InvalidArgument(
                "base_iri must not be empty".to_string(),
            ));
        }
        if self.storage.n_file_item == 0 {
            return Err(ProvstoreError::InvalidArgument(
                "storage.n_file_item must be positive".to_string(),
            ));
        }
        if self.upload.batch_size == 0 {
            return Err(ProvstoreError::InvalidArgument(
                "upload.batch_size must be positive".to_string(),
            ));
        }
        if self.upload.max_attempts == 0 {
            return Err(ProvstoreError::InvalidArgument(
                "upload.max_attempts must be positive".to_string(),
            ));
        }
        if self.upload.bulk_dir.is_some() && self.upload.bulk_chunk_size == 0 {
            return Err(ProvstoreError::InvalidArgument(
                "upload.bulk_chunk_size must be positive".to_string(),
            ));
        }
        if matches!(
            self.counter.backend,
            CounterBackendKind::File | CounterBackendKind::Table
        ) && self.counter.path.is_none()
        {
            return Err(ProvstoreError::InvalidArgument(
                "counter.path is required for the file and table backends".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn shard_config(&self) -> ShardConfig {
        ShardConfig {
            base_dir: self.storage.output_dir.clone(),
            dir_split: self.storage.dir_split,
            n_file_item: self.storage.n_file_item,
            default_dir: self.storage.default_dir.clone(),
            format: self.storage.format,
            zip_output: self.storage.zip_output,
        }
    }

    /// Build the configured counter backend.
    pub fn counter_backend(&self) -> Result<CounterBackend, ProvstoreError> {
        let path = || {
            self.counter.path.clone().ok_or_else(|| {
                ProvstoreError::InvalidArgument("counter.path is not set".to_string())
            })
        };
        Ok(match self.counter.backend {
            CounterBackendKind::Memory => CounterBackend::Memory(MemoryCounter::new()),
            CounterBackendKind::File => CounterBackend::File(FileCounter::new(path()?)),
            CounterBackendKind::Table => CounterBackend::Table(TableCounter::open(path()?)?),
            CounterBackendKind::Remote => CounterBackend::Remote(self.remote_counter()?),
        })
    }

    #[cfg(feature = "redis")]
    fn remote_counter(&self) -> Result<RemoteCounter, ProvstoreError> {
        match &self.counter.url {
            Some(url) => Ok(RemoteCounter::new(
                Box::new(crate::counter::RedisKv::connect(url)?),
                self.counter.namespace.clone(),
            )),
            None => Ok(RemoteCounter::in_memory()),
        }
    }

    #[cfg(not(feature = "redis"))]
    fn remote_counter(&self) -> Result<RemoteCounter, ProvstoreError> {
        match &self.counter.url {
            Some(url) => Err(ProvstoreError::InvalidArgument(format!(
                "counter.url '{url}' needs the redis feature"
            ))),
            None => Ok(RemoteCounter::in_memory()),
        }
    }

    #[must_use]
    pub fn upload_options(&self) -> UploadOptions {
        UploadOptions {
            batch_size: self.upload.batch_size,
            max_attempts: self.upload.max_attempts,
            retry_delay: Duration::from_millis(self.upload.retry_delay_ms),
            pending_dir: self.upload.pending_dir.clone(),
            save_queries: self.upload.save_queries,
            bulk: self.upload.bulk_dir.clone().map(|dir| BulkTarget {
                dir,
                chunk_size: self.upload.bulk_chunk_size,
            }),
        }
    }

    #[must_use]
    pub fn resp_agent_iri(&self) -> Option<Iri> {
        self.resp_agent.as_deref().map(Iri::new)
    }

    #[must_use]
    pub fn source_iri(&self) -> Option<Iri> {
        self.source.as_deref().map(Iri::new)
    }

    /// Empty registry minting under the configured base IRI and prefix.
    pub fn graph_set(&self, counter: Arc<dyn CounterStore>) -> GraphSet {
        GraphSet::new(
            self.base_iri.clone(),
            self.supplier_prefix.as_deref(),
            counter,
        )
    }

    /// Provenance set stamped with the configured source and agent, seeded
    /// from `registry_path` when one is set.
    pub fn prov_set(&self, counter: Arc<dyn CounterStore>) -> Result<ProvSet, ProvstoreError> {
        let mut prov = ProvSet::new(counter, self.source_iri(), self.resp_agent_iri());
        if let Some(path) = &self.registry_path {
            let loaded = prov.load_registry(path)?;
            debug!(path = %path.display(), loaded, "Snapshot registry loaded");
        }
        Ok(prov)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = Config::from_toml_str("").expect("parse");
        assert_eq!(config, Config::default());
        assert_eq!(config.storage.dir_split, 10_000);
        assert_eq!(config.upload.batch_size, 10);
    }

    #[test]
    fn sections_override_defaults() {
        let config = Config::from_toml_str(
            r#"
            supplier_prefix = "060"

            [storage]
            format = "nquads"
            dir_split = 0
            zip_output = true

            [counter]
            backend = "file"
            path = "/tmp/counters"

            [upload]
            batch_size = 25
            bulk_dir = "/tmp/bulk"
            "#,
        )
        .expect("parse");
        assert_eq!(config.storage.format, OutputFormat::NQuads);
        assert_eq!(config.counter.backend, CounterBackendKind::File);
        let options = config.upload_options();
        assert_eq!(options.batch_size, 25);
        assert_eq!(
            options.bulk.map(|b| b.chunk_size),
            Some(DEFAULT_BULK_CHUNK_SIZE)
        );
        assert_eq!(config.shard_config().dir_split, 0);
    }

    #[test]
    fn zero_values_rejected() {
        for text in [
            "[storage]\nn_file_item = 0",
            "[upload]\nbatch_size = 0",
            "[upload]\nmax_attempts = 0",
            "[counter]\nbackend = \"table\"",
        ] {
            assert!(
                matches!(
                    Config::from_toml_str(text),
                    Err(ProvstoreError::InvalidArgument(_))
                ),
                "{text} should be rejected"
            );
        }
    }

    #[test]
    fn sets_follow_identity_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = dir.path().join("registry.bin");
        let config = Config::from_toml_str(&format!(
            r#"
            supplier_prefix = "060"
            resp_agent = "https://orcid.org/0000-0002-8420-0696"
            source = "https://api.crossref.org/"
            registry_path = "{}"
            "#,
            registry.display()
        ))
        .expect("parse");

        let counter: Arc<dyn CounterStore> = Arc::new(MemoryCounter::new());
        let mut gs = config.graph_set(counter.clone());
        let br = gs
            .add(crate::EntityType::BibliographicResource)
            .expect("add");
        assert_eq!(br.to_string(), "https://w3id.org/oc/meta/br/0601");

        let mut prov = config.prov_set(counter.clone()).expect("empty registry");
        assert_eq!(prov.records().count(), 0);
        prov.generate(&gs, chrono::Utc::now()).expect("generate");
        let record = prov.records().next().expect("record").clone();
        assert_eq!(record.resp_agent, config.resp_agent_iri());
        assert_eq!(record.primary_source, config.source_iri());
        prov.save_registry(&registry).expect("save");

        let reloaded = config.prov_set(counter).expect("reload");
        assert_eq!(reloaded.record(&record.id), Some(&record));
    }

    #[test]
    fn unknown_keys_rejected() {
        assert!(Config::from_toml_str("[storage]\nshards = 3").is_err());
    }
}
