//! # Uploader
//!
//! Ships staged change-sets to a remote store as textual update requests.
//!
//! Per-entity update texts are grouped, in staging order, into batches of
//! `batch_size` joined with ` ; `. A batch is retried up to `max_attempts`
//! times with a doubling delay; a batch that still fails is written verbatim
//! to the pending directory as `<hash>_add<N>_remove<M>.sparql`, where the
//! hash is taken over the batch text, so re-spooling the same batch is
//! idempotent. [`Uploader::replay_pending`] sends those files again later.
//!
//! In bulk mode inserts go to gzip chunk files instead (see [`BulkExporter`])
//! and only deletions travel as update requests.

mod bulk;

pub use bulk::BulkExporter;

use crate::primitives::{
    DEFAULT_BATCH_SIZE, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY_MS, PENDING_EXTENSION,
    PENDING_HASH_LEN, UPDATE_SEPARATOR,
};
use crate::staged::StagedEntity;
use crate::ProvstoreError;
use reqwest::header::CONTENT_TYPE;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};

// =============================================================================
// CLIENT
// =============================================================================

/// Request/response transport to the remote store.
pub trait UpdateClient: Send + Sync {
    /// Execute one update request. Any failure is a `TransportFailure`.
    fn execute(&self, update: &str) -> Result<(), ProvstoreError>;
}

/// Posts `application/sparql-update` bodies over HTTP.
#[derive(Debug, Clone)]
pub struct HttpUpdateClient {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpUpdateClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ProvstoreError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProvstoreError::TransportFailure(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        })
    }
}

impl UpdateClient for HttpUpdateClient {
    fn execute(&self, update: &str) -> Result<(), ProvstoreError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/sparql-update")
            .body(update.to_string());
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .map_err(|e| ProvstoreError::TransportFailure(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProvstoreError::TransportFailure(format!(
                "{} answered {status}",
                self.endpoint
            )));
        }
        Ok(())
    }
}

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Bulk export destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkTarget {
    pub dir: PathBuf,
    pub chunk_size: usize,
}

/// Uploader settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    pub batch_size: usize,
    pub max_attempts: u32,
    /// Delay before the first retry; doubles after each failed attempt.
    pub retry_delay: Duration,
    pub pending_dir: PathBuf,
    /// Write every batch to `pending_dir` instead of sending it.
    pub save_queries: bool,
    pub bulk: Option<BulkTarget>,
}

impl UploadOptions {
    pub fn new(pending_dir: impl Into<PathBuf>) -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            pending_dir: pending_dir.into(),
            save_queries: false,
            bulk: None,
        }
    }
}

/// Outcome of [`Uploader::replay_pending`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub sent: usize,
    pub failed: usize,
}

// =============================================================================
// UPLOADER
// =============================================================================

/// Batches update texts and delivers them through an [`UpdateClient`].
pub struct Uploader<C: UpdateClient> {
    client: C,
    options: UploadOptions,
    bulk: Option<BulkExporter>,
}

/// Batch under construction.
#[derive(Default)]
struct Batch {
    texts: Vec<String>,
    added: usize,
    removed: usize,
}

impl<C: UpdateClient> Uploader<C> {
    pub fn new(client: C, options: UploadOptions) -> Result<Self, ProvstoreError> {
        if options.batch_size == 0 || options.max_attempts == 0 {
            return Err(ProvstoreError::InvalidArgument(
                "batch size and attempt count must be positive".to_string(),
            ));
        }
        let bulk = match &options.bulk {
            Some(target) => Some(BulkExporter::new(&target.dir, target.chunk_size)?),
            None => None,
        };
        Ok(Self {
            client,
            options,
            bulk,
        })
    }

    #[must_use]
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Upload every staged change-set.
    ///
    /// Returns `false` when at least one batch had to be spooled. Only local
    /// I/O failures (spooling, bulk export) surface as errors.
    pub fn upload_all(&mut self, staged: &[StagedEntity]) -> Result<bool, ProvstoreError> {
        let mut all_sent = true;
        let mut batch = Batch::default();
        let mut batches = 0;

        for entity in staged {
            let text = match self.bulk.as_mut() {
                Some(exporter) => {
                    exporter.append(entity.change.insert_quads(&entity.graph))?;
                    entity.change.delete_text(&entity.graph)
                }
                None => entity.update_text(),
            };
            if text.is_empty() {
                continue;
            }

            batch.texts.push(text);
            batch.removed += entity.change.n_removed();
            if self.bulk.is_none() {
                batch.added += entity.change.n_added();
            }

            if batch.texts.len() >= self.options.batch_size {
                all_sent &= self.flush(std::mem::take(&mut batch))?;
                batches += 1;
            }
        }
        if !batch.texts.is_empty() {
            all_sent &= self.flush(batch)?;
            batches += 1;
        }
        if let Some(exporter) = self.bulk.as_mut() {
            exporter.finish()?;
        }

        info!(entities = staged.len(), batches, all_sent, "Upload finished");
        Ok(all_sent)
    }

    fn flush(&self, batch: Batch) -> Result<bool, ProvstoreError> {
        let text = batch.texts.join(UPDATE_SEPARATOR);
        if self.options.save_queries {
            let path = self.spool(&text, batch.added, batch.removed)?;
            debug!(path = %path.display(), "Saved batch instead of sending");
            return Ok(true);
        }
        if self.send_with_retry(&text) {
            return Ok(true);
        }
        let path = self.spool(&text, batch.added, batch.removed)?;
        warn!(path = %path.display(), "Batch spooled for later replay");
        Ok(false)
    }

    /// Try `text` up to `max_attempts` times. Sleeps between attempts.
    fn send_with_retry(&self, text: &str) -> bool {
        let mut delay = self.options.retry_delay;
        for attempt in 1..=self.options.max_attempts {
            match self.client.execute(text) {
                Ok(()) => return true,
                Err(e) => {
                    warn!(attempt, max = self.options.max_attempts, error = %e, "Update failed");
                    if attempt < self.options.max_attempts {
                        std::thread::sleep(delay);
                        delay = delay.saturating_mul(2);
                    }
                }
            }
        }
        error!(attempts = self.options.max_attempts, "Giving up on batch");
        false
    }

    /// Write `text` to the pending directory under its content-derived name.
    fn spool(&self, text: &str, added: usize, removed: usize) -> Result<PathBuf, ProvstoreError> {
        fs::create_dir_all(&self.options.pending_dir)?;
        let path = self
            .options
            .pending_dir
            .join(pending_file_name(text, added, removed));
        fs::write(&path, text)?;
        Ok(path)
    }

    /// Resend spooled batches in name order, deleting each one accepted.
    pub fn replay_pending(&self) -> Result<ReplayReport, ProvstoreError> {
        let mut report = ReplayReport::default();
        for path in pending_files(&self.options.pending_dir)? {
            let text = fs::read_to_string(&path)?;
            if self.send_with_retry(&text) {
                fs::remove_file(&path)?;
                report.sent += 1;
            } else {
                report.failed += 1;
            }
        }
        info!(sent = report.sent, failed = report.failed, "Replayed pending batches");
        Ok(report)
    }
}

/// `<hash>_add<N>_remove<M>.sparql` for a batch text.
#[must_use]
pub fn pending_file_name(text: &str, added: usize, removed: usize) -> String {
    let hash = blake3::hash(text.as_bytes()).to_hex();
    format!(
        "{}_add{added}_remove{removed}.{PENDING_EXTENSION}",
        &hash.as_str()[..PENDING_HASH_LEN]
    )
}

/// Spooled batch files in `dir`, sorted by name. A missing directory is empty.
pub fn pending_files(dir: &Path) -> Result<Vec<PathBuf>, ProvstoreError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some(PENDING_EXTENSION) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::MemoryCounter;
    use crate::{EntityType, GraphSet, Term};
    use flate2::read::GzDecoder;
    use parking_lot::Mutex;
    use std::io::Read;
    use std::sync::Arc;
    use tempfile::tempdir;

    const TITLE: &str = "http://purl.org/dc/terms/title";

    #[derive(Default)]
    struct Recording {
        sent: Mutex<Vec<String>>,
        fail: bool,
    }

    impl UpdateClient for Recording {
        fn execute(&self, update: &str) -> Result<(), ProvstoreError> {
            if self.fail {
                return Err(ProvstoreError::TransportFailure("down".to_string()));
            }
            self.sent.lock().push(update.to_string());
            Ok(())
        }
    }

    fn staged(n: usize) -> Vec<StagedEntity> {
        let mut gs = GraphSet::new("http://x/", None, Arc::new(MemoryCounter::new()));
        for _ in 0..n {
            gs.add(EntityType::Identifier).expect("add");
        }
        gs.staged()
    }

    fn options(dir: &Path) -> UploadOptions {
        let mut options = UploadOptions::new(dir.join("pending"));
        options.batch_size = 2;
        options.retry_delay = Duration::from_millis(1);
        options
    }

    #[test]
    fn batches_are_grouped() {
        let dir = tempdir().expect("tempdir");
        let mut uploader = Uploader::new(Recording::default(), options(dir.path())).expect("new");
        assert!(uploader.upload_all(&staged(5)).expect("upload"));

        let sent = uploader.client().sent.lock();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0].matches("INSERT DATA").count(), 2);
        assert!(sent[0].contains(" ; "));
    }

    #[test]
    fn failed_batches_are_spooled() {
        let dir = tempdir().expect("tempdir");
        let client = Recording {
            fail: true,
            ..Recording::default()
        };
        let mut uploader = Uploader::new(client, options(dir.path())).expect("new");
        assert!(!uploader.upload_all(&staged(3)).expect("upload"));

        let files = pending_files(&dir.path().join("pending")).expect("list");
        assert_eq!(files.len(), 2);
        let names: Vec<String> = files
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        assert!(names.iter().any(|n| n.ends_with("_add2_remove0.sparql")));
        assert!(names.iter().any(|n| n.ends_with("_add1_remove0.sparql")));
    }

    /// One retitled entity, one deleted entity, one untouched entity.
    fn edited() -> Vec<StagedEntity> {
        let mut gs = GraphSet::new("http://x/", None, Arc::new(MemoryCounter::new()));
        let a = gs.add(EntityType::Identifier).expect("add");
        let b = gs.add(EntityType::Identifier).expect("add");
        gs.add(EntityType::Identifier).expect("add");
        gs.entity_mut(&a)
            .expect("entity")
            .add(TITLE, Term::literal("before"))
            .expect("edit");
        gs.commit_changes();

        let entity = gs.entity_mut(&a).expect("entity");
        entity.remove(TITLE, &Term::literal("before")).expect("remove");
        entity.add(TITLE, Term::literal("after")).expect("add");
        gs.mark_deleted(&b).expect("delete");
        gs.staged()
    }

    fn bulk_options(dir: &Path) -> UploadOptions {
        let mut options = options(dir);
        options.bulk = Some(BulkTarget {
            dir: dir.join("bulk"),
            chunk_size: 100,
        });
        options
    }

    #[test]
    fn bulk_mode_sends_only_deletions() {
        let dir = tempdir().expect("tempdir");
        let mut uploader =
            Uploader::new(Recording::default(), bulk_options(dir.path())).expect("new");
        assert!(uploader.upload_all(&edited()).expect("upload"));

        let sent = uploader.client().sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].matches("DELETE DATA").count(), 2);
        assert!(!sent[0].contains("INSERT DATA"));
        assert!(sent[0].contains("\"before\""));

        let chunk = dir.path().join("bulk").join("bulk_000000.nq.gz");
        let mut text = String::new();
        GzDecoder::new(fs::File::open(&chunk).expect("open"))
            .read_to_string(&mut text)
            .expect("decode");
        assert_eq!(text.lines().count(), 1);
        assert!(text.contains("\"after\""));
        assert!(text.trim_end().ends_with("<http://x/id/> ."));
    }

    #[test]
    fn bulk_spool_names_count_no_additions() {
        let dir = tempdir().expect("tempdir");
        let client = Recording {
            fail: true,
            ..Recording::default()
        };
        let mut uploader = Uploader::new(client, bulk_options(dir.path())).expect("new");
        assert!(!uploader.upload_all(&edited()).expect("upload"));

        let files = pending_files(&dir.path().join("pending")).expect("list");
        assert_eq!(files.len(), 1);
        let name = files[0]
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .expect("name");
        assert!(name.contains("_add0_"));
        let text = fs::read_to_string(&files[0]).expect("read");
        assert!(!text.contains("INSERT DATA"));
    }

    #[test]
    fn save_queries_writes_instead_of_sending() {
        let dir = tempdir().expect("tempdir");
        let mut options = options(dir.path());
        options.save_queries = true;
        let mut uploader = Uploader::new(Recording::default(), options).expect("new");
        assert!(uploader.upload_all(&staged(3)).expect("upload"));

        assert!(uploader.client().sent.lock().is_empty());
        let files = pending_files(&dir.path().join("pending")).expect("list");
        assert_eq!(files.len(), 2);
        let saved = fs::read_to_string(&files[0]).expect("read");
        assert!(saved.starts_with("INSERT DATA"));
    }

    #[test]
    fn pending_name_is_content_hash() {
        let a = pending_file_name("INSERT DATA { }", 1, 0);
        let b = pending_file_name("INSERT DATA { }", 1, 0);
        assert_eq!(a, b);
        assert_eq!(a.len(), PENDING_HASH_LEN + "_add1_remove0.sparql".len());
    }
}
