//! # Bulk Export
//!
//! Gzip-compressed N-Quads chunks for offline bulk loading. Chunks are
//! numbered `bulk_000000.nq.gz`, `bulk_000001.nq.gz`, ... and each holds at
//! most `chunk_size` statements. Numbering resumes after the highest chunk
//! already present in the directory.

use crate::{ProvstoreError, Quad};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const CHUNK_PREFIX: &str = "bulk_";
const CHUNK_SUFFIX: &str = ".nq.gz";

struct OpenChunk {
    path: PathBuf,
    encoder: GzEncoder<BufWriter<File>>,
    statements: usize,
}

/// Streams quads into size-capped gzip chunks.
pub struct BulkExporter {
    dir: PathBuf,
    chunk_size: usize,
    next_index: u64,
    current: Option<OpenChunk>,
    finished: Vec<PathBuf>,
}

impl std::fmt::Debug for BulkExporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkExporter")
            .field("dir", &self.dir)
            .field("chunk_size", &self.chunk_size)
            .field("next_index", &self.next_index)
            .finish_non_exhaustive()
    }
}

impl BulkExporter {
    pub fn new(dir: impl Into<PathBuf>, chunk_size: usize) -> Result<Self, ProvstoreError> {
        if chunk_size == 0 {
            return Err(ProvstoreError::InvalidArgument(
                "bulk chunk size must be positive".to_string(),
            ));
        }
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let next_index = next_chunk_index(&dir)?;
        Ok(Self {
            dir,
            chunk_size,
            next_index,
            current: None,
            finished: Vec::new(),
        })
    }

    /// Append quads, rotating to a new chunk whenever the cap is reached.
    pub fn append(&mut self, quads: impl IntoIterator<Item = Quad>) -> Result<usize, ProvstoreError> {
        let mut written = 0;
        for quad in quads {
            if self
                .current
                .as_ref()
                .is_none_or(|chunk| chunk.statements >= self.chunk_size)
            {
                self.rotate()?;
            }
            if let Some(chunk) = self.current.as_mut() {
                writeln!(chunk.encoder, "{quad}")?;
                chunk.statements += 1;
                written += 1;
            }
        }
        Ok(written)
    }

    fn rotate(&mut self) -> Result<(), ProvstoreError> {
        self.close_current()?;
        let path = self
            .dir
            .join(format!("{CHUNK_PREFIX}{:06}{CHUNK_SUFFIX}", self.next_index));
        self.next_index += 1;
        let file = File::create(&path)?;
        self.current = Some(OpenChunk {
            path,
            encoder: GzEncoder::new(BufWriter::new(file), Compression::default()),
            statements: 0,
        });
        Ok(())
    }

    fn close_current(&mut self) -> Result<(), ProvstoreError> {
        if let Some(chunk) = self.current.take() {
            let mut inner = chunk.encoder.finish()?;
            inner.flush()?;
            debug!(path = %chunk.path.display(), statements = chunk.statements, "Closed bulk chunk");
            self.finished.push(chunk.path);
        }
        Ok(())
    }

    /// Close the open chunk and return every chunk written so far.
    pub fn finish(&mut self) -> Result<Vec<PathBuf>, ProvstoreError> {
        self.close_current()?;
        Ok(self.finished.clone())
    }
}

fn next_chunk_index(dir: &Path) -> Result<u64, ProvstoreError> {
    let mut next = 0;
    for entry in fs::read_dir(dir)? {
        let name = entry?.file_name();
        let Some(name) = name.to_str() else { continue };
        let index = name
            .strip_prefix(CHUNK_PREFIX)
            .and_then(|rest| rest.strip_suffix(CHUNK_SUFFIX))
            .and_then(|digits| digits.parse::<u64>().ok());
        if let Some(index) = index {
            next = next.max(index + 1);
        }
    }
    Ok(next)
}
