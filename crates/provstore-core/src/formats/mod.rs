//! # Formats
//!
//! In-memory statement container plus the on-disk encodings:
//! - `json`: expanded JSON-LD documents
//! - `nquads`: line-oriented quads
//! - `persistence`: the binary snapshot registry

pub mod json;
pub mod nquads;
pub mod persistence;

pub use persistence::{RegistryHeader, registry_from_bytes, registry_to_bytes};

use crate::shard::OutputFormat;
use crate::{Iri, ProvstoreError, Quad, Triple};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{Cursor, Read, Write};

/// Statements grouped by named graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dataset {
    graphs: BTreeMap<Iri, BTreeSet<Triple>>,
}

impl Dataset {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, graph: Iri, triple: Triple) -> bool {
        self.graphs.entry(graph).or_default().insert(triple)
    }

    pub fn extend(&mut self, graph: &Iri, triples: impl IntoIterator<Item = Triple>) {
        let slot = self.graphs.entry(graph.clone()).or_default();
        slot.extend(triples);
    }

    /// Drop every statement about `subject`, in every graph.
    ///
    /// Graphs left empty are removed. Returns the number of statements dropped.
    pub fn remove_subject(&mut self, subject: &Iri) -> usize {
        let mut removed = 0;
        for triples in self.graphs.values_mut() {
            let before = triples.len();
            triples.retain(|t| &t.subject != subject);
            removed += before - triples.len();
        }
        self.graphs.retain(|_, triples| !triples.is_empty());
        removed
    }

    #[must_use]
    pub fn graph(&self, graph: &Iri) -> Option<&BTreeSet<Triple>> {
        self.graphs.get(graph)
    }

    pub fn graphs(&self) -> impl Iterator<Item = (&Iri, &BTreeSet<Triple>)> {
        self.graphs.iter()
    }

    pub fn quads(&self) -> impl Iterator<Item = Quad> + '_ {
        self.graphs.iter().flat_map(|(graph, triples)| {
            triples.iter().cloned().map(move |t| t.in_graph(graph))
        })
    }

    /// Total number of statements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.graphs.values().map(BTreeSet::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graphs.values().all(BTreeSet::is_empty)
    }

    // =========================================================================
    // ENCODING
    // =========================================================================

    /// Encode in `format`, optionally wrapped in a single-entry zip archive.
    pub fn to_bytes(
        &self,
        format: OutputFormat,
        zip_entry: Option<&str>,
    ) -> Result<Vec<u8>, ProvstoreError> {
        let raw = match format {
            OutputFormat::Json => json::render(self)?,
            OutputFormat::NQuads => nquads::render(self).into_bytes(),
        };
        match zip_entry {
            Some(name) => zip_single(name, &raw),
            None => Ok(raw),
        }
    }

    /// Decode bytes written by [`Self::to_bytes`] with the same arguments.
    pub fn from_bytes(
        bytes: &[u8],
        format: OutputFormat,
        zipped: bool,
    ) -> Result<Self, ProvstoreError> {
        let raw = if zipped {
            unzip_single(bytes)?
        } else {
            bytes.to_vec()
        };
        match format {
            OutputFormat::Json => json::parse(&raw),
            OutputFormat::NQuads => {
                let text = String::from_utf8(raw)
                    .map_err(|e| ProvstoreError::SerializationFailure(e.to_string()))?;
                nquads::parse(&text, None)
            }
        }
    }
}

fn zip_single(name: &str, raw: &[u8]) -> Result<Vec<u8>, ProvstoreError> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    writer
        .start_file(name, options)
        .map_err(|e| ProvstoreError::SerializationFailure(e.to_string()))?;
    writer.write_all(raw)?;
    let cursor = writer
        .finish()
        .map_err(|e| ProvstoreError::SerializationFailure(e.to_string()))?;
    Ok(cursor.into_inner())
}

fn unzip_single(bytes: &[u8]) -> Result<Vec<u8>, ProvstoreError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ProvstoreError::SerializationFailure(e.to_string()))?;
    if archive.len() != 1 {
        return Err(ProvstoreError::SerializationFailure(format!(
            "expected one archive entry, found {}",
            archive.len()
        )));
    }
    let mut entry = archive
        .by_index(0)
        .map_err(|e| ProvstoreError::SerializationFailure(e.to_string()))?;
    let mut out = Vec::new();
    entry.read_to_end(&mut out)?;
    Ok(out)
}
