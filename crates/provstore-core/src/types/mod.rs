//! # Core Type Definitions
//!
//! This module contains the statement model and the shared error type:
//! - Identifiers and terms (`Iri`, `Term`, `Literal`)
//! - Statements (`Triple`, `Quad`)
//! - The closed set of entity types (`EntityType`)
//! - Error types (`ProvstoreError`)
//!
//! ## Determinism Guarantees
//!
//! Every type here implements `Ord`, so statement sets are `BTreeSet`s and
//! every rendering of a set comes out in the same order on every run.

use crate::vocab;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// IRI
// =============================================================================

/// An absolute IRI, stored without angle brackets.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Iri(pub String);

impl Iri {
    /// Create a new IRI from a string.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the IRI as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Iri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.0)
    }
}

impl From<&str> for Iri {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// =============================================================================
// TERMS
// =============================================================================

/// A literal value with an optional datatype or language tag.
///
/// A literal carries at most one of the two; `language` wins on render.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Literal {
    pub lexical: String,
    pub datatype: Option<Iri>,
    pub language: Option<String>,
}

impl Literal {
    /// Plain string literal.
    #[must_use]
    pub fn simple(lexical: impl Into<String>) -> Self {
        Self {
            lexical: lexical.into(),
            datatype: None,
            language: None,
        }
    }

    /// Literal with an explicit datatype.
    #[must_use]
    pub fn typed(lexical: impl Into<String>, datatype: impl Into<String>) -> Self {
        Self {
            lexical: lexical.into(),
            datatype: Some(Iri::new(datatype)),
            language: None,
        }
    }

    /// Language-tagged string.
    #[must_use]
    pub fn tagged(lexical: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            lexical: lexical.into(),
            datatype: None,
            language: Some(language.into()),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", escape_literal(&self.lexical))?;
        if let Some(lang) = &self.language {
            write!(f, "@{lang}")
        } else if let Some(dt) = &self.datatype {
            write!(f, "^^{dt}")
        } else {
            Ok(())
        }
    }
}

/// The object position of a statement.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Term {
    Iri(Iri),
    Blank(String),
    Literal(Literal),
}

impl Term {
    /// IRI term.
    #[must_use]
    pub fn iri(s: impl Into<String>) -> Self {
        Self::Iri(Iri::new(s))
    }

    /// Plain string literal term.
    #[must_use]
    pub fn literal(s: impl Into<String>) -> Self {
        Self::Literal(Literal::simple(s))
    }

    /// Returns the IRI when this term is one.
    #[must_use]
    pub fn as_iri(&self) -> Option<&Iri> {
        match self {
            Self::Iri(iri) => Some(iri),
            _ => None,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Iri(iri) => iri.fmt(f),
            Self::Blank(label) => write!(f, "_:{label}"),
            Self::Literal(lit) => lit.fmt(f),
        }
    }
}

/// Escape a literal's lexical form for N-Triples / SPARQL output.
#[must_use]
pub fn escape_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}

// =============================================================================
// STATEMENTS
// =============================================================================

/// One statement about an entity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Triple {
    pub subject: Iri,
    pub predicate: Iri,
    pub object: Term,
}

impl Triple {
    /// Create a new triple.
    #[must_use]
    pub fn new(subject: impl Into<String>, predicate: impl Into<String>, object: Term) -> Self {
        Self {
            subject: Iri::new(subject),
            predicate: Iri::new(predicate),
            object,
        }
    }

    /// Attach this triple to a named graph.
    #[must_use]
    pub fn in_graph(self, graph: &Iri) -> Quad {
        Quad {
            triple: self,
            graph: graph.clone(),
        }
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} .", self.subject, self.predicate, self.object)
    }
}

/// A triple tagged with the graph that owns it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Quad {
    pub triple: Triple,
    pub graph: Iri,
}

impl fmt::Display for Quad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} .",
            self.triple.subject, self.triple.predicate, self.triple.object, self.graph
        )
    }
}

// =============================================================================
// ENTITY TYPES
// =============================================================================

/// The fixed set of entity kinds in the corpus.
///
/// Every kind-dependent decision (counter namespace, label, base class,
/// directory name) goes through an exhaustive match on this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityType {
    AgentRole,
    BibliographicReference,
    BibliographicResource,
    Citation,
    DiscourseElement,
    Identifier,
    PointerList,
    ResponsibleAgent,
    ResourceEmbodiment,
    ReferencePointer,
    /// Provenance snapshot. Append-only.
    Snapshot,
}

impl EntityType {
    /// Every graph (non-provenance) entity type.
    pub const GRAPH_TYPES: [EntityType; 10] = [
        Self::AgentRole,
        Self::BibliographicReference,
        Self::BibliographicResource,
        Self::Citation,
        Self::DiscourseElement,
        Self::Identifier,
        Self::PointerList,
        Self::ResponsibleAgent,
        Self::ResourceEmbodiment,
        Self::ReferencePointer,
    ];

    /// Two-letter tag used in identifiers, counters and directory names.
    #[must_use]
    pub const fn short_name(self) -> &'static str {
        match self {
            Self::AgentRole => "ar",
            Self::BibliographicReference => "be",
            Self::BibliographicResource => "br",
            Self::Citation => "ci",
            Self::DiscourseElement => "de",
            Self::Identifier => "id",
            Self::PointerList => "pl",
            Self::ResponsibleAgent => "ra",
            Self::ResourceEmbodiment => "re",
            Self::ReferencePointer => "rp",
            Self::Snapshot => "se",
        }
    }

    /// Human-readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::AgentRole => "agent role",
            Self::BibliographicReference => "bibliographic reference",
            Self::BibliographicResource => "bibliographic resource",
            Self::Citation => "citation",
            Self::DiscourseElement => "discourse element",
            Self::Identifier => "identifier",
            Self::PointerList => "single location pointer list",
            Self::ResponsibleAgent => "responsible agent",
            Self::ResourceEmbodiment => "resource embodiment",
            Self::ReferencePointer => "in-text reference pointer",
            Self::Snapshot => "snapshot of entity metadata",
        }
    }

    /// The base class asserted by the primary type statement.
    #[must_use]
    pub const fn base_class(self) -> &'static str {
        match self {
            Self::AgentRole => vocab::PRO_ROLE_IN_TIME,
            Self::BibliographicReference => vocab::BIRO_BIBLIOGRAPHIC_REFERENCE,
            Self::BibliographicResource => vocab::FABIO_EXPRESSION,
            Self::Citation => vocab::CITO_CITATION,
            Self::DiscourseElement => vocab::DEO_DISCOURSE_ELEMENT,
            Self::Identifier => vocab::DATACITE_IDENTIFIER,
            Self::PointerList => vocab::C4O_SINGLE_LOCATION_POINTER_LIST,
            Self::ResponsibleAgent => vocab::FOAF_AGENT,
            Self::ResourceEmbodiment => vocab::FABIO_MANIFESTATION,
            Self::ReferencePointer => vocab::C4O_IN_TEXT_REFERENCE_POINTER,
            Self::Snapshot => vocab::PROV_ENTITY,
        }
    }

    /// Whether this type is append-only provenance.
    #[must_use]
    pub const fn is_provenance(self) -> bool {
        matches!(self, Self::Snapshot)
    }

    /// Parse a two-letter tag.
    pub fn from_short_name(tag: &str) -> Result<Self, ProvstoreError> {
        match tag {
            "ar" => Ok(Self::AgentRole),
            "be" => Ok(Self::BibliographicReference),
            "br" => Ok(Self::BibliographicResource),
            "ci" => Ok(Self::Citation),
            "de" => Ok(Self::DiscourseElement),
            "id" => Ok(Self::Identifier),
            "pl" => Ok(Self::PointerList),
            "ra" => Ok(Self::ResponsibleAgent),
            "re" => Ok(Self::ResourceEmbodiment),
            "rp" => Ok(Self::ReferencePointer),
            "se" => Ok(Self::Snapshot),
            other => Err(ProvstoreError::InvalidArgument(format!(
                "unknown entity type tag '{other}'"
            ))),
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in provstore.
///
/// - `InvalidArgument` and `InvalidState` abort the operation that raised them
/// - `TransportFailure` is caught at the upload batch boundary and spooled
/// - Nothing is dropped silently
#[derive(Debug, Error)]
pub enum ProvstoreError {
    /// A caller passed a value the operation cannot accept.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation is not allowed in the current state of an entity or store.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The remote store was unreachable or rejected a request.
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    /// A graph could not be rendered or parsed in the requested format.
    #[error("Serialization failure: {0}")]
    SerializationFailure(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for ProvstoreError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_escaping() {
        let lit = Literal::simple("say \"hi\"\nnow");
        assert_eq!(lit.to_string(), r#""say \"hi\"\nnow""#);
    }

    #[test]
    fn typed_and_tagged_literals_render() {
        let typed = Literal::typed("2024-01-01T00:00:00Z", vocab::XSD_DATE_TIME);
        assert_eq!(
            typed.to_string(),
            "\"2024-01-01T00:00:00Z\"^^<http://www.w3.org/2001/XMLSchema#dateTime>"
        );
        assert_eq!(Literal::tagged("titolo", "it").to_string(), "\"titolo\"@it");
    }

    #[test]
    fn quad_renders_graph_last() {
        let quad = Triple::new("http://a/br/1", "http://p", Term::iri("http://a/br/2"))
            .in_graph(&Iri::new("http://a/br/"));
        assert_eq!(
            quad.to_string(),
            "<http://a/br/1> <http://p> <http://a/br/2> <http://a/br/> ."
        );
    }

    #[test]
    fn short_names_roundtrip() {
        for ty in EntityType::GRAPH_TYPES {
            assert_eq!(EntityType::from_short_name(ty.short_name()).ok(), Some(ty));
        }
        assert!(EntityType::from_short_name("zz").is_err());
    }

    #[test]
    fn only_snapshots_are_provenance() {
        assert!(EntityType::Snapshot.is_provenance());
        assert!(
            EntityType::GRAPH_TYPES
                .iter()
                .all(|ty| !ty.is_provenance())
        );
    }
}
