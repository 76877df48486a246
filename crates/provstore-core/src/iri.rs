//! # Identifier Grammar
//!
//! Entities are named `{base}{short}/{prefix}{count}`, where the optional
//! supplier prefix matches `0[1-9]+0` and the count matches `[1-9][0-9]*`.
//! Snapshots hang off their subject as `{entity}/prov/se/{n}`, and a dataset
//! root is just `{base}{short}/`.

use crate::{EntityType, Iri, ProvstoreError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A parsed entity identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityIri {
    base: String,
    entity_type: EntityType,
    prefix: String,
    number: u64,
}

impl EntityIri {
    /// Build an identifier from its parts.
    pub fn new(
        base: impl Into<String>,
        entity_type: EntityType,
        prefix: impl Into<String>,
        number: u64,
    ) -> Result<Self, ProvstoreError> {
        let prefix = prefix.into();
        if entity_type.is_provenance() {
            return Err(ProvstoreError::InvalidArgument(
                "snapshots are named after their subject, not minted directly".to_string(),
            ));
        }
        if number == 0 {
            return Err(ProvstoreError::InvalidArgument(
                "entity numbers start at 1".to_string(),
            ));
        }
        validate_prefix(&prefix)?;
        Ok(Self {
            base: base.into(),
            entity_type,
            prefix,
            number,
        })
    }

    /// Parse a full IRI string against the configured base.
    pub fn parse(base: &str, iri: &str) -> Result<Self, ProvstoreError> {
        match Identifier::parse(base, iri)? {
            Identifier::Entity(entity) => Ok(entity),
            _ => Err(ProvstoreError::InvalidArgument(format!(
                "'{iri}' is not an entity identifier"
            ))),
        }
    }

    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    #[must_use]
    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    /// Supplier prefix, empty when the entity was minted without one.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    #[must_use]
    pub fn number(&self) -> u64 {
        self.number
    }

    #[must_use]
    pub fn iri(&self) -> Iri {
        Iri::new(self.to_string())
    }

    /// Named graph holding every entity of this type.
    #[must_use]
    pub fn graph_iri(&self) -> Iri {
        Iri::new(format!("{}{}/", self.base, self.entity_type.short_name()))
    }

    /// Named graph holding this entity's snapshots.
    #[must_use]
    pub fn prov_graph_iri(&self) -> Iri {
        Iri::new(format!("{self}/prov/"))
    }
}

impl fmt::Display for EntityIri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}/{}{}",
            self.base,
            self.entity_type.short_name(),
            self.prefix,
            self.number
        )
    }
}

/// Identity of one snapshot: its subject plus the subject-local sequence number.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SnapshotId {
    pub subject: EntityIri,
    pub number: u64,
}

impl SnapshotId {
    #[must_use]
    pub fn new(subject: EntityIri, number: u64) -> Self {
        Self { subject, number }
    }

    #[must_use]
    pub fn iri(&self) -> Iri {
        Iri::new(self.to_string())
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/prov/{}/{}",
            self.subject,
            EntityType::Snapshot.short_name(),
            self.number
        )
    }
}

/// Any identifier the resolver understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identifier {
    Entity(EntityIri),
    Snapshot(SnapshotId),
    /// Root of a whole type's dataset, e.g. `{base}br/`.
    Dataset(EntityType),
}

impl Identifier {
    pub fn parse(base: &str, iri: &str) -> Result<Self, ProvstoreError> {
        let rest = iri.strip_prefix(base).ok_or_else(|| {
            ProvstoreError::InvalidArgument(format!("'{iri}' is outside base '{base}'"))
        })?;
        let parts: Vec<&str> = rest.split('/').collect();

        match parts.as_slice() {
            [short, ""] => Ok(Self::Dataset(EntityType::from_short_name(short)?)),
            [short, local] => {
                let entity_type = graph_type(short)?;
                let (prefix, number) = split_local_name(local)?;
                Ok(Self::Entity(EntityIri::new(
                    base,
                    entity_type,
                    prefix,
                    number,
                )?))
            }
            [short, local, "prov", "se", seq] => {
                let entity_type = graph_type(short)?;
                let (prefix, number) = split_local_name(local)?;
                let subject = EntityIri::new(base, entity_type, prefix, number)?;
                let seq = seq.parse::<u64>().ok().filter(|n| *n > 0).ok_or_else(|| {
                    ProvstoreError::InvalidArgument(format!("malformed snapshot number in '{iri}'"))
                })?;
                Ok(Self::Snapshot(SnapshotId::new(subject, seq)))
            }
            _ => Err(ProvstoreError::InvalidArgument(format!(
                "unrecognised identifier '{iri}'"
            ))),
        }
    }
}

fn graph_type(short: &str) -> Result<EntityType, ProvstoreError> {
    let ty = EntityType::from_short_name(short)?;
    if ty.is_provenance() {
        return Err(ProvstoreError::InvalidArgument(
            "snapshot identifiers must be nested under a subject".to_string(),
        ));
    }
    Ok(ty)
}

/// Split `{prefix}{count}` into its supplier prefix and numeric count.
pub fn split_local_name(local: &str) -> Result<(String, u64), ProvstoreError> {
    let malformed =
        || ProvstoreError::InvalidArgument(format!("malformed numeric identifier '{local}'"));

    let bytes = local.as_bytes();
    if bytes.is_empty() || !bytes.iter().all(u8::is_ascii_digit) {
        return Err(malformed());
    }

    let mut prefix_len = 0;
    if bytes[0] == b'0' {
        let mut i = 1;
        while i < bytes.len() && bytes[i] != b'0' {
            i += 1;
        }
        if i == 1 || i >= bytes.len() {
            return Err(malformed());
        }
        prefix_len = i + 1;
    }

    let count = &local[prefix_len..];
    if count.is_empty() || count.starts_with('0') {
        return Err(malformed());
    }
    let number = count.parse::<u64>().map_err(|_| malformed())?;
    Ok((local[..prefix_len].to_string(), number))
}

fn validate_prefix(prefix: &str) -> Result<(), ProvstoreError> {
    if prefix.is_empty() {
        return Ok(());
    }
    let bytes = prefix.as_bytes();
    let valid = bytes.len() >= 3
        && bytes[0] == b'0'
        && bytes[bytes.len() - 1] == b'0'
        && bytes[1..bytes.len() - 1]
            .iter()
            .all(|b| (b'1'..=b'9').contains(b));
    if valid {
        Ok(())
    } else {
        Err(ProvstoreError::InvalidArgument(format!(
            "supplier prefix '{prefix}' must match 0[1-9]+0"
        )))
    }
}

// =============================================================================
// TESTS
// =============================================================================
