//! # Snapshot Registry Format
//!
//! Binary serialization of snapshot records, so restore and merge lookups
//! survive restarts.
//!
//! Format: Header (5 bytes) + postcard-serialized record list.
//! - 4 bytes: Magic ("PVSR")
//! - 1 byte: Version
//!
//! Size and header are validated before the payload is deserialized.

use crate::provenance::SnapshotRecord;
use crate::{ProvstoreError, primitives};

/// Maximum accepted registry size.
pub const MAX_REGISTRY_SIZE: usize = 256 * 1024 * 1024; // 256 MB

const HEADER_LEN: usize = 5;

// =============================================================================
// FILE HEADER
// =============================================================================

/// The header preceding every registry payload.
#[derive(Debug, Clone, Copy)]
pub struct RegistryHeader {
    pub magic: [u8; 4],
    pub version: u8,
}

impl RegistryHeader {
    #[must_use]
    pub fn new() -> Self {
        Self {
            magic: *primitives::MAGIC_BYTES,
            version: primitives::FORMAT_VERSION,
        }
    }

    pub fn validate(&self) -> Result<(), ProvstoreError> {
        if &self.magic != primitives::MAGIC_BYTES {
            return Err(ProvstoreError::SerializationFailure(
                "Invalid magic bytes".to_string(),
            ));
        }
        if self.version != primitives::FORMAT_VERSION {
            return Err(ProvstoreError::SerializationFailure(format!(
                "Unsupported version: {} (expected {})",
                self.version,
                primitives::FORMAT_VERSION
            )));
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProvstoreError> {
        if bytes.len() < HEADER_LEN {
            return Err(ProvstoreError::SerializationFailure(
                "Header too short".to_string(),
            ));
        }
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        Ok(Self {
            magic,
            version: bytes[4],
        })
    }
}

impl Default for RegistryHeader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// SERIALIZATION
// =============================================================================

/// Serialize records to bytes (header + payload).
pub fn registry_to_bytes<'a>(
    records: impl IntoIterator<Item = &'a SnapshotRecord>,
) -> Result<Vec<u8>, ProvstoreError> {
    let records: Vec<&SnapshotRecord> = records.into_iter().collect();
    let payload = postcard::to_stdvec(&records)
        .map_err(|e| ProvstoreError::SerializationFailure(e.to_string()))?;

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&RegistryHeader::new().to_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Deserialize records written by [`registry_to_bytes`].
pub fn registry_from_bytes(bytes: &[u8]) -> Result<Vec<SnapshotRecord>, ProvstoreError> {
    if bytes.len() < HEADER_LEN {
        return Err(ProvstoreError::SerializationFailure(format!(
            "Data too short: minimum {HEADER_LEN} bytes required"
        )));
    }
    if bytes.len() > MAX_REGISTRY_SIZE {
        return Err(ProvstoreError::SerializationFailure(format!(
            "Data size {} bytes exceeds maximum allowed {} bytes",
            bytes.len(),
            MAX_REGISTRY_SIZE
        )));
    }

    let header = RegistryHeader::from_bytes(bytes)?;
    header.validate()?;

    postcard::from_bytes(&bytes[HEADER_LEN..]).map_err(|e| {
        ProvstoreError::SerializationFailure(format!("Failed to deserialize registry: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iri::{EntityIri, SnapshotId};
    use crate::provenance::SnapshotKind;
    use crate::{EntityType, Iri};
    use chrono::{TimeZone, Utc};

    fn record(n: u64) -> SnapshotRecord {
        let subject =
            EntityIri::new("http://x/", EntityType::BibliographicResource, "060", 7).expect("iri");
        let at = Utc
            .with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
            .single()
            .expect("time");
        SnapshotRecord {
            id: SnapshotId::new(subject.clone(), n),
            kind: if n == 1 {
                SnapshotKind::Creation
            } else {
                SnapshotKind::Modification
            },
            generated_at: at,
            invalidated_at: None,
            derived_from: (n > 1)
                .then(|| SnapshotId::new(subject, n - 1))
                .into_iter()
                .collect(),
            primary_source: None,
            resp_agent: Some(Iri::new("https://orcid.org/0000-0000-0000-0000")),
            description: "d".to_string(),
            update_query: None,
        }
    }

    #[test]
    fn registry_roundtrip() {
        let records = vec![record(1), record(2)];
        let bytes = registry_to_bytes(&records).expect("serialize");
        assert_eq!(&bytes[..4], primitives::MAGIC_BYTES);
        let back = registry_from_bytes(&bytes).expect("deserialize");
        assert_eq!(back, records);
    }

    #[test]
    fn invalid_magic_rejected() {
        let mut bytes = vec![0u8; 10];
        bytes[0..4].copy_from_slice(b"XXXX");
        assert!(registry_from_bytes(&bytes).is_err());
    }

    #[test]
    fn short_input_rejected() {
        assert!(registry_from_bytes(b"PVS").is_err());
    }
}
