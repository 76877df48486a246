//! # Vocabulary
//!
//! The handful of IRIs the core itself writes. Domain vocabularies used by
//! entity accessors live with those accessors, not here.

pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";

pub const XSD_DATE_TIME: &str = "http://www.w3.org/2001/XMLSchema#dateTime";

pub const PROV_ENTITY: &str = "http://www.w3.org/ns/prov#Entity";
pub const PROV_SPECIALIZATION_OF: &str = "http://www.w3.org/ns/prov#specializationOf";
pub const PROV_GENERATED_AT_TIME: &str = "http://www.w3.org/ns/prov#generatedAtTime";
pub const PROV_INVALIDATED_AT_TIME: &str = "http://www.w3.org/ns/prov#invalidatedAtTime";
pub const PROV_WAS_DERIVED_FROM: &str = "http://www.w3.org/ns/prov#wasDerivedFrom";
pub const PROV_HAD_PRIMARY_SOURCE: &str = "http://www.w3.org/ns/prov#hadPrimarySource";
pub const PROV_WAS_ATTRIBUTED_TO: &str = "http://www.w3.org/ns/prov#wasAttributedTo";

pub const DCTERMS_DESCRIPTION: &str = "http://purl.org/dc/terms/description";
pub const OCO_HAS_UPDATE_QUERY: &str = "https://w3id.org/oc/ontology/hasUpdateQuery";

pub const PRO_ROLE_IN_TIME: &str = "http://purl.org/spar/pro/RoleInTime";
pub const BIRO_BIBLIOGRAPHIC_REFERENCE: &str = "http://purl.org/spar/biro/BibliographicReference";
pub const FABIO_EXPRESSION: &str = "http://purl.org/spar/fabio/Expression";
pub const CITO_CITATION: &str = "http://purl.org/spar/cito/Citation";
pub const DEO_DISCOURSE_ELEMENT: &str = "http://purl.org/spar/deo/DiscourseElement";
pub const DATACITE_IDENTIFIER: &str = "http://purl.org/spar/datacite/Identifier";
pub const C4O_SINGLE_LOCATION_POINTER_LIST: &str =
    "http://purl.org/spar/c4o/SingleLocationPointerList";
pub const FOAF_AGENT: &str = "http://xmlns.com/foaf/0.1/Agent";
pub const FABIO_MANIFESTATION: &str = "http://purl.org/spar/fabio/Manifestation";
pub const C4O_IN_TEXT_REFERENCE_POINTER: &str = "http://purl.org/spar/c4o/InTextReferencePointer";
