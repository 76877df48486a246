//! # Fixed Primitives
//!
//! Compile-time constants shared by every provstore component.
//!
//! Defaults here mirror the values used by the corpus layout: 10 000 items
//! per directory bucket, 1 000 items per file bucket, and a `_` directory for
//! entities minted without a supplier prefix.

/// Default number of items per directory bucket.
pub const DEFAULT_DIR_SPLIT: u64 = 10_000;

/// Default number of items per file bucket.
pub const DEFAULT_N_FILE_ITEM: u64 = 1_000;

/// Directory used when an entity has no supplier prefix and no default is
/// configured.
pub const FALLBACK_BUCKET: &str = "_";

/// Sub-directory holding an entity's provenance history.
pub const HISTORY_DIR: &str = "prov";

/// File stem of a dataset root document.
pub const DATASET_INDEX_STEM: &str = "index";

// =============================================================================
// COUNTER FILE FORMAT
// =============================================================================

/// Width of a freshly created counter file line, newline included.
///
/// Two digits of payload plus `\n`.
pub const INITIAL_LINE_WIDTH: usize = 3;

/// Filler byte used to left-justify counter values inside a line.
pub const COUNTER_FILLER: u8 = b' ';

/// File name prefix for per-type entity counters.
pub const ENTITY_COUNTER_PREFIX: &str = "info_file_";

/// File name prefix for per-type snapshot counters.
pub const SNAPSHOT_COUNTER_PREFIX: &str = "prov_file_";

// =============================================================================
// UPLOAD
// =============================================================================

/// Default number of per-entity update statements grouped into one request.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Default number of attempts for a single batch before it is spooled.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the first retry, in milliseconds. Doubles per attempt.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 5_000;

/// Default statement cap for one bulk export chunk.
pub const DEFAULT_BULK_CHUNK_SIZE: usize = 1_000_000;

/// Separator between update statements sent in one request.
pub const UPDATE_SEPARATOR: &str = " ; ";

/// Extension of spooled update files.
pub const PENDING_EXTENSION: &str = "sparql";

/// Number of hex characters of the content hash used in spooled file names.
pub const PENDING_HASH_LEN: usize = 16;

// =============================================================================
// SNAPSHOT REGISTRY FORMAT
// =============================================================================

/// Magic bytes for the snapshot registry file header.
pub const MAGIC_BYTES: &[u8; 4] = b"PVSR";

/// Current snapshot registry format version.
///
/// Increment this when making breaking changes to the serialization format.
pub const FORMAT_VERSION: u8 = 1;
