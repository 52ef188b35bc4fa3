//! Hard ceilings for configurable safety limits.
//!
//! Operators may lower these limits through live configuration, but a
//! configured value above its ceiling cannot be honored by the backend
//! and is flagged at startup.

/// Maximum size of a single document body in bytes (8 MB).
///
/// The backend caps a transaction at 10 MB; 8 MB leaves headroom for
/// revision metadata and index mutations written in the same
/// transaction.
pub const MAX_DOCUMENT_SIZE: u64 = 8_000_000;

/// Maximum size of a single attachment in bytes (8 MB).
///
/// Attachments are written through the same transaction path as
/// documents and share the same headroom requirement.
pub const MAX_ATTACHMENT_SIZE: u64 = 8_000_000;

/// Maximum length of a document id in bytes (512).
///
/// Backend keys are capped at 10 KB; 512 leaves room for the directory
/// prefix, subspace tags, and index key components that wrap the id.
pub const MAX_DOCUMENT_ID_LENGTH: u64 = 512;

/// Maximum size of one stored binary chunk in bytes (100 KB).
///
/// This is the backend's hard limit on a single value. Larger blobs
/// must be split into chunks at or below this size.
pub const MAX_BINARY_CHUNK_SIZE: u64 = 100_000;

/// Byte limit for string-valued transaction options (16).
///
/// The backend rejects string option values of 16 bytes or more, so an
/// applied value must encode to strictly fewer bytes than this.
pub const MAX_STRING_OPTION_BYTES: usize = 16;
