//! Error types for melon operations.
//!
//! This module defines the main error type [`MelonError`] which represents
//! all possible errors that can occur while normalizing chapter content,
//! parsing headers, and manipulating the document model.
//!
//! # Example
//!
//! ```rust
//! use melon_core::{MelonError, Result};
//!
//! fn require_header(header: &str) -> Result<()> {
//!     if header.is_empty() {
//!         return Err(MelonError::Parsing("empty chapter header".to_string()));
//!     }
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for document-model and normalization operations.
///
/// Structural and contract violations (missing IDs, unresolved tags,
/// malformed language codes) propagate through this enum; expected
/// absences such as a chapter missing at the source use dedicated
/// variants so bulk loops can catch and skip them.
#[derive(Error, Debug)]
pub enum MelonError {
    /// Language code failed the ISO 639-3 shape check
    /// (exactly 3 lowercase alphabetic characters).
    #[error("Invalid language code \"{0}\": must be 3 lowercase letters")]
    InvalidLanguageCode(String),

    /// Attempt to set a non-standard key on a words dictionary.
    ///
    /// Arbitrary extra keys belong in the additional-data side map.
    #[error("Key \"{0}\" is non-standard; use additional data")]
    UnknownDictionaryKey(String),

    /// A tag outside the content whitelist was found during strict
    /// validation. Fatal for the enclosing paragraph.
    #[error("Unresolved tag \"{0}\"")]
    UnresolvedTag(String),

    /// Generic parsing/contract violation (missing required ID,
    /// wrong content kind for a chapter, and similar).
    #[error("Parsing error: {0}")]
    Parsing(String),

    /// Lookup by chapter ID found nothing.
    #[error("Chapter {0} not found")]
    ChapterNotFound(i64),

    /// Merge source chapter carried content but no resolvable ID.
    #[error("Merging error: {0}")]
    Merging(String),

    /// The JSON document declares a format this build does not handle.
    #[error("Unsupported format{}", .0.as_deref().map(|f| format!(" \"{f}\"")).unwrap_or_default())]
    UnsupportedFormat(Option<String>),

    /// A volume/chapter number segment was non-numeric after cleaning.
    ///
    /// Treated as a data-integrity bug in upstream input, not recovered.
    #[error("Invalid chapter numeration \"{0}\"")]
    InvalidNumber(String),

    /// Inline image payload was not valid Base64.
    #[error("Invalid Base64 image payload: {0}")]
    InvalidBase64(String),

    /// No local JSON document resolved for the given identificator.
    #[error("Title file not found for \"{0}\"")]
    TitleFileNotFound(String),

    /// Referenced file does not exist.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Image URL failed to parse.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Filesystem errors while reading/writing documents or images.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors from reqwest.
    #[cfg(feature = "fetch")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for MelonError.
///
/// This is a convenience alias for `std::result::Result<T, MelonError>`.
pub type Result<T> = std::result::Result<T, MelonError>;
