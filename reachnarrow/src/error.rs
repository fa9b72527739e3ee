//! Error taxonomy shared across the analysis and the SBOM collaborators.

use std::path::PathBuf;

/// Errors surfaced by the library.
///
/// Only `EntryNotFound` and `DependencyExtractorFailed` are fatal to an
/// analysis; parse and import-resolution failures are absorbed inside the
/// builder so that reachability stays over-approximate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The entry file is absent or unreadable.
    #[error("entry file not found or unreadable: {0}")]
    EntryNotFound(PathBuf),

    /// The external dependency-extraction subprocess failed or produced
    /// unparseable output.
    #[error("dependency extractor failed: {0}")]
    DependencyExtractorFailed(String),

    /// An individual source file failed to parse.
    #[error("failed to parse source: {0}")]
    ParseFailure(String),

    /// No candidate path was found for an import.
    #[error("unresolved import: {0}")]
    ImportUnresolved(String),

    /// The orchestrator provided no target names.
    #[error("no target functions were provided")]
    TargetListEmpty,

    /// SBOM input matched neither accepted format.
    #[error("input failed schema validation: {0}")]
    SchemaValidation(String),

    /// A CVSS vector string could not be interpreted.
    #[error("malformed CVSS vector: {0}")]
    InvalidCvssVector(String),

    /// A collaborator fetch (advisory database, code host) failed.
    #[error("fetch failed for {url}: {reason}")]
    FetchFailed { url: String, reason: String },

    /// Filesystem error from the glue layers.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON decoding error from the glue layers.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
