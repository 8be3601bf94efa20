//! Error types for the Collada exporter.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using ExportError.
pub type Result<T> = std::result::Result<T, ExportError>;

/// Main error type for export, conversion and metadata import.
#[derive(Error, Debug)]
pub enum ExportError {
    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse JSON data (scene descriptions, config files).
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Failed to parse a Collada document.
    #[error("XML parse error: {0}")]
    Xml(#[from] roxmltree::Error),

    /// The finished document could not be moved to its destination.
    #[error("Failed to write document: {0}")]
    Persist(#[from] tempfile::PersistError),

    /// The scene graph references something that does not exist.
    #[error("Invalid scene: {0}")]
    InvalidScene(String),

    /// No converter path was configured.
    #[error("Converter path is not set; cannot convert to GR2")]
    ConverterNotConfigured,

    /// The configured converter path does not point at a file.
    #[error("Converter not found at {0}")]
    ConverterMissing(PathBuf),

    /// The converter ran and exited with a non-zero status.
    #[error("Conversion failed: {0}")]
    ConversionFailed(String),

    /// A file handed to the importer is not a usable Collada document.
    #[error("Import error: {0}")]
    Import(String),

    /// The export was aborted by the caller.
    #[error("Export cancelled")]
    Cancelled,
}

impl ExportError {
    /// Configuration errors only affect the conversion stage; the written
    /// document stays on disk.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ExportError::ConverterNotConfigured | ExportError::ConverterMissing(_)
        )
    }
}
