use thiserror::Error;

use shoebox_core::CoreError;
use shoebox_store::StoreError;

/// Error surface of the catalog engine. Variants are stable kinds; the
/// payload is a human-readable description.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("unknown error: {0}")]
    Unknown(String),
    #[error("no admissible files found in {0}")]
    NoFilesFound(String),
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("attribute validation failure: {0}")]
    AttributeValidation(String),
    #[error("not implemented: {0}")]
    NotImplemented(String),
    #[error("invalid method argument: {0}")]
    InvalidArgument(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("database connection error: {0}")]
    Connection(String),
    #[error("import not found: {0}")]
    ImportNotFound(String),
    #[error("view reduce failure: {0}")]
    ViewReduce(String),
    #[error("probe failure: {0}")]
    Probe(String),
}

impl From<StoreError> for CatalogError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => CatalogError::NotFound(what),
            StoreError::Conflict(what) => CatalogError::Conflict(what),
            StoreError::Connection(what) => CatalogError::Connection(what),
            StoreError::Reduce(what) => CatalogError::ViewReduce(what),
            other => CatalogError::Unknown(other.to_string()),
        }
    }
}

impl From<CoreError> for CatalogError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Probe(what) => CatalogError::Probe(what),
            CoreError::InvalidInput(what) => CatalogError::InvalidArgument(what),
            CoreError::InvalidConfig(what) => CatalogError::InvalidConfig(what),
            CoreError::Io(what) => CatalogError::Unknown(what),
        }
    }
}
