use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("revision conflict on {0}")]
    Conflict(String),
    #[error("database connection error: {0}")]
    Connection(String),
    #[error("unknown view: {0}")]
    UnknownView(String),
    #[error("reduce failure: {0}")]
    Reduce(String),
    #[error("invalid document: {0}")]
    InvalidDoc(String),
    #[error("storage error: {0}")]
    Backend(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;
        match &err {
            rusqlite::Error::SqliteFailure(inner, _) => match inner.code {
                ErrorCode::CannotOpen
                | ErrorCode::NotADatabase
                | ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked => StoreError::Connection(err.to_string()),
                _ => StoreError::Backend(err.to_string()),
            },
            _ => StoreError::Backend(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::InvalidDoc(err.to_string())
    }
}
