use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("probe failure: {0}")]
    Probe(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::Io(err.to_string())
    }
}

impl From<walkdir::Error> for CoreError {
    fn from(err: walkdir::Error) -> Self {
        CoreError::Io(err.to_string())
    }
}
