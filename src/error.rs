use std::sync::Arc;

/// Errors surfaced by a chronicler and its collaborators.
///
/// `Clone` so one disposal outcome can be handed to every caller that awaits it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("invalid config: {0}")]
    Config(String),
    #[error("Object Disposed!")]
    Disposed,
    #[error("io error: {0}")]
    Io(Arc<std::io::Error>),
    #[error("serialize error: {0}")]
    Serialize(Arc<serde_json::Error>),
    #[error("no active archive file")]
    NoActiveFile,
    #[error("write scheduler stopped")]
    SchedulerStopped,
}

impl Error {
    pub fn is_disposed(&self) -> bool {
        matches!(self, Error::Disposed)
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::Io(Arc::new(value))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::Serialize(Arc::new(value))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
