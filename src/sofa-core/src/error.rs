use std::path::PathBuf;

/// Errors raised by the client and entity layer.
///
/// HTTP error statuses are not errors: a 404 or 409 arrives as a normal
/// [`Response`](crate::Response) and callers branch on its status code.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required identity field was missing; no request was sent.
    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// Connection or protocol failure below HTTP.
    #[error("transport failure ({code}): {text}")]
    Transport { code: u32, text: String },

    #[error("could not read `{}`: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition(message.into())
    }

    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::Precondition(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
