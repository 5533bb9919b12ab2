//! Error type shared by every reader, writer and the split/join service.
//!
//! End-of-stream is never an error here: readers return `Ok(None)` (or
//! `Ok(false)` for in-place message reads) once the record sequence is
//! exhausted, and keep returning it on every later call.

use std::path::PathBuf;

/// Boxed source error produced by a marshaler collaborator.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Underlying open/read/write/close failure, including truncated frames
    /// and short writes.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// A record could not be serialized.
    #[error("encode {context}: {source}")]
    Encode {
        context: String,
        #[source]
        source: BoxError,
    },

    /// A record (or a compressed stream header) could not be deserialized.
    #[error("decode {context}: {source}")]
    Decode {
        context: String,
        #[source]
        source: BoxError,
    },

    /// Split failed to create or write a part; already created parts are removed.
    #[error("split part '{}': {source}", .part.display())]
    PartialCreate {
        part: PathBuf,
        #[source]
        source: Box<Error>,
    },

    /// Join failed while handling one of its parts.
    #[error("join {stage} '{}': {source}", .part.display())]
    Join {
        part: PathBuf,
        stage: &'static str,
        #[source]
        source: Box<Error>,
    },

    #[error("split limit must be greater than zero, got {0}")]
    InvalidLimit(usize),

    #[error("invalid state: {0}")]
    InvalidState(&'static str),
}

impl Error {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn encode(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Error::Encode {
            context: context.into(),
            source: source.into(),
        }
    }

    pub(crate) fn decode(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Error::Decode {
            context: context.into(),
            source: source.into(),
        }
    }

    pub(crate) fn join(part: impl Into<PathBuf>, stage: &'static str, source: Error) -> Self {
        Error::Join {
            part: part.into(),
            stage,
            source: Box::new(source),
        }
    }

    pub(crate) fn partial_create(part: impl Into<PathBuf>, source: Error) -> Self {
        Error::PartialCreate {
            part: part.into(),
            source: Box::new(source),
        }
    }

    /// `true` for decode failures, including ones wrapped by split/join.
    pub fn is_decode(&self) -> bool {
        match self {
            Error::Decode { .. } => true,
            Error::PartialCreate { source, .. } | Error::Join { source, .. } => source.is_decode(),
            _ => false,
        }
    }

    /// `true` for I/O failures, including ones wrapped by split/join.
    pub fn is_io(&self) -> bool {
        match self {
            Error::Io { .. } => true,
            Error::PartialCreate { source, .. } | Error::Join { source, .. } => source.is_io(),
            _ => false,
        }
    }
}

/// Attach a context string to an `io::Result`.
pub(crate) trait IoContext<T> {
    fn io_context<C, F>(self, f: F) -> Result<T>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn io_context<C, F>(self, f: F) -> Result<T>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        self.map_err(|e| Error::io(f(), e))
    }
}
