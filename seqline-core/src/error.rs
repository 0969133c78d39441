//! Error taxonomy for generation and rendering

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal errors raised while turning commands into a rendered diagram.
///
/// Generation failures always carry the 1-based line number of the command
/// that triggered them. There is no recovery path: callers are expected to
/// keep the previous successful render and surface the message.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// Structural, semantic or configuration violation found while
    /// generating the sequence
    #[error("{message} at line {line}")]
    Generation { message: String, line: usize },

    /// The sequence names a theme the renderer does not know
    #[error("Unknown theme '{0}'")]
    UnknownTheme(String),

    /// Programmer-error-class violation inside the renderer; cannot occur
    /// for a generator-produced sequence
    #[error("internal renderer error: {0}")]
    Internal(String),
}

impl Error {
    pub(crate) fn at(message: impl Into<String>, line: usize) -> Self {
        Error::Generation {
            message: message.into(),
            line,
        }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Error::Internal(message.into())
    }
}
