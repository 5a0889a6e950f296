use thiserror::Error;

/// Classifies a [`Error`] for callers that need to branch on failure mode
/// (retry, surface, ignore) without inspecting the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Malformed caller input: bad time window, symbol too short, wrong
    /// day-of-paths count. Never retried.
    InvalidArgument,

    /// A cache tier does not have the requested item. This is a local
    /// signal between tiers and is never surfaced past the cache chain.
    NotFound,

    /// The leaf fetcher hit the vendor's rate-limit marker. Retried with
    /// backoff up to the configured attempt count.
    Transient,

    /// Filesystem, object-store, or network failure that isn't a
    /// recognized rate-limit response.
    Io,

    /// An internal invariant was violated (e.g. more than 24 H1 bars in a
    /// day). Treated as fatal; likely a bug in this crate or its caller.
    IllegalState,

    /// A forward/backward count extension ran out of data before
    /// collecting the requested count.
    Exhausted,
}

/// Error type for every fallible operation in this crate.
#[derive(Error, Debug)]
#[error("{kind:?}: {message}")]
pub struct Error {
    pub kind: Kind,
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    pub fn new(kind: Kind, message: impl Into<String>) -> Self {
        Error {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        kind: Kind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Error::new(Kind::InvalidArgument, message)
    }

    pub fn illegal_state(message: impl Into<String>) -> Self {
        Error::new(Kind::IllegalState, message)
    }

    pub fn exhausted(message: impl Into<String>) -> Self {
        Error::new(Kind::Exhausted, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Error::new(Kind::Io, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Error::new(Kind::Transient, message)
    }

    /// Does this error's diagnostic contain the configured rate-limit
    /// marker string (default `"503"`)? Used by the leaf fetcher to decide
    /// whether to retry.
    pub fn contains_marker(&self, marker: &str) -> bool {
        self.message.contains(marker)
            || self
                .source
                .as_ref()
                .map(|s| s.to_string().contains(marker))
                .unwrap_or(false)
    }
}
