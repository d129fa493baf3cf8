use std::{fmt, io, path::PathBuf};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed {what}: {reason}")]
    MalformedFormat { what: &'static str, reason: String },

    #[error("truncated {what}: {reason}")]
    TruncatedData { what: &'static str, reason: String },

    /// A kirbi file carried more than one ticket.
    #[error("interchange file holds {count} tickets, only single ticket files are supported")]
    UnsupportedMultiTicket { count: usize },

    #[error("index {index} is out of range for a cache of {len} entries")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("{target}: no realm given and no default realm is defined")]
    MissingRealm { target: String },

    #[error("{path}: refusing a path with a parent directory traversal")]
    UnsafePath { path: String },

    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    /// Terminal state of a cache driven delegation: every candidate failed.
    #[error("none of the {} cached tickets could be used{}", .0.len(), ReasonList(.0))]
    ExhaustedCandidates(Vec<ExchangeError>),

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path}: {source}")]
    InFile {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },

    #[error("configuration: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn malformed(what: &'static str, reason: impl Into<String>) -> Self {
        Self::MalformedFormat {
            what,
            reason: reason.into(),
        }
    }

    pub(crate) fn truncated(what: &'static str, reason: impl Into<String>) -> Self {
        Self::TruncatedData {
            what,
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Attaches the file the error came from, unless it already names one.
    pub(crate) fn in_file(self, path: impl Into<PathBuf>) -> Self {
        match self {
            Self::Io { .. } | Self::InFile { .. } => self,
            other => Self::InFile {
                path: path.into(),
                source: Box::new(other),
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Io { source, .. } => source.kind() == io::ErrorKind::NotFound,
            Self::InFile { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Failure reasons collected while exhausting delegation candidates.
    pub fn candidate_failures(&self) -> &[ExchangeError] {
        match self {
            Self::ExhaustedCandidates(failures) => failures,
            _ => &[],
        }
    }
}

/// Failure of one ticket exchange, tagged with what it was attempted for.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{source_identifier}: {reason}")]
pub struct ExchangeError {
    pub source_identifier: String,
    pub reason: String,
}

impl ExchangeError {
    pub fn new(source_identifier: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            source_identifier: source_identifier.into(),
            reason: reason.into(),
        }
    }
}

struct ReasonList<'a>(&'a [ExchangeError]);

impl fmt::Display for ReasonList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for failure in self.0 {
            write!(f, "\n  {}", failure)?;
        }
        Ok(())
    }
}
