//! Error types shared across the sync pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Invalid or inconsistent configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no targets configured")]
    NoTargets,

    #[error("invalid target URL '{url}': {reason}")]
    InvalidTarget { url: String, reason: String },

    #[error("invalid exclude pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("retry attempts must be at least 1")]
    NoAttempts,
}

/// Failure while turning a package into an archive on disk.
///
/// These are usually transient: a file can disappear between the moment a
/// change was reported and the moment its content is read.
#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to walk {}: {source}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("failed to write archive {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<AssemblyError>,
    },
}

/// Coarse classification of a failed push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushErrorKind {
    /// The target could not be reached or reported itself unhealthy.
    Transport,
    /// The request reached the target but was rejected.
    Protocol,
    /// The package was accepted but installing some nodes failed.
    RemoteNode,
    /// Nothing was sent: the archive could not be read on this machine.
    Local,
}

/// Failure delivering one archive to one target.
#[derive(Debug, Clone, Error)]
pub enum PushError {
    #[error("target not ready")]
    NotReady,

    #[error("target unreachable: {0}")]
    Unreachable(String),

    #[error("failed to read archive: {0}")]
    Archive(String),

    #[error("request rejected: {status}")]
    Rejected { status: String },

    #[error("unexpected response format")]
    UnexpectedResponse,

    #[error("error installing nodes:\n{}", lines.join("\n"))]
    NodeInstall { lines: Vec<String> },

    #[error("{message} (status {code})")]
    Status { code: String, message: String },

    /// Free-form failure reported by a custom delivery implementation.
    #[error("{0}")]
    Other(String),
}

impl PushError {
    pub fn kind(&self) -> PushErrorKind {
        match self {
            PushError::NotReady | PushError::Unreachable(_) => PushErrorKind::Transport,
            PushError::Archive(_) => PushErrorKind::Local,
            PushError::Rejected { .. } | PushError::UnexpectedResponse | PushError::Other(_) => {
                PushErrorKind::Protocol
            }
            PushError::NodeInstall { .. } | PushError::Status { .. } => PushErrorKind::RemoteNode,
        }
    }
}
