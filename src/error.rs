use std::{io, path::PathBuf};
use thiserror::Error;

/// Raw input could not be turned into an absolute URL with a host.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid URL '{input}': {reason}")]
pub struct NormalizationError {
    pub input: String,
    pub reason: String,
}

/// Why a create-or-reuse request was rejected. None of these leave a
/// partial mapping behind.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShortenError {
    #[error("URL must not be empty")]
    EmptyUrl,

    #[error(transparent)]
    Normalization(#[from] NormalizationError),

    #[error("alias '{0}' must be 3–32 characters: letters, digits, '_' or '-'")]
    AliasInvalid(String),

    #[error("alias '{alias}' is already in use for {existing}")]
    AliasConflict { alias: String, existing: String },

    #[error("no free short code found after {0} attempts")]
    CodeSpaceExhausted(u32),
}

/// The listener could not bind the requested port nor the ephemeral fallback.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ChangePortError {
    #[error("port {0} is out of range (1024–65535)")]
    PortOutOfRange(u16),

    #[error(transparent)]
    Bind(#[from] ListenerError),
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to read {}: {source}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Save {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode link table: {0}")]
    Encode(#[from] csv::Error),
}
