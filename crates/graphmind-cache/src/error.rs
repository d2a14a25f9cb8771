//! Cache-layer errors.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    /// The on-disk artifact failed structural validation. The file is
    /// treated as absent and rebuilt; it is never partially trusted.
    #[error("corrupted cache artifact: {reason}")]
    Corrupted { reason: &'static str },

    #[error("cache i/o failed: {0}")]
    Io(#[from] std::io::Error),

    /// The JSON sidecar was readable but did not describe a valid entry.
    #[error("invalid cache metadata: {0}")]
    MetaInvalid(String),

    /// A rebuild held the slot past the deadline and there was no previous
    /// generation to fall back to.
    #[error("timed out after {waited:?} waiting for a rebuild")]
    RebuildTimeout { waited: Duration },

    /// An index build observed its cancel token and stopped early.
    #[error("index build cancelled")]
    Cancelled,
}
