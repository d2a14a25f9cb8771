//! Edge identifiers.

use std::fmt;

use thiserror::Error;
use ulid::Ulid;

use crate::context::{Clock, Entropy};

/// Rendered length of an edge id.
pub const EDGE_ID_LEN: usize = 26;

/// Sortable edge identifier: a ULID (48-bit millisecond timestamp plus 80
/// random bits) rendered as 26 Crockford base32 characters.
///
/// Ids generated in one process sort by creation time, which keeps journal
/// scans roughly chronological without a separate sort key.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeId(Ulid);

impl EdgeId {
    /// Mint a fresh id from the injected clock and entropy.
    pub fn generate(clock: &dyn Clock, entropy: &dyn Entropy) -> Self {
        EdgeId(Ulid::from_parts(clock.now_millis(), entropy.next_u128()))
    }

    /// Rebuild an id from its parts. Only the low 48 bits of the timestamp
    /// and the low 80 bits of `random` are significant.
    pub fn from_parts(timestamp_ms: u64, random: u128) -> Self {
        EdgeId(Ulid::from_parts(timestamp_ms, random))
    }

    /// Millisecond timestamp embedded in the id.
    pub fn timestamp_ms(&self) -> u64 {
        self.0.timestamp_ms()
    }

    /// Parse the canonical 26-character form.
    pub fn parse(text: &str) -> Result<Self, EdgeIdError> {
        if text.len() != EDGE_ID_LEN {
            return Err(EdgeIdError::BadLength(text.len()));
        }
        Ulid::from_string(text)
            .map(EdgeId)
            .map_err(|_| EdgeIdError::BadEncoding)
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Debug for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EdgeId({})", self.0)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EdgeIdError {
    #[error("expected 26 characters, got {0}")]
    BadLength(usize),
    #[error("not a valid Crockford base32 id")]
    BadEncoding,
}
