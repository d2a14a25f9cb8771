//! Fixed-capacity text fields.
//!
//! Wire records carry short bounded strings (paths, authors, session ids).
//! [`BoundedStr`] keeps them inline with no heap allocation. Truncation is
//! the documented behavior for oversized host input; the decode path uses
//! the strict constructor instead.

use std::fmt;
use std::hash::{Hash, Hasher};

use thiserror::Error;

/// Maximum content bytes for a path field.
pub const PATH_CAP: usize = 255;
/// Maximum content bytes for an attribution author.
pub const AUTHOR_CAP: usize = 63;
/// Maximum content bytes for an attribution session id.
pub const SESSION_CAP: usize = 31;

/// Inline UTF-8 string holding at most `MAX` content bytes (`MAX` <= 255).
#[derive(Clone, Copy)]
pub struct BoundedStr<const MAX: usize> {
    buf: [u8; MAX],
    len: u8,
}

impl<const MAX: usize> BoundedStr<MAX> {
    pub const fn empty() -> Self {
        BoundedStr {
            buf: [0u8; MAX],
            len: 0,
        }
    }

    /// Build by truncating `text` at the last char boundary within capacity.
    /// Total: any input produces a valid value.
    pub fn truncate_from(text: &str) -> Self {
        let mut end = text.len().min(MAX);
        while end > 0 && !text.is_char_boundary(end) {
            end -= 1;
        }
        let mut buf = [0u8; MAX];
        buf[..end].copy_from_slice(&text.as_bytes()[..end]);
        BoundedStr {
            buf,
            len: end as u8,
        }
    }

    /// Strict constructor: oversized input is an error, not a truncation.
    pub fn new(text: &str) -> Result<Self, TextTooLong> {
        if text.len() > MAX {
            return Err(TextTooLong {
                len: text.len(),
                max: MAX,
            });
        }
        Ok(Self::truncate_from(text))
    }

    pub fn as_str(&self) -> &str {
        // Construction only ever copies whole chars, so this cannot fail.
        std::str::from_utf8(&self.buf[..self.len as usize]).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub const fn capacity() -> usize {
        MAX
    }
}

impl<const MAX: usize> Default for BoundedStr<MAX> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<const MAX: usize> PartialEq for BoundedStr<MAX> {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl<const MAX: usize> Eq for BoundedStr<MAX> {}

impl<const MAX: usize> Hash for BoundedStr<MAX> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl<const MAX: usize> PartialEq<&str> for BoundedStr<MAX> {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl<const MAX: usize> fmt::Display for BoundedStr<MAX> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<const MAX: usize> fmt::Debug for BoundedStr<MAX> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("text of {len} bytes exceeds capacity {max}")]
pub struct TextTooLong {
    pub len: usize,
    pub max: usize,
}
