//! Graphmind edge model.
//!
//! Core building blocks for the relationship graph:
//! - Typed, attributed edges between repository objects ([`AttributedEdge`])
//! - Provenance records saying who created an edge ([`Attribution`])
//! - A compact CBOR wire codec with a fixed field order
//! - Provenance filters for query-time selection ([`Filter`])
//!
//! Everything that touches ambient process state (clock, randomness,
//! environment) goes through the capability traits in [`context`], so hosts
//! and tests control determinism end to end.

pub mod attribution;
pub mod cbor;
pub mod context;
pub mod edge;
pub mod filter;
pub mod ident;
pub mod text;

pub use attribution::{Attribution, AttributionSource, SourceMask};
pub use cbor::CodecError;
pub use context::{Clock, EdgeContext, Entropy, EnvSource};
pub use edge::AttributedEdge;
pub use filter::Filter;
pub use ident::EdgeId;
pub use text::{BoundedStr, AUTHOR_CAP, PATH_CAP, SESSION_CAP};

use std::fmt;

use half::f16;
use thiserror::Error;

// ============================================================================
// Object identifiers
// ============================================================================

/// Raw length of an object id in bytes.
pub const OBJECT_ID_LEN: usize = 20;

/// A 20-byte object identifier (the hash of a tracked repository object).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId([u8; OBJECT_ID_LEN]);

impl ObjectId {
    pub const fn from_bytes(bytes: [u8; OBJECT_ID_LEN]) -> Self {
        ObjectId(bytes)
    }

    /// Parse a 40-character hex string (either case).
    pub fn from_hex(hex: &str) -> Result<Self, ObjectIdError> {
        let digits = hex.as_bytes();
        if digits.len() != OBJECT_ID_LEN * 2 {
            return Err(ObjectIdError::BadLength(digits.len()));
        }
        let mut out = [0u8; OBJECT_ID_LEN];
        for (i, pair) in digits.chunks_exact(2).enumerate() {
            let hi = hex_nibble(pair[0]).ok_or(ObjectIdError::BadDigit(pair[0] as char))?;
            let lo = hex_nibble(pair[1]).ok_or(ObjectIdError::BadDigit(pair[1] as char))?;
            out[i] = (hi << 4) | lo;
        }
        Ok(ObjectId(out))
    }

    pub const fn as_bytes(&self) -> &[u8; OBJECT_ID_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(OBJECT_ID_LEN * 2);
        for byte in self.0 {
            out.push(HEX_DIGITS[(byte >> 4) as usize] as char);
            out.push(HEX_DIGITS[(byte & 0x0F) as usize] as char);
        }
        out
    }
}

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

fn hex_nibble(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        _ => None,
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ObjectIdError {
    #[error("expected 40 hex characters, got {0}")]
    BadLength(usize),
    #[error("invalid hex digit {0:?}")]
    BadDigit(char),
}

// ============================================================================
// Relations and lanes
// ============================================================================

/// Typed relationship carried by an edge. Wire values are fixed; `Custom`
/// sits far from the built-in range so later additions stay below it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum RelationKind {
    Implements = 1,
    References = 2,
    DependsOn = 3,
    Augments = 4,
    Custom = 1000,
}

impl RelationKind {
    pub const fn wire_value(self) -> u16 {
        self as u16
    }

    /// Strict mapping from the wire; unknown discriminants are rejected.
    pub const fn from_wire(value: u16) -> Option<Self> {
        match value {
            1 => Some(RelationKind::Implements),
            2 => Some(RelationKind::References),
            3 => Some(RelationKind::DependsOn),
            4 => Some(RelationKind::Augments),
            1000 => Some(RelationKind::Custom),
            _ => None,
        }
    }

    /// Label used in rendered edge output.
    pub const fn label(self) -> &'static str {
        match self {
            RelationKind::Implements => "implements",
            RelationKind::References => "references",
            RelationKind::DependsOn => "depends_on",
            RelationKind::Augments => "augments",
            RelationKind::Custom => "custom",
        }
    }
}

/// Workflow lane an edge belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Lane {
    Default = 0,
    Architecture = 1,
    Testing = 2,
    Refactor = 3,
    Analysis = 4,
    Custom = 100,
}

impl Lane {
    pub const fn wire_value(self) -> u8 {
        self as u8
    }

    pub const fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(Lane::Default),
            1 => Some(Lane::Architecture),
            2 => Some(Lane::Testing),
            3 => Some(Lane::Refactor),
            4 => Some(Lane::Analysis),
            100 => Some(Lane::Custom),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Lane::Default => "default",
            Lane::Architecture => "architecture",
            Lane::Testing => "testing",
            Lane::Refactor => "refactor",
            Lane::Analysis => "analysis",
            Lane::Custom => "custom",
        }
    }
}

// ============================================================================
// Confidence
// ============================================================================

/// Edge confidence as an IEEE 754 binary16 value in `[0.0, 1.0]`.
///
/// The bit pattern is stored directly. The invariant keeps the sign bit
/// clear, so integer order on the bits equals numeric order and the derived
/// `Ord` can be used for range checks and fingerprint bytes alike.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Confidence(u16);

impl Confidence {
    pub const ZERO: Confidence = Confidence(0x0000);
    /// Exactly 1.0.
    pub const FULL: Confidence = Confidence(0x3C00);

    /// Quantize an `f32` to binary16, clamping into `[0.0, 1.0]`.
    /// NaN and negative zero both land on zero.
    pub fn new(value: f32) -> Self {
        let clamped = if value.is_nan() || value <= 0.0 {
            0.0
        } else {
            value.min(1.0)
        };
        Confidence(f16::from_f32(clamped).to_bits())
    }

    /// Reconstruct from raw bits, rejecting anything outside the invariant.
    /// The sign bit is rejected outright (negative zero included) so bit
    /// order stays equal to numeric order.
    pub fn from_bits(bits: u16) -> Result<Self, ConfidenceError> {
        let value = f16::from_bits(bits);
        if value.is_nan() {
            return Err(ConfidenceError::NotANumber);
        }
        if bits & 0x8000 != 0 || value.to_f32() > 1.0 {
            return Err(ConfidenceError::OutOfRange(value.to_f32()));
        }
        Ok(Confidence(bits))
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub fn value(self) -> f32 {
        f16::from_bits(self.0).to_f32()
    }

    /// Parse a decimal confidence. Strict about the range: out-of-range
    /// values are an error here, not a clamp.
    pub fn parse(text: &str) -> Result<Self, ConfidenceError> {
        let value: f32 = text
            .trim()
            .parse()
            .map_err(|_| ConfidenceError::Unparseable)?;
        if value.is_nan() {
            return Err(ConfidenceError::NotANumber);
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(ConfidenceError::OutOfRange(value));
        }
        Ok(Confidence::new(value))
    }
}

impl Default for Confidence {
    fn default() -> Self {
        Confidence::FULL
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.value())
    }
}

impl fmt::Debug for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Confidence({})", self.value())
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfidenceError {
    #[error("confidence {0} outside [0.0, 1.0]")]
    OutOfRange(f32),
    #[error("confidence is NaN")]
    NotANumber,
    #[error("not a decimal number")]
    Unparseable,
}
