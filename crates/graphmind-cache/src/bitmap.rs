//! Compressed edge-index bitmaps and their on-disk framing.
//!
//! An [`EdgeBitmap`] holds the journal sequence numbers of every edge in a
//! filtered view. On disk it is a small fixed header (magic, format
//! version, flags) followed by the standard roaring serialization; the
//! header is validated strictly on read and any mismatch marks the whole
//! artifact corrupted.

use std::io::{self, Cursor};
use std::path::Path;

use roaring::RoaringBitmap;

use crate::error::CacheError;
use crate::fsops::FileOps;

/// Leading bytes of every cache artifact.
pub const CACHE_MAGIC: [u8; 8] = *b"GMCACHE\0";

/// On-disk format version. Bumped on any incompatible layout change.
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// Header flags. No flags are defined yet, so the field must read zero.
const FLAGS_NONE: u32 = 0;

/// Magic + version + flags.
pub const HEADER_LEN: usize = 16;

const ESTIMATE_FIXED_SLACK: usize = 64;
const ESTIMATE_BYTES_PER_MEMBER: usize = 2;

/// Set of journal sequence numbers, roaring-compressed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EdgeBitmap {
    bits: RoaringBitmap,
}

impl EdgeBitmap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, seq: u32) -> bool {
        self.bits.insert(seq)
    }

    pub fn insert_many<I: IntoIterator<Item = u32>>(&mut self, seqs: I) {
        self.bits.extend(seqs);
    }

    pub fn remove(&mut self, seq: u32) -> bool {
        self.bits.remove(seq)
    }

    pub fn contains(&self, seq: u32) -> bool {
        self.bits.contains(seq)
    }

    pub fn len(&self) -> u64 {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.bits.iter()
    }

    pub fn to_vec(&self) -> Vec<u32> {
        self.bits.iter().collect()
    }

    // ========================================================================
    // Set algebra
    // ========================================================================

    pub fn union(&self, other: &EdgeBitmap) -> EdgeBitmap {
        EdgeBitmap {
            bits: &self.bits | &other.bits,
        }
    }

    pub fn intersect(&self, other: &EdgeBitmap) -> EdgeBitmap {
        EdgeBitmap {
            bits: &self.bits & &other.bits,
        }
    }

    pub fn difference(&self, other: &EdgeBitmap) -> EdgeBitmap {
        EdgeBitmap {
            bits: &self.bits - &other.bits,
        }
    }

    pub fn symmetric_difference(&self, other: &EdgeBitmap) -> EdgeBitmap {
        EdgeBitmap {
            bits: &self.bits ^ &other.bits,
        }
    }

    // ========================================================================
    // Serialization
    // ========================================================================

    /// Write the framed artifact: header, then the roaring payload.
    pub fn serialize_into<W: io::Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(&CACHE_MAGIC)?;
        writer.write_all(&CACHE_FORMAT_VERSION.to_le_bytes())?;
        writer.write_all(&FLAGS_NONE.to_le_bytes())?;
        self.bits.serialize_into(writer)
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.bits.serialized_size());
        // Writing to a Vec cannot fail.
        let _ = self.serialize_into(&mut out);
        out
    }

    /// Parse a framed artifact. The header must match exactly and the
    /// payload must fill the rest of the input.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, CacheError> {
        if bytes.len() < HEADER_LEN {
            return Err(CacheError::Corrupted {
                reason: "truncated header",
            });
        }
        if bytes[0..8] != CACHE_MAGIC {
            return Err(CacheError::Corrupted {
                reason: "bad magic",
            });
        }
        let version = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        if version != CACHE_FORMAT_VERSION {
            return Err(CacheError::Corrupted {
                reason: "unsupported format version",
            });
        }
        let flags = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);
        if flags != FLAGS_NONE {
            return Err(CacheError::Corrupted {
                reason: "unknown header flags",
            });
        }

        let mut payload = Cursor::new(&bytes[HEADER_LEN..]);
        let bits = RoaringBitmap::deserialize_from(&mut payload).map_err(|_| {
            CacheError::Corrupted {
                reason: "payload deserialization failed",
            }
        })?;
        if payload.position() as usize != bytes.len() - HEADER_LEN {
            return Err(CacheError::Corrupted {
                reason: "trailing bytes after payload",
            });
        }
        Ok(EdgeBitmap { bits })
    }

    /// Advisory size for preallocation. Dense sets come in well under this;
    /// pathologically sparse sets can exceed it.
    pub fn estimate_serialized_size(&self) -> usize {
        HEADER_LEN + ESTIMATE_FIXED_SLACK + ESTIMATE_BYTES_PER_MEMBER * self.bits.len() as usize
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    pub fn write_file(&self, files: &dyn FileOps, path: &Path) -> Result<(), CacheError> {
        files.write_atomic(path, &self.serialize())?;
        Ok(())
    }

    pub fn read_file(files: &dyn FileOps, path: &Path) -> Result<Self, CacheError> {
        let bytes = files.read(path)?;
        Self::deserialize(&bytes)
    }
}

impl FromIterator<u32> for EdgeBitmap {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        EdgeBitmap {
            bits: RoaringBitmap::from_iter(iter),
        }
    }
}
