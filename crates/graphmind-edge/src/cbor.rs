//! Minimal CBOR subset for the edge wire format.
//!
//! Only what the journal record needs: unsigned integers, byte strings,
//! text strings and arrays, always in shortest form. Text and byte string
//! lengths are capped at 16 bits on read, matching the format. Readers are
//! bounds-checked everywhere; malformed input surfaces as
//! [`CodecError::Malformed`], never a panic or over-read.

use std::str;

use thiserror::Error;

// Major types (high 3 bits).
const MAJOR_UINT: u8 = 0x00;
const MAJOR_BYTES: u8 = 0x40;
const MAJOR_TEXT: u8 = 0x60;
const MAJOR_ARRAY: u8 = 0x80;

const MAJOR_MASK: u8 = 0xE0;
const INFO_MASK: u8 = 0x1F;

// Additional-info markers for multi-byte arguments.
const INFO_U8: u8 = 24;
const INFO_U16: u8 = 25;
const INFO_U32: u8 = 26;
const INFO_U64: u8 = 27;

/// Codec failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("output buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },
    #[error("malformed record at byte {offset}: {reason}")]
    Malformed {
        offset: usize,
        reason: &'static str,
    },
}

impl CodecError {
    pub(crate) fn malformed(offset: usize, reason: &'static str) -> Self {
        CodecError::Malformed { offset, reason }
    }
}

/// Wire size of an unsigned integer item, header included.
pub(crate) fn uint_len(value: u64) -> usize {
    if value < 24 {
        1
    } else if value <= u8::MAX as u64 {
        2
    } else if value <= u16::MAX as u64 {
        3
    } else if value <= u32::MAX as u64 {
        5
    } else {
        9
    }
}

/// Wire size of a definite-length string/array header.
pub(crate) fn header_len(len: u64) -> usize {
    uint_len(len)
}

// ============================================================================
// Writer
// ============================================================================

/// Cursor writing CBOR items into a caller-owned buffer.
pub(crate) struct CborWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> CborWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        CborWriter { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    fn put(&mut self, byte: u8) -> Result<(), CodecError> {
        if self.pos >= self.buf.len() {
            return Err(CodecError::BufferTooSmall {
                needed: self.pos + 1,
                available: self.buf.len(),
            });
        }
        self.buf[self.pos] = byte;
        self.pos += 1;
        Ok(())
    }

    fn put_slice(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        let end = self.pos + bytes.len();
        if end > self.buf.len() {
            return Err(CodecError::BufferTooSmall {
                needed: end,
                available: self.buf.len(),
            });
        }
        self.buf[self.pos..end].copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }

    /// Shortest-form item header: major type plus argument.
    fn header(&mut self, major: u8, value: u64) -> Result<(), CodecError> {
        if value < 24 {
            self.put(major | value as u8)
        } else if value <= u8::MAX as u64 {
            self.put(major | INFO_U8)?;
            self.put(value as u8)
        } else if value <= u16::MAX as u64 {
            self.put(major | INFO_U16)?;
            self.put_slice(&(value as u16).to_be_bytes())
        } else if value <= u32::MAX as u64 {
            self.put(major | INFO_U32)?;
            self.put_slice(&(value as u32).to_be_bytes())
        } else {
            self.put(major | INFO_U64)?;
            self.put_slice(&value.to_be_bytes())
        }
    }

    pub fn uint(&mut self, value: u64) -> Result<(), CodecError> {
        self.header(MAJOR_UINT, value)
    }

    pub fn bytes(&mut self, data: &[u8]) -> Result<(), CodecError> {
        self.header(MAJOR_BYTES, data.len() as u64)?;
        self.put_slice(data)
    }

    pub fn text(&mut self, text: &str) -> Result<(), CodecError> {
        self.header(MAJOR_TEXT, text.len() as u64)?;
        self.put_slice(text.as_bytes())
    }

    pub fn array_header(&mut self, len: u64) -> Result<(), CodecError> {
        self.header(MAJOR_ARRAY, len)
    }
}

// ============================================================================
// Reader
// ============================================================================

/// Cursor decoding CBOR items from untrusted bytes.
pub(crate) struct CborReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> CborReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        CborReader { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::malformed(self.pos, "input truncated"));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Item header of the expected major type; returns the argument.
    fn header(&mut self, expected_major: u8) -> Result<u64, CodecError> {
        let at = self.pos;
        let initial = self.take(1)?[0];
        if initial & MAJOR_MASK != expected_major {
            return Err(CodecError::malformed(at, "unexpected item type"));
        }
        match initial & INFO_MASK {
            info @ 0..=23 => Ok(info as u64),
            INFO_U8 => Ok(self.take(1)?[0] as u64),
            INFO_U16 => {
                let b = self.take(2)?;
                Ok(u16::from_be_bytes([b[0], b[1]]) as u64)
            }
            INFO_U32 => {
                let b = self.take(4)?;
                Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as u64)
            }
            INFO_U64 => {
                let b = self.take(8)?;
                Ok(u64::from_be_bytes([
                    b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
                ]))
            }
            _ => Err(CodecError::malformed(at, "unsupported length encoding")),
        }
    }

    /// String-family header: arguments wider than 16 bits are rejected.
    fn short_header(&mut self, expected_major: u8) -> Result<u64, CodecError> {
        let at = self.pos;
        let initial = self.take(1)?[0];
        if initial & MAJOR_MASK != expected_major {
            return Err(CodecError::malformed(at, "unexpected item type"));
        }
        match initial & INFO_MASK {
            info @ 0..=23 => Ok(info as u64),
            INFO_U8 => Ok(self.take(1)?[0] as u64),
            INFO_U16 => {
                let b = self.take(2)?;
                Ok(u16::from_be_bytes([b[0], b[1]]) as u64)
            }
            _ => Err(CodecError::malformed(at, "string length too wide")),
        }
    }

    pub fn uint(&mut self) -> Result<u64, CodecError> {
        self.header(MAJOR_UINT)
    }

    pub fn uint8(&mut self) -> Result<u8, CodecError> {
        let at = self.pos;
        let value = self.uint()?;
        u8::try_from(value).map_err(|_| CodecError::malformed(at, "integer exceeds u8"))
    }

    pub fn uint16(&mut self) -> Result<u16, CodecError> {
        let at = self.pos;
        let value = self.uint()?;
        u16::try_from(value).map_err(|_| CodecError::malformed(at, "integer exceeds u16"))
    }

    pub fn uint32(&mut self) -> Result<u32, CodecError> {
        let at = self.pos;
        let value = self.uint()?;
        u32::try_from(value).map_err(|_| CodecError::malformed(at, "integer exceeds u32"))
    }

    /// Byte string whose length must equal `N` exactly.
    pub fn exact_bytes<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let at = self.pos;
        let len = self.short_header(MAJOR_BYTES)?;
        if len != N as u64 {
            return Err(CodecError::malformed(at, "byte string has wrong length"));
        }
        let slice = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    /// Text string of at most `max_len` bytes; payload must be valid UTF-8.
    pub fn text(&mut self, max_len: usize) -> Result<&'a str, CodecError> {
        let at = self.pos;
        let len = self.short_header(MAJOR_TEXT)?;
        if len > max_len as u64 {
            return Err(CodecError::malformed(at, "text field too long"));
        }
        let slice = self.take(len as usize)?;
        str::from_utf8(slice).map_err(|_| CodecError::malformed(at, "text is not valid UTF-8"))
    }

    /// Array header that must announce exactly `expected` elements.
    pub fn array_header(&mut self, expected: u64) -> Result<(), CodecError> {
        let at = self.pos;
        let len = self.header(MAJOR_ARRAY)?;
        if len != expected {
            return Err(CodecError::malformed(at, "wrong array length"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_uint(value: u64) -> Vec<u8> {
        let mut buf = vec![0u8; 9];
        let mut writer = CborWriter::new(&mut buf);
        writer.uint(value).expect("uint should fit");
        let len = writer.position();
        buf.truncate(len);
        buf
    }

    #[test]
    fn uint_shortest_form() {
        assert_eq!(write_uint(0), vec![0x00]);
        assert_eq!(write_uint(23), vec![0x17]);
        assert_eq!(write_uint(24), vec![0x18, 24]);
        assert_eq!(write_uint(255), vec![0x18, 255]);
        assert_eq!(write_uint(256), vec![0x19, 0x01, 0x00]);
        assert_eq!(write_uint(65_535), vec![0x19, 0xFF, 0xFF]);
        assert_eq!(write_uint(65_536), vec![0x1A, 0x00, 0x01, 0x00, 0x00]);
        assert_eq!(
            write_uint(u32::MAX as u64 + 1),
            vec![0x1B, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00]
        );
        assert_eq!(uint_len(23), 1);
        assert_eq!(uint_len(24), 2);
        assert_eq!(uint_len(u16::MAX as u64), 3);
        assert_eq!(uint_len(u32::MAX as u64), 5);
        assert_eq!(uint_len(u64::MAX), 9);
    }

    #[test]
    fn uint_read_round_trip() {
        for value in [0u64, 1, 23, 24, 255, 256, 65_535, 65_536, u64::MAX] {
            let bytes = write_uint(value);
            let mut reader = CborReader::new(&bytes);
            assert_eq!(reader.uint(), Ok(value));
            assert_eq!(reader.remaining(), 0);
        }
    }

    #[test]
    fn narrow_uint_readers_enforce_width() {
        let bytes = write_uint(300);
        assert_eq!(
            CborReader::new(&bytes).uint8(),
            Err(CodecError::malformed(0, "integer exceeds u8"))
        );
        assert_eq!(CborReader::new(&bytes).uint16(), Ok(300));

        let wide = write_uint(u32::MAX as u64 + 1);
        assert!(CborReader::new(&wide).uint32().is_err());
    }

    #[test]
    fn text_round_trip_and_bounds() {
        let mut buf = vec![0u8; 64];
        let mut writer = CborWriter::new(&mut buf);
        writer.text("hello").expect("text should fit");
        let len = writer.position();

        let mut reader = CborReader::new(&buf[..len]);
        assert_eq!(reader.text(16), Ok("hello"));

        let mut reader = CborReader::new(&buf[..len]);
        assert_eq!(
            reader.text(4),
            Err(CodecError::malformed(0, "text field too long"))
        );
    }

    #[test]
    fn text_rejects_invalid_utf8() {
        // Header for a 2-byte text string, then a stray continuation byte.
        let bytes = [0x62, 0xC3, 0x28];
        let mut reader = CborReader::new(&bytes);
        assert_eq!(
            reader.text(16),
            Err(CodecError::malformed(0, "text is not valid UTF-8"))
        );
    }

    #[test]
    fn string_length_headers_capped_at_u16() {
        // Text header with a u32 length argument is off-format even when the
        // value itself is small.
        let bytes = [0x7A, 0x00, 0x00, 0x00, 0x02, b'h', b'i'];
        let mut reader = CborReader::new(&bytes);
        assert_eq!(
            reader.text(16),
            Err(CodecError::malformed(0, "string length too wide"))
        );
    }

    #[test]
    fn exact_bytes_checks_length() {
        let mut buf = vec![0u8; 32];
        let mut writer = CborWriter::new(&mut buf);
        writer.bytes(&[1, 2, 3, 4]).expect("bytes should fit");
        let len = writer.position();

        let mut reader = CborReader::new(&buf[..len]);
        assert_eq!(reader.exact_bytes::<4>(), Ok([1, 2, 3, 4]));

        let mut reader = CborReader::new(&buf[..len]);
        assert_eq!(
            reader.exact_bytes::<5>(),
            Err(CodecError::malformed(0, "byte string has wrong length"))
        );
    }

    #[test]
    fn truncated_input_is_rejected() {
        let bytes = write_uint(65_536);
        for cut in 0..bytes.len() {
            let mut reader = CborReader::new(&bytes[..cut]);
            assert!(reader.uint().is_err(), "cut at {cut} should fail");
        }
    }

    #[test]
    fn wrong_major_type_is_rejected() {
        let bytes = write_uint(5);
        let mut reader = CborReader::new(&bytes);
        assert_eq!(
            reader.text(16),
            Err(CodecError::malformed(0, "unexpected item type"))
        );
    }

    #[test]
    fn reserved_info_values_are_rejected() {
        for info in [28u8, 29, 30, 31] {
            let bytes = [MAJOR_UINT | info];
            let mut reader = CborReader::new(&bytes);
            assert_eq!(
                reader.uint(),
                Err(CodecError::malformed(0, "unsupported length encoding"))
            );
        }
    }

    #[test]
    fn array_header_checks_count() {
        let mut buf = vec![0u8; 8];
        let mut writer = CborWriter::new(&mut buf);
        writer.array_header(13).expect("header should fit");
        let len = writer.position();

        let mut reader = CborReader::new(&buf[..len]);
        assert_eq!(reader.array_header(13), Ok(()));

        let mut reader = CborReader::new(&buf[..len]);
        assert_eq!(
            reader.array_header(12),
            Err(CodecError::malformed(0, "wrong array length"))
        );
    }

    #[test]
    fn writer_reports_exhaustion() {
        let mut buf = vec![0u8; 2];
        let mut writer = CborWriter::new(&mut buf);
        assert_eq!(
            writer.text("hello"),
            Err(CodecError::BufferTooSmall {
                needed: 6,
                available: 2
            })
        );
    }
}
