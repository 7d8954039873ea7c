//! Order-preserving key components and value framing
//!
//! Keys are built from components whose encodings sort byte-wise in the same
//! order as the values they encode:
//!
//! ```text
//! string : bytes with 0x00 → 0x00 0xFF, then terminator 0x00 0x01
//! u64    : 8 bytes big-endian
//! i64    : 8 bytes big-endian with the sign bit flipped
//! ```
//!
//! The string terminator sorts below any escaped byte, so `"a"` < `"a\0"` <
//! `"ab"` holds for the encodings too, and a shorter component never bleeds
//! into the one after it.
//!
//! Values are framed as:
//!
//! ```text
//! ┌─────────┬──────────┬─────────────────────────────┐
//! │ version │ crc32    │ lz4(bincode(value))         │
//! │ u8      │ u32 (LE) │ size-prefixed block         │
//! └─────────┴──────────┴─────────────────────────────┘
//! ```

use crate::table::error::{TableError, TableResult};
use serde::{de::DeserializeOwned, Serialize};

const ESCAPE: u8 = 0x00;
const ESCAPED_NUL: u8 = 0xFF;
const TERMINATOR: u8 = 0x01;

/// Current value frame version
const FRAME_VERSION: u8 = 1;

/// Frame header size in bytes
const FRAME_HEADER_SIZE: usize = 5;

/// Append an escaped, terminated string component
pub fn put_str(buf: &mut Vec<u8>, s: &str) {
    for &b in s.as_bytes() {
        if b == ESCAPE {
            buf.push(ESCAPE);
            buf.push(ESCAPED_NUL);
        } else {
            buf.push(b);
        }
    }
    buf.push(ESCAPE);
    buf.push(TERMINATOR);
}

/// Append a big-endian u64 component
pub fn put_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_be_bytes());
}

/// Append an i64 component that sorts in numeric order
pub fn put_i64(buf: &mut Vec<u8>, v: i64) {
    buf.extend_from_slice(&((v as u64) ^ (1 << 63)).to_be_bytes());
}

/// Cursor over an encoded key
pub struct KeyReader<'a> {
    input: &'a [u8],
}

impl<'a> KeyReader<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        Self { input }
    }

    /// Read a string component written by [`put_str`]
    pub fn take_str(&mut self) -> TableResult<String> {
        let mut out = Vec::new();
        let mut i = 0;
        loop {
            match self.input.get(i) {
                None => return Err(TableError::Decode("unterminated string component".into())),
                Some(&ESCAPE) => match self.input.get(i + 1) {
                    Some(&TERMINATOR) => {
                        self.input = &self.input[i + 2..];
                        break;
                    }
                    Some(&ESCAPED_NUL) => {
                        out.push(ESCAPE);
                        i += 2;
                    }
                    other => {
                        return Err(TableError::Decode(format!(
                            "invalid escape sequence 0x00 {:?}",
                            other
                        )))
                    }
                },
                Some(&b) => {
                    out.push(b);
                    i += 1;
                }
            }
        }

        String::from_utf8(out).map_err(|e| TableError::Decode(format!("invalid utf-8: {}", e)))
    }

    pub fn take_u64(&mut self) -> TableResult<u64> {
        let bytes = self.take_fixed::<8>()?;
        Ok(u64::from_be_bytes(bytes))
    }

    pub fn take_i64(&mut self) -> TableResult<i64> {
        let bytes = self.take_fixed::<8>()?;
        Ok((u64::from_be_bytes(bytes) ^ (1 << 63)) as i64)
    }

    fn take_fixed<const N: usize>(&mut self) -> TableResult<[u8; N]> {
        if self.input.len() < N {
            return Err(TableError::Decode(format!(
                "expected {} bytes, found {}",
                N,
                self.input.len()
            )));
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&self.input[..N]);
        self.input = &self.input[N..];
        Ok(out)
    }

    /// Fail if anything is left over
    pub fn finish(self) -> TableResult<()> {
        if self.input.is_empty() {
            Ok(())
        } else {
            Err(TableError::Decode(format!(
                "{} trailing bytes after key",
                self.input.len()
            )))
        }
    }
}

/// Serialize, compress and checksum a value
pub fn encode_frame<T: Serialize>(value: &T) -> TableResult<Vec<u8>> {
    let body = bincode::serialize(value).map_err(|e| TableError::Encode(e.to_string()))?;
    let compressed = lz4_flex::compress_prepend_size(&body);

    let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE + compressed.len());
    buf.push(FRAME_VERSION);
    buf.extend_from_slice(&crc32fast::hash(&compressed).to_le_bytes());
    buf.extend_from_slice(&compressed);
    Ok(buf)
}

/// Verify, decompress and deserialize a value written by [`encode_frame`]
pub fn decode_frame<T: DeserializeOwned>(bytes: &[u8]) -> TableResult<T> {
    if bytes.len() < FRAME_HEADER_SIZE {
        return Err(TableError::Decode(format!(
            "value frame too short: {} bytes",
            bytes.len()
        )));
    }

    let version = bytes[0];
    if version != FRAME_VERSION {
        return Err(TableError::Decode(format!(
            "unsupported value frame version: {}",
            version
        )));
    }

    let stored = u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
    let compressed = &bytes[FRAME_HEADER_SIZE..];
    let computed = crc32fast::hash(compressed);
    if stored != computed {
        return Err(TableError::Decode(format!(
            "value checksum mismatch: stored={}, computed={}",
            stored, computed
        )));
    }

    let body = lz4_flex::decompress_size_prepended(compressed)
        .map_err(|e| TableError::Decode(format!("decompression failed: {}", e)))?;
    Ok(bincode::deserialize(&body)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enc_str(s: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        put_str(&mut buf, s);
        buf
    }

    fn enc_i64(v: i64) -> Vec<u8> {
        let mut buf = Vec::new();
        put_i64(&mut buf, v);
        buf
    }

    #[test]
    fn test_string_order_matches_byte_order() {
        let mut words = vec!["ab", "a", "", "a\0", "a-b", "b", "a\0b", "a/b"];
        let mut encoded: Vec<Vec<u8>> = words.iter().map(|w| enc_str(w)).collect();

        words.sort();
        encoded.sort();

        let decoded: Vec<String> = encoded
            .iter()
            .map(|e| KeyReader::new(e).take_str().unwrap())
            .collect();
        assert_eq!(decoded, words);
    }

    #[test]
    fn test_i64_order_matches_byte_order() {
        let values = [i64::MIN, -5, -1, 0, 1, 42, i64::MAX];
        for pair in values.windows(2) {
            assert!(enc_i64(pair[0]) < enc_i64(pair[1]), "{:?}", pair);
        }

        for v in values {
            let bytes = enc_i64(v);
            assert_eq!(KeyReader::new(&bytes).take_i64().unwrap(), v);
        }
    }

    #[test]
    fn test_unterminated_string_is_decode_error() {
        let err = KeyReader::new(b"abc").take_str().unwrap_err();
        assert!(matches!(err, TableError::Decode(_)));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut buf = Vec::new();
        put_u64(&mut buf, 7);
        buf.push(0xAA);

        let mut reader = KeyReader::new(&buf);
        assert_eq!(reader.take_u64().unwrap(), 7);
        assert!(reader.finish().is_err());
    }

    #[test]
    fn test_frame_round_trip() {
        let value = ("pod".to_string(), 12u64);
        let frame = encode_frame(&value).unwrap();
        let restored: (String, u64) = decode_frame(&frame).unwrap();
        assert_eq!(restored, value);
    }

    #[test]
    fn test_corrupt_frame_detected() {
        let mut frame = encode_frame(&"payload".to_string()).unwrap();
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;

        let err = decode_frame::<String>(&frame).unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"));

        assert!(decode_frame::<String>(&[1, 0]).is_err());
    }
}
