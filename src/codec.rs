//! Block codec: converts character blocks to their UTF-8 byte representation
//! and back. The codec is stateless; block boundaries are always aligned to
//! character boundaries by the ingestion engine, so decoding never sees a
//! split multi-byte sequence.

use crate::error::{Error, Result};

/// Convert a block of characters to its UTF-8 byte representation.
pub fn encode(block: &str) -> &[u8] {
    block.as_bytes()
}

/// Convert the byte representation of a block back to its characters.
pub fn decode(buf: Vec<u8>) -> Result<String> {
    String::from_utf8(buf).map_err(|e| Error::InvalidData(format!("block is not valid UTF-8: {e}")))
}

/// Splits `s` after its first `n` characters. If `s` has fewer than `n`
/// characters the split point is the end of the string.
pub fn split_at_chars(s: &str, n: usize) -> (&str, &str) {
    match s.char_indices().nth(n) {
        Some((idx, _)) => s.split_at(idx),
        None => (s, ""),
    }
}

/// Returns the substring of `s` covering characters `[start, end)`.
/// Both bounds must lie within the string's character length.
pub fn slice_chars(s: &str, start: usize, end: usize) -> &str {
    let (_, tail) = split_at_chars(s, start);
    let (snippet, _) = split_at_chars(tail, end - start);
    snippet
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_ascii() {
        let block = "the quick brown fox";
        let bytes = encode(block).to_vec();
        assert_eq!(decode(bytes).unwrap(), block);
    }

    #[test]
    fn test_roundtrip_multibyte() {
        let block = "héllo wörld ≤≥ 你好 𝄞";
        let bytes = encode(block).to_vec();
        assert!(bytes.len() > block.chars().count());
        assert_eq!(decode(bytes).unwrap(), block);
    }

    #[test]
    fn test_decode_rejects_invalid_utf8() {
        let result = decode(vec![0xC3, 0x28]);
        assert!(matches!(result, Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_split_at_chars() {
        assert_eq!(split_at_chars("hello", 2), ("he", "llo"));
        assert_eq!(split_at_chars("hello", 0), ("", "hello"));
        assert_eq!(split_at_chars("hello", 5), ("hello", ""));
        assert_eq!(split_at_chars("hello", 9), ("hello", ""));
        // é is two bytes but one character
        assert_eq!(split_at_chars("héllo", 2), ("hé", "llo"));
    }

    #[test]
    fn test_slice_chars() {
        assert_eq!(slice_chars("hello", 1, 4), "ell");
        assert_eq!(slice_chars("hello", 0, 5), "hello");
        assert_eq!(slice_chars("hello", 3, 3), "");
        assert_eq!(slice_chars("héllo", 1, 3), "él");
        assert_eq!(slice_chars("你好世界", 1, 3), "好世");
    }
}
