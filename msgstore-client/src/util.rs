//! Utilities.

/// Hex-encodes a byte slice (lowercase, no separators).
pub fn to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Decodes a lowercase hex string back into bytes.
pub fn from_hex(s: &str) -> Result<Vec<u8>, hex::FromHexError> {
    hex::decode(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip() {
        let data = vec![0u8, 1, 255, 16, 128];
        assert_eq!(from_hex(&to_hex(&data)).unwrap(), data);
    }
}
