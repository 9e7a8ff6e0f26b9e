//! Plain lowercase hex encode/decode, shared by SCTE-35's convenience wrappers and HLS's
//! `SCTE35-IN`/`SCTE35-OUT` attribute values.

use crate::error::{Result, VdkError};

pub fn encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2);
    for byte in data {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

pub fn decode(s: &str) -> Result<Vec<u8>> {
    let s = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    if s.len() % 2 != 0 {
        return Err(VdkError::Parser(format!("hex string has odd length: {}", s.len())));
    }
    (0..s.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&s[i..i + 2], 16)
                .map_err(|e| VdkError::Parser(format!("invalid hex digit at offset {}: {}", i, e)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let data = [0xDE, 0xAD, 0xBE, 0xEF];
        assert_eq!(decode(&encode(&data)).unwrap(), data);
    }

    #[test]
    fn test_decode_strips_0x_prefix() {
        assert_eq!(decode("0xDEAD").unwrap(), vec![0xDE, 0xAD]);
        assert_eq!(decode("DEAD").unwrap(), vec![0xDE, 0xAD]);
    }

    #[test]
    fn test_decode_rejects_odd_length() {
        assert!(decode("abc").is_err());
    }
}
