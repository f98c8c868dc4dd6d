use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MagnetError;

/// Length of a v1 (SHA-1) info hash in bytes.
pub const INFO_HASH_LEN: usize = 20;

/// SHA-1 info hash identifying a torrent's info dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InfoHash([u8; INFO_HASH_LEN]);

impl InfoHash {
    /// Wrap raw hash bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; INFO_HASH_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw hash bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; INFO_HASH_LEN] {
        &self.0
    }

    /// Lowercase hex rendering, as used in resume file names and logs.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Display for InfoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for InfoHash {
    type Err = MagnetError;

    /// Accepts 40 hex digits or 32 base32 digits, in either case.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || MagnetError::InvalidInfoHash {
            value: value.to_string(),
        };
        match value.len() {
            BASE32_LEN => decode_base32(value).map(Self).ok_or_else(invalid),
            _ => {
                let mut bytes = [0_u8; INFO_HASH_LEN];
                hex::decode_to_slice(value, &mut bytes).map_err(|_| invalid())?;
                Ok(Self(bytes))
            }
        }
    }
}

const BASE32_LEN: usize = 32;

/// RFC 4648 alphabet, unpadded.
fn decode_base32(value: &str) -> Option<[u8; INFO_HASH_LEN]> {
    let mut bytes = [0_u8; INFO_HASH_LEN];
    let mut filled = 0;
    let mut buffer: u16 = 0;
    let mut bits = 0_u32;
    for ch in value.bytes() {
        let digit = match ch.to_ascii_uppercase() {
            upper @ b'A'..=b'Z' => upper - b'A',
            numeral @ b'2'..=b'7' => numeral - b'2' + 26,
            _ => return None,
        };
        buffer = (buffer << 5) | u16::from(digit);
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            *bytes.get_mut(filled)? = u8::try_from((buffer >> bits) & 0xff).ok()?;
            filled += 1;
        }
    }
    (filled == INFO_HASH_LEN).then_some(bytes)
}

impl TryFrom<String> for InfoHash {
    type Error = MagnetError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<InfoHash> for String {
    fn from(value: InfoHash) -> Self {
        value.to_hex()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mixed_case_hex() -> anyhow::Result<()> {
        let hash: InfoHash = "C12FE1C06BBA254A9DC9F519B335AA7C1367A88A".parse()?;
        assert_eq!(hash.to_hex(), "c12fe1c06bba254a9dc9f519b335aa7c1367a88a");
        Ok(())
    }

    #[test]
    fn parses_base32() -> anyhow::Result<()> {
        let upper: InfoHash = "AERUKZ4JVPG66AJDIVTYTK6N54ASGRLH".parse()?;
        let lower: InfoHash = "aerukz4jvpg66ajdivtytk6n54asgrlh".parse()?;
        assert_eq!(upper.to_hex(), "0123456789abcdef0123456789abcdef01234567");
        assert_eq!(upper, lower);
        assert!("AERUKZ4JVPG66AJDIVTYTK6N54ASGRL1".parse::<InfoHash>().is_err());
        Ok(())
    }

    #[test]
    fn rejects_wrong_length() {
        assert!("abcd".parse::<InfoHash>().is_err());
    }
}
