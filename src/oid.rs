use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Error;

/// git object id
///
/// holds either a SHA-1 (20 bytes) or a SHA-256 (32 bytes) id, depending on
/// the object format of the repository.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Oid {
    bytes: [u8; 32],
    len: u8,
}

impl Oid {
    /// parse from hex string (40 or 64 hex chars)
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        let decoded = hex::decode(s).map_err(|_| Error::InvalidOid(s.to_string()))?;
        if decoded.len() != 20 && decoded.len() != 32 {
            return Err(Error::InvalidOid(s.to_string()));
        }
        let mut bytes = [0u8; 32];
        bytes[..decoded.len()].copy_from_slice(&decoded);
        Ok(Self {
            bytes,
            len: decoded.len() as u8,
        })
    }

    /// get raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    /// convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }

    /// abbreviated hex form for display
    pub fn short(&self) -> String {
        self.to_hex()[..12].to_string()
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Oid({})", self.short())
    }
}

impl std::str::FromStr for Oid {
    type Err = Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::from_hex(s.trim())
    }
}

impl Serialize for Oid {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Oid {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
