//! Object hashing.
//!
//! The repositories this crate reads are SHA-1 object stores; `ObjectHash`
//! is a fixed 20-byte (40 hex character) newtype rather than the
//! multi-algorithm selector some Git implementations carry, since nothing
//! downstream of the object store ever needs to compare hashes produced
//! under different algorithms within the same repository.

use std::{fmt::Display, io, str::FromStr};

use colored::Colorize;
use serde::{Deserialize, Serialize};
use sha1::Digest;

use crate::object::types::ObjectType;

pub const HASH_SIZE: usize = 20;
pub const HASH_HEX_LEN: usize = 40;

/// A SHA-1 Git object id: 20 raw bytes, 40 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
pub struct ObjectHash(pub [u8; HASH_SIZE]);

impl Default for ObjectHash {
    fn default() -> Self {
        ObjectHash([0u8; HASH_SIZE])
    }
}

impl std::fmt::Debug for ObjectHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObjectHash({})", self)
    }
}

impl Display for ObjectHash {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl AsRef<[u8]> for ObjectHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Parse a 40-character lowercase hex string into an `ObjectHash`.
impl FromStr for ObjectHash {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != HASH_HEX_LEN {
            return Err(format!(
                "invalid hash length: got {}, expected {}",
                s.len(),
                HASH_HEX_LEN
            ));
        }
        let bytes = hex::decode(s).map_err(|e| e.to_string())?;
        let mut h = [0u8; HASH_SIZE];
        h.copy_from_slice(&bytes);
        Ok(ObjectHash(h))
    }
}

impl ObjectHash {
    /// The all-zero hash, used as a sentinel for "no parent"/"ref deleted".
    pub const ZERO: ObjectHash = ObjectHash([0u8; HASH_SIZE]);

    pub fn zero_str() -> String {
        "0".repeat(HASH_HEX_LEN)
    }

    pub const fn size(&self) -> usize {
        HASH_SIZE
    }

    /// Hash raw bytes with SHA-1.
    pub fn new(data: &[u8]) -> ObjectHash {
        let digest = sha1::Sha1::digest(data);
        let mut bytes = [0u8; HASH_SIZE];
        bytes.copy_from_slice(digest.as_ref());
        ObjectHash(bytes)
    }

    /// Hash the canonical `"<type> <len>\0<data>"` framing used for loose
    /// objects, the way every Git object id is actually computed.
    pub fn from_type_and_data(object_type: ObjectType, data: &[u8]) -> ObjectHash {
        let mut framed = Vec::with_capacity(data.len() + 16);
        framed.extend(object_type.to_data());
        framed.push(b' ');
        framed.extend(data.len().to_string().as_bytes());
        framed.push(b'\0');
        framed.extend(data);
        ObjectHash::new(&framed)
    }

    /// Build an `ObjectHash` from exactly 20 raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<ObjectHash, String> {
        if bytes.len() != HASH_SIZE {
            return Err(format!(
                "invalid byte length: got {}, expected {}",
                bytes.len(),
                HASH_SIZE
            ));
        }
        let mut h = [0u8; HASH_SIZE];
        h.copy_from_slice(bytes);
        Ok(ObjectHash(h))
    }

    /// Read exactly 20 bytes from a stream as a hash.
    pub fn from_stream(data: &mut impl io::Read) -> io::Result<ObjectHash> {
        let mut h = [0u8; HASH_SIZE];
        data.read_exact(&mut h)?;
        Ok(ObjectHash(h))
    }

    /// Colorized hex string, for terminal-facing diagnostics.
    pub fn to_color_str(self) -> String {
        self.to_string().red().bold().to_string()
    }

    pub fn to_data(self) -> Vec<u8> {
        self.0.to_vec()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::ObjectHash;

    #[test]
    fn hashes_known_input() {
        let data = "Hello, world!".as_bytes();
        let hash = ObjectHash::new(data);
        assert_eq!(hash.to_string(), "943a702d06f34599aee1f8da8ef9f7296031d699");
    }

    #[test]
    fn round_trips_through_hex() {
        let hash_str = "8ab686eafeb1f44702738c8b0f24f2567c36da6d";
        let hash = ObjectHash::from_str(hash_str).unwrap();
        assert_eq!(hash.to_string(), hash_str);
        assert_eq!(
            hash.to_data(),
            vec![
                0x8a, 0xb6, 0x86, 0xea, 0xfe, 0xb1, 0xf4, 0x47, 0x02, 0x73, 0x8c, 0x8b, 0x0f, 0x24,
                0xf2, 0x56, 0x7c, 0x36, 0xda, 0x6d
            ]
        );
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(ObjectHash::from_str("deadbeef").is_err());
    }

    #[test]
    fn reads_from_stream() {
        let source = [
            0x8a, 0xb6, 0x86, 0xea, 0xfe, 0xb1, 0xf4, 0x47, 0x02, 0x73, 0x8c, 0x8b, 0x0f, 0x24,
            0xf2, 0x56, 0x7c, 0x36, 0xda, 0x6d,
        ];
        let mut reader = std::io::Cursor::new(source);
        let hash = ObjectHash::from_stream(&mut reader).unwrap();
        assert_eq!(hash.to_string(), "8ab686eafeb1f44702738c8b0f24f2567c36da6d");
    }
}
