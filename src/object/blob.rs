//! The Blob object stores the raw content of a single file, with no
//! metadata of its own — name, mode, and position all live in the `Tree`
//! entries that point at it.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::errors::GitError;
use crate::hash::ObjectHash;
use crate::object::{ObjectTrait, types::ObjectType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blob {
    pub id: ObjectHash,
    pub data: Vec<u8>,
}

impl PartialEq for Blob {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for Blob {}

impl Display for Blob {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "blob {} ({} bytes)", self.id, self.data.len())
    }
}

impl Blob {
    pub fn new(data: Vec<u8>) -> Blob {
        let id = ObjectHash::from_type_and_data(ObjectType::Blob, &data);
        Blob { id, data }
    }
}

impl ObjectTrait for Blob {
    fn from_bytes(data: &[u8], hash: ObjectHash) -> Result<Self, GitError> {
        Ok(Blob {
            id: hash,
            data: data.to_vec(),
        })
    }

    fn get_type(&self) -> ObjectType {
        ObjectType::Blob
    }

    fn get_size(&self) -> usize {
        self.data.len()
    }

    fn to_data(&self) -> Result<Vec<u8>, GitError> {
        Ok(self.data.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computes_correct_hash() {
        let blob = Blob::new(b"hello\n".to_vec());
        assert_eq!(
            blob.id.to_string(),
            ObjectHash::from_type_and_data(ObjectType::Blob, b"hello\n").to_string()
        );
    }

    #[test]
    fn from_bytes_preserves_hash() {
        let hash = ObjectHash::from_type_and_data(ObjectType::Blob, b"content");
        let blob = Blob::from_bytes(b"content", hash).unwrap();
        assert_eq!(blob.data, b"content");
        assert_eq!(blob.id, hash);
    }
}
