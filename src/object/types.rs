//! Git object type enumeration and its wire encodings.
//!
//! In Git, each object type has a unique small integer used both in loose
//! object headers (as ASCII text) and in the 3-bit pack entry type field:
//!
//! * `Commit` (1): author/committer, message, parent commits, a tree.
//! * `Tree` (2): a sorted list of directory entries.
//! * `Blob` (3): file content.
//! * `Tag` (4): an annotated tag pointing at another object.
//! * `OffsetDelta` (6): a delta encoded against a base at a negative byte
//!   offset earlier in the same pack.
//! * `HashDelta` (7): a delta encoded against a base identified by hash.

use std::fmt::{self, Display};

use crate::errors::GitError;

#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    Commit = 1,
    Tree,
    Blob,
    Tag,
    OffsetDelta = 6,
    HashDelta = 7,
}

const COMMIT_OBJECT_TYPE: &[u8] = b"commit";
const TREE_OBJECT_TYPE: &[u8] = b"tree";
const BLOB_OBJECT_TYPE: &[u8] = b"blob";
const TAG_OBJECT_TYPE: &[u8] = b"tag";

impl Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ObjectType::Blob => write!(f, "blob"),
            ObjectType::Tree => write!(f, "tree"),
            ObjectType::Commit => write!(f, "commit"),
            ObjectType::Tag => write!(f, "tag"),
            ObjectType::OffsetDelta => write!(f, "OffsetDelta"),
            ObjectType::HashDelta => write!(f, "HashDelta"),
        }
    }
}

impl ObjectType {
    /// True for the four base object types that carry their own content
    /// (as opposed to a delta, which needs a base to resolve against).
    pub fn is_base(&self) -> bool {
        matches!(
            self,
            ObjectType::Commit | ObjectType::Tree | ObjectType::Blob | ObjectType::Tag
        )
    }

    /// Convert to the 3-bit type id used in a pack entry header.
    pub fn to_pack_type_u8(&self) -> u8 {
        match self {
            ObjectType::Commit => 1,
            ObjectType::Tree => 2,
            ObjectType::Blob => 3,
            ObjectType::Tag => 4,
            ObjectType::OffsetDelta => 6,
            ObjectType::HashDelta => 7,
        }
    }

    /// Decode the 3-bit type id read from a pack entry header.
    pub fn from_pack_type_u8(number: u8) -> Result<ObjectType, GitError> {
        match number {
            1 => Ok(ObjectType::Commit),
            2 => Ok(ObjectType::Tree),
            3 => Ok(ObjectType::Blob),
            4 => Ok(ObjectType::Tag),
            6 => Ok(ObjectType::OffsetDelta),
            7 => Ok(ObjectType::HashDelta),
            _ => Err(GitError::InvalidObjectType(format!(
                "invalid pack object type number: {number}"
            ))),
        }
    }

    /// ASCII bytes used in the loose object header (`"<type> <len>\0"`).
    /// Panics for delta types, which never have a standalone loose-object
    /// header of their own.
    pub fn to_data(self) -> Vec<u8> {
        match self {
            ObjectType::Commit => COMMIT_OBJECT_TYPE.to_vec(),
            ObjectType::Tree => TREE_OBJECT_TYPE.to_vec(),
            ObjectType::Blob => BLOB_OBJECT_TYPE.to_vec(),
            ObjectType::Tag => TAG_OBJECT_TYPE.to_vec(),
            ObjectType::OffsetDelta | ObjectType::HashDelta => {
                panic!("delta object types have no standalone loose-object header")
            }
        }
    }

    /// Parse the ASCII object type name found in a loose object header.
    pub fn from_string(s: &str) -> Result<ObjectType, GitError> {
        match s {
            "blob" => Ok(ObjectType::Blob),
            "tree" => Ok(ObjectType::Tree),
            "commit" => Ok(ObjectType::Commit),
            "tag" => Ok(ObjectType::Tag),
            _ => Err(GitError::InvalidObjectType(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_pack_type_ids() {
        for t in [
            ObjectType::Commit,
            ObjectType::Tree,
            ObjectType::Blob,
            ObjectType::Tag,
            ObjectType::OffsetDelta,
            ObjectType::HashDelta,
        ] {
            let id = t.to_pack_type_u8();
            assert_eq!(ObjectType::from_pack_type_u8(id).unwrap(), t);
        }
    }

    #[test]
    fn parses_loose_header_names() {
        assert_eq!(ObjectType::from_string("blob").unwrap(), ObjectType::Blob);
        assert!(ObjectType::from_string("bogus").is_err());
    }
}
