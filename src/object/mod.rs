//! Object model for Git blobs, trees, commits, and tags, plus the common
//! trait that lets the pack and loose-object readers build strongly typed
//! values out of raw bytes without knowing which concrete type they hold
//! until the header has been parsed.

pub mod blob;
pub mod commit;
pub mod signature;
pub mod tag;
pub mod tree;
pub mod types;

use std::fmt::Display;
use std::io::{BufRead, Read};

use crate::{errors::GitError, hash::ObjectHash, object::types::ObjectType, zlib::ReadBoxed};

pub use blob::Blob;
pub use commit::Commit;
pub use tag::Tag;
pub use tree::{Tree, TreeEntry, TreeEntryKind};

/// Common interface implemented by `Blob`, `Tree`, `Commit`, and `Tag`.
pub trait ObjectTrait: Send + Sync + Display {
    /// Parse a value of this type out of its already-decompressed content
    /// bytes, given the hash the object was looked up by.
    fn from_bytes(data: &[u8], hash: ObjectHash) -> Result<Self, GitError>
    where
        Self: Sized;

    /// Read and parse a base (non-delta) object straight out of an
    /// inflating reader, reusing the SHA-1 the reader accumulated over the
    /// object header and content rather than rehashing.
    fn from_buf_read<R: BufRead>(read: &mut ReadBoxed<R>, size: usize) -> Result<Self, GitError>
    where
        Self: Sized,
    {
        let mut content = Vec::with_capacity(size);
        read.read_to_end(&mut content)?;
        let hash = read.hash.clone().finalize();
        Self::from_bytes(&content, hash)
    }

    fn get_type(&self) -> ObjectType;

    fn get_size(&self) -> usize;

    fn to_data(&self) -> Result<Vec<u8>, GitError>;

    /// Computes the object hash from the canonical serialized form. Override
    /// only when the hash is already known up front (e.g. when parsed from
    /// a loose object whose path already encodes it).
    fn object_hash(&self) -> Result<ObjectHash, GitError> {
        let data = self.to_data()?;
        Ok(ObjectHash::from_type_and_data(self.get_type(), &data))
    }
}

/// A decoded Git object of any kind, tagged by its runtime type. This is
/// what the object store and pack reader hand back once a hash has been
/// resolved and its content parsed.
#[derive(Debug, Clone)]
pub enum Object {
    Commit(Commit),
    Tree(Tree),
    Blob(Blob),
    Tag(Tag),
}

impl Object {
    pub fn id(&self) -> ObjectHash {
        match self {
            Object::Commit(c) => c.id,
            Object::Tree(t) => t.id,
            Object::Blob(b) => b.id,
            Object::Tag(t) => t.id,
        }
    }

    pub fn object_type(&self) -> ObjectType {
        match self {
            Object::Commit(_) => ObjectType::Commit,
            Object::Tree(_) => ObjectType::Tree,
            Object::Blob(_) => ObjectType::Blob,
            Object::Tag(_) => ObjectType::Tag,
        }
    }

    /// Parse a base (non-delta) object, dispatching on `object_type`.
    pub fn parse(object_type: ObjectType, data: &[u8], hash: ObjectHash) -> Result<Object, GitError> {
        match object_type {
            ObjectType::Commit => Ok(Object::Commit(Commit::from_bytes(data, hash)?)),
            ObjectType::Tree => Ok(Object::Tree(Tree::from_bytes(data, hash)?)),
            ObjectType::Blob => Ok(Object::Blob(Blob::from_bytes(data, hash)?)),
            ObjectType::Tag => Ok(Object::Tag(Tag::from_bytes(data, hash)?)),
            ObjectType::OffsetDelta | ObjectType::HashDelta => Err(GitError::Malformed(
                "cannot parse a delta entry as a base object".to_string(),
            )),
        }
    }

    pub fn as_commit(&self) -> Option<&Commit> {
        match self {
            Object::Commit(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_tree(&self) -> Option<&Tree> {
        match self {
            Object::Tree(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&Blob> {
        match self {
            Object::Blob(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_tag(&self) -> Option<&Tag> {
        match self {
            Object::Tag(t) => Some(t),
            _ => None,
        }
    }
}
