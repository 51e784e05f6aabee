//! The annotated Tag object: a pointer to another object plus a tagger
//! signature and message. Lightweight tags never produce one of these —
//! they're just a ref pointing straight at a commit — so `Tag` values only
//! ever come from parsing an actual tag object's bytes.

use std::fmt::Display;
use std::str::FromStr;

use bstr::ByteSlice;
use serde::{Deserialize, Serialize};

use crate::errors::GitError;
use crate::hash::ObjectHash;
use crate::object::signature::Signature;
use crate::object::{ObjectTrait, types::ObjectType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: ObjectHash,
    pub object_id: ObjectHash,
    pub object_type: ObjectType,
    pub tag_name: String,
    pub tagger: Signature,
    pub message: String,
}

impl PartialEq for Tag {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for Tag {}

impl Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        writeln!(f, "object {}", self.object_id)?;
        writeln!(f, "type {}", self.object_type)?;
        writeln!(f, "tag {}", self.tag_name)?;
        writeln!(f, "{}", self.tagger)?;
        write!(f, "{}", self.message)
    }
}

impl ObjectTrait for Tag {
    fn from_bytes(data: &[u8], hash: ObjectHash) -> Result<Self, GitError> {
        let mut rest = data;

        let object_line_end = rest
            .find_byte(0x0a)
            .ok_or_else(|| GitError::InvalidTagObject("missing object line".to_string()))?;
        let object_id = ObjectHash::from_str(
            std::str::from_utf8(&rest[7..object_line_end]) // "object " is 7 bytes
                .map_err(|e| GitError::InvalidTagObject(e.to_string()))?,
        )
        .map_err(GitError::InvalidHashValue)?;
        rest = &rest[object_line_end + 1..];

        let type_line_end = rest
            .find_byte(0x0a)
            .ok_or_else(|| GitError::InvalidTagObject("missing type line".to_string()))?;
        let object_type = ObjectType::from_string(
            std::str::from_utf8(&rest[5..type_line_end]) // "type " is 5 bytes
                .map_err(|e| GitError::InvalidTagObject(e.to_string()))?,
        )?;
        rest = &rest[type_line_end + 1..];

        let tag_line_end = rest
            .find_byte(0x0a)
            .ok_or_else(|| GitError::InvalidTagObject("missing tag line".to_string()))?;
        let tag_name = String::from_utf8_lossy(&rest[4..tag_line_end]).to_string(); // "tag " is 4 bytes
        rest = &rest[tag_line_end + 1..];

        let tagger_line_end = rest
            .find_byte(0x0a)
            .ok_or_else(|| GitError::InvalidTagObject("missing tagger line".to_string()))?;
        let tagger = Signature::from_data(rest[..tagger_line_end].to_vec())
            .map_err(|e| GitError::InvalidTagObject(e.to_string()))?;
        rest = &rest[tagger_line_end + 1..];

        // A blank line separates the header from the message; tolerate its
        // absence for odd hand-written fixtures.
        let message = if rest.first() == Some(&0x0a) {
            String::from_utf8_lossy(&rest[1..]).to_string()
        } else {
            String::from_utf8_lossy(rest).to_string()
        };

        Ok(Tag {
            id: hash,
            object_id,
            object_type,
            tag_name,
            tagger,
            message,
        })
    }

    fn get_type(&self) -> ObjectType {
        ObjectType::Tag
    }

    fn get_size(&self) -> usize {
        0
    }

    fn to_data(&self) -> Result<Vec<u8>, GitError> {
        let mut data = Vec::new();
        data.extend(b"object ");
        data.extend(self.object_id.to_string().as_bytes());
        data.push(0x0a);
        data.extend(b"type ");
        data.extend(self.object_type.to_string().as_bytes());
        data.push(0x0a);
        data.extend(b"tag ");
        data.extend(self.tag_name.as_bytes());
        data.push(0x0a);
        data.extend(self.tagger.to_data()?);
        data.push(0x0a);
        data.push(0x0a);
        data.extend(self.message.as_bytes());
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_annotated_tag() {
        let object_id = ObjectHash::new(b"some commit");
        let tagger =
            Signature::from_data(b"tagger A U Thor <a@b.com> 1000 +0000".to_vec()).unwrap();
        let mut tag = Tag {
            id: ObjectHash::ZERO,
            object_id,
            object_type: ObjectType::Commit,
            tag_name: "v1.0.0".to_string(),
            tagger,
            message: "release\n".to_string(),
        };
        let data = tag.to_data().unwrap();
        tag.id = ObjectHash::from_type_and_data(ObjectType::Tag, &data);

        let parsed = Tag::from_bytes(&data, tag.id).unwrap();
        assert_eq!(parsed.object_id, object_id);
        assert_eq!(parsed.tag_name, "v1.0.0");
        assert_eq!(parsed.message, "release\n");
    }
}
