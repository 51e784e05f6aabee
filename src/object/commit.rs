//! The Commit object anchors a single point in a project's history: the
//! tree that reflects the full state of the repository at that point, the
//! parent commit(s) it was built from, and who made the change and why.

use std::fmt::Display;
use std::str::FromStr;

use bstr::ByteSlice;
use serde::{Deserialize, Serialize};

use crate::errors::GitError;
use crate::hash::ObjectHash;
use crate::object::signature::Signature;
use crate::object::{ObjectTrait, types::ObjectType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commit {
    pub id: ObjectHash,
    pub tree_id: ObjectHash,
    pub parent_commit_ids: Vec<ObjectHash>,
    pub author: Signature,
    pub committer: Signature,
    pub message: String,
}

impl PartialEq for Commit {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for Commit {}

impl Display for Commit {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        writeln!(f, "tree: {}", self.tree_id)?;
        for parent in self.parent_commit_ids.iter() {
            writeln!(f, "parent: {parent}")?;
        }
        writeln!(f, "author {}", self.author)?;
        writeln!(f, "committer {}", self.committer)?;
        writeln!(f, "{}", self.message)
    }
}

impl Commit {
    pub fn new(
        author: Signature,
        committer: Signature,
        tree_id: ObjectHash,
        parent_commit_ids: Vec<ObjectHash>,
        message: &str,
    ) -> Commit {
        let mut commit = Commit {
            id: ObjectHash::default(),
            tree_id,
            parent_commit_ids,
            author,
            committer,
            message: message.to_string(),
        };
        let hash = ObjectHash::from_type_and_data(ObjectType::Commit, &commit.to_data().unwrap());
        commit.id = hash;
        commit
    }

    /// Extracts the first non-blank line of the commit message, skipping
    /// past any embedded PGP signature block — the summary line used in
    /// blame results and log-style listings.
    pub fn format_message(&self) -> String {
        if let Some(pos) = self
            .message
            .lines()
            .position(|line| line.contains("-----END PGP SIGNATURE-----"))
        {
            return self
                .message
                .lines()
                .skip(pos + 1)
                .find(|line| !line.trim().is_empty())
                .map(|line| line.to_owned())
                .unwrap_or_else(|| self.message.clone());
        }

        self.message
            .lines()
            .find(|line| !line.trim().is_empty())
            .map(|line| line.to_owned())
            .unwrap_or_else(|| self.message.clone())
    }

    /// True if this commit has more than one parent.
    pub fn is_merge(&self) -> bool {
        self.parent_commit_ids.len() > 1
    }
}

impl ObjectTrait for Commit {
    fn from_bytes(data: &[u8], hash: ObjectHash) -> Result<Self, GitError> {
        let mut commit = data;

        let tree_end = commit
            .find_byte(0x0a)
            .ok_or_else(|| GitError::InvalidCommitObject("missing tree line".to_string()))?;
        let tree_id = ObjectHash::from_str(
            std::str::from_utf8(&commit[5..tree_end]) // "tree " is 5 bytes
                .map_err(|e| GitError::InvalidCommitObject(e.to_string()))?,
        )
        .map_err(GitError::InvalidHashValue)?;
        let binding = commit[tree_end + 1..].to_vec();
        commit = &binding;

        let author_begin = commit
            .find("author")
            .ok_or_else(|| GitError::InvalidCommitObject("missing author line".to_string()))?;
        let parent_commit_ids: Vec<ObjectHash> = commit[..author_begin]
            .find_iter("parent")
            .map(|parent| {
                let parent_end = commit[parent..]
                    .find_byte(0x0a)
                    .map(|p| parent + p)
                    .unwrap_or(commit.len());
                ObjectHash::from_str(
                    std::str::from_utf8(&commit[parent + 7..parent_end]) // "parent " is 7 bytes
                        .map_err(|e| GitError::InvalidCommitObject(e.to_string()))?,
                )
                .map_err(GitError::InvalidHashValue)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let binding = commit[author_begin..].to_vec();
        commit = &binding;

        let author_line_end = commit
            .find_byte(0x0a)
            .ok_or_else(|| GitError::InvalidCommitObject("missing author line end".to_string()))?;
        let author = Signature::from_data(commit[..author_line_end].to_vec())
            .map_err(|e| GitError::InvalidCommitObject(e.to_string()))?;

        let binding = commit[author_line_end + 1..].to_vec();
        commit = &binding;
        let committer_line_end = commit
            .find_byte(0x0a)
            .ok_or_else(|| GitError::InvalidCommitObject("missing committer line".to_string()))?;
        let committer = Signature::from_data(commit[..committer_line_end].to_vec())
            .map_err(|e| GitError::InvalidCommitObject(e.to_string()))?;

        let message_start = committer_line_end + 1;
        let message = String::from_utf8_lossy(&commit[message_start..]).to_string();

        Ok(Commit {
            id: hash,
            tree_id,
            parent_commit_ids,
            author,
            committer,
            message,
        })
    }

    fn get_type(&self) -> ObjectType {
        ObjectType::Commit
    }

    fn get_size(&self) -> usize {
        0
    }

    fn to_data(&self) -> Result<Vec<u8>, GitError> {
        let mut data = Vec::new();

        data.extend(b"tree ");
        data.extend(self.tree_id.to_string().as_bytes());
        data.push(0x0a);

        for parent_tree_id in &self.parent_commit_ids {
            data.extend(b"parent ");
            data.extend(parent_tree_id.to_string().as_bytes());
            data.push(0x0a);
        }

        data.extend(self.author.to_data()?);
        data.push(0x0a);
        data.extend(self.committer.to_data()?);
        data.push(0x0a);
        data.extend(self.message.as_bytes());

        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic_commit() -> Commit {
        let raw_commit = br#"tree 341e54913a3a43069f2927cc0f703e5a9f730df1
author benjamin <benjamin@example.com> 1757467768 +0800
committer benjamin <benjamin@example.com> 1757491219 +0800

test parse commit from bytes
"#;
        let hash = ObjectHash::from_str("57d7685c60213a9da465cf900f31933be3a7ee39").unwrap();
        Commit::from_bytes(raw_commit, hash).unwrap()
    }

    #[test]
    fn parses_tree_and_signatures() {
        let commit = basic_commit();
        assert_eq!(
            commit.tree_id,
            ObjectHash::from_str("341e54913a3a43069f2927cc0f703e5a9f730df1").unwrap()
        );
        assert_eq!(commit.author.name, "benjamin");
        assert_eq!(commit.author.email, "benjamin@example.com");
        assert_eq!(commit.committer.name, "benjamin");
        assert!(commit.parent_commit_ids.is_empty());
    }

    #[test]
    fn format_message_skips_pgp_block() {
        let raw_commit = br#"tree 341e54913a3a43069f2927cc0f703e5a9f730df1
author benjamin <benjamin@example.com> 1757467768 +0800
committer benjamin <benjamin@example.com> 1757491219 +0800
gpgsig -----BEGIN PGP SIGNATURE-----

 abc123
 -----END PGP SIGNATURE-----

real message here
"#;
        let hash = ObjectHash::new(raw_commit);
        let commit = Commit::from_bytes(raw_commit, hash).unwrap();
        assert_eq!(commit.format_message(), "real message here");
    }

    #[test]
    fn detects_merge_commits() {
        let mut commit = basic_commit();
        assert!(!commit.is_merge());
        commit.parent_commit_ids.push(ObjectHash::new(b"p1"));
        commit.parent_commit_ids.push(ObjectHash::new(b"p2"));
        assert!(commit.is_merge());
    }
}
