//! The Tree object: a sorted list of directory entries, each naming a mode,
//! a path component, and the hash of the blob/subtree it points to.

use std::fmt::Display;

use bstr::ByteSlice;
use serde::{Deserialize, Serialize};

use crate::errors::GitError;
use crate::hash::ObjectHash;
use crate::object::{ObjectTrait, types::ObjectType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TreeEntryKind {
    Blob,
    BlobExecutable,
    Tree,
    Symlink,
    Commit, // gitlink / submodule
}

impl TreeEntryKind {
    pub fn mode_str(&self) -> &'static str {
        match self {
            TreeEntryKind::Blob => "100644",
            TreeEntryKind::BlobExecutable => "100755",
            TreeEntryKind::Tree => "40000",
            TreeEntryKind::Symlink => "120000",
            TreeEntryKind::Commit => "160000",
        }
    }

    pub fn from_mode(mode: &str) -> Result<TreeEntryKind, GitError> {
        match mode {
            "100644" | "100664" => Ok(TreeEntryKind::Blob),
            "100755" => Ok(TreeEntryKind::BlobExecutable),
            "40000" | "040000" => Ok(TreeEntryKind::Tree),
            "120000" => Ok(TreeEntryKind::Symlink),
            "160000" => Ok(TreeEntryKind::Commit),
            other => Err(GitError::InvalidTreeItem(format!(
                "unrecognized tree entry mode `{other}`"
            ))),
        }
    }

    pub fn is_tree(&self) -> bool {
        matches!(self, TreeEntryKind::Tree)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub mode: TreeEntryKind,
    pub name: String,
    pub id: ObjectHash,
}

/// Git's tree sort order compares names as if directory entries carried a
/// trailing `/`. For a file/directory pair sharing a name prefix (`foo.txt`
/// vs. the directory `foo`), the comparison point is `'.'` (0x2e) in
/// `foo.txt` against the implicit `'/'` (0x2f) for `foo`'s subtree, and
/// `'.' < '/'`, so the file `foo.txt` sorts *before* the directory `foo`.
pub(crate) fn tree_entry_key(entry: &TreeEntry) -> Vec<u8> {
    let mut key = entry.name.as_bytes().to_vec();
    if entry.mode.is_tree() {
        key.push(b'/');
    }
    key
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tree {
    pub id: ObjectHash,
    pub entries: Vec<TreeEntry>,
}

impl PartialEq for Tree {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for Tree {}

impl Display for Tree {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{} {} {}", entry.mode.mode_str(), entry.id, entry.name)?;
        }
        Ok(())
    }
}

impl Tree {
    pub fn new(mut entries: Vec<TreeEntry>) -> Tree {
        entries.sort_by(|a, b| tree_entry_key(a).cmp(&tree_entry_key(b)));
        let data = Self::encode(&entries);
        let id = ObjectHash::from_type_and_data(ObjectType::Tree, &data);
        Tree { id, entries }
    }

    fn encode(entries: &[TreeEntry]) -> Vec<u8> {
        let mut data = Vec::new();
        for entry in entries {
            data.extend(entry.mode.mode_str().as_bytes());
            data.push(b' ');
            data.extend(entry.name.as_bytes());
            data.push(0);
            data.extend(entry.id.to_data());
        }
        data
    }

    pub fn find(&self, name: &str) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.name == name)
    }
}

impl ObjectTrait for Tree {
    fn from_bytes(data: &[u8], hash: ObjectHash) -> Result<Self, GitError> {
        let mut entries = Vec::new();
        let mut rest = data;
        while !rest.is_empty() {
            let sp = rest
                .find_byte(b' ')
                .ok_or_else(|| GitError::InvalidTreeObject("missing mode separator".to_string()))?;
            let mode_str = rest[..sp]
                .to_str()
                .map_err(|e| GitError::InvalidTreeObject(e.to_string()))?;
            let mode = TreeEntryKind::from_mode(mode_str)?;

            let nul = rest[sp + 1..]
                .find_byte(0)
                .ok_or_else(|| GitError::InvalidTreeObject("missing name terminator".to_string()))?;
            let name = String::from_utf8_lossy(&rest[sp + 1..sp + 1 + nul]).to_string();

            let hash_start = sp + 1 + nul + 1;
            let hash_end = hash_start + crate::hash::HASH_SIZE;
            if rest.len() < hash_end {
                return Err(GitError::InvalidTreeObject(
                    "truncated entry hash".to_string(),
                ));
            }
            let id = ObjectHash::from_bytes(&rest[hash_start..hash_end])
                .map_err(GitError::InvalidTreeItem)?;

            entries.push(TreeEntry { mode, name, id });
            rest = &rest[hash_end..];
        }

        Ok(Tree {
            id: hash,
            entries,
        })
    }

    fn get_type(&self) -> ObjectType {
        ObjectType::Tree
    }

    fn get_size(&self) -> usize {
        self.entries.len()
    }

    fn to_data(&self) -> Result<Vec<u8>, GitError> {
        Ok(Self::encode(&self.entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, kind: TreeEntryKind) -> TreeEntry {
        TreeEntry {
            mode: kind,
            name: name.to_string(),
            id: ObjectHash::new(name.as_bytes()),
        }
    }

    #[test]
    fn sorts_directories_after_same_named_file_prefix() {
        let tree = Tree::new(vec![
            entry("foo.txt", TreeEntryKind::Blob),
            entry("foo", TreeEntryKind::Tree),
        ]);
        assert_eq!(tree.entries[0].name, "foo.txt");
        assert_eq!(tree.entries[1].name, "foo");
    }

    #[test]
    fn round_trips_through_bytes() {
        let tree = Tree::new(vec![
            entry("a.txt", TreeEntryKind::Blob),
            entry("sub", TreeEntryKind::Tree),
        ]);
        let data = tree.to_data().unwrap();
        let parsed = Tree::from_bytes(&data, tree.id).unwrap();
        assert_eq!(parsed.entries, tree.entries);
    }
}
