//! Directory-entry blame: for each immediate child of a directory, the
//! most recent ancestor commit that last changed it. Not line-level blame
//! (explicitly out of scope, §1) — one verdict per tree entry.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, FixedOffset};

use crate::diff::validate_path;
use crate::errors::GitError;
use crate::hash::ObjectHash;
use crate::store::ObjectStore;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BlameEntry {
    pub commit_id: ObjectHash,
    pub author_name: String,
    pub message_first_line: String,
    pub when: DateTime<FixedOffset>,
}

/// Resolve `dir_path` under `root_tree` to the `(name, entry_hash)` pairs
/// of its immediate children, in tree order. Empty `dir_path` means the
/// tree root itself.
fn dir_children(store: &ObjectStore, root_tree: ObjectHash, dir_path: &str) -> Result<Vec<(String, ObjectHash)>, GitError> {
    validate_path(dir_path)?;
    let mut current = root_tree;
    for component in dir_path.split('/').filter(|c| !c.is_empty()) {
        let tree = store.get_tree(current)?;
        let Some(entry) = tree.find(component) else {
            return Err(GitError::NotFound(format!("no such directory `{dir_path}`")));
        };
        if !entry.mode.is_tree() {
            return Err(GitError::NotFound(format!("`{dir_path}` is not a directory")));
        }
        current = entry.id;
    }
    let tree = store.get_tree(current)?;
    Ok(tree.entries.iter().map(|e| (e.name.clone(), e.id)).collect())
}

/// For each immediate child of `dir_path` as it exists at `commit_id`,
/// find the closest ancestor commit (bounded BFS, §4.F) that last touched
/// it. Entries not resolved within `max_commits` come back with `None`.
pub fn blame_directory(
    store: &ObjectStore,
    commit_id: ObjectHash,
    dir_path: &str,
    max_commits: usize,
) -> Result<HashMap<String, Option<BlameEntry>>, GitError> {
    let target_commit = store.get_commit(commit_id)?;
    let children = dir_children(store, target_commit.tree_id, dir_path)?;
    let all_names: Vec<String> = children.iter().map(|(n, _)| n.clone()).collect();

    let mut pending: HashMap<String, ObjectHash> = children.into_iter().collect();
    let mut origins: HashMap<String, ObjectHash> = HashMap::new();

    let mut visited: HashSet<ObjectHash> = HashSet::new();
    visited.insert(commit_id);

    // Queue carries (ancestor, descendant): `descendant` is the commit one
    // step closer to `commit_id` along the BFS edge we reached `ancestor`
    // through — the commit credited with the change if `ancestor` turns
    // out to differ.
    let mut queue: VecDeque<(ObjectHash, ObjectHash)> = VecDeque::new();
    for parent in &target_commit.parent_commit_ids {
        queue.push_back((*parent, commit_id));
    }

    let mut visited_count = 0usize;
    while let Some((ancestor_id, descendant_id)) = queue.pop_front() {
        if pending.is_empty() {
            break;
        }
        if visited_count >= max_commits {
            break;
        }
        if !visited.insert(ancestor_id) {
            continue;
        }
        visited_count += 1;

        let Ok(ancestor_commit) = store.get_commit(ancestor_id) else {
            continue;
        };
        let ancestor_map: HashMap<String, ObjectHash> = dir_children(store, ancestor_commit.tree_id, dir_path)
            .unwrap_or_default()
            .into_iter()
            .collect();

        let mut resolved = Vec::new();
        for (name, hash) in &pending {
            let unchanged = matches!(ancestor_map.get(name), Some(ancestor_hash) if ancestor_hash == hash);
            if !unchanged {
                origins.insert(name.clone(), descendant_id);
                resolved.push(name.clone());
            }
        }
        for name in resolved {
            pending.remove(&name);
        }
        if pending.is_empty() {
            break;
        }

        for parent in &ancestor_commit.parent_commit_ids {
            if !visited.contains(parent) {
                queue.push_back((*parent, ancestor_id));
            }
        }
    }

    let mut result = HashMap::new();
    for name in all_names {
        let entry = match origins.get(&name) {
            Some(origin_commit_id) => {
                let commit = store.get_commit(*origin_commit_id)?;
                Some(BlameEntry {
                    commit_id: *origin_commit_id,
                    author_name: commit.author.name.clone(),
                    message_first_line: commit.format_message(),
                    when: commit.author.when(),
                })
            }
            None => None,
        };
        result.insert(name, entry);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::signature::{Signature, SignatureRole};
    use crate::object::tree::{TreeEntry, TreeEntryKind};
    use crate::object::types::ObjectType;
    use crate::object::{Commit, ObjectTrait, Tree};
    use tempfile::TempDir;

    fn write_loose(git_dir: &std::path::Path, object_type: ObjectType, data: &[u8]) -> ObjectHash {
        let hash = ObjectHash::from_type_and_data(object_type, data);
        let hex = hash.to_hex();
        let dir = git_dir.join("objects").join(&hex[..2]);
        std::fs::create_dir_all(&dir).unwrap();
        let mut framed = Vec::new();
        framed.extend(object_type.to_data());
        framed.push(b' ');
        framed.extend(data.len().to_string().as_bytes());
        framed.push(0);
        framed.extend(data);
        use std::io::Write;
        let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&framed).unwrap();
        std::fs::write(dir.join(&hex[2..]), encoder.finish().unwrap()).unwrap();
        hash
    }

    fn sig(role: SignatureRole, ts: i64) -> Signature {
        Signature { role, name: "A".to_string(), email: "a@b.com".to_string(), timestamp: ts, offset_minutes: 0 }
    }

    fn write_commit(
        git_dir: &std::path::Path,
        tree_id: ObjectHash,
        parents: Vec<ObjectHash>,
        ts: i64,
        message: &str,
    ) -> ObjectHash {
        let commit = Commit::new(sig(SignatureRole::Author, ts), sig(SignatureRole::Committer, ts), tree_id, parents, message);
        write_loose(git_dir, ObjectType::Commit, &commit.to_data().unwrap())
    }

    fn write_tree(git_dir: &std::path::Path, entries: Vec<TreeEntry>) -> ObjectHash {
        let tree = Tree::new(entries);
        write_loose(git_dir, ObjectType::Tree, &tree.to_data().unwrap())
    }

    #[test]
    fn finds_last_modifying_commit_per_child() {
        let tmp = TempDir::new().unwrap();
        let git_dir = tmp.path().join(".git");
        std::fs::create_dir_all(git_dir.join("objects")).unwrap();

        let blob_v1 = write_loose(&git_dir, ObjectType::Blob, b"v1");
        let blob_v2 = write_loose(&git_dir, ObjectType::Blob, b"v2");
        let untouched = write_loose(&git_dir, ObjectType::Blob, b"stable");

        let tree1 = write_tree(
            &git_dir,
            vec![
                TreeEntry { mode: TreeEntryKind::Blob, name: "a.txt".to_string(), id: blob_v1 },
                TreeEntry { mode: TreeEntryKind::Blob, name: "b.txt".to_string(), id: untouched },
            ],
        );
        let c1 = write_commit(&git_dir, tree1, vec![], 100, "first\n");

        let tree2 = write_tree(
            &git_dir,
            vec![
                TreeEntry { mode: TreeEntryKind::Blob, name: "a.txt".to_string(), id: blob_v2 },
                TreeEntry { mode: TreeEntryKind::Blob, name: "b.txt".to_string(), id: untouched },
            ],
        );
        let c2 = write_commit(&git_dir, tree2, vec![c1], 200, "second: change a\n");

        let store = ObjectStore::open(&git_dir, 50).unwrap();
        let blame = blame_directory(&store, c2, "", 1000).unwrap();

        assert_eq!(blame.get("a.txt").unwrap().as_ref().unwrap().commit_id, c2);
        assert_eq!(blame.get("b.txt").unwrap().as_ref().unwrap().commit_id, c1);
    }

    #[test]
    fn unresolved_within_depth_limit_reports_none() {
        let tmp = TempDir::new().unwrap();
        let git_dir = tmp.path().join(".git");
        std::fs::create_dir_all(git_dir.join("objects")).unwrap();

        let blob = write_loose(&git_dir, ObjectType::Blob, b"x");
        let tree = write_tree(&git_dir, vec![TreeEntry { mode: TreeEntryKind::Blob, name: "f.txt".to_string(), id: blob }]);
        let c1 = write_commit(&git_dir, tree, vec![], 1, "root\n");

        let store = ObjectStore::open(&git_dir, 50).unwrap();
        let blame = blame_directory(&store, c1, "", 0).unwrap();
        assert!(blame.get("f.txt").unwrap().is_none());
    }
}
