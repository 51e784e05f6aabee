//! Working-tree status: what's staged in the index relative to HEAD, what's
//! modified on disk relative to the index, and what's untracked. This is
//! consumed two ways — on demand by external collaborators, and by the
//! Live Manager's low-frequency poller (§4.G.3), since edits and new files
//! never touch `<gitDir>` and so are invisible to the filesystem watcher.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::diff::DiffStatus;
use crate::errors::GitError;
use crate::hash::{HASH_SIZE, ObjectHash};
use crate::repo::Snapshot;
use crate::store::ObjectStore;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PathStatus {
    pub path: String,
    pub status: DiffStatus,
}

/// Canonicalized (sorted) shape matching §9's open question: the poller's
/// change detection needs a stable serialization to avoid spurious
/// broadcasts on every tick, so fields are always emitted in sorted order.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct WorkingTreeStatus {
    pub staged: Vec<PathStatus>,
    pub modified: Vec<PathStatus>,
    pub untracked: Vec<String>,
}

struct IndexEntry {
    path: String,
    id: ObjectHash,
}

/// Parse `.git/index` (v2/v3 fixed-length entries; v4's name-prefix
/// compression isn't supported and yields an empty index with a warning —
/// status then degrades to "everything looks untracked/modified" rather
/// than failing the whole poll).
fn read_index(git_dir: &Path) -> Result<Vec<IndexEntry>, GitError> {
    let path = git_dir.join("index");
    let Ok(data) = std::fs::read(&path) else {
        return Ok(Vec::new());
    };
    if data.len() < 12 || &data[0..4] != b"DIRC" {
        return Ok(Vec::new());
    }
    let version = u32::from_be_bytes(data[4..8].try_into().unwrap());
    let entry_count = u32::from_be_bytes(data[8..12].try_into().unwrap()) as usize;
    if version == 4 {
        tracing::warn!("index format v4 (name compression) is not supported; reporting empty index");
        return Ok(Vec::new());
    }

    let mut entries = Vec::with_capacity(entry_count);
    let mut offset = 12usize;
    for _ in 0..entry_count {
        let entry_start = offset;
        if offset + 62 > data.len() {
            break;
        }
        let sha_start = offset + 40;
        let id = match ObjectHash::from_bytes(&data[sha_start..sha_start + HASH_SIZE]) {
            Ok(id) => id,
            Err(_) => break,
        };
        let flags_start = sha_start + HASH_SIZE;
        let flags = u16::from_be_bytes(data[flags_start..flags_start + 2].try_into().unwrap());
        let mut cursor = flags_start + 2;
        if version == 3 && flags & 0x4000 != 0 {
            cursor += 2; // extended flags
        }
        let name_end = data[cursor..].iter().position(|&b| b == 0).map(|p| cursor + p);
        let Some(name_end) = name_end else { break };
        let name = String::from_utf8_lossy(&data[cursor..name_end]).to_string();

        let consumed = name_end + 1 - entry_start;
        let padded = consumed.div_ceil(8) * 8;
        offset = entry_start + padded;

        entries.push(IndexEntry { path: name, id });
    }

    Ok(entries)
}

/// Diff the index against HEAD's tree, by path, to determine what's staged
/// (added/modified/deleted relative to the last commit).
fn staged_status(store: &ObjectStore, head_tree: Option<ObjectHash>, index: &[IndexEntry]) -> Result<Vec<PathStatus>, GitError> {
    let mut head_paths: HashMap<String, ObjectHash> = HashMap::new();
    if let Some(tree_id) = head_tree {
        collect_tree_paths(store, tree_id, "", &mut head_paths)?;
    }

    let mut staged = Vec::new();
    let mut seen: std::collections::HashSet<&str> = std::collections::HashSet::new();
    for entry in index {
        seen.insert(entry.path.as_str());
        match head_paths.get(&entry.path) {
            None => staged.push(PathStatus { path: entry.path.clone(), status: DiffStatus::Added }),
            Some(head_hash) if *head_hash != entry.id => {
                staged.push(PathStatus { path: entry.path.clone(), status: DiffStatus::Modified })
            }
            _ => {}
        }
    }
    for (path, _) in &head_paths {
        if !seen.contains(path.as_str()) {
            staged.push(PathStatus { path: path.clone(), status: DiffStatus::Deleted });
        }
    }
    staged.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(staged)
}

fn collect_tree_paths(store: &ObjectStore, tree_id: ObjectHash, prefix: &str, out: &mut HashMap<String, ObjectHash>) -> Result<(), GitError> {
    let tree = store.get_tree(tree_id)?;
    for entry in &tree.entries {
        let path = if prefix.is_empty() { entry.name.clone() } else { format!("{prefix}/{}", entry.name) };
        if entry.mode.is_tree() {
            collect_tree_paths(store, entry.id, &path, out)?;
        } else {
            out.insert(path, entry.id);
        }
    }
    Ok(())
}

/// Compare on-disk content of every indexed path against the index's
/// recorded blob hash, and walk the working tree for anything not in the
/// index at all (untracked).
fn worktree_vs_index(work_dir: &Path, index: &[IndexEntry]) -> (Vec<PathStatus>, Vec<String>) {
    let indexed: std::collections::HashSet<&str> = index.iter().map(|e| e.path.as_str()).collect();

    let mut modified = Vec::new();
    for entry in index {
        let on_disk = work_dir.join(&entry.path);
        match std::fs::read(&on_disk) {
            Ok(data) => {
                let current_hash = ObjectHash::from_type_and_data(crate::object::types::ObjectType::Blob, &data);
                if current_hash != entry.id {
                    modified.push(PathStatus { path: entry.path.clone(), status: DiffStatus::Modified });
                }
            }
            Err(_) => modified.push(PathStatus { path: entry.path.clone(), status: DiffStatus::Deleted }),
        }
    }
    modified.sort_by(|a, b| a.path.cmp(&b.path));

    let mut untracked = Vec::new();
    walk_untracked(work_dir, work_dir, &indexed, &mut untracked);
    untracked.sort();
    (modified, untracked)
}

fn walk_untracked(root: &Path, dir: &Path, indexed: &std::collections::HashSet<&str>, out: &mut Vec<String>) {
    let Ok(entries) = std::fs::read_dir(dir) else { return };
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
        if name == ".git" {
            continue;
        }
        if path.is_dir() {
            walk_untracked(root, &path, indexed, out);
            continue;
        }
        let Ok(rel) = path.strip_prefix(root) else { continue };
        let rel_str = rel.to_string_lossy().replace('\\', "/");
        if !indexed.contains(rel_str.as_str()) {
            out.push(rel_str);
        }
    }
}

/// Full working-tree status for `snapshot`: staged vs. HEAD, modified vs.
/// the index, and untracked paths. Returns the empty status for a bare
/// repository (no working tree to inspect).
pub fn compute_status(store: &ObjectStore, snapshot: &Snapshot) -> Result<WorkingTreeStatus, GitError> {
    let Some(work_dir) = &snapshot.work_dir else {
        return Ok(WorkingTreeStatus::default());
    };

    let index = read_index(&snapshot.git_dir)?;
    let head_tree = snapshot
        .head
        .hash
        .and_then(|h| snapshot.get_commit(&h))
        .map(|c| c.tree_id);

    let staged = staged_status(store, head_tree, &index)?;
    let (modified, untracked) = worktree_vs_index(work_dir, &index);

    Ok(WorkingTreeStatus { staged, modified, untracked })
}

/// Path to the repository's `.git/index`, for callers that want to detect
/// changes cheaply (e.g. polling mtime) before paying for a full status
/// recompute. Not currently used by the poller, which recomputes and
/// compares the canonical serialization instead (§9), but kept as the
/// obvious extension point.
pub fn index_path(git_dir: &Path) -> PathBuf {
    git_dir.join("index")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_status_for_bare_repo() {
        let snapshot = Snapshot::empty();
        assert!(snapshot.work_dir.is_none());
    }

    #[test]
    fn missing_index_file_yields_empty_entries() {
        let tmp = tempfile::TempDir::new().unwrap();
        let entries = read_index(tmp.path()).unwrap();
        assert!(entries.is_empty());
    }
}
