//! Derived-data diffing: tree diff with exact-hash rename detection,
//! unified file diff via a Myers-style LCS alignment, and working-tree
//! diff against HEAD. None of this mutates anything; every function here
//! takes a `Snapshot`/`ObjectStore` and returns a freshly computed value
//! the caller (usually the Live Manager's LRU cache, §4.G.5) is free to
//! hold onto forever, since it's keyed on immutable content hashes.

use std::path::Path;

use similar::{Algorithm, ChangeTag, TextDiff};

use crate::errors::GitError;
use crate::hash::ObjectHash;
use crate::object::tree::{Tree, TreeEntry, TreeEntryKind, tree_entry_key};
use crate::store::ObjectStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffStatus {
    Added,
    Modified,
    Deleted,
    Renamed,
    Copied,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DiffEntry {
    pub path: String,
    pub status: DiffStatus,
    pub old_hash: Option<ObjectHash>,
    pub new_hash: Option<ObjectHash>,
    pub old_path: Option<String>,
    pub is_binary: bool,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct TreeDiffResult {
    pub entries: Vec<DiffEntry>,
    pub truncated: bool,
}

pub fn validate_path(path: &str) -> Result<(), GitError> {
    if path.contains('\0') {
        return Err(GitError::InvalidInput("path contains a NUL byte".to_string()));
    }
    if path.starts_with('/') {
        return Err(GitError::InvalidInput(format!(
            "path `{path}` must be relative to the repository root, not absolute"
        )));
    }
    if path.split('/').any(|segment| segment == "..") {
        return Err(GitError::InvalidInput(format!(
            "path `{path}` contains a `..` traversal segment"
        )));
    }
    Ok(())
}

fn load_tree(store: &ObjectStore, id: Option<ObjectHash>) -> Result<Tree, GitError> {
    match id {
        Some(id) => store.get_tree(id),
        None => Ok(Tree { id: ObjectHash::ZERO, entries: vec![] }),
    }
}

/// Walk `root_tree`'s entries down `path` (slash-separated), returning the
/// entry at the end if it exists.
pub fn resolve_path_in_tree(
    store: &ObjectStore,
    root_tree: ObjectHash,
    path: &str,
) -> Result<Option<(ObjectHash, TreeEntryKind)>, GitError> {
    validate_path(path)?;
    let mut current = root_tree;
    let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
    if components.is_empty() {
        return Ok(Some((root_tree, TreeEntryKind::Tree)));
    }
    for (i, component) in components.iter().enumerate() {
        let tree = store.get_tree(current)?;
        let Some(entry) = tree.find(component) else {
            return Ok(None);
        };
        if i == components.len() - 1 {
            return Ok(Some((entry.id, entry.mode)));
        }
        if !entry.mode.is_tree() {
            return Ok(None);
        }
        current = entry.id;
    }
    Ok(None)
}

/// Tree diff between two (possibly absent) tree ids, with exact-hash
/// rename detection as a post-pass (§4.E.1).
pub fn tree_diff(
    store: &ObjectStore,
    prev_tree_id: Option<ObjectHash>,
    new_tree_id: Option<ObjectHash>,
    max_entries: usize,
) -> Result<TreeDiffResult, GitError> {
    let mut entries = Vec::new();
    let mut truncated = false;
    walk_trees(store, prev_tree_id, new_tree_id, "", &mut entries, max_entries, &mut truncated)?;
    detect_renames(&mut entries);
    Ok(TreeDiffResult { entries, truncated })
}

fn push_entry(out: &mut Vec<DiffEntry>, max_entries: usize, truncated: &mut bool, entry: DiffEntry) -> bool {
    if out.len() >= max_entries {
        *truncated = true;
        return false;
    }
    out.push(entry);
    true
}

fn is_binary_blob(store: &ObjectStore, id: ObjectHash) -> bool {
    store
        .get_blob(id)
        .map(|b| crate::utils::looks_binary(&b.data))
        .unwrap_or(false)
}

/// Recursively emit added/deleted entries for every entry under `tree_id`
/// (used when one whole side of a comparison is absent, or a directory was
/// wholesale added/removed).
fn emit_subtree(
    store: &ObjectStore,
    tree_id: ObjectHash,
    prefix: &str,
    status: DiffStatus,
    out: &mut Vec<DiffEntry>,
    max_entries: usize,
    truncated: &mut bool,
) -> Result<(), GitError> {
    let tree = store.get_tree(tree_id)?;
    for entry in &tree.entries {
        let path = join_path(prefix, &entry.name);
        if entry.mode.is_tree() {
            emit_subtree(store, entry.id, &path, status, out, max_entries, truncated)?;
        } else {
            let is_binary = is_binary_blob(store, entry.id);
            let (old_hash, new_hash) = match status {
                DiffStatus::Added => (None, Some(entry.id)),
                _ => (Some(entry.id), None),
            };
            if !push_entry(
                out,
                max_entries,
                truncated,
                DiffEntry { path, status, old_hash, new_hash, old_path: None, is_binary },
            ) {
                return Ok(());
            }
        }
    }
    Ok(())
}

/// Emit `entry` (present on only one side of the comparison) as wholly
/// `status` — recursing into `emit_subtree` if it's a directory, or a
/// single `DiffEntry` if it's a file.
fn emit_one_sided(
    store: &ObjectStore,
    entry: &TreeEntry,
    prefix: &str,
    status: DiffStatus,
    out: &mut Vec<DiffEntry>,
    max_entries: usize,
    truncated: &mut bool,
) -> Result<(), GitError> {
    let path = join_path(prefix, &entry.name);
    if entry.mode.is_tree() {
        emit_subtree(store, entry.id, &path, status, out, max_entries, truncated)?;
    } else {
        let is_binary = is_binary_blob(store, entry.id);
        let (old_hash, new_hash) = match status {
            DiffStatus::Added => (None, Some(entry.id)),
            _ => (Some(entry.id), None),
        };
        push_entry(out, max_entries, truncated, DiffEntry { path, status, old_hash, new_hash, old_path: None, is_binary });
    }
    Ok(())
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

fn walk_trees(
    store: &ObjectStore,
    prev_id: Option<ObjectHash>,
    new_id: Option<ObjectHash>,
    prefix: &str,
    out: &mut Vec<DiffEntry>,
    max_entries: usize,
    truncated: &mut bool,
) -> Result<(), GitError> {
    if *truncated {
        return Ok(());
    }
    let prev = load_tree(store, prev_id)?;
    let next = load_tree(store, new_id)?;

    let mut i = 0usize;
    let mut j = 0usize;
    while (i < prev.entries.len() || j < next.entries.len()) && !*truncated {
        let a = prev.entries.get(i);
        let b = next.entries.get(j);
        // Entries are stored in Git's directory-slash key order
        // (`tree_entry_key`), which differs from a plain name comparison
        // whenever one side is a file and the other a same-named-prefix
        // directory (`foo.txt` vs. the directory `foo`) — so the merge
        // must advance on that key order too, not on `ea.name`/`eb.name`.
        let order = match (a, b) {
            (Some(ea), Some(eb)) => Some(tree_entry_key(ea).cmp(&tree_entry_key(eb))),
            (Some(_), None) => Some(std::cmp::Ordering::Less),
            (None, Some(_)) => Some(std::cmp::Ordering::Greater),
            (None, None) => None,
        };
        match (a, b, order) {
            (Some(ea), Some(eb), Some(std::cmp::Ordering::Equal)) => {
                // Equal keys imply equal trailing-slash-ness, so `ea` and
                // `eb` are either both trees or both blobs here — a
                // same-named file/directory pair never shares a key (the
                // directory's key carries the extra `/`), so that case is
                // handled by the ordering arms below instead.
                let path = join_path(prefix, &ea.name);
                if ea.mode.is_tree() && eb.mode.is_tree() {
                    if ea.id != eb.id {
                        walk_trees(store, Some(ea.id), Some(eb.id), &path, out, max_entries, truncated)?;
                    }
                } else if ea.id != eb.id || ea.mode != eb.mode {
                    let is_binary = is_binary_blob(store, eb.id) || is_binary_blob(store, ea.id);
                    push_entry(
                        out,
                        max_entries,
                        truncated,
                        DiffEntry {
                            path,
                            status: DiffStatus::Modified,
                            old_hash: Some(ea.id),
                            new_hash: Some(eb.id),
                            old_path: None,
                            is_binary,
                        },
                    );
                }
                i += 1;
                j += 1;
            }
            (Some(ea), _, Some(std::cmp::Ordering::Less)) => {
                emit_one_sided(store, ea, prefix, DiffStatus::Deleted, out, max_entries, truncated)?;
                i += 1;
            }
            (_, Some(eb), Some(std::cmp::Ordering::Greater)) => {
                emit_one_sided(store, eb, prefix, DiffStatus::Added, out, max_entries, truncated)?;
                j += 1;
            }
            _ => unreachable!(),
        }
    }
    Ok(())
}

/// Pair unmatched deletions and additions whose blob hash is identical
/// into a single `renamed` entry. Exact-content only, no similarity score.
fn detect_renames(entries: &mut Vec<DiffEntry>) {
    let mut renamed_pairs: Vec<(usize, usize)> = Vec::new();
    for (di, d) in entries.iter().enumerate() {
        if d.status != DiffStatus::Deleted || d.is_binary {
            continue;
        }
        for (ai, a) in entries.iter().enumerate() {
            if a.status != DiffStatus::Added || a.is_binary {
                continue;
            }
            if renamed_pairs.iter().any(|&(_, used)| used == ai) {
                continue;
            }
            if d.old_hash.is_some() && d.old_hash == a.new_hash {
                renamed_pairs.push((di, ai));
                break;
            }
        }
    }

    if renamed_pairs.is_empty() {
        return;
    }

    let mut to_remove: Vec<usize> = Vec::new();
    for (del_idx, add_idx) in &renamed_pairs {
        let old_path = entries[*del_idx].path.clone();
        let old_hash = entries[*del_idx].old_hash;
        let new_hash = entries[*add_idx].new_hash;
        let new_path = entries[*add_idx].path.clone();
        entries[*add_idx] = DiffEntry {
            path: new_path,
            status: DiffStatus::Renamed,
            old_hash,
            new_hash,
            old_path: Some(old_path),
            is_binary: false,
        };
        to_remove.push(*del_idx);
    }
    to_remove.sort_unstable_by(|a, b| b.cmp(a));
    for idx in to_remove {
        entries.remove(idx);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffLineType {
    Context,
    Addition,
    Deletion,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DiffLine {
    pub line_type: DiffLineType,
    pub content: String,
    pub old_line: Option<usize>,
    pub new_line: Option<usize>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DiffHunk {
    pub old_start: usize,
    pub old_lines: usize,
    pub new_start: usize,
    pub new_lines: usize,
    pub lines: Vec<DiffLine>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FileDiff {
    pub path: String,
    pub old_hash: Option<ObjectHash>,
    pub new_hash: Option<ObjectHash>,
    pub is_binary: bool,
    pub truncated: bool,
    pub hunks: Vec<DiffHunk>,
}

impl FileDiff {
    fn empty(path: &str, old_hash: Option<ObjectHash>, new_hash: Option<ObjectHash>, is_binary: bool, truncated: bool) -> FileDiff {
        FileDiff { path: path.to_string(), old_hash, new_hash, is_binary, truncated, hunks: vec![] }
    }
}

/// Unified diff between two blobs (either may be absent, modeling a pure
/// add/delete), using `similar`'s Myers-style LCS alignment and grouping
/// changes into hunks with `context_lines` of surrounding context.
pub fn compute_file_diff(
    store: &ObjectStore,
    old_blob: Option<ObjectHash>,
    new_blob: Option<ObjectHash>,
    path: &str,
    context_lines: usize,
    max_bytes: u64,
) -> Result<FileDiff, GitError> {
    let old_data = match old_blob {
        Some(id) => Some(store.get_blob(id)?.data),
        None => None,
    };
    let new_data = match new_blob {
        Some(id) => Some(store.get_blob(id)?.data),
        None => None,
    };

    let is_binary = old_data.as_deref().map(crate::utils::looks_binary).unwrap_or(false)
        || new_data.as_deref().map(crate::utils::looks_binary).unwrap_or(false);
    if is_binary {
        return Ok(FileDiff::empty(path, old_blob, new_blob, true, false));
    }

    let too_big = old_data.as_ref().map(|d| d.len() as u64).unwrap_or(0) > max_bytes
        || new_data.as_ref().map(|d| d.len() as u64).unwrap_or(0) > max_bytes;
    if too_big {
        return Ok(FileDiff::empty(path, old_blob, new_blob, false, true));
    }

    let old_text = old_data.as_deref().unwrap_or(&[]);
    let new_text = new_data.as_deref().unwrap_or(&[]);
    let hunks = line_diff_hunks(old_text, new_text, context_lines);

    Ok(FileDiff { path: path.to_string(), old_hash: old_blob, new_hash: new_blob, is_binary: false, truncated: false, hunks })
}

/// Split blob bytes into logical lines (LF-separated, no trailing
/// newline retained on any line, lossily decoded since a blob isn't
/// guaranteed to be valid UTF-8).
fn to_lines(data: &[u8]) -> Vec<String> {
    if data.is_empty() {
        return Vec::new();
    }
    let text = String::from_utf8_lossy(data);
    let mut lines: Vec<String> = text.split('\n').map(|s| s.to_string()).collect();
    if text.ends_with('\n') {
        lines.pop();
    }
    lines
}

fn line_diff_hunks(old_text: &[u8], new_text: &[u8], context_lines: usize) -> Vec<DiffHunk> {
    let old_lines = to_lines(old_text);
    let new_lines = to_lines(new_text);
    let old_refs: Vec<&str> = old_lines.iter().map(|s| s.as_str()).collect();
    let new_refs: Vec<&str> = new_lines.iter().map(|s| s.as_str()).collect();
    let diff = TextDiff::configure().algorithm(Algorithm::Myers).diff_slices(&old_refs, &new_refs);
    let context = context_lines.clamp(1, 100);

    let mut hunks = Vec::new();
    for group in diff.grouped_ops(context) {
        let mut lines = Vec::new();
        let mut old_start = None;
        let mut new_start = None;
        let mut old_count = 0usize;
        let mut new_count = 0usize;

        for op in &group {
            for change in diff.iter_changes(op) {
                let old_idx = change.old_index();
                let new_idx = change.new_index();
                let content = change.value().to_string();
                let line_type = match change.tag() {
                    ChangeTag::Equal => DiffLineType::Context,
                    ChangeTag::Delete => DiffLineType::Deletion,
                    ChangeTag::Insert => DiffLineType::Addition,
                };
                match line_type {
                    DiffLineType::Context => {
                        old_count += 1;
                        new_count += 1;
                    }
                    DiffLineType::Deletion => old_count += 1,
                    DiffLineType::Addition => new_count += 1,
                }
                if old_start.is_none() {
                    if let Some(idx) = old_idx {
                        old_start = Some(idx + 1);
                    }
                }
                if new_start.is_none() {
                    if let Some(idx) = new_idx {
                        new_start = Some(idx + 1);
                    }
                }
                lines.push(DiffLine {
                    line_type,
                    content,
                    old_line: old_idx.map(|i| i + 1),
                    new_line: new_idx.map(|i| i + 1),
                });
            }
        }

        hunks.push(DiffHunk {
            old_start: old_start.unwrap_or(0),
            old_lines: old_count,
            new_start: new_start.unwrap_or(0),
            new_lines: new_count,
            lines,
        });
    }
    hunks
}

/// Diff a working-tree path against its HEAD-committed version. Status is
/// derived from presence on each side (§4.E.3): absent-in-HEAD-present-
/// on-disk is `added`, present-in-HEAD-absent-on-disk is `deleted`, else
/// `modified`.
pub fn compute_working_tree_file_diff(
    store: &ObjectStore,
    head_tree: Option<ObjectHash>,
    work_dir: &Path,
    path: &str,
    context_lines: usize,
    max_bytes: u64,
) -> Result<(FileDiff, DiffStatus), GitError> {
    validate_path(path)?;
    let head_entry = match head_tree {
        Some(tree_id) => resolve_path_in_tree(store, tree_id, path)?,
        None => None,
    };
    let old_blob = head_entry.filter(|(_, kind)| !kind.is_tree()).map(|(id, _)| id);

    let on_disk_path = work_dir.join(path);
    let on_disk = std::fs::read(&on_disk_path).ok();

    let status = match (old_blob.is_some(), on_disk.is_some()) {
        (false, true) => DiffStatus::Added,
        (true, false) => DiffStatus::Deleted,
        _ => DiffStatus::Modified,
    };

    let is_binary = on_disk.as_deref().map(crate::utils::looks_binary).unwrap_or(false)
        || old_blob.map(|id| is_binary_blob(store, id)).unwrap_or(false);
    if is_binary {
        return Ok((FileDiff::empty(path, old_blob, None, true, false), status));
    }

    let old_data = match old_blob {
        Some(id) => store.get_blob(id)?.data,
        None => Vec::new(),
    };
    let too_big = old_data.len() as u64 > max_bytes || on_disk.as_ref().map(|d| d.len() as u64).unwrap_or(0) > max_bytes;
    if too_big {
        return Ok((FileDiff::empty(path, old_blob, None, false, true), status));
    }

    let new_data = on_disk.unwrap_or_default();
    let hunks = line_diff_hunks(&old_data, &new_data, context_lines);

    Ok((FileDiff { path: path.to_string(), old_hash: old_blob, new_hash: None, is_binary: false, truncated: false, hunks }, status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{ObjectTrait, Tree, TreeEntry};
    use tempfile::TempDir;

    fn store_with_objects(tmp: &TempDir) -> ObjectStore {
        let git_dir = tmp.path().join(".git");
        std::fs::create_dir_all(git_dir.join("objects")).unwrap();
        ObjectStore::open(&git_dir, 50).unwrap()
    }

    fn write_loose(git_dir: &Path, object_type: crate::object::types::ObjectType, data: &[u8]) -> ObjectHash {
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
        let compressed = encoder.finish().unwrap();
        std::fs::write(dir.join(&hex[2..]), compressed).unwrap();
        hash
    }

    #[test]
    fn rename_detection_exact_hash() {
        let tmp = TempDir::new().unwrap();
        let git_dir = tmp.path().join(".git");
        std::fs::create_dir_all(git_dir.join("objects")).unwrap();

        let shared_blob = write_loose(&git_dir, crate::object::types::ObjectType::Blob, b"shared content");
        let unchanged_blob = write_loose(&git_dir, crate::object::types::ObjectType::Blob, b"unchanged");

        let t1 = Tree::new(vec![
            TreeEntry { mode: TreeEntryKind::Blob, name: "a.txt".to_string(), id: unchanged_blob },
            TreeEntry { mode: TreeEntryKind::Blob, name: "b.txt".to_string(), id: shared_blob },
        ]);
        let t2 = Tree::new(vec![
            TreeEntry { mode: TreeEntryKind::Blob, name: "a.txt".to_string(), id: unchanged_blob },
            TreeEntry { mode: TreeEntryKind::Blob, name: "c.txt".to_string(), id: shared_blob },
        ]);
        write_loose(&git_dir, crate::object::types::ObjectType::Tree, &t1.to_data().unwrap());
        write_loose(&git_dir, crate::object::types::ObjectType::Tree, &t2.to_data().unwrap());

        let store = ObjectStore::open(&git_dir, 50).unwrap();
        let result = tree_diff(&store, Some(t1.id), Some(t2.id), 500).unwrap();

        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.entries[0].status, DiffStatus::Renamed);
        assert_eq!(result.entries[0].path, "c.txt");
        assert_eq!(result.entries[0].old_path.as_deref(), Some("b.txt"));
    }

    /// `foo.txt` (blob) and `foo` (tree) share a name prefix, so Git's
    /// directory-slash key order sorts `foo.txt` before `foo/` — the
    /// two-pointer merge must follow that key order rather than a plain
    /// name comparison, or it misaligns and reports the untouched `foo`
    /// directory as both added and deleted.
    #[test]
    fn unchanged_directory_sharing_a_name_prefix_with_a_deleted_file_is_not_touched() {
        let tmp = TempDir::new().unwrap();
        let git_dir = tmp.path().join(".git");
        std::fs::create_dir_all(git_dir.join("objects")).unwrap();

        let inner_blob = write_loose(&git_dir, crate::object::types::ObjectType::Blob, b"inner");
        let inner_tree = Tree::new(vec![TreeEntry {
            mode: TreeEntryKind::Blob,
            name: "inner.txt".to_string(),
            id: inner_blob,
        }]);
        write_loose(&git_dir, crate::object::types::ObjectType::Tree, &inner_tree.to_data().unwrap());

        let foo_txt_blob = write_loose(&git_dir, crate::object::types::ObjectType::Blob, b"foo.txt contents");
        let zzz_blob = write_loose(&git_dir, crate::object::types::ObjectType::Blob, b"zzz contents");

        let t1 = Tree::new(vec![
            TreeEntry { mode: TreeEntryKind::Blob, name: "foo.txt".to_string(), id: foo_txt_blob },
            TreeEntry { mode: TreeEntryKind::Tree, name: "foo".to_string(), id: inner_tree.id },
            TreeEntry { mode: TreeEntryKind::Blob, name: "zzz".to_string(), id: zzz_blob },
        ]);
        let t2 = Tree::new(vec![TreeEntry {
            mode: TreeEntryKind::Tree,
            name: "foo".to_string(),
            id: inner_tree.id,
        }]);
        write_loose(&git_dir, crate::object::types::ObjectType::Tree, &t1.to_data().unwrap());
        write_loose(&git_dir, crate::object::types::ObjectType::Tree, &t2.to_data().unwrap());

        let store = ObjectStore::open(&git_dir, 50).unwrap();
        let result = tree_diff(&store, Some(t1.id), Some(t2.id), 500).unwrap();

        assert_eq!(result.entries.len(), 2);
        assert!(result.entries.iter().all(|e| !e.path.starts_with("foo/") && e.path != "foo"));
        let deleted: std::collections::HashSet<&str> = result
            .entries
            .iter()
            .filter(|e| e.status == DiffStatus::Deleted)
            .map(|e| e.path.as_str())
            .collect();
        assert_eq!(deleted, std::collections::HashSet::from(["foo.txt", "zzz"]));
    }

    #[test]
    fn file_diff_with_context_3_matches_spec_example() {
        let tmp = TempDir::new().unwrap();
        let git_dir = tmp.path().join(".git");
        std::fs::create_dir_all(git_dir.join("objects")).unwrap();

        let old_content = (1..=10).map(|n| n.to_string()).collect::<Vec<_>>().join("\n") + "\n";
        let mut new_lines: Vec<String> = (1..=5).map(|n| n.to_string()).collect();
        new_lines.push("99".to_string());
        new_lines.extend((7..=10).map(|n| n.to_string()));
        let new_content = new_lines.join("\n") + "\n";

        let old_id = write_loose(&git_dir, crate::object::types::ObjectType::Blob, old_content.as_bytes());
        let new_id = write_loose(&git_dir, crate::object::types::ObjectType::Blob, new_content.as_bytes());

        let store = ObjectStore::open(&git_dir, 50).unwrap();
        let diff = compute_file_diff(&store, Some(old_id), Some(new_id), "nums.txt", 3, 512 * 1024).unwrap();

        assert_eq!(diff.hunks.len(), 1);
        let hunk = &diff.hunks[0];
        assert_eq!(hunk.old_start, 3);
        assert_eq!(hunk.old_lines, 7);
        assert_eq!(hunk.new_start, 3);
        assert_eq!(hunk.new_lines, 7);
        let types: Vec<DiffLineType> = hunk.lines.iter().map(|l| l.line_type).collect();
        assert_eq!(
            types,
            vec![
                DiffLineType::Context,
                DiffLineType::Context,
                DiffLineType::Context,
                DiffLineType::Deletion,
                DiffLineType::Addition,
                DiffLineType::Context,
                DiffLineType::Context,
                DiffLineType::Context,
            ]
        );
    }

    #[test]
    fn binary_blob_skips_hunks() {
        let tmp = TempDir::new().unwrap();
        let git_dir = tmp.path().join(".git");
        std::fs::create_dir_all(git_dir.join("objects")).unwrap();
        let old_id = write_loose(&git_dir, crate::object::types::ObjectType::Blob, b"text");
        let new_id = write_loose(&git_dir, crate::object::types::ObjectType::Blob, b"bin\0ary");

        let store = ObjectStore::open(&git_dir, 50).unwrap();
        let diff = compute_file_diff(&store, Some(old_id), Some(new_id), "f", 3, 512 * 1024).unwrap();
        assert!(diff.is_binary);
        assert!(diff.hunks.is_empty());
    }

    #[test]
    fn rejects_path_traversal() {
        assert!(validate_path("../secret").is_err());
        assert!(validate_path("a/../b").is_err());
        assert!(validate_path("fine/path.txt").is_ok());
    }

    #[test]
    fn working_tree_diff_detects_added_file() {
        let tmp = TempDir::new().unwrap();
        let store = store_with_objects(&tmp);
        std::fs::write(tmp.path().join("new.txt"), "hello\n").unwrap();

        let (diff, status) =
            compute_working_tree_file_diff(&store, None, tmp.path(), "new.txt", 3, 512 * 1024).unwrap();
        assert_eq!(status, DiffStatus::Added);
        assert!(!diff.hunks.is_empty());
    }

}
