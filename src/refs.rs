//! Reference index: every branch, tag, remote, and stash entry a repository
//! carries, read from the three places Git actually stores them — loose
//! files under `refs/`, the consolidated `packed-refs` text file, and
//! `HEAD` — plus `config` for remotes and `description` for the repo blurb.
//!
//! Nothing here touches the object store; a `RefIndex` is just the parsed
//! shape of the ref namespace. Resolving a ref's target to a commit and
//! walking history from it is the Repository Model's job.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::GitError;
use crate::hash::ObjectHash;

pub const MAX_SYMREF_HOPS: usize = 8;

/// Either a direct object id or a pointer at another ref by full name.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RefTarget {
    Hash(ObjectHash),
    Symbolic(String),
}

/// A named ref as read from disk, before symref resolution.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Reference {
    pub full_name: String,
    pub target: RefTarget,
}

/// A tag is either a ref pointing straight at a commit (lightweight) or
/// one pointing at a tag object carrying its own message/tagger
/// (annotated). `peeled`, when known from `packed-refs`, is the commit the
/// annotated tag ultimately resolves to.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TagRef {
    Lightweight(ObjectHash),
    Annotated { tag_id: ObjectHash, peeled: Option<ObjectHash> },
}

impl TagRef {
    /// The id recorded directly on the ref — the tag object id for an
    /// annotated tag, the target commit for a lightweight one.
    pub fn ref_target(&self) -> ObjectHash {
        match self {
            TagRef::Lightweight(h) => *h,
            TagRef::Annotated { tag_id, .. } => *tag_id,
        }
    }
}

/// One entry of `refs/stash`'s reflog.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Stash {
    pub index: usize,
    pub commit_id: ObjectHash,
    pub message: String,
}

/// HEAD, resolved through at most `MAX_SYMREF_HOPS` symref hops.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct HeadInfo {
    /// The branch HEAD points at, if any (e.g. `refs/heads/main`).
    pub ref_name: Option<String>,
    /// The commit HEAD ultimately resolves to. `None` for an unborn branch.
    pub hash: Option<ObjectHash>,
    pub detached: bool,
}

/// Everything the reference namespace holds for one repository.
#[derive(Debug, Clone, Default)]
pub struct RefIndex {
    pub branches: HashMap<String, ObjectHash>,
    pub tags: HashMap<String, TagRef>,
    pub remotes: HashMap<String, String>,
    pub head: HeadInfo,
    pub stashes: Vec<Stash>,
    pub description: String,
}

const UNNAMED_REPO_PLACEHOLDER: &str =
    "Unnamed repository; edit this file 'description' to name the repository.";

impl RefIndex {
    /// Read every ref source under `git_dir` and merge them: loose refs
    /// shadow same-named packed refs.
    pub fn build(git_dir: &Path) -> Result<RefIndex, GitError> {
        let packed = read_packed_refs(git_dir)?;
        let mut raw: HashMap<String, Reference> = packed.refs;
        let peeled = packed.peeled;

        walk_loose_refs(&git_dir.join("refs"), &mut raw)?;
        if let Some(head) = read_single_loose_ref(&git_dir.join("HEAD"))? {
            raw.insert("HEAD".to_string(), head);
        }

        let mut branches = HashMap::new();
        let mut tags = HashMap::new();
        for (name, reference) in &raw {
            if name == "HEAD" {
                continue;
            }
            let RefTarget::Hash(hash) = resolve_symref(&raw, reference, 0)? else {
                continue;
            };
            if let Some(short) = name.strip_prefix("refs/heads/") {
                branches.insert(short.to_string(), hash);
            } else if let Some(short) = name.strip_prefix("refs/tags/") {
                let peeled_target = peeled.get(name).copied();
                let tag_ref = match peeled_target {
                    Some(target) => TagRef::Annotated { tag_id: hash, peeled: Some(target) },
                    None => TagRef::Lightweight(hash),
                };
                tags.insert(short.to_string(), tag_ref);
            }
        }

        let head = resolve_head(&raw)?;
        let remotes = read_remotes(git_dir)?;
        let stashes = read_stashes(git_dir)?;
        let description = read_description(git_dir)?;

        Ok(RefIndex {
            branches,
            tags,
            remotes,
            head,
            stashes,
            description,
        })
    }

    pub fn remote_hashes(&self) -> impl Iterator<Item = (&str, ObjectHash)> {
        // Remote-tracking branches aren't exposed as their own map in the
        // data model (spec §3 doesn't name one), but they still live under
        // refs/ as loose/packed refs shadowed into `branches` under their
        // full `refs/remotes/...` short name by the walk above; nothing
        // extra needed here today. Kept for symmetry with `branches()`.
        std::iter::empty::<(&str, ObjectHash)>().chain(
            self.branches
                .iter()
                .filter(|(n, _)| n.starts_with("remotes/"))
                .map(|(n, h)| (n.as_str(), *h)),
        )
    }
}

/// Follow `ref:` pointers up to `MAX_SYMREF_HOPS`, detecting cycles and
/// dangling targets. Returns the final `RefTarget`, which is `Symbolic` only
/// when the chain didn't bottom out at a hash within the hop budget.
fn resolve_symref(
    all: &HashMap<String, Reference>,
    start: &Reference,
    depth: usize,
) -> Result<RefTarget, GitError> {
    if depth >= MAX_SYMREF_HOPS {
        return Err(GitError::Malformed(format!(
            "symref chain from `{}` exceeded {MAX_SYMREF_HOPS} hops",
            start.full_name
        )));
    }
    match &start.target {
        RefTarget::Hash(h) => Ok(RefTarget::Hash(*h)),
        RefTarget::Symbolic(target_name) => match all.get(target_name) {
            Some(next) => resolve_symref(all, next, depth + 1),
            None => Ok(RefTarget::Symbolic(target_name.clone())),
        },
    }
}

fn resolve_head(all: &HashMap<String, Reference>) -> Result<HeadInfo, GitError> {
    let Some(head_ref) = all.get("HEAD") else {
        return Ok(HeadInfo::default());
    };
    match &head_ref.target {
        RefTarget::Hash(h) => Ok(HeadInfo {
            ref_name: None,
            hash: Some(*h),
            detached: true,
        }),
        RefTarget::Symbolic(name) => {
            let resolved = resolve_symref(all, head_ref, 0)?;
            let hash = match resolved {
                RefTarget::Hash(h) => Some(h),
                RefTarget::Symbolic(_) => None, // unborn branch
            };
            Ok(HeadInfo {
                ref_name: Some(name.clone()),
                hash,
                detached: false,
            })
        }
    }
}

fn parse_ref_content(content: &str) -> Result<RefTarget, GitError> {
    let content = content.trim();
    if let Some(target) = content.strip_prefix("ref: ") {
        Ok(RefTarget::Symbolic(target.trim().to_string()))
    } else {
        content
            .parse::<ObjectHash>()
            .map(RefTarget::Hash)
            .map_err(GitError::InvalidHashValue)
    }
}

fn read_single_loose_ref(path: &Path) -> Result<Option<Reference>, GitError> {
    if !path.is_file() {
        return Ok(None);
    }
    let content = fs::read_to_string(path).map_err(GitError::IOError)?;
    let target = parse_ref_content(&content)?;
    Ok(Some(Reference {
        full_name: "HEAD".to_string(),
        target,
    }))
}

fn walk_loose_refs(refs_dir: &Path, out: &mut HashMap<String, Reference>) -> Result<(), GitError> {
    if !refs_dir.is_dir() {
        return Ok(());
    }
    walk_loose_refs_recursive(refs_dir, refs_dir, out)
}

fn walk_loose_refs_recursive(
    root: &Path,
    dir: &Path,
    out: &mut HashMap<String, Reference>,
) -> Result<(), GitError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Ok(()),
    };
    for entry in entries {
        let entry = entry.map_err(GitError::IOError)?;
        let path = entry.path();
        if path.is_dir() {
            walk_loose_refs_recursive(root, &path, out)?;
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) == Some("lock") {
            continue;
        }
        let Ok(rel) = path.strip_prefix(root.parent().unwrap_or(root)) else {
            continue;
        };
        let full_name = rel.to_string_lossy().replace('\\', "/");
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => continue,
        };
        let Ok(target) = parse_ref_content(&content) else {
            continue;
        };
        out.insert(full_name.clone(), Reference { full_name, target });
    }
    Ok(())
}

struct PackedRefs {
    refs: HashMap<String, Reference>,
    /// Full ref name -> peeled (dereferenced) commit hash, for annotated
    /// tags carrying a trailing `^<hash>` line.
    peeled: HashMap<String, ObjectHash>,
}

fn read_packed_refs(git_dir: &Path) -> Result<PackedRefs, GitError> {
    let path = git_dir.join("packed-refs");
    let mut refs = HashMap::new();
    let mut peeled = HashMap::new();
    let Ok(content) = fs::read_to_string(&path) else {
        return Ok(PackedRefs { refs, peeled });
    };

    let mut last_name: Option<String> = None;
    for line in content.lines() {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(peeled_hex) = line.strip_prefix('^') {
            if let Some(name) = &last_name {
                if let Ok(hash) = peeled_hex.trim().parse::<ObjectHash>() {
                    peeled.insert(name.clone(), hash);
                }
            }
            continue;
        }
        let mut parts = line.splitn(2, ' ');
        let hash_str = parts.next().unwrap_or_default();
        let name = parts.next().unwrap_or_default().trim();
        let Ok(hash) = hash_str.parse::<ObjectHash>() else {
            last_name = None;
            continue;
        };
        refs.insert(
            name.to_string(),
            Reference {
                full_name: name.to_string(),
                target: RefTarget::Hash(hash),
            },
        );
        last_name = Some(name.to_string());
    }
    Ok(PackedRefs { refs, peeled })
}

/// Minimal INI-style reader for `<gitDir>/config`: sections and their
/// scalar `key = value` entries, enough to pull `[remote "name"]` blocks.
fn read_remotes(git_dir: &Path) -> Result<HashMap<String, String>, GitError> {
    let path = git_dir.join("config");
    let mut remotes = HashMap::new();
    let Ok(content) = fs::read_to_string(&path) else {
        return Ok(remotes);
    };

    let mut current_remote: Option<String> = None;
    let mut url: Option<String> = None;
    let mut push_url: Option<String> = None;

    let flush = |current: &Option<String>,
                 url: &Option<String>,
                 push_url: &Option<String>,
                 remotes: &mut HashMap<String, String>| {
        if let Some(name) = current {
            // §9 open question: prefer `url`, fall back to `pushUrl` only
            // when `url` is absent.
            if let Some(u) = url.clone().or_else(|| push_url.clone()) {
                remotes.insert(name.clone(), u);
            }
        }
    };

    for raw_line in content.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        if line.starts_with('[') && line.ends_with(']') {
            flush(&current_remote, &url, &push_url, &mut remotes);
            url = None;
            push_url = None;
            current_remote = parse_remote_section(line);
            continue;
        }
        if current_remote.is_none() {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            let value = value.trim().trim_matches('"');
            match key {
                "url" => url = Some(value.to_string()),
                "pushurl" => push_url = Some(value.to_string()),
                _ => {}
            }
        }
    }
    flush(&current_remote, &url, &push_url, &mut remotes);

    Ok(remotes)
}

fn parse_remote_section(line: &str) -> Option<String> {
    let inner = line.trim_start_matches('[').trim_end_matches(']');
    let mut parts = inner.splitn(2, ' ');
    if parts.next()? != "remote" {
        return None;
    }
    let quoted = parts.next()?.trim();
    Some(quoted.trim_matches('"').to_string())
}

fn read_stashes(git_dir: &Path) -> Result<Vec<Stash>, GitError> {
    let path = git_dir.join("logs").join("refs").join("stash");
    let Ok(content) = fs::read_to_string(&path) else {
        return Ok(Vec::new());
    };

    let mut stashes = Vec::new();
    // reflog line: "<old-sha> <new-sha> <name> <email> <ts> <tz>\t<message>"
    for (reverse_index, line) in content.lines().rev().enumerate() {
        let Some(tab_pos) = line.find('\t') else { continue };
        let message = line[tab_pos + 1..].to_string();
        let header = &line[..tab_pos];
        let mut fields = header.split_whitespace();
        let Some(_old) = fields.next() else { continue };
        let Some(new_sha) = fields.next() else { continue };
        let Ok(commit_id) = new_sha.parse::<ObjectHash>() else { continue };
        stashes.push(Stash {
            index: reverse_index,
            commit_id,
            message,
        });
    }
    Ok(stashes)
}

fn read_description(git_dir: &Path) -> Result<String, GitError> {
    let path = git_dir.join("description");
    let Ok(content) = fs::read_to_string(&path) else {
        return Ok(String::new());
    };
    let trimmed = content.trim();
    if trimmed == UNNAMED_REPO_PLACEHOLDER || trimmed.is_empty() {
        Ok(String::new())
    } else {
        Ok(trimmed.to_string())
    }
}

/// True when `candidate` looks like a bare repository root: `HEAD`,
/// `objects/`, and `refs/` exist directly under it, with no `.git`
/// subdirectory and therefore no separate working tree.
pub fn is_bare_repo(candidate: &Path) -> bool {
    candidate.join("HEAD").is_file()
        && candidate.join("objects").is_dir()
        && candidate.join("refs").is_dir()
        && !candidate.join(".git").exists()
}

/// Resolve a repository root (working-tree checkout, bare repo, or linked
/// worktree) to its `gitDir`, following a `.git` *file* (as opposed to
/// directory) that redirects into a linked worktree's private dir.
pub fn resolve_git_dir(repo_root: &Path) -> Result<PathBuf, GitError> {
    if is_bare_repo(repo_root) {
        return Ok(repo_root.to_path_buf());
    }

    let dot_git = repo_root.join(".git");
    if dot_git.is_dir() {
        return Ok(dot_git);
    }
    if dot_git.is_file() {
        let content = fs::read_to_string(&dot_git).map_err(GitError::IOError)?;
        let first_line = content.lines().next().unwrap_or_default();
        let Some(target) = first_line.strip_prefix("gitdir: ") else {
            return Err(GitError::Malformed(format!(
                "`.git` file at {} has no `gitdir:` line",
                dot_git.display()
            )));
        };
        let target_path = PathBuf::from(target.trim());
        let resolved = if target_path.is_absolute() {
            target_path
        } else {
            repo_root.join(target_path)
        };
        return Ok(resolved);
    }

    Err(GitError::RepoNotFound(format!(
        "no `.git` directory or file at {}",
        repo_root.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn merges_loose_over_packed_and_resolves_head() {
        let tmp = TempDir::new().unwrap();
        let git_dir = tmp.path();
        let hash = "a".repeat(40);
        write(git_dir, "HEAD", "ref: refs/heads/main\n");
        write(git_dir, "refs/heads/main", &format!("{hash}\n"));
        write(
            git_dir,
            "packed-refs",
            "# pack-refs with: peeled fully-peeled sorted\n",
        );

        let index = RefIndex::build(git_dir).unwrap();
        assert_eq!(index.branches.get("main").unwrap().to_string(), hash);
        assert_eq!(index.head.ref_name.as_deref(), Some("refs/heads/main"));
        assert!(!index.head.detached);
        assert_eq!(index.head.hash.unwrap().to_string(), hash);
    }

    #[test]
    fn detects_detached_head() {
        let tmp = TempDir::new().unwrap();
        let git_dir = tmp.path();
        let hash = "b".repeat(40);
        write(git_dir, "HEAD", &format!("{hash}\n"));

        let index = RefIndex::build(git_dir).unwrap();
        assert!(index.head.detached);
        assert_eq!(index.head.hash.unwrap().to_string(), hash);
    }

    #[test]
    fn reads_annotated_tag_with_peeled_hash() {
        let tmp = TempDir::new().unwrap();
        let git_dir = tmp.path();
        let tag_id = "c".repeat(40);
        let peeled = "d".repeat(40);
        write(git_dir, "HEAD", "ref: refs/heads/main\n");
        write(git_dir, "refs/heads/main", &format!("{}\n", "e".repeat(40)));
        write(
            git_dir,
            "packed-refs",
            &format!("{tag_id} refs/tags/v1.0\n^{peeled}\n"),
        );

        let index = RefIndex::build(git_dir).unwrap();
        match index.tags.get("v1.0").unwrap() {
            TagRef::Annotated { tag_id: got_tag, peeled: got_peeled } => {
                assert_eq!(got_tag.to_string(), tag_id);
                assert_eq!(got_peeled.unwrap().to_string(), peeled);
            }
            TagRef::Lightweight(_) => panic!("expected annotated tag"),
        }
    }

    #[test]
    fn loose_ref_shadows_packed_ref() {
        let tmp = TempDir::new().unwrap();
        let git_dir = tmp.path();
        let packed_hash = "1".repeat(40);
        let loose_hash = "2".repeat(40);
        write(git_dir, "HEAD", "ref: refs/heads/main\n");
        write(
            git_dir,
            "packed-refs",
            &format!("{packed_hash} refs/heads/main\n"),
        );
        write(git_dir, "refs/heads/main", &format!("{loose_hash}\n"));

        let index = RefIndex::build(git_dir).unwrap();
        assert_eq!(index.branches.get("main").unwrap().to_string(), loose_hash);
    }

    #[test]
    fn reads_remote_url_preferring_url_over_pushurl() {
        let tmp = TempDir::new().unwrap();
        let git_dir = tmp.path();
        write(git_dir, "HEAD", "ref: refs/heads/main\n");
        write(
            git_dir,
            "config",
            "[remote \"origin\"]\n\turl = https://example.com/repo.git\n\tpushurl = https://example.com/other.git\n",
        );

        let index = RefIndex::build(git_dir).unwrap();
        assert_eq!(
            index.remotes.get("origin").unwrap(),
            "https://example.com/repo.git"
        );
    }

    #[test]
    fn empty_description_for_placeholder() {
        let tmp = TempDir::new().unwrap();
        let git_dir = tmp.path();
        write(git_dir, "HEAD", "ref: refs/heads/main\n");
        write(git_dir, "description", UNNAMED_REPO_PLACEHOLDER);

        let index = RefIndex::build(git_dir).unwrap();
        assert_eq!(index.description, "");
    }
}
