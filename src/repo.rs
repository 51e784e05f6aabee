//! The Repository Model: an immutable snapshot of a repository's commits
//! and refs, built by walking the commit DAG from every ref tip, plus the
//! delta engine that diffs two snapshots into a `RepositoryDelta`.
//!
//! A `Snapshot` never changes after it's built — the Live Manager
//! (`crate::live`) is the only thing that ever holds a *mutable* pointer
//! to "the current one"; everyone else just holds a cheap `Arc` clone.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rayon::prelude::*;

use crate::errors::GitError;
use crate::hash::ObjectHash;
use crate::object::{Commit, Tag};
use crate::refs::{HeadInfo, RefIndex, TagRef};
use crate::store::ObjectStore;

/// An immutable view of a repository at one point in time: every reachable
/// commit, every branch/tag/remote, HEAD, and the handful of repo-level
/// fields (description, paths, bareness) that round out the picture.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub commits: Arc<HashMap<ObjectHash, Commit>>,
    pub branches: Arc<HashMap<String, ObjectHash>>,
    pub tags: Arc<HashMap<String, TagRef>>,
    pub remotes: Arc<HashMap<String, String>>,
    pub head: HeadInfo,
    pub stashes: Arc<Vec<crate::refs::Stash>>,
    /// Refs (branch/tag/HEAD targets) that point outside `commits` — either
    /// a genuinely dangling ref or one whose target is a non-commit object
    /// (e.g. a tag pointing at a blob).
    pub dangling: Arc<HashSet<ObjectHash>>,
    pub description: String,
    pub work_dir: Option<PathBuf>,
    pub git_dir: PathBuf,
    pub is_bare: bool,
}

impl Snapshot {
    /// The well-defined zero snapshot: no commits, no refs, HEAD undefined.
    /// Used as the "previous" side of a delta on first load.
    pub fn empty() -> Snapshot {
        Snapshot {
            commits: Arc::new(HashMap::new()),
            branches: Arc::new(HashMap::new()),
            tags: Arc::new(HashMap::new()),
            remotes: Arc::new(HashMap::new()),
            head: HeadInfo::default(),
            stashes: Arc::new(Vec::new()),
            dangling: Arc::new(HashSet::new()),
            description: String::new(),
            work_dir: None,
            git_dir: PathBuf::new(),
            is_bare: false,
        }
    }

    /// Resolve `repo_root` (a working-tree checkout or a bare repo) and
    /// build a full snapshot: refs via `RefIndex`, then every commit
    /// reachable from any branch/tag/HEAD tip via `ObjectStore`.
    pub fn build(repo_root: &Path, store: &ObjectStore, delta_chain_max_depth: usize) -> Result<Snapshot, GitError> {
        let _ = delta_chain_max_depth; // depth is enforced inside `store`, not here
        let git_dir = crate::refs::resolve_git_dir(repo_root)?;
        let is_bare = crate::refs::is_bare_repo(&git_dir);
        let work_dir = if is_bare { None } else { Some(repo_root.to_path_buf()) };

        let ref_index = RefIndex::build(&git_dir)?;

        let mut roots: Vec<ObjectHash> = Vec::new();
        roots.extend(ref_index.branches.values().copied());
        for tag in ref_index.tags.values() {
            roots.push(match tag {
                TagRef::Lightweight(h) => *h,
                TagRef::Annotated { peeled: Some(p), .. } => *p,
                TagRef::Annotated { tag_id, .. } => *tag_id,
            });
        }
        if let Some(h) = ref_index.head.hash {
            roots.push(h);
        }

        // Partition the ref tips across worker threads, each walking its own
        // parent chain, sharing `visited` under a mutex so two workers that
        // converge on a common ancestor only process it once. Rebuild-heavy
        // repos with many branch tips benefit most; the walk itself is
        // I/O-bound (object store reads) so this mostly hides store latency
        // rather than saving CPU.
        let visited: Mutex<HashSet<ObjectHash>> = Mutex::new(HashSet::new());
        let commits: Mutex<HashMap<ObjectHash, Commit>> = Mutex::new(HashMap::new());
        let dangling: Mutex<HashSet<ObjectHash>> = Mutex::new(HashSet::new());

        roots.into_par_iter().for_each(|root| {
            let mut queue: VecDeque<ObjectHash> = VecDeque::new();
            queue.push_back(root);
            while let Some(id) = queue.pop_front() {
                if !visited.lock().unwrap().insert(id) {
                    continue;
                }
                match store.get_commit(id) {
                    Ok(commit) => {
                        for parent in &commit.parent_commit_ids {
                            queue.push_back(*parent);
                        }
                        commits.lock().unwrap().insert(id, commit);
                    }
                    Err(_) => {
                        // Either the object doesn't exist (dangling ref) or
                        // it isn't a commit at all (a tag pointing at a
                        // blob). Per §7 propagation policy, log and keep
                        // going rather than abort the whole snapshot build.
                        tracing::warn!(object = %id, "skipping unreadable commit while building snapshot");
                        dangling.lock().unwrap().insert(id);
                    }
                }
            }
        });

        let commits = commits.into_inner().unwrap();
        let dangling = dangling.into_inner().unwrap();

        Ok(Snapshot {
            commits: Arc::new(commits),
            branches: Arc::new(ref_index.branches),
            tags: Arc::new(ref_index.tags),
            remotes: Arc::new(ref_index.remotes),
            head: ref_index.head,
            stashes: Arc::new(ref_index.stashes),
            dangling: Arc::new(dangling),
            description: ref_index.description,
            work_dir,
            git_dir,
            is_bare,
        })
    }

    pub fn commit_count(&self) -> usize {
        self.commits.len()
    }

    pub fn branch_count(&self) -> usize {
        self.branches.len()
    }

    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }

    pub fn get_commit(&self, id: &ObjectHash) -> Option<&Commit> {
        self.commits.get(id)
    }

    /// Tag short-names in the deterministic order the live view renders
    /// them: annotated-tag `tagger.when` descending (resolved via the
    /// object store, since the snapshot only carries the tag's ref-level
    /// metadata), falling back to short-name ascending for lightweight
    /// tags or annotated tags whose tag object isn't resolvable.
    pub fn ordered_tag_names(&self, store: &ObjectStore) -> Vec<String> {
        let mut names: Vec<(String, Option<i64>)> = self
            .tags
            .iter()
            .map(|(name, tag_ref)| {
                let when = match tag_ref {
                    TagRef::Annotated { tag_id, .. } => store.get_tag(*tag_id).ok().map(|t| t.tagger.timestamp),
                    TagRef::Lightweight(_) => None,
                };
                (name.clone(), when)
            })
            .collect();
        // Fallback ordering is natural-sort, not byte-lexical, so `v9` comes
        // before `v10` — the common case for version-tag names.
        names.sort_by(|a, b| match (a.1, b.1) {
            (Some(ta), Some(tb)) => tb.cmp(&ta).then_with(|| natord::compare(&a.0, &b.0)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => natord::compare(&a.0, &b.0),
        });
        names.into_iter().map(|(n, _)| n).collect()
    }

    /// Diff `self` (the "next" snapshot) against `prev`, producing the
    /// delta a subscriber would need to apply to go from `prev` to `self`.
    pub fn diff(&self, prev: &Snapshot) -> RepositoryDelta {
        RepositoryDelta::compute(prev, self)
    }
}

/// The difference between two snapshots: commits and refs that appeared,
/// changed, or vanished going from `prev` to `next`.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct RepositoryDelta {
    pub added_commits: Vec<Commit>,
    pub deleted_commits: Vec<ObjectHash>,
    pub added_branches: HashMap<String, ObjectHash>,
    pub amended_branches: HashMap<String, ObjectHash>,
    pub deleted_branches: HashMap<String, ObjectHash>,
    pub added_tags: Vec<String>,
    pub deleted_tags: Vec<String>,
}

impl RepositoryDelta {
    /// Pure set-difference over hash keys: added/deleted commits, and for
    /// branches/tags a three-way classification (added/amended/deleted)
    /// over the union of names in both snapshots.
    pub fn compute(prev: &Snapshot, next: &Snapshot) -> RepositoryDelta {
        let mut added_commits: Vec<Commit> = next
            .commits
            .iter()
            .filter(|(id, _)| !prev.commits.contains_key(*id))
            .map(|(_, c)| c.clone())
            .collect();
        // §4.D ordering: author-date descending so consumers can apply in
        // a visually sensible sequence.
        added_commits.sort_by(|a, b| b.author.timestamp.cmp(&a.author.timestamp));

        let deleted_commits: Vec<ObjectHash> = prev
            .commits
            .keys()
            .filter(|id| !next.commits.contains_key(*id))
            .copied()
            .collect();

        let mut added_branches = HashMap::new();
        let mut amended_branches = HashMap::new();
        let mut deleted_branches = HashMap::new();
        let branch_names: HashSet<&String> = prev.branches.keys().chain(next.branches.keys()).collect();
        for name in branch_names {
            match (prev.branches.get(name), next.branches.get(name)) {
                (None, Some(h)) => {
                    added_branches.insert(name.clone(), *h);
                }
                (Some(h), None) => {
                    deleted_branches.insert(name.clone(), *h);
                }
                (Some(old), Some(new)) if old != new => {
                    amended_branches.insert(name.clone(), *new);
                }
                _ => {}
            }
        }

        let mut added_tags = Vec::new();
        let mut deleted_tags = Vec::new();
        let tag_names: HashSet<&String> = prev.tags.keys().chain(next.tags.keys()).collect();
        for name in tag_names {
            match (prev.tags.get(name), next.tags.get(name)) {
                (None, Some(_)) => added_tags.push(name.clone()),
                (Some(_), None) => deleted_tags.push(name.clone()),
                _ => {}
            }
        }
        added_tags.sort();
        deleted_tags.sort();

        RepositoryDelta {
            added_commits,
            deleted_commits,
            added_branches,
            amended_branches,
            deleted_branches,
            added_tags,
            deleted_tags,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added_commits.is_empty()
            && self.deleted_commits.is_empty()
            && self.added_branches.is_empty()
            && self.amended_branches.is_empty()
            && self.deleted_branches.is_empty()
            && self.added_tags.is_empty()
            && self.deleted_tags.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::signature::{Signature, SignatureRole};

    fn sig(ts: i64) -> Signature {
        Signature {
            role: SignatureRole::Author,
            name: "A".to_string(),
            email: "a@b.com".to_string(),
            timestamp: ts,
            offset_minutes: 0,
        }
    }

    fn commit(id_seed: &str, ts: i64) -> Commit {
        Commit {
            id: ObjectHash::new(id_seed.as_bytes()),
            tree_id: ObjectHash::ZERO,
            parent_commit_ids: vec![],
            author: sig(ts),
            committer: sig(ts),
            message: "m\n".to_string(),
        }
    }

    fn snapshot_with(commits: Vec<Commit>, branches: Vec<(&str, ObjectHash)>) -> Snapshot {
        let mut map = HashMap::new();
        for c in commits {
            map.insert(c.id, c);
        }
        let mut branch_map = HashMap::new();
        for (name, id) in branches {
            branch_map.insert(name.to_string(), id);
        }
        Snapshot {
            commits: Arc::new(map),
            branches: Arc::new(branch_map),
            tags: Arc::new(HashMap::new()),
            remotes: Arc::new(HashMap::new()),
            head: HeadInfo::default(),
            stashes: Arc::new(Vec::new()),
            dangling: Arc::new(HashSet::new()),
            description: String::new(),
            work_dir: None,
            git_dir: PathBuf::new(),
            is_bare: false,
        }
    }

    #[test]
    fn empty_delta_identity() {
        let s = snapshot_with(vec![commit("a", 1)], vec![("main", ObjectHash::new(b"a"))]);
        let delta = s.diff(&s);
        assert!(delta.is_empty());
    }

    #[test]
    fn classifies_added_amended_deleted_branches_and_commits() {
        let c1 = commit("c1", 10);
        let c2 = commit("c2", 20);
        let prev = snapshot_with(
            vec![c1.clone()],
            vec![("main", c1.id), ("old-branch", c1.id)],
        );
        let next = snapshot_with(
            vec![c1.clone(), c2.clone()],
            vec![("main", c2.id), ("new-branch", c2.id)],
        );

        let delta = next.diff(&prev);
        assert_eq!(delta.added_commits.len(), 1);
        assert_eq!(delta.added_commits[0].id, c2.id);
        assert!(delta.deleted_commits.is_empty());
        assert_eq!(delta.amended_branches.get("main"), Some(&c2.id));
        assert_eq!(delta.added_branches.get("new-branch"), Some(&c2.id));
        assert_eq!(delta.deleted_branches.get("old-branch"), Some(&c1.id));
    }

    #[test]
    fn added_commits_sorted_by_author_date_descending() {
        let c1 = commit("c1", 5);
        let c2 = commit("c2", 50);
        let c3 = commit("c3", 25);
        let prev = snapshot_with(vec![], vec![]);
        let next = snapshot_with(vec![c1.clone(), c2.clone(), c3.clone()], vec![]);

        let delta = next.diff(&prev);
        let timestamps: Vec<i64> = delta.added_commits.iter().map(|c| c.author.timestamp).collect();
        assert_eq!(timestamps, vec![50, 25, 5]);
    }
}
