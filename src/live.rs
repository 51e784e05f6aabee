//! The Live Manager: the orchestrator that ties the rest of the crate
//! together into a running process. It watches `<gitDir>` for changes,
//! debounces bursts, rebuilds the `Snapshot`, computes a `RepositoryDelta`
//! against the previous one, and fans the result out to subscribers under
//! back-pressure (§4.G). It also runs the working-tree status poller
//! (§4.G.3) and fronts the diff/blame engines with the bounded LRU caches
//! (§4.G.5) so repeated queries for the same content hash are free.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{Mutex, RwLock, mpsc, watch};

use crate::blame::{self, BlameEntry};
use crate::cache::LruCache;
use crate::config::Config;
use crate::diff::{self, FileDiff, TreeDiffResult};
use crate::errors::GitError;
use crate::hash::ObjectHash;
use crate::repo::{RepositoryDelta, Snapshot};
use crate::status::{self, WorkingTreeStatus};
use crate::store::ObjectStore;

/// HEAD summary as published to subscribers (§6): richer than the
/// snapshot's internal `HeadInfo` since it also carries the counts,
/// remotes, and recent tags a client's header bar wants without a
/// separate round trip.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct HeadSummary {
    pub id: Option<ObjectHash>,
    pub ref_name: Option<String>,
    pub branch_name: Option<String>,
    pub detached: bool,
    pub commit_count: usize,
    pub branch_count: usize,
    pub tag_count: usize,
    pub remotes: HashMap<String, String>,
    pub recent_tags: Vec<String>,
}

const RECENT_TAGS_LIMIT: usize = 10;

fn head_summary(snapshot: &Snapshot, store: &ObjectStore) -> HeadSummary {
    let branch_name = snapshot
        .head
        .ref_name
        .as_ref()
        .and_then(|r| r.strip_prefix("refs/heads/"))
        .map(|s| s.to_string());
    let mut recent_tags = snapshot.ordered_tag_names(store);
    recent_tags.truncate(RECENT_TAGS_LIMIT);
    HeadSummary {
        id: snapshot.head.hash,
        ref_name: snapshot.head.ref_name.clone(),
        branch_name,
        detached: snapshot.head.detached,
        commit_count: snapshot.commit_count(),
        branch_count: snapshot.branch_count(),
        tag_count: snapshot.tag_count(),
        remotes: (*snapshot.remotes).clone(),
        recent_tags,
    }
}

/// One message published to subscribers: a repository delta, a working-
/// tree status refresh, a HEAD summary refresh, or some combination.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct UpdateMessage {
    pub delta: Option<RepositoryDelta>,
    pub status: Option<WorkingTreeStatus>,
    pub head: Option<HeadSummary>,
}

struct LiveState {
    snapshot: Snapshot,
    store: Arc<ObjectStore>,
}

const SUBSCRIBER_CHANNEL_CAPACITY: usize = 64;
const BROADCAST_RING_CAPACITY: usize = 256;
const SUBSCRIBER_WRITE_DEADLINE: Duration = Duration::from_secs(10);

type SubscriberMap = Arc<RwLock<HashMap<u64, mpsc::Sender<UpdateMessage>>>>;

/// A handle returned from `subscribe()` that removes the caller's entry
/// from the subscriber set when dropped or explicitly called.
pub struct Unsubscribe {
    id: u64,
    subscribers: SubscriberMap,
}

impl Unsubscribe {
    pub async fn call(self) {
        self.subscribers.write().await.remove(&self.id);
    }
}

/// Orchestrates filesystem-watch → debounce → rebuild → delta → broadcast,
/// the working-tree status poller, and the derived-query caches.
pub struct LiveManager {
    repo_root: PathBuf,
    config: Config,
    state: Arc<RwLock<LiveState>>,
    subscribers: SubscriberMap,
    next_sub_id: AtomicU64,
    inner_tx: mpsc::Sender<UpdateMessage>,
    rebuild_lock: Arc<Mutex<()>>,
    cancel_tx: watch::Sender<bool>,
    closed: AtomicBool,
    tasks: Mutex<Option<Vec<tokio::task::JoinHandle<()>>>>,
    blame_cache: LruCache<String, Arc<HashMap<String, Option<BlameEntry>>>>,
    tree_diff_cache: LruCache<String, Arc<TreeDiffResult>>,
    file_diff_cache: LruCache<String, Arc<FileDiff>>,
}

impl LiveManager {
    /// Build the initial snapshot, then spin up the watcher+debounce task,
    /// the status poller, and the broadcast fan-out task.
    pub async fn start(config: Config) -> Result<Arc<LiveManager>, GitError> {
        let repo_root = config.repo_path.clone();
        let git_dir = crate::refs::resolve_git_dir(&repo_root)?;
        let store = ObjectStore::open(&git_dir, config.delta_chain_max_depth)?;
        let snapshot = Snapshot::build(&repo_root, &store, config.delta_chain_max_depth)?;

        let (inner_tx, inner_rx) = mpsc::channel(BROADCAST_RING_CAPACITY);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let manager = Arc::new(LiveManager {
            repo_root: repo_root.clone(),
            config: config.clone(),
            state: Arc::new(RwLock::new(LiveState { snapshot, store: Arc::new(store) })),
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            next_sub_id: AtomicU64::new(0),
            inner_tx,
            rebuild_lock: Arc::new(Mutex::new(())),
            cancel_tx,
            closed: AtomicBool::new(false),
            tasks: Mutex::new(None),
            blame_cache: LruCache::new(config.cache_size),
            tree_diff_cache: LruCache::new(config.cache_size),
            file_diff_cache: LruCache::new(config.cache_size),
        });

        let watch_task = {
            let manager = manager.clone();
            let cancel_rx = cancel_rx.clone();
            tokio::spawn(async move { manager.run_watch_loop(cancel_rx).await; })
        };
        let poll_task = {
            let manager = manager.clone();
            let cancel_rx = cancel_rx.clone();
            tokio::spawn(async move { manager.run_status_poller(cancel_rx).await; })
        };
        let fanout_task = {
            let manager = manager.clone();
            let cancel_rx = cancel_rx.clone();
            tokio::spawn(async move { manager.run_fanout(inner_rx, cancel_rx).await; })
        };

        *manager.tasks.lock().await = Some(vec![watch_task, poll_task, fanout_task]);
        Ok(manager)
    }

    /// The current `(snapshot, store)` pair. Cheap: `Snapshot`'s fields
    /// are all `Arc`s, so this is a handful of atomic increments, and the
    /// caller does no further synchronization against the live slot.
    pub async fn current(&self) -> (Snapshot, Arc<ObjectStore>) {
        let state = self.state.read().await;
        (state.snapshot.clone(), state.store.clone())
    }

    pub async fn head_summary(&self) -> HeadSummary {
        let (snapshot, store) = self.current().await;
        head_summary(&snapshot, &store)
    }

    /// Register a new subscriber. Per §5's ordering guarantee, the
    /// returned initial message (computed as `current.Diff(empty)`) is
    /// handed back directly — before the subscriber is added to the fan-
    /// out set — so it's guaranteed to precede any live delta.
    pub async fn subscribe(&self) -> (UpdateMessage, mpsc::Receiver<UpdateMessage>, Unsubscribe) {
        let id = self.next_sub_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);

        let mut subs = self.subscribers.write().await;
        let (snapshot, store) = self.current().await;
        let initial = UpdateMessage {
            delta: Some(snapshot.diff(&Snapshot::empty())),
            status: None,
            head: Some(head_summary(&snapshot, &store)),
        };
        subs.insert(id, tx);
        drop(subs);

        (initial, rx, Unsubscribe { id, subscribers: self.subscribers.clone() })
    }

    pub async fn tree_diff(&self, commit_id: ObjectHash) -> Result<Arc<TreeDiffResult>, GitError> {
        let key = commit_id.to_string();
        let (snapshot, store) = self.current().await;
        self.tree_diff_cache.get_or_try_insert_with(key, || {
            let tree_id = snapshot
                .get_commit(&commit_id)
                .ok_or_else(|| GitError::NotFound(format!("no such commit {commit_id}")))?
                .tree_id;
            let result = diff::tree_diff(&store, None, Some(tree_id), self.config.tree_diff_max_entries)?;
            Ok(Arc::new(result))
        })
    }

    pub async fn file_diff(
        &self,
        commit_id: ObjectHash,
        path: &str,
        context_lines: usize,
    ) -> Result<Arc<FileDiff>, GitError> {
        let key = format!("{commit_id}:{path}:ctx{context_lines}");
        let (snapshot, store) = self.current().await;
        self.file_diff_cache.get_or_try_insert_with(key, || {
            let commit = snapshot
                .get_commit(&commit_id)
                .ok_or_else(|| GitError::NotFound(format!("no such commit {commit_id}")))?;
            let parent_tree = commit
                .parent_commit_ids
                .first()
                .and_then(|p| snapshot.get_commit(p))
                .map(|c| c.tree_id);
            let old_blob = match parent_tree {
                Some(tree_id) => diff::resolve_path_in_tree(&store, tree_id, path)?.map(|(id, _)| id),
                None => None,
            };
            let new_blob = diff::resolve_path_in_tree(&store, commit.tree_id, path)?.map(|(id, _)| id);
            let result = diff::compute_file_diff(&store, old_blob, new_blob, path, context_lines, self.config.file_diff_max_bytes)?;
            Ok(Arc::new(result))
        })
    }

    pub async fn working_tree_file_diff(&self, path: &str, context_lines: usize) -> Result<diff::FileDiff, GitError> {
        let (snapshot, store) = self.current().await;
        let Some(work_dir) = &snapshot.work_dir else {
            return Err(GitError::InvalidInput("repository is bare; no working tree to diff".to_string()));
        };
        let head_tree = snapshot.head.hash.and_then(|h| snapshot.get_commit(&h)).map(|c| c.tree_id);
        let (file_diff, _status) =
            diff::compute_working_tree_file_diff(&store, head_tree, work_dir, path, context_lines, self.config.file_diff_max_bytes)?;
        Ok(file_diff)
    }

    pub async fn blame(&self, commit_id: ObjectHash, dir_path: &str) -> Result<Arc<HashMap<String, Option<BlameEntry>>>, GitError> {
        let key = format!("{commit_id}:{dir_path}");
        let (_snapshot, store) = self.current().await;
        self.blame_cache.get_or_try_insert_with(key, || {
            let result = blame::blame_directory(&store, commit_id, dir_path, self.config.blame_max_commits)?;
            Ok(Arc::new(result))
        })
    }

    pub async fn status(&self) -> Result<WorkingTreeStatus, GitError> {
        let (snapshot, store) = self.current().await;
        status::compute_status(&store, &snapshot)
    }

    async fn run_watch_loop(&self, mut cancel_rx: watch::Receiver<bool>) {
        let git_dir = self.state.read().await.snapshot.git_dir.clone();
        let (fs_tx, mut fs_rx) = mpsc::unbounded_channel::<Event>();

        let watcher_result = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                if let Ok(event) = res {
                    let _ = fs_tx.send(event);
                }
            },
            NotifyConfig::default(),
        );
        let mut watcher = match watcher_result {
            Ok(w) => w,
            Err(err) => {
                tracing::error!(%err, "failed to construct filesystem watcher; live updates disabled");
                return;
            }
        };
        for path in watch_roots(&git_dir) {
            if path.is_dir() {
                if let Err(err) = watcher.watch(&path, RecursiveMode::Recursive) {
                    tracing::warn!(%err, path = %path.display(), "failed to watch path");
                }
            }
        }

        let debounce = self.config.debounce_interval;
        let mut sleep_fut = Box::pin(tokio::time::sleep(Duration::from_secs(u64::MAX)));
        // Trigger an initial rebuild so subscribers connecting before any
        // filesystem event still see a freshly built snapshot.
        self.try_rebuild().await;

        loop {
            tokio::select! {
                _ = &mut sleep_fut => {
                    self.try_rebuild().await;
                    sleep_fut = Box::pin(tokio::time::sleep(Duration::from_secs(u64::MAX)));
                }
                event = fs_rx.recv() => {
                    match event {
                        Some(event) => {
                            if relevant_event(&event, &git_dir) {
                                tracing::debug!(?event, "relevant filesystem event; (re)starting debounce timer");
                                sleep_fut = Box::pin(tokio::time::sleep(debounce));
                            }
                        }
                        None => break,
                    }
                }
                _ = cancel_rx.changed() => {
                    if *cancel_rx.borrow() {
                        break;
                    }
                }
            }
        }
    }

    async fn run_status_poller(&self, mut cancel_rx: watch::Receiver<bool>) {
        let mut last_canonical: Option<String> = None;
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.status_poll_interval) => {
                    let (snapshot, store) = self.current().await;
                    match status::compute_status(&store, &snapshot) {
                        Ok(status) => {
                            // §9: canonical (already-sorted) serialization so
                            // a status that hasn't actually changed never
                            // triggers a spurious broadcast.
                            let canonical = serde_json::to_string(&status).unwrap_or_default();
                            if last_canonical.as_deref() != Some(canonical.as_str()) {
                                last_canonical = Some(canonical);
                                self.publish(UpdateMessage { delta: None, status: Some(status), head: None }).await;
                            }
                        }
                        Err(err) => tracing::warn!(%err, "working tree status poll failed"),
                    }
                }
                _ = cancel_rx.changed() => {
                    if *cancel_rx.borrow() {
                        break;
                    }
                }
            }
        }
    }

    async fn try_rebuild(&self) {
        let Ok(_guard) = self.rebuild_lock.try_lock() else {
            tracing::debug!("rebuild already in flight; deferring to next tick");
            return;
        };

        let repo_root = self.repo_root.clone();
        let max_depth = self.config.delta_chain_max_depth;
        let result = tokio::task::spawn_blocking(move || {
            let git_dir = crate::refs::resolve_git_dir(&repo_root)?;
            let store = ObjectStore::open(&git_dir, max_depth)?;
            let snapshot = Snapshot::build(&repo_root, &store, max_depth)?;
            Ok::<_, GitError>((snapshot, store))
        })
        .await;

        let (new_snapshot, new_store) = match result {
            Ok(Ok(pair)) => pair,
            Ok(Err(err)) => {
                tracing::error!(%err, "snapshot rebuild failed");
                return;
            }
            Err(err) => {
                tracing::error!(%err, "snapshot rebuild task panicked");
                return;
            }
        };

        let mut state = self.state.write().await;
        let delta = new_snapshot.diff(&state.snapshot);
        let head = head_summary(&new_snapshot, &new_store);
        state.snapshot = new_snapshot;
        state.store = Arc::new(new_store);
        drop(state);

        if !delta.is_empty() {
            self.publish(UpdateMessage { delta: Some(delta), status: None, head: Some(head) }).await;
        }
    }

    async fn publish(&self, message: UpdateMessage) {
        if self.inner_tx.try_send(message).is_err() {
            tracing::warn!("broadcast ring full; dropping update (subscribers should reconnect to recover)");
        }
    }

    async fn run_fanout(&self, mut inner_rx: mpsc::Receiver<UpdateMessage>, mut cancel_rx: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                message = inner_rx.recv() => {
                    match message {
                        Some(message) => self.fan_out_one(message).await,
                        None => break,
                    }
                }
                _ = cancel_rx.changed() => {
                    if *cancel_rx.borrow() {
                        break;
                    }
                }
            }
        }
    }

    async fn fan_out_one(&self, message: UpdateMessage) {
        let senders: Vec<(u64, mpsc::Sender<UpdateMessage>)> = {
            let subs = self.subscribers.read().await;
            subs.iter().map(|(id, tx)| (*id, tx.clone())).collect()
        };

        let mut stale = Vec::new();
        for (id, tx) in senders {
            let outcome = tokio::time::timeout(SUBSCRIBER_WRITE_DEADLINE, tx.send(message.clone())).await;
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(_)) => stale.push(id),
                Err(_) => {
                    tracing::warn!(subscriber = id, "write deadline elapsed; disconnecting subscriber");
                    stale.push(id);
                }
            }
        }

        if !stale.is_empty() {
            let mut subs = self.subscribers.write().await;
            for id in stale {
                subs.remove(&id);
            }
        }
    }

    /// Cancel the watch/poll/fan-out tasks, wait for them, and drop every
    /// subscriber channel. Idempotent: a second call is a no-op.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.cancel_tx.send(true);

        if let Some(tasks) = self.tasks.lock().await.take() {
            for task in tasks {
                let _ = task.await;
            }
        }

        let mut subs = self.subscribers.write().await;
        subs.clear();

        self.blame_cache.clear();
        self.tree_diff_cache.clear();
        self.file_diff_cache.clear();
    }
}

fn watch_roots(git_dir: &std::path::Path) -> Vec<PathBuf> {
    vec![
        git_dir.to_path_buf(),
        git_dir.join("refs").join("heads"),
        git_dir.join("refs").join("tags"),
        git_dir.join("refs").join("remotes"),
    ]
}

/// §4.G.1's event filter: only Create/Write(Modify)/Rename/Remove matter;
/// `.lock` files are Git's atomic-rename scratch files (the paired rename
/// is the real signal), and `logs/`/`config` churn isn't ref-shape change.
fn relevant_event(event: &Event, git_dir: &std::path::Path) -> bool {
    let kind_ok = matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_));
    if !kind_ok {
        return false;
    }
    event.paths.iter().any(|p| is_watchable_path(p, git_dir))
}

fn is_watchable_path(path: &std::path::Path, git_dir: &std::path::Path) -> bool {
    if path.extension().and_then(|e| e.to_str()) == Some("lock") {
        return false;
    }
    if let Ok(rel) = path.strip_prefix(git_dir) {
        if rel.starts_with("logs") {
            return false;
        }
        if rel == std::path::Path::new("config") {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, EventAttributes};

    fn event(kind: EventKind, paths: Vec<PathBuf>) -> Event {
        Event { kind, paths, attrs: EventAttributes::new() }
    }

    #[test]
    fn ignores_lock_files() {
        let git_dir = PathBuf::from("/repo/.git");
        let e = event(EventKind::Create(CreateKind::File), vec![git_dir.join("refs/heads/main.lock")]);
        assert!(!relevant_event(&e, &git_dir));
    }

    #[test]
    fn ignores_logs_and_config() {
        let git_dir = PathBuf::from("/repo/.git");
        let e1 = event(EventKind::Modify(notify::event::ModifyKind::Any), vec![git_dir.join("logs/HEAD")]);
        assert!(!relevant_event(&e1, &git_dir));
        let e2 = event(EventKind::Modify(notify::event::ModifyKind::Any), vec![git_dir.join("config")]);
        assert!(!relevant_event(&e2, &git_dir));
    }

    #[test]
    fn accepts_ref_create() {
        let git_dir = PathBuf::from("/repo/.git");
        let e = event(EventKind::Create(CreateKind::File), vec![git_dir.join("refs/heads/feature")]);
        assert!(relevant_event(&e, &git_dir));
    }
}
