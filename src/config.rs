//! Runtime configuration, read from `GIT_INSPECTOR_*` environment variables
//! with the same defaulting style `PackConfig`/`LfsConfig` use elsewhere in
//! this crate family: every field has a sane default, and a badly formed
//! environment value is logged and ignored rather than treated as fatal.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    /// Path to the repository's working directory (or bare repo root).
    pub repo_path: PathBuf,
    /// Maximum number of entries held in the derived-data cache.
    pub cache_size: usize,
    /// Minimum tracing level the embedding collaborator should configure.
    pub log_level: String,
    /// `"json"` or `"pretty"`; read by the embedding collaborator, not by
    /// this crate's own tracing call sites.
    pub log_format: String,
    /// How long to wait after the first filesystem event before rebuilding
    /// the snapshot, to coalesce bursts of writes.
    #[serde(with = "duration_millis")]
    pub debounce_interval: Duration,
    /// Interval between working-tree status polls.
    #[serde(with = "duration_millis")]
    pub status_poll_interval: Duration,
    /// Maximum number of ancestor commits a blame walk will visit before
    /// giving up on remaining unresolved entries.
    pub blame_max_commits: usize,
    /// Maximum ofs-delta/ref-delta chain length before a pack object is
    /// treated as malformed.
    pub delta_chain_max_depth: usize,
    /// Files larger than this are reported as binary-diff rather than
    /// having their contents diffed line by line.
    pub file_diff_max_bytes: u64,
    /// Tree diffs are truncated past this many changed entries.
    pub tree_diff_max_entries: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repo_path: PathBuf::from("."),
            cache_size: 500,
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            debounce_interval: Duration::from_millis(100),
            status_poll_interval: Duration::from_secs(2),
            blame_max_commits: 1000,
            delta_chain_max_depth: 50,
            file_diff_max_bytes: 512 * 1024,
            tree_diff_max_entries: 500,
        }
    }
}

impl Config {
    /// Build a `Config` from `GIT_INSPECTOR_*` environment variables,
    /// falling back to `Config::default()` field-by-field for anything
    /// unset or unparseable.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("GIT_INSPECTOR_REPO_PATH") {
            cfg.repo_path = PathBuf::from(v);
        }
        set_parsed(&mut cfg.cache_size, "GIT_INSPECTOR_CACHE_SIZE");
        if let Ok(v) = std::env::var("GIT_INSPECTOR_LOG_LEVEL") {
            cfg.log_level = v;
        }
        if let Ok(v) = std::env::var("GIT_INSPECTOR_LOG_FORMAT") {
            cfg.log_format = v;
        }
        set_parsed_millis(&mut cfg.debounce_interval, "GIT_INSPECTOR_DEBOUNCE_MS");
        set_parsed_millis(
            &mut cfg.status_poll_interval,
            "GIT_INSPECTOR_STATUS_POLL_MS",
        );
        set_parsed(&mut cfg.blame_max_commits, "GIT_INSPECTOR_BLAME_MAX_COMMITS");
        set_parsed(
            &mut cfg.delta_chain_max_depth,
            "GIT_INSPECTOR_DELTA_CHAIN_MAX_DEPTH",
        );
        set_parsed(&mut cfg.file_diff_max_bytes, "GIT_INSPECTOR_FILE_DIFF_MAX_BYTES");
        set_parsed(
            &mut cfg.tree_diff_max_entries,
            "GIT_INSPECTOR_TREE_DIFF_MAX_ENTRIES",
        );

        cfg
    }
}

fn set_parsed<T: std::str::FromStr>(field: &mut T, var: &str) {
    if let Ok(v) = std::env::var(var) {
        match v.parse() {
            Ok(parsed) => *field = parsed,
            Err(_) => tracing::warn!("ignoring unparseable {var}={v:?}, keeping default"),
        }
    }
}

fn set_parsed_millis(field: &mut Duration, var: &str) {
    if let Ok(v) = std::env::var(var) {
        match v.parse::<u64>() {
            Ok(ms) => *field = Duration::from_millis(ms),
            Err(_) => tracing::warn!("ignoring unparseable {var}={v:?}, keeping default"),
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::Config;

    #[test]
    fn defaults_match_spec_knobs() {
        let cfg = Config::default();
        assert_eq!(cfg.cache_size, 500);
        assert_eq!(cfg.blame_max_commits, 1000);
        assert_eq!(cfg.delta_chain_max_depth, 50);
        assert_eq!(cfg.tree_diff_max_entries, 500);
        assert_eq!(cfg.file_diff_max_bytes, 512 * 1024);
    }
}
