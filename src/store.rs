//! The object store: resolves hashes and hex prefixes to Git objects,
//! reading loose objects out of `.git/objects/xx/yyyy...` and packed
//! objects out of `.git/objects/pack/*.pack` + `*.idx` pairs. Doesn't
//! write anything back — this is a read-only inspector, not a porcelain.

use std::collections::HashMap;
use std::fs;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use crate::errors::GitError;
use crate::hash::{HASH_HEX_LEN, ObjectHash};
use crate::object::{Object, commit::Commit, tag::Tag, tree::Tree};
use crate::object::{blob::Blob, types::ObjectType};
use crate::pack::{PackFile, PackIndex};
use crate::zlib::ReadBoxed;

struct OpenPack {
    file: PackFile,
    index: PackIndex,
}

/// Read-only view over a repository's `objects/` directory: loose objects
/// plus every pack currently sitting in `objects/pack/`.
pub struct ObjectStore {
    objects_dir: PathBuf,
    packs: Vec<OpenPack>,
    delta_chain_max_depth: usize,
}

impl ObjectStore {
    pub fn open(repo_git_dir: &Path, delta_chain_max_depth: usize) -> Result<ObjectStore, GitError> {
        let objects_dir = repo_git_dir.join("objects");
        if !objects_dir.is_dir() {
            return Err(GitError::RepoNotFound(format!(
                "no objects directory at {}",
                objects_dir.display()
            )));
        }

        let mut packs = Vec::new();
        let pack_dir = objects_dir.join("pack");
        if pack_dir.is_dir() {
            for entry in fs::read_dir(&pack_dir).map_err(GitError::IOError)? {
                let entry = entry.map_err(GitError::IOError)?;
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("idx") {
                    continue;
                }
                let pack_path = path.with_extension("pack");
                if !pack_path.is_file() {
                    continue;
                }
                let idx_bytes = fs::read(&path).map_err(GitError::IOError)?;
                let index = PackIndex::parse(&idx_bytes)?;
                let pack_bytes = fs::read(&pack_path).map_err(GitError::IOError)?;
                let file = PackFile::parse(pack_bytes)?;
                packs.push(OpenPack { file, index });
            }
        }

        Ok(ObjectStore {
            objects_dir,
            packs,
            delta_chain_max_depth,
        })
    }

    fn loose_path(&self, hash: &ObjectHash) -> PathBuf {
        let hex = hash.to_hex();
        self.objects_dir.join(&hex[..2]).join(&hex[2..])
    }

    /// True if an object with this exact hash exists, loose or packed.
    pub fn exists(&self, hash: &ObjectHash) -> bool {
        self.loose_path(hash).is_file()
            || self.packs.iter().any(|p| p.index.find_offset(hash).is_some())
    }

    /// Resolve a (possibly abbreviated) hex prefix to the single matching
    /// hash, erroring on zero or multiple matches.
    pub fn resolve(&self, prefix: &str) -> Result<ObjectHash, GitError> {
        if prefix.len() == HASH_HEX_LEN {
            let hash = prefix
                .parse::<ObjectHash>()
                .map_err(GitError::InvalidHashValue)?;
            return if self.exists(&hash) {
                Ok(hash)
            } else {
                Err(GitError::NotFound(format!("object {prefix} not found")))
            };
        }

        let mut matches: Vec<ObjectHash> = Vec::new();
        if let Some(hex_subdir) = prefix.get(..2) {
            let dir = self.objects_dir.join(hex_subdir);
            if dir.is_dir() {
                let rest = &prefix[2.min(prefix.len())..];
                if let Ok(entries) = fs::read_dir(&dir) {
                    for entry in entries.flatten() {
                        if let Some(name) = entry.file_name().to_str() {
                            if name.starts_with(rest) {
                                if let Ok(hash) = format!("{hex_subdir}{name}").parse() {
                                    matches.push(hash);
                                }
                            }
                        }
                    }
                }
            }
        }
        for pack in &self.packs {
            for h in pack.index.resolve_prefix(prefix) {
                if !matches.contains(&h) {
                    matches.push(h);
                }
            }
        }

        match matches.len() {
            0 => Err(GitError::NotFound(format!("no object matches prefix {prefix}"))),
            1 => Ok(matches[0]),
            _ => Err(GitError::Ambiguous(prefix.to_string())),
        }
    }

    /// Read an object's raw `(type, content)` pair, checking loose storage
    /// first and falling back to packs.
    pub fn read_raw(&self, hash: &ObjectHash) -> Result<(ObjectType, Vec<u8>), GitError> {
        self.read_raw_depth(hash, 0)
    }

    /// `depth` is the number of delta hops already taken to get here, across
    /// however many packs and loose objects the chain has crossed so far —
    /// a ref-delta's base may live in a loose file, another pack, or the
    /// same pack (§4.A), so the depth budget has to be threaded through
    /// this store-level lookup rather than reset every time resolution
    /// leaves a single pack's own index.
    fn read_raw_depth(&self, hash: &ObjectHash, depth: usize) -> Result<(ObjectType, Vec<u8>), GitError> {
        if depth > self.delta_chain_max_depth {
            return Err(GitError::DeltaChainTooDeep(self.delta_chain_max_depth));
        }

        let loose_path = self.loose_path(hash);
        if loose_path.is_file() {
            return self.read_loose(&loose_path, hash);
        }

        for pack in &self.packs {
            if let Some(offset) = pack.index.find_offset(hash) {
                self.verify_crc(pack, hash, offset);
                return pack.file.resolve_object(offset, self.delta_chain_max_depth, &|base_hash, base_depth| {
                    self.read_raw_depth(base_hash, base_depth)
                });
            }
        }

        Err(GitError::NotFound(format!("object {hash} not found")))
    }

    /// Best-effort pack integrity check: compare the entry's recomputed
    /// CRC32 against the one the `.idx` recorded. Logged, never fatal — a
    /// mismatch signals on-disk corruption but the object may still
    /// decompress and type-check fine, and this crate never repairs packs.
    fn verify_crc(&self, pack: &OpenPack, hash: &ObjectHash, offset: u64) {
        let Some(expected) = pack.index.crc32_for(hash) else {
            return;
        };
        match pack.file.crc32_of_entry(offset) {
            Ok(actual) if actual != expected => {
                tracing::warn!(%hash, expected, actual, "pack entry CRC32 mismatch; pack may be corrupt");
            }
            Ok(_) => {}
            Err(err) => tracing::warn!(%hash, %err, "failed to recompute pack entry CRC32"),
        }
    }

    fn read_loose(&self, path: &Path, hash: &ObjectHash) -> Result<(ObjectType, Vec<u8>), GitError> {
        let file = fs::File::open(path).map_err(GitError::IOError)?;
        let mut reader = BufReader::new(file);
        let mut compressed = Vec::new();
        reader.read_to_end(&mut compressed).map_err(GitError::IOError)?;

        let cursor = std::io::Cursor::new(compressed);
        let mut inflate = ReadBoxed::new_for_delta(BufReader::new(cursor));
        let mut raw = Vec::new();
        inflate.read_to_end(&mut raw).map_err(GitError::IOError)?;

        let header_end = memchr::memchr(0, &raw)
            .ok_or_else(|| GitError::Malformed(format!("loose object {hash} missing NUL header terminator")))?;
        let header = std::str::from_utf8(&raw[..header_end])
            .map_err(|e| GitError::Malformed(e.to_string()))?;
        let mut parts = header.splitn(2, ' ');
        let type_name = parts
            .next()
            .ok_or_else(|| GitError::Malformed("empty loose object header".to_string()))?;
        let obj_type = ObjectType::from_string(type_name)?;
        let content = raw[header_end + 1..].to_vec();
        Ok((obj_type, content))
    }

    /// Read and parse an object of any kind.
    pub fn get_object(&self, hash: ObjectHash) -> Result<Object, GitError> {
        let (obj_type, data) = self.read_raw(&hash)?;
        Object::parse(obj_type, &data, hash)
    }

    pub fn get_commit(&self, hash: ObjectHash) -> Result<Commit, GitError> {
        match self.get_object(hash)? {
            Object::Commit(c) => Ok(c),
            other => Err(GitError::InvalidObjectType(format!(
                "{hash} is a {}, not a commit",
                other.object_type()
            ))),
        }
    }

    pub fn get_tree(&self, hash: ObjectHash) -> Result<Tree, GitError> {
        match self.get_object(hash)? {
            Object::Tree(t) => Ok(t),
            other => Err(GitError::InvalidObjectType(format!(
                "{hash} is a {}, not a tree",
                other.object_type()
            ))),
        }
    }

    pub fn get_blob(&self, hash: ObjectHash) -> Result<Blob, GitError> {
        match self.get_object(hash)? {
            Object::Blob(b) => Ok(b),
            other => Err(GitError::InvalidObjectType(format!(
                "{hash} is a {}, not a blob",
                other.object_type()
            ))),
        }
    }

    pub fn get_tag(&self, hash: ObjectHash) -> Result<Tag, GitError> {
        match self.get_object(hash)? {
            Object::Tag(t) => Ok(t),
            other => Err(GitError::InvalidObjectType(format!(
                "{hash} is a {}, not a tag",
                other.object_type()
            ))),
        }
    }

    /// Peel a tag chain (annotated tags can point at other tags) down to
    /// the first non-tag object it ultimately references.
    pub fn peel(&self, mut hash: ObjectHash) -> Result<Object, GitError> {
        loop {
            match self.get_object(hash)? {
                Object::Tag(tag) => hash = tag.object_id,
                other => return Ok(other),
            }
        }
    }
}

/// A small in-process cache of resolved commit parents, used by callers
/// that walk history repeatedly (blame, snapshot build) to avoid re-parsing
/// the same commit object many times within one operation.
#[derive(Default)]
pub struct CommitCache {
    cache: HashMap<ObjectHash, Commit>,
}

impl CommitCache {
    pub fn get_or_load(&mut self, store: &ObjectStore, hash: ObjectHash) -> Result<Commit, GitError> {
        if let Some(c) = self.cache.get(&hash) {
            return Ok(c.clone());
        }
        let commit = store.get_commit(hash)?;
        self.cache.insert(hash, commit.clone());
        Ok(commit)
    }
}
