//! Reader for Git pack index (`.idx`) files: versions 1 and 2. Provides
//! O(log n) hash lookup via the 256-entry fanout table; v2 additionally
//! carries per-object CRC32s and the 64-bit extended offset table for packs
//! bigger than 2 GiB, neither of which v1 has room for in its fixed-width
//! `(offset, hash)` records.

use std::io::Read;

use byteorder::{BigEndian, ReadBytesExt};

use crate::errors::GitError;
use crate::hash::{HASH_SIZE, ObjectHash};

const IDX_MAGIC: [u8; 4] = [0xff, 0x74, 0x4f, 0x63];
const IDX_VERSION: u32 = 2;
const LARGE_OFFSET_FLAG: u32 = 0x8000_0000;

/// A parsed `.idx` file: fanout table, sorted object names, offsets into
/// the corresponding pack file, and (v2 only) per-object CRC32s.
#[derive(Debug, Clone)]
pub struct PackIndex {
    fanout: [u32; 256],
    hashes: Vec<ObjectHash>,
    crc32s: Vec<u32>,
    offsets: Vec<u64>,
    pub pack_hash: ObjectHash,
    pub idx_hash: ObjectHash,
}

impl PackIndex {
    pub fn parse(data: &[u8]) -> Result<PackIndex, GitError> {
        if data.len() < 256 * 4 + 40 {
            return Err(GitError::InvalidIdxFile("file too short".to_string()));
        }
        if data[..4] == IDX_MAGIC {
            Self::parse_v2(data)
        } else {
            Self::parse_v1(data)
        }
    }

    fn parse_v2(data: &[u8]) -> Result<PackIndex, GitError> {
        let version = u32::from_be_bytes(data[4..8].try_into().unwrap());
        if version != IDX_VERSION {
            return Err(GitError::InvalidIdxFile(format!(
                "unsupported idx version {version}"
            )));
        }

        let mut cursor = &data[8..];
        let fanout = read_fanout(&mut cursor)?;
        let object_count = fanout[255] as usize;

        let hashes = read_hashes(&mut cursor, object_count)?;

        let mut crc32s = Vec::with_capacity(object_count);
        for _ in 0..object_count {
            crc32s.push(read_u32(&mut cursor)?);
        }

        let mut raw_offsets = Vec::with_capacity(object_count);
        let mut large_count = 0usize;
        for _ in 0..object_count {
            let v = read_u32(&mut cursor)?;
            if v & LARGE_OFFSET_FLAG != 0 {
                large_count = large_count.max(((v & !LARGE_OFFSET_FLAG) + 1) as usize);
            }
            raw_offsets.push(v);
        }

        let mut large_offsets = Vec::with_capacity(large_count);
        for _ in 0..large_count {
            large_offsets.push(read_u64(&mut cursor)?);
        }

        let offsets: Vec<u64> = raw_offsets
            .into_iter()
            .map(|v| {
                if v & LARGE_OFFSET_FLAG != 0 {
                    let idx = (v & !LARGE_OFFSET_FLAG) as usize;
                    large_offsets.get(idx).copied().unwrap_or(0)
                } else {
                    v as u64
                }
            })
            .collect();

        let (pack_hash, idx_hash) = read_trailer(cursor)?;

        Ok(PackIndex {
            fanout,
            hashes,
            crc32s,
            offsets,
            pack_hash,
            idx_hash,
        })
    }

    /// Version 1 has no magic or version header at all — the file opens
    /// directly with the fanout table, followed by `(4-byte offset,
    /// 20-byte hash)` records sorted by hash, and no per-object CRC32s.
    fn parse_v1(data: &[u8]) -> Result<PackIndex, GitError> {
        let mut cursor = data;
        let fanout = read_fanout(&mut cursor)?;
        let object_count = fanout[255] as usize;

        let mut hashes = Vec::with_capacity(object_count);
        let mut offsets = Vec::with_capacity(object_count);
        for _ in 0..object_count {
            let offset = read_u32(&mut cursor)? as u64;
            let mut buf = [0u8; HASH_SIZE];
            cursor
                .read_exact(&mut buf)
                .map_err(|_| GitError::InvalidIdxFile("truncated name table".to_string()))?;
            offsets.push(offset);
            hashes.push(ObjectHash(buf));
        }

        let (pack_hash, idx_hash) = read_trailer(cursor)?;

        Ok(PackIndex {
            fanout,
            hashes,
            crc32s: Vec::new(),
            offsets,
            pack_hash,
            idx_hash,
        })
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    fn bucket_range(&self, first_byte: u8) -> (usize, usize) {
        let start = if first_byte == 0 {
            0
        } else {
            self.fanout[first_byte as usize - 1] as usize
        };
        let end = self.fanout[first_byte as usize] as usize;
        (start, end)
    }

    /// Binary-search the bucket for `hash`'s first byte, returning its pack
    /// offset if found.
    pub fn find_offset(&self, hash: &ObjectHash) -> Option<u64> {
        let (start, end) = self.bucket_range(hash.0[0]);
        self.hashes[start..end]
            .binary_search(hash)
            .ok()
            .map(|pos| self.offsets[start + pos])
    }

    /// `None` both when `hash` isn't present and when the index is a v1
    /// file, which carries no per-object CRC32 table at all.
    pub fn crc32_for(&self, hash: &ObjectHash) -> Option<u32> {
        let (start, end) = self.bucket_range(hash.0[0]);
        let pos = self.hashes[start..end].binary_search(hash).ok()?;
        self.crc32s.get(start + pos).copied()
    }

    /// Resolve a hex prefix to the set of matching hashes, for short-hash
    /// ambiguity detection.
    pub fn resolve_prefix(&self, prefix: &str) -> Vec<ObjectHash> {
        if prefix.is_empty() || prefix.len() > 40 {
            return Vec::new();
        }
        let first_byte = match u8::from_str_radix(&prefix[..prefix.len().min(2)].to_string(), 16) {
            Ok(b) if prefix.len() >= 2 => b,
            _ => {
                // odd-length or short prefix: scan the two buckets the
                // nibble could belong to.
                return self
                    .hashes
                    .iter()
                    .filter(|h| h.to_hex().starts_with(prefix))
                    .copied()
                    .collect();
            }
        };
        let (start, end) = self.bucket_range(first_byte);
        self.hashes[start..end]
            .iter()
            .filter(|h| h.to_hex().starts_with(prefix))
            .copied()
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ObjectHash, u64, u32)> {
        self.hashes
            .iter()
            .zip(self.offsets.iter().copied())
            .zip(self.crc32s.iter().copied())
            .map(|((h, o), c)| (h, o, c))
    }
}

fn read_u32(cursor: &mut &[u8]) -> Result<u32, GitError> {
    cursor
        .read_u32::<BigEndian>()
        .map_err(|_| GitError::InvalidIdxFile("truncated u32 field".to_string()))
}

fn read_u64(cursor: &mut &[u8]) -> Result<u64, GitError> {
    cursor
        .read_u64::<BigEndian>()
        .map_err(|_| GitError::InvalidIdxFile("truncated u64 field".to_string()))
}

fn read_fanout(cursor: &mut &[u8]) -> Result<[u32; 256], GitError> {
    let mut fanout = [0u32; 256];
    for slot in fanout.iter_mut() {
        *slot = read_u32(cursor)?;
    }
    Ok(fanout)
}

fn read_hashes(cursor: &mut &[u8], object_count: usize) -> Result<Vec<ObjectHash>, GitError> {
    let mut hashes = Vec::with_capacity(object_count);
    for _ in 0..object_count {
        let mut buf = [0u8; HASH_SIZE];
        cursor
            .read_exact(&mut buf)
            .map_err(|_| GitError::InvalidIdxFile("truncated name table".to_string()))?;
        hashes.push(ObjectHash(buf));
    }
    Ok(hashes)
}

fn read_trailer(mut cursor: &[u8]) -> Result<(ObjectHash, ObjectHash), GitError> {
    if cursor.len() < HASH_SIZE * 2 {
        return Err(GitError::InvalidIdxFile("missing trailer".to_string()));
    }
    let mut pack_hash_buf = [0u8; HASH_SIZE];
    cursor.read_exact(&mut pack_hash_buf).unwrap();
    let mut idx_hash_buf = [0u8; HASH_SIZE];
    cursor.read_exact(&mut idx_hash_buf).unwrap();
    Ok((ObjectHash(pack_hash_buf), ObjectHash(idx_hash_buf)))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hand-builds a minimal valid v2 idx for a single object, mirroring
    /// the byte layout the writer in this crate family produces.
    fn build_single_entry_idx(hash: ObjectHash, crc32: u32, offset: u32) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend(IDX_MAGIC);
        out.extend(2u32.to_be_bytes());

        let first_byte = hash.0[0] as usize;
        for i in 0..256 {
            let count = if i >= first_byte { 1u32 } else { 0 };
            out.extend(count.to_be_bytes());
        }
        out.extend(hash.0);
        out.extend(crc32.to_be_bytes());
        out.extend(offset.to_be_bytes());
        out.extend([0xAAu8; HASH_SIZE]); // pack hash
        out.extend([0xBBu8; HASH_SIZE]); // idx hash
        out
    }

    #[test]
    fn finds_offset_for_known_hash() {
        let hash = ObjectHash([7u8; HASH_SIZE]);
        let data = build_single_entry_idx(hash, 0xdead_beef, 42);
        let idx = PackIndex::parse(&data).unwrap();
        assert_eq!(idx.find_offset(&hash), Some(42));
        assert_eq!(idx.crc32_for(&hash), Some(0xdead_beef));
    }

    #[test]
    fn resolves_hex_prefix() {
        let hash = ObjectHash([7u8; HASH_SIZE]);
        let data = build_single_entry_idx(hash, 1, 1);
        let idx = PackIndex::parse(&data).unwrap();
        let prefix = &hash.to_hex()[..8];
        assert_eq!(idx.resolve_prefix(prefix), vec![hash]);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut data = build_single_entry_idx(ObjectHash([1u8; HASH_SIZE]), 1, 1);
        data[0] = 0x00;
        assert!(PackIndex::parse(&data).is_err());
    }

    /// Hand-builds a minimal valid v1 idx (no magic/version header, no
    /// CRC32 table) for a single object.
    fn build_v1_single_entry_idx(hash: ObjectHash, offset: u32) -> Vec<u8> {
        let mut out = Vec::new();
        let first_byte = hash.0[0] as usize;
        for i in 0..256 {
            let count = if i >= first_byte { 1u32 } else { 0 };
            out.extend(count.to_be_bytes());
        }
        out.extend(offset.to_be_bytes());
        out.extend(hash.0);
        out.extend([0xAAu8; HASH_SIZE]); // pack hash
        out.extend([0xBBu8; HASH_SIZE]); // idx hash
        out
    }

    #[test]
    fn parses_v1_idx_without_magic_or_crc32_table() {
        let hash = ObjectHash([9u8; HASH_SIZE]);
        let data = build_v1_single_entry_idx(hash, 99);
        let idx = PackIndex::parse(&data).unwrap();
        assert_eq!(idx.find_offset(&hash), Some(99));
        assert_eq!(idx.crc32_for(&hash), None);
        assert_eq!(idx.len(), 1);
    }
}
