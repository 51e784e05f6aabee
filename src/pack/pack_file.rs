//! Parses the `PACK` object stream itself: the 12-byte header, each
//! object's type+size framing, and ofs-delta/ref-delta resolution against
//! earlier objects in the same pack.

use std::io::{BufReader, Cursor};

use crate::errors::GitError;
use crate::hash::{HASH_SIZE, ObjectHash};
use crate::object::types::ObjectType;
use crate::zlib::ReadBoxed;

const PACK_MAGIC: [u8; 4] = *b"PACK";

/// What kind of entry a pack object header describes.
#[derive(Debug, Clone, Copy)]
pub enum PackEntryKind {
    Base(ObjectType),
    /// Resolved to an absolute byte offset of the base object in this pack.
    OfsDelta(u64),
    RefDelta(ObjectHash),
}

#[derive(Debug, Clone, Copy)]
pub struct PackObjectHeader {
    /// Byte offset of this entry's type/size header within the pack.
    pub offset: u64,
    pub kind: PackEntryKind,
    /// Declared size of the *decompressed* content (base content size for
    /// base objects, delta-instruction-stream size for deltas).
    pub size: usize,
    /// Byte offset where the zlib-compressed body begins.
    pub body_offset: u64,
}

/// An in-memory view over a complete `.pack` file. Packs are read in full
/// rather than streamed, since delta resolution needs random access back
/// into earlier objects regardless of how the bytes arrived.
pub struct PackFile {
    data: Vec<u8>,
    pub version: u32,
    pub object_count: u32,
}

impl PackFile {
    pub fn parse(data: Vec<u8>) -> Result<PackFile, GitError> {
        if data.len() < 32 {
            return Err(GitError::InvalidPackFile("file too short".to_string()));
        }
        if data[..4] != PACK_MAGIC {
            return Err(GitError::InvalidPackFile("bad magic".to_string()));
        }
        let version = u32::from_be_bytes(data[4..8].try_into().unwrap());
        if version != 2 && version != 3 {
            return Err(GitError::InvalidPackFile(format!(
                "unsupported pack version {version}"
            )));
        }
        let object_count = u32::from_be_bytes(data[8..12].try_into().unwrap());

        Ok(PackFile {
            data,
            version,
            object_count,
        })
    }

    /// Parse the type+size (and delta base reference, if any) header that
    /// starts at `offset`.
    pub fn read_header_at(&self, offset: u64) -> Result<PackObjectHeader, GitError> {
        let mut pos = offset as usize;
        let bytes = self.data.as_slice();
        if pos >= bytes.len() {
            return Err(GitError::Malformed("object header past end of pack".to_string()));
        }

        let first = bytes[pos];
        pos += 1;
        let type_id = (first >> 4) & 0x07;
        let mut size = (first & 0x0f) as usize;
        let mut shift = 4u32;
        let mut more = first & 0x80 != 0;
        while more {
            if pos >= bytes.len() {
                return Err(GitError::Malformed("truncated object size varint".to_string()));
            }
            let b = bytes[pos];
            pos += 1;
            size |= ((b & 0x7f) as usize) << shift;
            shift += 7;
            more = b & 0x80 != 0;
        }

        let kind = match type_id {
            1 => PackEntryKind::Base(ObjectType::Commit),
            2 => PackEntryKind::Base(ObjectType::Tree),
            3 => PackEntryKind::Base(ObjectType::Blob),
            4 => PackEntryKind::Base(ObjectType::Tag),
            6 => {
                // ofs-delta: negative offset varint, base128, MSB-first with
                // a +1 adjustment on each continuation byte.
                let mut c = bytes
                    .get(pos)
                    .copied()
                    .ok_or_else(|| GitError::Malformed("truncated ofs-delta offset".to_string()))?;
                pos += 1;
                let mut value = (c & 0x7f) as u64;
                while c & 0x80 != 0 {
                    c = bytes
                        .get(pos)
                        .copied()
                        .ok_or_else(|| GitError::Malformed("truncated ofs-delta offset".to_string()))?;
                    pos += 1;
                    value += 1;
                    value = (value << 7) | (c & 0x7f) as u64;
                }
                let base_offset = offset
                    .checked_sub(value)
                    .ok_or_else(|| GitError::Malformed("ofs-delta base offset underflows 0".to_string()))?;
                PackEntryKind::OfsDelta(base_offset)
            }
            7 => {
                if pos + HASH_SIZE > bytes.len() {
                    return Err(GitError::Malformed("truncated ref-delta base hash".to_string()));
                }
                let hash = ObjectHash::from_bytes(&bytes[pos..pos + HASH_SIZE])
                    .map_err(GitError::Malformed)?;
                pos += HASH_SIZE;
                PackEntryKind::RefDelta(hash)
            }
            other => {
                return Err(GitError::Malformed(format!(
                    "unknown pack entry type id {other}"
                )));
            }
        };

        Ok(PackObjectHeader {
            offset,
            kind,
            size,
            body_offset: pos as u64,
        })
    }

    /// Inflate the zlib body following `header`, returning exactly `header.size`
    /// decompressed bytes (raw content for base objects, delta instructions
    /// for delta objects).
    fn inflate_body(&self, header: &PackObjectHeader) -> Result<Vec<u8>, GitError> {
        let cursor = Cursor::new(&self.data[header.body_offset as usize..]);
        let mut reader = ReadBoxed::new_for_delta(BufReader::new(cursor));
        let mut out = Vec::with_capacity(header.size);
        std::io::Read::read_to_end(&mut reader, &mut out)?;
        if out.len() != header.size {
            return Err(GitError::Malformed(format!(
                "decompressed size {} does not match declared size {}",
                out.len(),
                header.size
            )));
        }
        Ok(out)
    }

    /// Length, in bytes, of the zlib-compressed body starting at
    /// `body_offset` — found by running the entry through `Decompress` with
    /// a throwaway output buffer and reading off `total_in` once it signals
    /// `StreamEnd`, rather than trusting any length field (the pack format
    /// doesn't carry one; entries are back-to-back compressed streams).
    fn compressed_body_len(&self, body_offset: u64) -> Result<u64, GitError> {
        use flate2::{Decompress, FlushDecompress, Status};
        let input = &self.data[body_offset as usize..];
        let mut decompressor = Decompress::new(true);
        let mut scratch = [0u8; 8192];
        let mut pos = 0usize;
        loop {
            let status = decompressor
                .decompress(&input[pos..], &mut scratch, FlushDecompress::None)
                .map_err(|e| GitError::Malformed(format!("corrupt zlib stream: {e}")))?;
            pos = decompressor.total_in() as usize;
            if status == Status::StreamEnd {
                return Ok(decompressor.total_in());
            }
            if pos >= input.len() {
                return Err(GitError::Malformed("truncated zlib stream".to_string()));
            }
        }
    }

    /// Recompute the CRC32 of the entry at `offset` (header bytes through
    /// the end of its compressed body), for comparison against the value
    /// the `.idx` file recorded at pack-write time (§4.A's per-object CRC32
    /// array). A mismatch means the pack has bit-rotted since it was
    /// written; the declared object-store contract only surfaces this as a
    /// logged warning (§7's propagation policy), not a hard failure, since
    /// the object still decompresses and type/size-checks cleanly.
    pub fn crc32_of_entry(&self, offset: u64) -> Result<u32, GitError> {
        let header = self.read_header_at(offset)?;
        let compressed_len = self.compressed_body_len(header.body_offset)?;
        let entry_end = header.body_offset as usize + compressed_len as usize;
        let entry_bytes = self
            .data
            .get(offset as usize..entry_end)
            .ok_or_else(|| GitError::Malformed("entry range past end of pack".to_string()))?;
        Ok(crc32fast::hash(entry_bytes))
    }

    /// Resolve an object at `offset` to its final type and fully
    /// reconstructed content, walking the ofs-delta/ref-delta chain up to
    /// `max_depth` hops. `resolve_ref_base` is handed each ref-delta's base
    /// hash plus the hop count it's being resolved at — its base may live
    /// in this same pack, another open pack, or as a loose object, so
    /// looking it up is the `ObjectStore`'s job, not this single pack's.
    pub fn resolve_object(
        &self,
        offset: u64,
        max_depth: usize,
        resolve_ref_base: &dyn Fn(&ObjectHash, usize) -> Result<(ObjectType, Vec<u8>), GitError>,
    ) -> Result<(ObjectType, Vec<u8>), GitError> {
        self.resolve_object_depth(offset, max_depth, 0, resolve_ref_base)
    }

    fn resolve_object_depth(
        &self,
        offset: u64,
        max_depth: usize,
        depth: usize,
        resolve_ref_base: &dyn Fn(&ObjectHash, usize) -> Result<(ObjectType, Vec<u8>), GitError>,
    ) -> Result<(ObjectType, Vec<u8>), GitError> {
        if depth > max_depth {
            return Err(GitError::DeltaChainTooDeep(max_depth));
        }
        let header = self.read_header_at(offset)?;
        match header.kind {
            PackEntryKind::Base(obj_type) => Ok((obj_type, self.inflate_body(&header)?)),
            PackEntryKind::OfsDelta(base_offset) => {
                let (base_type, base_content) =
                    self.resolve_object_depth(base_offset, max_depth, depth + 1, resolve_ref_base)?;
                let delta = self.inflate_body(&header)?;
                let mut cursor = Cursor::new(delta);
                let content = crate::delta::apply(&mut cursor, &base_content)?;
                Ok((base_type, content))
            }
            PackEntryKind::RefDelta(base_hash) => {
                let (base_type, base_content) = resolve_ref_base(&base_hash, depth + 1)?;
                let delta = self.inflate_body(&header)?;
                let mut cursor = Cursor::new(delta);
                let content = crate::delta::apply(&mut cursor, &base_content)?;
                Ok((base_type, content))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{Compression, write::ZlibEncoder};
    use std::io::Write;

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    fn build_pack_with_one_blob(content: &[u8]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend(PACK_MAGIC);
        data.extend(2u32.to_be_bytes());
        data.extend(1u32.to_be_bytes());

        // type 3 (blob), size < 16 so it fits the low 4 bits with no
        // continuation byte.
        let size = content.len();
        assert!(size < 16);
        let header_byte = (3 << 4) | (size as u8);
        data.push(header_byte);
        data.extend(zlib(content));
        data
    }

    #[test]
    fn parses_header_and_resolves_base_object() {
        let content = b"hi";
        let pack_bytes = build_pack_with_one_blob(content);
        let pack = PackFile::parse(pack_bytes).unwrap();
        assert_eq!(pack.object_count, 1);

        let header = pack.read_header_at(12).unwrap();
        assert!(matches!(header.kind, PackEntryKind::Base(ObjectType::Blob)));
        assert_eq!(header.size, content.len());
    }

    #[test]
    fn rejects_bad_magic() {
        let mut data = build_pack_with_one_blob(b"x");
        data[0] = b'X';
        assert!(PackFile::parse(data).is_err());
    }
}
