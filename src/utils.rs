//! Shared I/O helpers for reading pack/loose-object bytes while tracking
//! stream progress and computing SHA-1 digests incrementally.

use std::io::{self, BufRead, Read};

use sha1::{Digest, Sha1};

use crate::hash::ObjectHash;

pub fn read_bytes(file: &mut impl Read, len: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0; len];
    file.read_exact(&mut buf)?;
    Ok(buf)
}

pub fn read_sha(file: &mut impl Read) -> io::Result<ObjectHash> {
    ObjectHash::from_stream(file)
}

/// A thin wrapper that counts bytes read from the underlying reader,
/// needed because `flate2`'s `ZlibDecoder` doesn't expose the compressed
/// byte count consumed, only the decompressed output.
pub struct CountingReader<R> {
    pub inner: R,
    pub bytes_read: u64,
}

impl<R> CountingReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            bytes_read: 0,
        }
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.bytes_read += n as u64;
        Ok(n)
    }
}

impl<R: BufRead> BufRead for CountingReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.bytes_read += amt as u64;
        self.inner.consume(amt);
    }
}

/// Incremental SHA-1 hasher usable through `std::io::Write`, so it can sit
/// at the end of a `tee`-style reader chain while a pack or loose object is
/// streamed through.
#[derive(Clone, Default)]
pub struct StreamHasher(Sha1);

impl StreamHasher {
    pub fn new() -> Self {
        Self(Sha1::new())
    }

    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    pub fn finalize(self) -> ObjectHash {
        let digest = self.0.finalize();
        ObjectHash::from_bytes(digest.as_ref()).expect("sha1 digest is always 20 bytes")
    }
}

impl io::Write for StreamHasher {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Returns true if the first 8 KiB of `data` contain a NUL byte, the
/// heuristic this crate uses to classify a blob as binary rather than text
/// for diffing purposes.
pub fn looks_binary(data: &[u8]) -> bool {
    let probe = &data[..data.len().min(8192)];
    memchr::memchr(0, probe).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counting_reader_tracks_bytes() {
        let data = b"0123456789";
        let mut reader = CountingReader::new(&data[..]);
        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(reader.bytes_read, 4);
    }

    #[test]
    fn stream_hasher_matches_object_hash() {
        let mut hasher = StreamHasher::new();
        hasher.update(b"Hello, world!");
        let hash = hasher.finalize();
        assert_eq!(hash.to_string(), "943a702d06f34599aee1f8da8ef9f7296031d699");
    }

    #[test]
    fn detects_binary_via_nul_byte() {
        assert!(looks_binary(b"abc\0def"));
        assert!(!looks_binary(b"plain text file\n"));
    }
}
