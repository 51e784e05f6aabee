//! Pack file and pack index reading: parsing `PACK` object streams,
//! resolving ofs-delta/ref-delta chains against base objects, and looking
//! up objects by hash via the companion `.idx` file.

pub mod index;
pub mod pack_file;

pub use index::PackIndex;
pub use pack_file::{PackFile, PackObjectHeader};
