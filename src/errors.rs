//! Error types for the git-inspector-core crate.
//!
//! This module defines a unified error enumeration used across object
//! parsing, pack decoding, index lookup, diffing, and the live manager. It
//! integrates with `thiserror` to provide `Display` implementations and
//! error source chaining where applicable.
//!
//! Variants map onto the error taxonomy consumers are expected to branch
//! on: `InvalidInput`, `NotFound`, `Malformed`, `LimitExceeded`,
//! `Ambiguous`, `IO`, and `Canceled`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GitError {
    /// Caller-supplied input failed validation before any I/O was attempted
    /// (wrong-length hex hash, path traversal, null bytes in a path).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// No such object, commit, ref, or path exists.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A hex prefix matched more than one object.
    #[error("Ambiguous object prefix `{0}` matches multiple objects")]
    Ambiguous(String),

    /// A resource limit (delta chain depth, tree diff entries, blame depth)
    /// was exceeded. Most limit overruns are reported as truncation flags
    /// rather than errors; this variant is for the cases that must fail.
    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),

    /// The operation was aborted due to shutdown.
    #[error("Operation canceled")]
    Canceled,

    /// Invalid or unsupported git object type name.
    #[error("The `{0}` is not a valid git object type.")]
    InvalidObjectType(String),

    /// Malformed or unsupported blob object encoding.
    #[error("The `{0}` is not a valid git blob object.")]
    InvalidBlobObject(String),

    /// Malformed tree object.
    #[error("Not a valid git tree object: {0}")]
    InvalidTreeObject(String),

    /// Invalid tree entry (mode/name/hash).
    #[error("The `{0}` is not a valid git tree item.")]
    InvalidTreeItem(String),

    /// Invalid commit signature (author/committer line).
    #[error("The `{0}` is not a valid git commit signature.")]
    InvalidSignature(String),

    /// Malformed commit object.
    #[error("Not a valid git commit object: {0}")]
    InvalidCommitObject(String),

    /// Malformed tag object.
    #[error("Not a valid git tag object: {0}")]
    InvalidTagObject(String),

    /// Malformed or unsupported index (.idx) file.
    #[error("The `{0}` is not a valid idx file.")]
    InvalidIdxFile(String),

    /// Malformed or unsupported pack file.
    #[error("Not a valid pack file: {0}")]
    InvalidPackFile(String),

    /// Corrupt zlib stream, truncated pack, unknown object type, or a
    /// zero/invalid delta instruction.
    #[error("Malformed object data: {0}")]
    Malformed(String),

    /// Delta chain depth exceeded the configured limit.
    #[error("Delta chain depth exceeded limit of {0}")]
    DeltaChainTooDeep(usize),

    /// Delta application produced a result inconsistent with the declared
    /// base/result sizes.
    #[error("Delta reconstruction error: {0}")]
    DeltaObjectError(String),

    /// I/O error from underlying reader, writer, or filesystem.
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),

    /// Invalid hash formatting or length.
    #[error("The `{0}` is not a valid hash value")]
    InvalidHashValue(String),

    /// Object could not be serialized back to its canonical byte form.
    #[error("Can't encode object `{0}` to bytes")]
    EncodeObjectError(String),

    /// UTF-8 conversion error while parsing text fields.
    #[error("UTF-8 conversion error: {0}")]
    ConversionError(String),

    /// Repository could not be located or opened.
    #[error("Repository not found at `{0}`")]
    RepoNotFound(String),

    /// Generic custom error for miscellaneous failures.
    #[error("{0}")]
    CustomError(String),
}

pub type GitResult<T> = Result<T, GitError>;
