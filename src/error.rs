use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = EncodeError> = std::result::Result<T, E>;

/// Errors that abort the packet currently being written.
///
/// None of these are fatal to the process. Dropping the writer after an error
/// returns its buffer to the pool.
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("byte write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("string contains a NUL byte at offset {position}")]
    EmbeddedNul { position: usize },
    #[error("body of {len} bytes is shorter than the 2-byte packet id the length header assumes")]
    BodyTooShort { len: usize },
    #[error("body of {len} bytes does not fit a 16-bit length header")]
    BodyTooLong { len: usize },
}
