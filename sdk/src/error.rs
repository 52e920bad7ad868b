use {std::io, thiserror::Error};

/// Failure modes of the encryption engine.
///
/// During a bulk pass, `AlreadyEncrypted` and per-file `Io` failures are
/// recoverable (the file is skipped and the pass continues); everything
/// touching the manifest is fatal for the pass.
#[derive(Debug, Error)]
pub enum Error {
    /// The file is an artifact of a previous encrypt pass over this root:
    /// the manifest itself, a ciphertext file it maps, or an original path
    /// it already covers.
    #[error("already encrypted: {path}")]
    AlreadyEncrypted { path: String },

    /// Authenticated decryption failed. Wrong key, truncation, corruption
    /// and tampering are indistinguishable by design.
    #[error("authentication failed: {reason}")]
    Authentication { reason: String },

    /// The manifest decrypted successfully but its payload is not a
    /// supported mapping document.
    #[error("malformed manifest: {0}")]
    ManifestFormat(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid encryption key: {0}")]
    InvalidKey(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
