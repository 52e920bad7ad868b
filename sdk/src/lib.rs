//! In-place folder encryption with a sealed manifest.
//!
//! An encryption pass replaces every file in a directory tree with an
//! authenticated ciphertext sibling under a random opaque name, then
//! writes a sealed manifest mapping those names back to the original
//! relative paths. A restore pass reads the manifest first and brings
//! every mapped file back exactly where it was. [`vault::Vault`] is the
//! entry point.

pub mod cipher;
pub mod codec;
pub mod error;
pub mod key;
pub mod manifest;
pub mod name;
pub mod path;
pub mod rules;
pub mod vault;

pub use {
    cipher::Cipher,
    error::{Error, Result},
    key::EncryptionKey,
    manifest::{MANIFEST_SUFFIX, Manifest, ManifestEntry, manifest_file_name},
    name::{OPAQUE_SUFFIX, OpaqueName},
    path::TreePath,
    rules::{Rule, Rules},
    vault::{PassSummary, Vault},
};
