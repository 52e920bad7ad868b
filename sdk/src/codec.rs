use {
    crate::{
        cipher::Cipher,
        error::{Error, Result},
        manifest::Manifest,
        path::TreePath,
    },
    fs_err::read,
    std::path::Path,
};

/// Produces the sealed content for a single file, without touching disk
/// beyond reading the original.
///
/// Files that are themselves artifacts of a previous pass come back as
/// [`Error::AlreadyEncrypted`]: the manifest file, any ciphertext file
/// recorded in the manifest, and any path the manifest already maps to a
/// ciphertext file. Recognition is by manifest membership, never by how
/// the file name looks.
pub fn encrypt_one(
    root: &Path,
    path: &TreePath,
    manifest: &Manifest,
    manifest_name: &str,
    cipher: &Cipher,
) -> Result<Vec<u8>> {
    if path.as_str() == manifest_name
        || manifest.contains_name(path.file_name())
        || manifest.maps_original(path)
    {
        return Err(Error::AlreadyEncrypted {
            path: path.to_string(),
        });
    }
    let content = read(root.join(path.to_native()))?;
    cipher.seal(&content)
}

/// Recovers the original content of one ciphertext file.
pub fn decrypt_one(cipher: &Cipher, blob: &[u8]) -> Result<Vec<u8>> {
    cipher.open(blob)
}
