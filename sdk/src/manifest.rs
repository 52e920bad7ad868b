use {
    crate::{
        cipher::Cipher,
        error::{Error, Result},
        name::OpaqueName,
        path::TreePath,
    },
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::{collections::BTreeMap, io},
};

/// Suffix of the manifest file stored inside the processed root.
pub const MANIFEST_SUFFIX: &str = ".map";

const MANIFEST_VERSION: u32 = 1;

/// Mapping from opaque ciphertext names to the originals they replaced.
///
/// The manifest only ever exists on disk in sealed form. Writing it is
/// the commit point of an encryption pass, and reading it back is the
/// mandatory first step of a restore.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    version: u32,
    created_at: DateTime<Utc>,
    entries: BTreeMap<OpaqueName, ManifestEntry>,
}

/// What is known about one encrypted file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Root-relative path of the original file.
    pub path: TreePath,
    /// Size of the original content in bytes.
    pub size: u64,
    pub modified_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unix_mode: Option<u32>,
}

impl Manifest {
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: MANIFEST_VERSION,
            created_at: Utc::now(),
            entries: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, name: OpaqueName, entry: ManifestEntry) {
        self.entries.insert(name, entry);
    }

    pub fn remove(&mut self, name: &str) -> Option<ManifestEntry> {
        self.entries.remove(name)
    }

    /// True if `file_name` is the name of a ciphertext file we created.
    #[must_use]
    pub fn contains_name(&self, file_name: &str) -> bool {
        self.entries.contains_key(file_name)
    }

    /// True if `path` is already recorded as the original of some entry.
    #[must_use]
    pub fn maps_original(&self, path: &TreePath) -> bool {
        self.entries.values().any(|entry| entry.path == *path)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&OpaqueName, &ManifestEntry)> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Serializes and encrypts the manifest into its on-disk form.
    pub fn seal(&self, cipher: &Cipher) -> Result<Vec<u8>> {
        let serialized = serde_json::to_vec(self).map_err(io::Error::other)?;
        cipher.seal(&serialized)
    }

    /// Decrypts and parses a manifest read from disk.
    ///
    /// [`Error::Authentication`] means the data was not sealed with this
    /// key or was damaged; [`Error::ManifestFormat`] means it was sealed
    /// with this key but does not contain a manifest we understand.
    pub fn open(cipher: &Cipher, blob: &[u8]) -> Result<Self> {
        let plaintext = cipher.open(blob)?;
        let manifest: Self = serde_json::from_slice(&plaintext)
            .map_err(|err| Error::ManifestFormat(err.to_string()))?;
        if manifest.version != MANIFEST_VERSION {
            return Err(Error::ManifestFormat(format!(
                "unsupported manifest version {} (expected {MANIFEST_VERSION})",
                manifest.version
            )));
        }
        Ok(manifest)
    }
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new()
    }
}

/// Name of the manifest file for a root directory called `root_name`.
#[must_use]
pub fn manifest_file_name(root_name: &str) -> String {
    format!("{root_name}{MANIFEST_SUFFIX}")
}
