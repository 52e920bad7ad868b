use {
    crate::{
        cipher::Cipher,
        codec,
        error::{Error, Result},
        key::EncryptionKey,
        manifest::{Manifest, ManifestEntry, manifest_file_name},
        name::OpaqueName,
        path::TreePath,
        rules::Rules,
    },
    derivative::Derivative,
    fs_err as fs,
    itertools::Itertools,
    std::{
        io::Write,
        path::{Path, PathBuf},
    },
    tempfile::NamedTempFile,
    tracing::{debug, error, info, warn},
};

/// Outcome of one encryption or restore pass.
///
/// Per-file problems never abort a pass; they end up in `failed` and the
/// rest of the pass continues. Check [`has_failures`](Self::has_failures)
/// to distinguish full from partial success.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassSummary {
    pub processed: u64,
    pub skipped: u64,
    pub failed: u64,
    /// Total size of the original content of processed files.
    pub original_bytes: u64,
}

impl PassSummary {
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    fn count_processed(&mut self, bytes: u64) {
        self.processed = self.processed.saturating_add(1);
        self.original_bytes = self.original_bytes.saturating_add(bytes);
    }

    fn count_skipped(&mut self) {
        self.skipped = self.skipped.saturating_add(1);
    }

    fn count_failed(&mut self) {
        self.failed = self.failed.saturating_add(1);
    }
}

/// A root directory being encrypted in place.
///
/// An encryption pass replaces every file under the root with an
/// opaque-named sealed sibling and finally writes the sealed manifest
/// into the root. The manifest write is the commit point of the pass.
/// A restore pass reads the manifest first, restores every entry it
/// maps, and deletes the manifest once nothing is left to restore.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Vault {
    root: PathBuf,
    manifest_name: String,
    #[derivative(Debug = "ignore")]
    cipher: Cipher,
}

impl Vault {
    pub fn open(root: impl AsRef<Path>, key: &EncryptionKey) -> Result<Self> {
        let root = dunce::canonicalize(root.as_ref())?;
        if !fs::metadata(&root)?.is_dir() {
            return Err(Error::InvalidPath(format!(
                "{} is not a directory",
                root.display()
            )));
        }
        let root_name = root
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                Error::InvalidPath(format!("cannot determine the name of {}", root.display()))
            })?;
        Ok(Self {
            manifest_name: manifest_file_name(root_name),
            root,
            cipher: Cipher::new(key),
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Name of the manifest file inside the root.
    #[must_use]
    pub fn manifest_name(&self) -> &str {
        &self.manifest_name
    }

    fn manifest_path(&self) -> PathBuf {
        self.root.join(&self.manifest_name)
    }

    /// Encrypts every file under the root, except those matched by
    /// `exclude` and artifacts left by a previous pass.
    pub fn encrypt_all(&self, exclude: &Rules) -> Result<PassSummary> {
        let mut targets = Vec::new();
        self.collect_targets(&self.root, exclude, &mut targets)?;
        targets.sort();
        self.encrypt_targets(targets)
    }

    /// Encrypts an explicit list of root-relative files, merging the
    /// result into the existing manifest if there is one.
    pub fn encrypt_files(&self, files: &[TreePath]) -> Result<PassSummary> {
        let targets = files.iter().cloned().sorted().dedup().collect_vec();
        self.encrypt_targets(targets)
    }

    fn collect_targets(
        &self,
        dir: &Path,
        exclude: &Rules,
        targets: &mut Vec<TreePath>,
    ) -> Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let entry_path = entry.path();
            let Some(file_name) = entry_path.file_name().and_then(|name| name.to_str()) else {
                warn!(
                    "Skipping {}: file name is not valid unicode",
                    entry_path.display()
                );
                continue;
            };
            if exclude.matches(file_name) {
                debug!("Skipping {} (excluded)", entry_path.display());
                continue;
            }
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                self.collect_targets(&entry_path, exclude, targets)?;
            } else if file_type.is_file() {
                let relative = entry_path.strip_prefix(&self.root).map_err(|_| {
                    Error::InvalidPath(format!(
                        "{} is not under {}",
                        entry_path.display(),
                        self.root.display()
                    ))
                })?;
                let path = TreePath::from_native(relative)?;
                if path.as_str() == self.manifest_name {
                    continue;
                }
                targets.push(path);
            } else {
                warn!(
                    "Skipping {}: not a regular file or directory",
                    entry_path.display()
                );
            }
        }
        Ok(())
    }

    fn encrypt_targets(&self, targets: Vec<TreePath>) -> Result<PassSummary> {
        let mut manifest = self.load_or_new_manifest()?;
        let mut summary = PassSummary::default();
        for path in targets {
            match self.encrypt_file(&path, &mut manifest) {
                Ok(bytes) => {
                    info!("Encrypted {path}");
                    summary.count_processed(bytes);
                }
                Err(Error::AlreadyEncrypted { .. }) => {
                    debug!("Skipping {path}: already encrypted");
                    summary.count_skipped();
                }
                Err(err) => {
                    error!("Failed to encrypt {path}: {err}");
                    summary.count_failed();
                }
            }
        }
        self.commit_manifest(&manifest)?;
        Ok(summary)
    }

    /// Encrypts one file and replaces it with its opaque-named sibling.
    /// The original is removed only after the sealed file is durably in
    /// place.
    fn encrypt_file(&self, path: &TreePath, manifest: &mut Manifest) -> Result<u64> {
        let blob =
            codec::encrypt_one(&self.root, path, manifest, &self.manifest_name, &self.cipher)?;
        let native = self.root.join(path.to_native());
        let metadata = fs::metadata(&native)?;
        let entry = ManifestEntry {
            path: path.clone(),
            size: metadata.len(),
            modified_at: metadata.modified()?.into(),
            unix_mode: unix_mode(&metadata),
        };
        let dir = native.parent().ok_or_else(|| {
            Error::InvalidPath(format!("{} has no parent directory", native.display()))
        })?;
        let name = self.fresh_name(dir, manifest)?;
        commit_via_tmp(dir, &dir.join(name.as_str()), &blob)?;
        if let Err(err) = fs::remove_file(&native) {
            warn!("Cannot remove original file {}: {err}", native.display());
        }
        manifest.insert(name, entry);
        Ok(metadata.len())
    }

    fn fresh_name(&self, dir: &Path, manifest: &Manifest) -> Result<OpaqueName> {
        loop {
            let name = OpaqueName::random();
            if manifest.contains_name(name.as_str()) || dir.join(name.as_str()).try_exists()? {
                continue;
            }
            return Ok(name);
        }
    }

    fn load_or_new_manifest(&self) -> Result<Manifest> {
        let manifest_path = self.manifest_path();
        if !manifest_path.try_exists()? {
            return Ok(Manifest::new());
        }
        let blob = fs::read(&manifest_path)?;
        let manifest = Manifest::open(&self.cipher, &blob)?;
        debug!(
            "Merging into the existing manifest ({} entries)",
            manifest.len()
        );
        Ok(manifest)
    }

    fn commit_manifest(&self, manifest: &Manifest) -> Result<()> {
        let blob = manifest.seal(&self.cipher)?;
        commit_via_tmp(&self.root, &self.manifest_path(), &blob)
    }

    /// Reads and decrypts the manifest without touching anything else.
    pub fn load_manifest(&self) -> Result<Manifest> {
        let blob = fs::read(self.manifest_path())?;
        Manifest::open(&self.cipher, &blob)
    }

    /// Restores every file the manifest maps.
    ///
    /// Nothing is modified unless the manifest itself was read,
    /// authenticated and parsed. Entries that fail to restore keep their
    /// ciphertext file and stay in a reduced manifest written at the end
    /// of the pass; the manifest is deleted only when every entry has
    /// been restored.
    pub fn decrypt_all(&self) -> Result<PassSummary> {
        let mut manifest = self.load_manifest()?;
        let mut summary = PassSummary::default();
        let mut resolved = Vec::new();
        for (name, entry) in manifest.entries() {
            match self.decrypt_entry(name, entry) {
                Ok(bytes) => {
                    info!("Restored {}", entry.path);
                    summary.count_processed(bytes);
                    resolved.push(name.clone());
                }
                Err(err) => {
                    error!("Failed to restore {}: {err}", entry.path);
                    summary.count_failed();
                }
            }
        }
        for name in &resolved {
            manifest.remove(name.as_str());
        }
        if manifest.is_empty() {
            fs::remove_file(self.manifest_path())?;
        } else {
            warn!(
                "Keeping a reduced manifest with {} unrestored entries",
                manifest.len()
            );
            self.commit_manifest(&manifest)?;
        }
        Ok(summary)
    }

    fn decrypt_entry(&self, name: &OpaqueName, entry: &ManifestEntry) -> Result<u64> {
        let cipher_path = self
            .root
            .join(entry.path.with_file_name(name.as_str())?.to_native());
        let blob = fs::read(&cipher_path)?;
        let plaintext = codec::decrypt_one(&self.cipher, &blob)?;

        let target = self.root.join(entry.path.to_native());
        let dir = target.parent().ok_or_else(|| {
            Error::InvalidPath(format!("{} has no parent directory", target.display()))
        })?;
        fs::create_dir_all(dir)?;
        commit_via_tmp(dir, &target, &plaintext)?;

        #[cfg(target_family = "unix")]
        {
            use std::fs::Permissions;
            use std::os::unix::prelude::PermissionsExt;

            if let Some(mode) = entry.unix_mode {
                fs::set_permissions(&target, Permissions::from_mode(mode))?;
            }
        }

        if let Err(err) = fs::remove_file(&cipher_path) {
            warn!("Cannot remove {}: {err}", cipher_path.display());
        }
        Ok(entry.size)
    }
}

/// Writes `content` into `target` through a temporary file in the same
/// directory, so the target either keeps its old state or holds the
/// complete new content.
fn commit_via_tmp(dir: &Path, target: &Path, content: &[u8]) -> Result<()> {
    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(content)?;
    file.flush()?;
    file.as_file().sync_all()?;
    let (_, tmp_path) = file.keep().map_err(|err| err.error)?;
    if let Err(err) = rename_replacing(&tmp_path, target) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }
    Ok(())
}

fn rename_replacing(from: &Path, to: &Path) -> Result<()> {
    if let Err(first_err) = fs::rename(from, to) {
        // Windows refuses to rename over an existing file.
        if !to.try_exists()? {
            return Err(first_err.into());
        }
        fs::remove_file(to)?;
        fs::rename(from, to)?;
    }
    Ok(())
}

#[cfg(target_family = "unix")]
fn unix_mode(metadata: &std::fs::Metadata) -> Option<u32> {
    use std::os::unix::prelude::PermissionsExt;

    Some(metadata.permissions().mode())
}

#[cfg(not(target_family = "unix"))]
fn unix_mode(_metadata: &std::fs::Metadata) -> Option<u32> {
    None
}

#[test]
fn commit_via_tmp_replaces_existing_files() {
    use tempfile::TempDir;

    let dir = TempDir::new().unwrap();
    let target = dir.path().join("out.bin");
    commit_via_tmp(dir.path(), &target, b"first").unwrap();
    assert_eq!(fs::read(&target).unwrap(), b"first");
    commit_via_tmp(dir.path(), &target, b"second").unwrap();
    assert_eq!(fs::read(&target).unwrap(), b"second");
    // The temporary file must not linger.
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
}
