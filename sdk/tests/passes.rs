use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use cloakroom_sdk::{EncryptionKey, Error, OPAQUE_SUFFIX, Rule, Rules, TreePath, Vault};
use fs_err::{create_dir, read, read_dir, remove_file, rename, symlink_metadata, write};
use rand::distr::{Alphanumeric, SampleString};
use rand::seq::IndexedRandom;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tempfile::TempDir;

const FILE_COUNT: usize = 12;

fn random_name(rng: &mut ChaCha8Rng) -> String {
    let len = rng.random_range(3..=10);
    Alphanumeric.sample_string(rng, len)
}

fn write_random_file(path: &Path, rng: &mut ChaCha8Rng) -> Result<()> {
    let len = rng.random_range(0..=30_000);
    let mut content = vec![0u8; len];
    rng.fill_bytes(&mut content);
    write(path, content)?;
    Ok(())
}

/// Creates a few nested directories and exactly [`FILE_COUNT`] files with
/// random names and content.
fn populate(root: &Path, rng: &mut ChaCha8Rng) -> Result<()> {
    let mut dirs = vec![root.to_path_buf()];
    for _ in 0..4 {
        let parent = dirs.choose(rng).unwrap().clone();
        let dir = parent.join(random_name(rng));
        if !dir.try_exists()? {
            create_dir(&dir)?;
            dirs.push(dir);
        }
    }
    let mut paths = BTreeSet::new();
    while paths.len() < FILE_COUNT {
        let dir = dirs.choose(rng).unwrap();
        let path = dir.join(random_name(rng));
        if !path.try_exists()? {
            paths.insert(path);
        }
    }
    for path in &paths {
        write_random_file(path, rng)?;
    }
    Ok(())
}

fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    fs_err::create_dir_all(to)?;
    for entry in read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            fs_err::copy(entry.path(), target)?;
        }
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

/// Fails unless both trees have identical structure, content and modes.
fn diff(path1: &Path, path2: &Path) -> Result<()> {
    let meta1 = symlink_metadata(path1)?;
    let meta2 = symlink_metadata(path2)?;
    if meta1.is_dir() != meta2.is_dir() {
        bail!(
            "is_dir mismatch for {} <-> {}",
            path1.display(),
            path2.display()
        );
    }
    if meta1.is_dir() {
        let names1 = sorted_names(path1)?;
        let names2 = sorted_names(path2)?;
        if names1 != names2 {
            bail!(
                "entry mismatch for {} ({names1:?}) <-> {} ({names2:?})",
                path1.display(),
                path2.display()
            );
        }
        for name in &names1 {
            diff(&path1.join(name), &path2.join(name))?;
        }
    } else {
        if read(path1)? != read(path2)? {
            bail!(
                "content mismatch for {} <-> {}",
                path1.display(),
                path2.display()
            );
        }
        if unix_mode(&meta1) != unix_mode(&meta2) {
            bail!(
                "unix_mode mismatch for {} <-> {}",
                path1.display(),
                path2.display()
            );
        }
    }
    Ok(())
}

fn sorted_names(dir: &Path) -> Result<Vec<std::ffi::OsString>> {
    let mut names = Vec::new();
    for entry in read_dir(dir)? {
        names.push(entry?.file_name());
    }
    names.sort();
    Ok(names)
}

/// Root-relative paths of all directories and files, sorted.
fn walk(root: &Path) -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
    let mut dirs = Vec::new();
    let mut files = Vec::new();
    walk_into(root, root, &mut dirs, &mut files)?;
    dirs.sort();
    files.sort();
    Ok((dirs, files))
}

fn walk_into(
    root: &Path,
    dir: &Path,
    dirs: &mut Vec<PathBuf>,
    files: &mut Vec<PathBuf>,
) -> Result<()> {
    for entry in read_dir(dir)? {
        let entry = entry?;
        let relative = entry.path().strip_prefix(root)?.to_path_buf();
        if entry.file_type()?.is_dir() {
            dirs.push(relative);
            walk_into(root, &entry.path(), dirs, files)?;
        } else {
            files.push(relative);
        }
    }
    Ok(())
}

fn opaque_file_names(files: &[PathBuf]) -> Vec<String> {
    files
        .iter()
        .filter_map(|path| path.file_name().and_then(|name| name.to_str()))
        .filter(|name| name.ends_with(OPAQUE_SUFFIX))
        .map(Into::into)
        .collect()
}

#[test]
fn full_roundtrip() -> Result<()> {
    let mut rng = ChaCha8Rng::seed_from_u64(1);
    let dir = TempDir::new()?;
    let root = dir.path().join("stuff");
    create_dir(&root)?;
    populate(&root, &mut rng)?;

    let (_, original_files) = walk(&root)?;
    assert_eq!(original_files.len(), FILE_COUNT);
    #[cfg(target_family = "unix")]
    {
        use std::fs::Permissions;
        use std::os::unix::prelude::PermissionsExt;

        let file = root.join(original_files.first().unwrap());
        fs_err::set_permissions(&file, Permissions::from_mode(0o600))?;
    }
    let snapshot = dir.path().join("snapshot");
    copy_tree(&root, &snapshot)?;

    let vault = Vault::open(&root, &EncryptionKey::generate())?;
    let summary = vault.encrypt_all(&Rules::default())?;
    assert_eq!(summary.processed, 12);
    assert_eq!(summary.skipped, 0);
    assert!(!summary.has_failures());

    let (dirs_before, _) = walk(&snapshot)?;
    let (dirs_after, files_after) = walk(&root)?;
    assert_eq!(dirs_after, dirs_before);
    assert_eq!(files_after.len(), 13);
    for file in &files_after {
        let name = file.file_name().unwrap().to_str().unwrap();
        assert!(
            name == vault.manifest_name() || name.ends_with(OPAQUE_SUFFIX),
            "unexpected file {name:?} after encryption"
        );
    }
    assert!(root.join(vault.manifest_name()).try_exists()?);
    for original in &original_files {
        assert!(!root.join(original).try_exists()?);
    }

    let manifest = vault.load_manifest()?;
    assert_eq!(manifest.len(), FILE_COUNT);
    for name in opaque_file_names(&files_after) {
        assert!(manifest.contains_name(&name));
    }

    let summary = vault.decrypt_all()?;
    assert_eq!(summary.processed, 12);
    assert!(!summary.has_failures());
    assert!(!root.join(vault.manifest_name()).try_exists()?);
    diff(&root, &snapshot)?;
    Ok(())
}

#[test]
fn exclude_rules_skip_names() -> Result<()> {
    let dir = TempDir::new()?;
    let root = dir.path().join("project");
    create_dir(&root)?;
    write(root.join("keep.txt"), b"keep me")?;
    create_dir(root.join("target"))?;
    write(root.join("target").join("junk.bin"), b"junk")?;
    write(root.join("build_cache.txt"), b"cache")?;

    let vault = Vault::open(&root, &EncryptionKey::generate())?;
    let exclude = Rules::new(vec![
        Rule::NameEquals("target".into()),
        Rule::NameMatches("^build_".parse()?),
    ]);
    let summary = vault.encrypt_all(&exclude)?;
    assert_eq!(summary.processed, 1);
    assert!(!summary.has_failures());

    assert!(!root.join("keep.txt").try_exists()?);
    assert_eq!(read(root.join("target").join("junk.bin"))?, b"junk");
    assert_eq!(read(root.join("build_cache.txt"))?, b"cache");
    assert_eq!(vault.load_manifest()?.len(), 1);

    let summary = vault.decrypt_all()?;
    assert_eq!(summary.processed, 1);
    assert_eq!(read(root.join("keep.txt"))?, b"keep me");
    Ok(())
}

#[test]
fn second_pass_is_a_no_op() -> Result<()> {
    let mut rng = ChaCha8Rng::seed_from_u64(2);
    let dir = TempDir::new()?;
    let root = dir.path().join("stuff");
    create_dir(&root)?;
    populate(&root, &mut rng)?;
    let snapshot = dir.path().join("snapshot");
    copy_tree(&root, &snapshot)?;

    let vault = Vault::open(&root, &EncryptionKey::generate())?;
    vault.encrypt_all(&Rules::default())?;
    let encrypted = dir.path().join("encrypted");
    copy_tree(&root, &encrypted)?;

    let summary = vault.encrypt_all(&Rules::default())?;
    assert_eq!(summary.processed, 0);
    assert_eq!(summary.skipped, 12);
    assert!(!summary.has_failures());
    let (_, files1) = walk(&root)?;
    let (_, files2) = walk(&encrypted)?;
    assert_eq!(files1, files2);

    vault.decrypt_all()?;
    diff(&root, &snapshot)?;
    Ok(())
}

#[test]
fn merge_pass_covers_new_files() -> Result<()> {
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    let dir = TempDir::new()?;
    let root = dir.path().join("stuff");
    create_dir(&root)?;
    populate(&root, &mut rng)?;
    let snapshot = dir.path().join("snapshot");
    copy_tree(&root, &snapshot)?;

    let vault = Vault::open(&root, &EncryptionKey::generate())?;
    vault.encrypt_all(&Rules::default())?;

    write(root.join("late.txt"), b"arrived late")?;
    write(snapshot.join("late.txt"), b"arrived late")?;
    let summary = vault.encrypt_all(&Rules::default())?;
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.skipped, 12);
    assert_eq!(vault.load_manifest()?.len(), 13);

    let summary = vault.decrypt_all()?;
    assert_eq!(summary.processed, 13);
    diff(&root, &snapshot)?;
    Ok(())
}

#[test]
fn selective_encryption_merges_into_one_manifest() -> Result<()> {
    let dir = TempDir::new()?;
    let root = dir.path().join("stuff");
    create_dir(&root)?;
    create_dir(root.join("docs"))?;
    write(root.join("a.txt"), b"aaa")?;
    write(root.join("docs").join("b.txt"), b"bbb")?;
    write(root.join("c.txt"), b"ccc")?;
    let snapshot = dir.path().join("snapshot");
    copy_tree(&root, &snapshot)?;

    let vault = Vault::open(&root, &EncryptionKey::generate())?;
    let summary = vault.encrypt_files(&[TreePath::new("a.txt")?, TreePath::new("a.txt")?])?;
    assert_eq!(summary.processed, 1);
    assert!(!root.join("a.txt").try_exists()?);
    assert_eq!(read(root.join("c.txt"))?, b"ccc");
    assert_eq!(vault.load_manifest()?.len(), 1);

    let summary = vault.encrypt_files(&[
        TreePath::new("docs/b.txt")?,
        // Already consumed by the first pass, must be skipped.
        TreePath::new("a.txt")?,
        // Never existed, must be reported but not abort the pass.
        TreePath::new("missing.txt")?,
    ])?;
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(vault.load_manifest()?.len(), 2);

    let summary = vault.decrypt_all()?;
    assert_eq!(summary.processed, 2);
    diff(&root, &snapshot)?;
    Ok(())
}

#[test]
fn unreadable_manifest_aborts_before_touching_files() -> Result<()> {
    let mut rng = ChaCha8Rng::seed_from_u64(4);
    let dir = TempDir::new()?;
    let root = dir.path().join("stuff");
    create_dir(&root)?;
    populate(&root, &mut rng)?;

    let key = EncryptionKey::generate();
    let vault = Vault::open(&root, &key)?;
    vault.encrypt_all(&Rules::default())?;
    let encrypted = dir.path().join("encrypted");
    copy_tree(&root, &encrypted)?;

    let wrong = Vault::open(&root, &EncryptionKey::generate())?;
    let err = wrong.decrypt_all().unwrap_err();
    assert!(matches!(err, Error::Authentication { .. }));
    diff(&root, &encrypted)?;

    let manifest_path = root.join(vault.manifest_name());
    rename(&manifest_path, dir.path().join("aside.map"))?;
    let err = vault.decrypt_all().unwrap_err();
    assert!(matches!(err, Error::Io(_)));
    rename(dir.path().join("aside.map"), &manifest_path)?;
    diff(&root, &encrypted)?;

    vault.decrypt_all()?;
    Ok(())
}

#[test]
fn damaged_entries_stay_in_a_reduced_manifest() -> Result<()> {
    let mut rng = ChaCha8Rng::seed_from_u64(5);
    let dir = TempDir::new()?;
    let root = dir.path().join("stuff");
    create_dir(&root)?;
    populate(&root, &mut rng)?;
    let snapshot = dir.path().join("snapshot");
    copy_tree(&root, &snapshot)?;

    let vault = Vault::open(&root, &EncryptionKey::generate())?;
    vault.encrypt_all(&Rules::default())?;

    let (_, files) = walk(&root)?;
    let opaque = opaque_file_names(&files);
    let tampered_name = opaque.first().unwrap().clone();
    let misplaced_name = opaque.last().unwrap().clone();
    assert_ne!(tampered_name, misplaced_name);
    let manifest = vault.load_manifest()?;
    let path_of = |name: &str| {
        manifest
            .entries()
            .find(|(key, _)| key.as_str() == name)
            .map(|(_, entry)| entry.path.clone())
            .unwrap()
    };
    let tampered_path =
        root.join(path_of(&tampered_name).with_file_name(&tampered_name)?.to_native());
    let misplaced_path =
        root.join(path_of(&misplaced_name).with_file_name(&misplaced_name)?.to_native());

    write(&tampered_path, b"garbage")?;
    rename(&misplaced_path, dir.path().join("aside.enc"))?;

    let summary = vault.decrypt_all()?;
    assert_eq!(summary.processed, 10);
    assert_eq!(summary.failed, 2);
    assert!(root.join(vault.manifest_name()).try_exists()?);
    assert_eq!(vault.load_manifest()?.len(), 2);
    assert!(tampered_path.try_exists()?);

    // Putting the misplaced file back makes its entry restorable.
    rename(dir.path().join("aside.enc"), &misplaced_path)?;
    let summary = vault.decrypt_all()?;
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(vault.load_manifest()?.len(), 1);

    // Everything except the tampered entry is back in place.
    remove_file(&tampered_path)?;
    remove_file(root.join(vault.manifest_name()))?;
    remove_file(snapshot.join(path_of(&tampered_name).to_native()))?;
    diff(&root, &snapshot)?;
    Ok(())
}

#[test]
fn loading_the_manifest_changes_nothing() -> Result<()> {
    let dir = TempDir::new()?;
    let root = dir.path().join("stuff");
    create_dir(&root)?;
    write(root.join("a.txt"), b"aaa")?;

    let vault = Vault::open(&root, &EncryptionKey::generate())?;
    vault.encrypt_all(&Rules::default())?;
    let encrypted = dir.path().join("encrypted");
    copy_tree(&root, &encrypted)?;

    let manifest = vault.load_manifest()?;
    assert_eq!(manifest.len(), 1);
    assert!(manifest.maps_original(&TreePath::new("a.txt")?));
    diff(&root, &encrypted)?;
    Ok(())
}

#[test]
fn empty_root() -> Result<()> {
    let dir = TempDir::new()?;
    let root = dir.path().join("stuff");
    create_dir(&root)?;

    let vault = Vault::open(&root, &EncryptionKey::generate())?;
    let summary = vault.encrypt_all(&Rules::default())?;
    assert_eq!(summary.processed, 0);
    assert!(root.join(vault.manifest_name()).try_exists()?);

    let summary = vault.decrypt_all()?;
    assert_eq!(summary.processed, 0);
    assert!(!root.join(vault.manifest_name()).try_exists()?);
    assert!(sorted_names(&root)?.is_empty());
    Ok(())
}
