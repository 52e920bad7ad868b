use {
    crate::error::{Error, Result},
    derive_more::Display,
    serde::{Deserialize, Deserializer, Serialize, de},
    std::{
        borrow::Cow,
        path::{Component, Path, PathBuf},
        str::FromStr,
    },
};

/// Path of a file relative to the processed root, always `/`-separated.
///
/// Manifest values use this form, so a tree encrypted on one platform can
/// be restored on another. Absolute paths, `.`/`..` components and empty
/// components are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display, Serialize)]
pub struct TreePath(String);

impl TreePath {
    pub fn new(path: &str) -> Result<Self> {
        check_path(path)?;
        Ok(Self(path.into()))
    }

    /// Builds a tree path from a native path relative to the root.
    pub fn from_native(path: &Path) -> Result<Self> {
        let mut joined = String::new();
        for component in path.components() {
            match component {
                Component::Normal(name) => {
                    let name = name.to_str().ok_or_else(|| {
                        Error::InvalidPath(format!("{} is not valid unicode", path.display()))
                    })?;
                    if !joined.is_empty() {
                        joined.push('/');
                    }
                    joined.push_str(name);
                }
                Component::CurDir => {}
                Component::Prefix(_) | Component::RootDir | Component::ParentDir => {
                    return Err(Error::InvalidPath(format!(
                        "{} must be relative and must not contain '..'",
                        path.display()
                    )));
                }
            }
        }
        Self::new(&joined)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Native form for joining onto the root directory.
    #[must_use]
    pub fn to_native(&self) -> PathBuf {
        self.0.split('/').collect()
    }

    /// Last path component.
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Replaces the last component, keeping the directory part.
    ///
    /// This is how a ciphertext file is placed next to the original it
    /// replaces, and found again from a manifest entry.
    pub fn with_file_name(&self, file_name: &str) -> Result<Self> {
        let dir = self.0.strip_suffix(self.file_name()).unwrap_or_default();
        Self::new(&format!("{dir}{file_name}"))
    }
}

impl FromStr for TreePath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl<'de> Deserialize<'de> for TreePath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Cow::<'_, str>::deserialize(deserializer)?
            .parse()
            .map_err(de::Error::custom)
    }
}

fn check_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(Error::InvalidPath("path cannot be empty".into()));
    }
    if path.starts_with('/') || path.ends_with('/') {
        return Err(Error::InvalidPath(format!(
            "path must be relative without leading or trailing '/': {path:?}"
        )));
    }
    if path.contains('\\') {
        return Err(Error::InvalidPath(format!(
            "path must use '/' as separator: {path:?}"
        )));
    }
    if path
        .split('/')
        .any(|component| component.is_empty() || component == "." || component == "..")
    {
        return Err(Error::InvalidPath(format!(
            "path contains an invalid component: {path:?}"
        )));
    }
    Ok(())
}
