use {
    crate::error::{Error, Result},
    derive_more::Display,
    rand::{RngCore, rand_core, rngs::OsRng},
    serde::{Deserialize, Deserializer, Serialize, de},
    std::{borrow::Cow, str::FromStr},
};

/// Suffix of every file written by an encryption pass.
pub const OPAQUE_SUFFIX: &str = ".enc";

const RAW_LENGTH: usize = 16;
const HEX_LENGTH: usize = RAW_LENGTH * 2;

/// Random name assigned to a ciphertext file.
///
/// The name carries no information about the original file. The mapping
/// back to the original path exists only inside the sealed manifest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display, Serialize)]
pub struct OpaqueName(String);

impl OpaqueName {
    /// Generates a fresh random name.
    ///
    /// 128 bits of OS randomness, so callers only need to retry on the
    /// off chance the name is already taken in the target directory.
    #[must_use]
    pub fn random() -> Self {
        let mut bytes = [0u8; RAW_LENGTH];
        rand_core::UnwrapErr(OsRng).fill_bytes(&mut bytes);
        Self(format!("{}{OPAQUE_SUFFIX}", hex::encode(bytes)))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for OpaqueName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex_part = s.strip_suffix(OPAQUE_SUFFIX).ok_or_else(|| {
            Error::InvalidPath(format!("{s:?} does not end with {OPAQUE_SUFFIX:?}"))
        })?;
        if hex_part.len() != HEX_LENGTH
            || !hex_part.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f'))
        {
            return Err(Error::InvalidPath(format!(
                "{s:?} is not a valid opaque file name"
            )));
        }
        Ok(Self(s.into()))
    }
}

impl<'de> Deserialize<'de> for OpaqueName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Cow::<'_, str>::deserialize(deserializer)?
            .parse()
            .map_err(de::Error::custom)
    }
}

impl std::borrow::Borrow<str> for OpaqueName {
    fn borrow(&self) -> &str {
        &self.0
    }
}
