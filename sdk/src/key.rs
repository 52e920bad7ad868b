use {
    crate::error::Error,
    aes_siv::{Aes256SivAead, Key, aead::array::Array},
    base64::{Engine, display::Base64Display, prelude::BASE64_URL_SAFE_NO_PAD},
    generic_array::typenum::U64,
    rand::{CryptoRng, rand_core, rngs::OsRng},
    serde::{Deserialize, Deserializer, Serialize, Serializer, de},
    std::{
        borrow::Cow,
        fmt::{self, Debug, Display},
        str::FromStr,
    },
};

/// Secret used to encrypt file contents and the manifest.
///
/// Both passes over a folder must use the same key. Sealed data is
/// unrecoverable without it.
#[derive(Clone)]
pub struct EncryptionKey(Array<u8, U64>);

impl EncryptionKey {
    #[must_use]
    #[inline]
    pub fn generate() -> Self {
        Self::generate_with_rng(&mut rand_core::UnwrapErr(OsRng))
    }

    #[inline]
    pub fn generate_with_rng<R: CryptoRng + ?Sized>(rng: &mut R) -> Self {
        let mut key = Key::<Aes256SivAead>::default();
        rng.fill_bytes(&mut key);
        Self(key)
    }

    #[must_use]
    #[inline]
    pub fn get(&self) -> &Array<u8, U64> {
        &self.0
    }

    #[must_use]
    #[inline]
    pub fn display_unmasked(&self) -> impl Display + '_ {
        Base64Display::new(self.0.as_ref(), &BASE64_URL_SAFE_NO_PAD)
    }
}

impl<'de> Deserialize<'de> for EncryptionKey {
    #[inline]
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Cow::<'_, str>::deserialize(deserializer)?
            .parse()
            .map_err(de::Error::custom)
    }
}

impl Serialize for EncryptionKey {
    #[inline]
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        BASE64_URL_SAFE_NO_PAD.encode(self.0).serialize(serializer)
    }
}

impl FromStr for EncryptionKey {
    type Err = Error;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        const KEY_LENGTH: usize = 64;

        let bytes = BASE64_URL_SAFE_NO_PAD
            .decode(s)
            .map_err(|err| Error::InvalidKey(err.to_string()))?;
        let array = <[u8; KEY_LENGTH]>::try_from(bytes).map_err(|bytes| {
            Error::InvalidKey(format!(
                "invalid length; got {}, expected {KEY_LENGTH}",
                bytes.len()
            ))
        })?;
        Ok(Self(array.into()))
    }
}

impl Debug for EncryptionKey {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKey").finish()
    }
}
