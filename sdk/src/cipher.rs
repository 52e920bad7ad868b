use {
    crate::{
        error::{Error, Result},
        key::EncryptionKey,
    },
    aes_siv::{AeadCore, Aes256SivAead, KeyInit, Nonce, aead::Aead},
    byteorder::{ByteOrder, LE, WriteBytesExt},
    generic_array::typenum::ToInt,
    rand::{RngCore, rand_core, rngs::OsRng},
    std::io::{self, Write},
};

/// Marker stored at the beginning of every sealed blob.
pub const MAGIC_NUMBER: u32 = 2_598_678_441;

const MAGIC_LEN: usize = size_of::<u32>();

fn nonce_size() -> usize {
    <Aes256SivAead as AeadCore>::NonceSize::to_int()
}

/// Authenticated cipher used for file contents and for the manifest.
///
/// Every sealed blob is self-contained: a fresh random nonce is generated
/// on each call and stored inside the blob, so sealing the same bytes
/// twice produces different output.
pub struct Cipher {
    inner: Aes256SivAead,
}

impl Cipher {
    #[must_use]
    pub fn new(key: &EncryptionKey) -> Self {
        Self {
            inner: Aes256SivAead::new(key.get()),
        }
    }

    /// Encrypts and authenticates `plaintext` into a standalone blob.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce = Nonce::default();
        rand_core::UnwrapErr(OsRng).fill_bytes(&mut nonce);
        let ciphertext = self
            .inner
            .encrypt(&nonce, plaintext)
            .map_err(|err| io::Error::other(format!("encryption failed: {err}")))?;

        let mut blob = Vec::new();
        blob.write_u32::<LE>(MAGIC_NUMBER)?;
        blob.write_all(&nonce)?;
        blob.write_all(&ciphertext)?;
        Ok(blob)
    }

    /// Authenticates and decrypts a blob produced by [`seal`](Self::seal).
    ///
    /// Any defect, whether a wrong key, truncation, modified bytes or a
    /// blob that was never sealed by us, comes back as
    /// [`Error::Authentication`].
    pub fn open(&self, blob: &[u8]) -> Result<Vec<u8>> {
        let header_len = MAGIC_LEN.saturating_add(nonce_size());
        let magic = blob
            .get(..MAGIC_LEN)
            .ok_or_else(|| auth_error("sealed data is too short"))?;
        if LE::read_u32(magic) != MAGIC_NUMBER {
            return Err(auth_error("bad magic number"));
        }
        let nonce = blob
            .get(MAGIC_LEN..header_len)
            .ok_or_else(|| auth_error("sealed data is too short"))?;
        let ciphertext = blob
            .get(header_len..)
            .ok_or_else(|| auth_error("sealed data is too short"))?;
        self.inner
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| auth_error("decryption failed"))
    }
}

fn auth_error(reason: &str) -> Error {
    Error::Authentication {
        reason: reason.into(),
    }
}
