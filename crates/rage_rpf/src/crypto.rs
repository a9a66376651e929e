//! The seam between the archive code and the ciphers protecting it.
//!
//! Keys are not shipped with this library. Callers that have them plug a [`CryptoProvider`]
//! into [`crate::read::RpfOptions`].

use std::fmt::Debug;

use crate::error::{DecryptionError, Result};
use crate::types::EncryptionMode;

/// Encrypts and decrypts archive data in place
///
/// NG is keyed per item, `name` and `length` are the key material: the archive's own name and
/// byte length for a header, the entry's name and size for an entry.
pub trait CryptoProvider: Debug + Send + Sync {
    /// Decrypt with the global AES key
    fn decrypt_aes(&self, data: &mut [u8]) -> Result<()>;

    /// Encrypt with the global AES key
    fn encrypt_aes(&self, data: &mut [u8]) -> Result<()>;

    /// Decrypt with the NG key selected by `name` and `length`
    fn decrypt_ng(&self, data: &mut [u8], name: &str, length: u32) -> Result<()>;

    /// Encrypt with the NG key selected by `name` and `length`
    fn encrypt_ng(&self, data: &mut [u8], name: &str, length: u32) -> Result<()>;
}

/// Decrypt `data` according to `mode`. Unencrypted modes leave it untouched.
pub fn decrypt(
    provider: &dyn CryptoProvider,
    mode: EncryptionMode,
    data: &mut [u8],
    name: &str,
    length: u32,
) -> Result<()> {
    match mode {
        EncryptionMode::None | EncryptionMode::Open => Ok(()),
        EncryptionMode::Aes => provider.decrypt_aes(data),
        EncryptionMode::Ng => provider.decrypt_ng(data, name, length),
    }
}

/// Encrypt `data` according to `mode`. Unencrypted modes leave it untouched.
pub fn encrypt(
    provider: &dyn CryptoProvider,
    mode: EncryptionMode,
    data: &mut [u8],
    name: &str,
    length: u32,
) -> Result<()> {
    match mode {
        EncryptionMode::None | EncryptionMode::Open => Ok(()),
        EncryptionMode::Aes => provider.encrypt_aes(data),
        EncryptionMode::Ng => provider.encrypt_ng(data, name, length),
    }
}

/// Provider without any keys, every call fails
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCrypto;

impl CryptoProvider for NoCrypto {
    fn decrypt_aes(&self, _data: &mut [u8]) -> Result<()> {
        Err(DecryptionError::MissingKeys(EncryptionMode::Aes).into())
    }

    fn encrypt_aes(&self, _data: &mut [u8]) -> Result<()> {
        Err(DecryptionError::MissingKeys(EncryptionMode::Aes).into())
    }

    fn decrypt_ng(&self, _data: &mut [u8], _name: &str, _length: u32) -> Result<()> {
        Err(DecryptionError::MissingKeys(EncryptionMode::Ng).into())
    }

    fn encrypt_ng(&self, _data: &mut [u8], _name: &str, _length: u32) -> Result<()> {
        Err(DecryptionError::MissingKeys(EncryptionMode::Ng).into())
    }
}

#[cfg(feature = "encryption")]
pub use aes_provider::AesCrypto;

#[cfg(feature = "encryption")]
mod aes_provider {
    use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};

    use super::CryptoProvider;
    use crate::error::{DecryptionError, Result};
    use crate::types::EncryptionMode;

    /// AES-256 in ECB mode over every whole 16 byte block, a trailing partial block is left as is
    ///
    /// Carries no NG tables, NG data fails with [`DecryptionError::MissingKeys`].
    #[derive(Clone)]
    pub struct AesCrypto {
        key: aes::Aes256,
    }

    impl std::fmt::Debug for AesCrypto {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("AesCrypto")
        }
    }

    impl AesCrypto {
        /// Create a provider from a 32 byte key
        pub fn new(key: &[u8]) -> Result<Self> {
            let key = aes::Aes256::new_from_slice(key).map_err(|_| DecryptionError::InvalidKey)?;
            Ok(Self { key })
        }
    }

    impl CryptoProvider for AesCrypto {
        fn decrypt_aes(&self, data: &mut [u8]) -> Result<()> {
            for chunk in data.chunks_exact_mut(16) {
                self.key.decrypt_block(aes::Block::from_mut_slice(chunk));
            }
            Ok(())
        }

        fn encrypt_aes(&self, data: &mut [u8]) -> Result<()> {
            for chunk in data.chunks_exact_mut(16) {
                self.key.encrypt_block(aes::Block::from_mut_slice(chunk));
            }
            Ok(())
        }

        fn decrypt_ng(&self, _data: &mut [u8], _name: &str, _length: u32) -> Result<()> {
            Err(DecryptionError::MissingKeys(EncryptionMode::Ng).into())
        }

        fn encrypt_ng(&self, _data: &mut [u8], _name: &str, _length: u32) -> Result<()> {
            Err(DecryptionError::MissingKeys(EncryptionMode::Ng).into())
        }
    }
}
