//! Password-sealed export of key material ("secure element").
//!
//! A validation authority exports its keypair so it can later re-attach it
//! to a record reconstructed from a transported bundle.
//!
//! ## Format
//!
//! ```json
//! {
//!   "version": 1,
//!   "address": "0x…",
//!   "kdf": {"algorithm": "argon2id", "memoryKib": 19456, "iterations": 2,
//!           "parallelism": 1, "salt": "<hex 32>"},
//!   "cipher": "xchacha20poly1305",
//!   "nonce": "<hex 24>",
//!   "ciphertext": "<hex>"
//! }
//! ```
//!
//! The key-encryption key is Argon2id(password, salt). The address is bound
//! as associated data, so editing it breaks decryption.

use std::fmt;

use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::config::KdfSettings;
use crate::crypto::{CryptoError, Identity, KeyMaterial, Signer};

pub const SECURE_ELEMENT_VERSION: u32 = 1;
const KDF_ALGORITHM: &str = "argon2id";
const CIPHER: &str = "xchacha20poly1305";
const SALT_LEN: usize = 32;
const NONCE_LEN: usize = 24;

pub type KeystoreResult<T> = Result<T, KeystoreError>;

#[derive(Debug, Error)]
pub enum KeystoreError {
    #[error("key derivation failed: {reason}")]
    Kdf { reason: String },

    #[error("encryption failed")]
    Encryption,

    /// Wrong password, or the document was modified.
    #[error("decryption failed: wrong password or tampered secure element")]
    Decryption,

    #[error("malformed secure element: {reason}")]
    Malformed { reason: String },

    #[error("unsupported secure element version {version}")]
    UnsupportedVersion { version: u32 },

    /// The decrypted key does not derive the address the document claims.
    #[error("secure element address mismatch: claims {claimed}, key derives {derived}")]
    AddressMismatch { claimed: String, derived: Identity },

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KdfParams {
    pub algorithm: String,
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
    pub salt: String,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecureElement {
    pub version: u32,
    pub address: String,
    pub kdf: KdfParams,
    pub cipher: String,
    pub nonce: String,
    pub ciphertext: String,
}

impl fmt::Debug for SecureElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureElement")
            .field("version", &self.version)
            .field("address", &self.address)
            .field("kdf", &self.kdf)
            .field("ciphertext", &format!("[{} hex chars]", self.ciphertext.len()))
            .finish()
    }
}

impl SecureElement {
    /// Encrypt `key` under `password`.
    pub fn seal(key: &KeyMaterial, password: &str, settings: &KdfSettings) -> KeystoreResult<Self> {
        settings.validate().map_err(|e| KeystoreError::Kdf {
            reason: e.to_string(),
        })?;

        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let address = key.identity().to_string();
        let kek = derive_key(
            password,
            &salt,
            settings.memory_kib,
            settings.iterations,
            settings.parallelism,
        )?;
        let cipher = XChaCha20Poly1305::new(Key::from_slice(kek.as_slice()));
        let secret = key.secret_bytes();
        let ciphertext = cipher
            .encrypt(
                XNonce::from_slice(&nonce),
                Payload {
                    msg: secret.as_slice(),
                    aad: address.as_bytes(),
                },
            )
            .map_err(|_| KeystoreError::Encryption)?;

        Ok(Self {
            version: SECURE_ELEMENT_VERSION,
            address,
            kdf: KdfParams {
                algorithm: KDF_ALGORITHM.to_string(),
                memory_kib: settings.memory_kib,
                iterations: settings.iterations,
                parallelism: settings.parallelism,
                salt: hex::encode(salt),
            },
            cipher: CIPHER.to_string(),
            nonce: hex::encode(nonce),
            ciphertext: hex::encode(ciphertext),
        })
    }

    /// Decrypt the key material, checking it derives the claimed address.
    pub fn open(&self, password: &str) -> KeystoreResult<KeyMaterial> {
        if self.version != SECURE_ELEMENT_VERSION {
            return Err(KeystoreError::UnsupportedVersion {
                version: self.version,
            });
        }
        if self.kdf.algorithm != KDF_ALGORITHM || self.cipher != CIPHER {
            return Err(malformed(format!(
                "unsupported algorithms {}/{}",
                self.kdf.algorithm, self.cipher
            )));
        }
        let foreign = KdfSettings {
            memory_kib: self.kdf.memory_kib,
            iterations: self.kdf.iterations,
            parallelism: self.kdf.parallelism,
        };
        if foreign.validate().is_err() {
            return Err(malformed("kdf parameters out of range".to_string()));
        }

        let salt = decode_hex("salt", &self.kdf.salt, Some(SALT_LEN))?;
        let nonce = decode_hex("nonce", &self.nonce, Some(NONCE_LEN))?;
        let ciphertext = decode_hex("ciphertext", &self.ciphertext, None)?;

        let kek = derive_key(
            password,
            &salt,
            foreign.memory_kib,
            foreign.iterations,
            foreign.parallelism,
        )?;
        let cipher = XChaCha20Poly1305::new(Key::from_slice(kek.as_slice()));
        let secret = Zeroizing::new(
            cipher
                .decrypt(
                    XNonce::from_slice(&nonce),
                    Payload {
                        msg: &ciphertext,
                        aad: self.address.as_bytes(),
                    },
                )
                .map_err(|_| KeystoreError::Decryption)?,
        );

        let key = KeyMaterial::from_secret_bytes(&secret)?;
        let claimed = Identity::parse(&self.address)?;
        if key.identity() != &claimed {
            return Err(KeystoreError::AddressMismatch {
                claimed: self.address.clone(),
                derived: key.identity().clone(),
            });
        }
        Ok(key)
    }

    pub fn to_json(&self) -> KeystoreResult<String> {
        serde_json::to_string(self).map_err(|e| malformed(e.to_string()))
    }

    pub fn from_json(text: &str) -> KeystoreResult<Self> {
        serde_json::from_str(text).map_err(|e| malformed(e.to_string()))
    }
}

fn derive_key(
    password: &str,
    salt: &[u8],
    memory_kib: u32,
    iterations: u32,
    parallelism: u32,
) -> KeystoreResult<Zeroizing<[u8; 32]>> {
    let params = Params::new(memory_kib, iterations, parallelism, Some(32)).map_err(|e| {
        KeystoreError::Kdf {
            reason: e.to_string(),
        }
    })?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut output = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(password.as_bytes(), salt, output.as_mut_slice())
        .map_err(|e| KeystoreError::Kdf {
            reason: e.to_string(),
        })?;
    Ok(output)
}

fn decode_hex(field: &str, value: &str, expected_len: Option<usize>) -> KeystoreResult<Vec<u8>> {
    let bytes = hex::decode(value).map_err(|e| malformed(format!("{field}: {e}")))?;
    if let Some(len) = expected_len {
        if bytes.len() != len {
            return Err(malformed(format!(
                "{field}: expected {len} bytes, got {}",
                bytes.len()
            )));
        }
    }
    Ok(bytes)
}

fn malformed(reason: String) -> KeystoreError {
    KeystoreError::Malformed { reason }
}
