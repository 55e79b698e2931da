//! Credential encryption for stored share passwords.
//!
//! Passwords are sealed with AES-256-GCM under a key derived by scrypt from a
//! long-lived shared secret and a fixed application salt. The resulting token
//! is self-contained:
//!
//! ```text
//! hex(nonce) ":" hex(tag) ":" hex(ciphertext)
//! ```
//!
//! A fresh random nonce is drawn for every encryption, so sealing the same
//! password twice yields two different tokens. The empty password maps to the
//! empty token (and back), which is how guest access is represented.

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit},
};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tracing::{trace, warn};
use zeroize::Zeroizing;

/// Fixed, application-specific scrypt salt.
pub const CREDENTIAL_SALT: &[u8] = b"netmount.credentials.v1";

/// Token field separator.
const TOKEN_DELIMITER: char = ':';

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;

/// Errors raised while sealing or opening a credential token.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// The token is malformed, was tampered with, or was sealed under another secret.
    ///
    /// Callers cannot tell which part of a forged token was wrong.
    #[error("Failed to decrypt stored credential: {reason}")]
    Decryption {
        /// Short description for logs
        reason: &'static str,
    },

    /// Key derivation failed (invalid cost parameters).
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    /// The AEAD refused to seal the plaintext.
    #[error("Credential encryption failed")]
    Encryption,
}

impl CryptoError {
    fn decryption(reason: &'static str) -> Self {
        CryptoError::Decryption { reason }
    }
}

/// scrypt cost parameters.
///
/// The default (`log_n = 14, r = 8, p = 1`) costs tens of milliseconds per
/// derivation, which keeps brute force of a weak secret expensive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// log2 of the CPU/memory cost `N`
    pub log_n: u8,
    /// Block size
    pub r: u32,
    /// Parallelism
    pub p: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            log_n: 14,
            r: 8,
            p: 1,
        }
    }
}

impl KdfParams {
    /// Cheap parameters for tests. Never use these for real credentials.
    pub fn insecure_fast() -> Self {
        Self {
            log_n: 4,
            r: 8,
            p: 1,
        }
    }
}

/// Seals and opens share passwords.
pub struct CredentialCodec {
    secret: SecretString,
    params: KdfParams,
}

impl std::fmt::Debug for CredentialCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCodec")
            .field("secret", &"[REDACTED]")
            .field("params", &self.params)
            .finish()
    }
}

impl CredentialCodec {
    /// Create a codec with the default key-derivation cost.
    pub fn new(secret: SecretString) -> Self {
        Self::with_params(secret, KdfParams::default())
    }

    /// Create a codec with explicit key-derivation cost.
    pub fn with_params(secret: SecretString, params: KdfParams) -> Self {
        Self { secret, params }
    }

    /// Encrypt `plaintext` into a self-contained token.
    ///
    /// The empty string encrypts to the empty token.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let key = self.derive_key()?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_slice()));

        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce);

        let sealed = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|_| CryptoError::Encryption)?;

        // aes-gcm appends the tag to the ciphertext
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);

        trace!(ciphertext_len = ciphertext.len(), "Sealed credential");
        Ok(format!(
            "{}{TOKEN_DELIMITER}{}{TOKEN_DELIMITER}{}",
            hex::encode(nonce),
            hex::encode(tag),
            hex::encode(ciphertext)
        ))
    }

    /// Decrypt a token produced by [`CredentialCodec::encrypt`].
    ///
    /// The empty token decrypts to the empty string.
    pub fn decrypt(&self, token: &str) -> Result<Zeroizing<String>, CryptoError> {
        if token.is_empty() {
            return Ok(Zeroizing::new(String::new()));
        }

        let mut parts = token.split(TOKEN_DELIMITER);
        let (Some(nonce_hex), Some(tag_hex), Some(ciphertext_hex), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            warn!("Credential token does not have three parts");
            return Err(CryptoError::decryption("malformed token"));
        };

        let nonce =
            hex::decode(nonce_hex).map_err(|_| CryptoError::decryption("malformed nonce"))?;
        let tag = hex::decode(tag_hex).map_err(|_| CryptoError::decryption("malformed tag"))?;
        let ciphertext = hex::decode(ciphertext_hex)
            .map_err(|_| CryptoError::decryption("malformed ciphertext"))?;

        if nonce.len() != NONCE_LEN || tag.len() != TAG_LEN {
            return Err(CryptoError::decryption("malformed token"));
        }

        let key = self.derive_key()?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_slice()));

        let mut sealed = ciphertext;
        sealed.extend_from_slice(&tag);

        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce), sealed.as_ref())
            .map(Zeroizing::new)
            .map_err(|_| {
                warn!("Credential authentication tag mismatch");
                CryptoError::decryption("authentication failed")
            })?;

        String::from_utf8(plaintext.to_vec())
            .map(Zeroizing::new)
            .map_err(|_| CryptoError::decryption("plaintext is not UTF-8"))
    }

    fn derive_key(&self) -> Result<Zeroizing<[u8; KEY_LEN]>, CryptoError> {
        let params = scrypt::Params::new(self.params.log_n, self.params.r, self.params.p, KEY_LEN)
            .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        scrypt::scrypt(
            self.secret.expose_secret().as_bytes(),
            CREDENTIAL_SALT,
            &params,
            &mut key[..],
        )
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

        Ok(key)
    }
}
