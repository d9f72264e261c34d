//! The on-disk envelope: `hex(iv):hex(ciphertext)`.
//!
//! Encryption is AES-256-GCM with a 128-bit nonce, so the ciphertext carries a
//! 16-byte authentication tag and any tampering, wrong key or wrong iv is
//! rejected instead of yielding garbage plaintext.

use std::fmt;

use aes_gcm::{
    aead::{consts::U16, Aead, AeadCore, KeyInit, OsRng},
    aes::Aes256,
    AesGcm, Nonce,
};
use keylock_core::{LockError, Result};

/// Separates the iv from the ciphertext in the serialized form.
pub const DELIMITER: char = ':';
pub const IV_LEN: usize = 16;
pub const TAG_LEN: usize = 16;
pub const SECRET_LEN: usize = 32;

type Cipher = AesGcm<Aes256, U16>;

/// Decoded `{iv, ciphertext}` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    iv: [u8; IV_LEN],
    ciphertext: Vec<u8>,
}

impl Envelope {
    /// Splits on the first delimiter and hex-decodes both halves. Trailing
    /// whitespace (an editor's final newline) is ignored.
    pub fn parse(text: &str) -> Result<Self> {
        let (iv_hex, ct_hex) = text
            .trim_end()
            .split_once(DELIMITER)
            .ok_or_else(|| malformed("missing delimiter"))?;

        let iv_bytes = hex::decode(iv_hex).map_err(|e| malformed(format!("iv: {e}")))?;
        let iv: [u8; IV_LEN] = iv_bytes.try_into().map_err(|bytes: Vec<u8>| {
            malformed(format!("iv must be {IV_LEN} bytes, got {}", bytes.len()))
        })?;

        let ciphertext = hex::decode(ct_hex).map_err(|e| malformed(format!("ciphertext: {e}")))?;
        if ciphertext.len() < TAG_LEN {
            return Err(malformed("ciphertext shorter than authentication tag"));
        }

        Ok(Self { iv, ciphertext })
    }

    pub fn iv(&self) -> &[u8; IV_LEN] {
        &self.iv
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{DELIMITER}{}",
            hex::encode(self.iv),
            hex::encode(&self.ciphertext)
        )
    }
}

/// True if `text` is a well-formed envelope. Says nothing about which key made it.
pub fn is_envelope(text: &str) -> bool {
    Envelope::parse(text).is_ok()
}

/// Encrypts under a fresh random iv; two calls never return the same envelope.
pub fn encrypt(plaintext: &[u8], secret: &[u8; SECRET_LEN]) -> Result<String> {
    let cipher = build_cipher(secret)?;
    let nonce = Cipher::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| LockError::EncryptionFailed {
            reason: e.to_string(),
        })?;

    let mut iv = [0u8; IV_LEN];
    iv.copy_from_slice(nonce.as_slice());
    Ok(Envelope { iv, ciphertext }.to_string())
}

/// Any failure is final; there is no attempt to salvage partial plaintext.
pub fn decrypt(envelope: &str, secret: &[u8; SECRET_LEN]) -> Result<Vec<u8>> {
    let envelope = Envelope::parse(envelope)?;
    let cipher = build_cipher(secret)?;
    cipher
        .decrypt(Nonce::<U16>::from_slice(&envelope.iv), envelope.ciphertext.as_ref())
        .map_err(|_| LockError::DecryptionFailed {
            reason: "authentication failed (wrong key or tampered data)".to_string(),
        })
}

fn build_cipher(secret: &[u8; SECRET_LEN]) -> Result<Cipher> {
    Cipher::new_from_slice(secret).map_err(|e| LockError::EncryptionFailed {
        reason: format!("cipher init failed: {e}"),
    })
}

fn malformed(reason: impl fmt::Display) -> LockError {
    LockError::DecryptionFailed {
        reason: format!("malformed envelope: {reason}"),
    }
}
