// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Passphrase envelope — age (scrypt) sealing and unsealing of whole documents.
// A document is sealed exactly when it starts with the age header.

use std::io::{Read, Write};

use age::secrecy::SecretString;
use forge_core::error::ForgeError;
use tracing::{debug, instrument};

/// Magic prefix of a binary age file.
const AGE_HEADER: &[u8] = b"age-encryption.org/";

/// Whether `bytes` (or at least their first few dozen bytes) carry the
/// envelope header.
pub fn is_sealed(bytes: &[u8]) -> bool {
    bytes.starts_with(AGE_HEADER)
}

/// Seals and unseals documents with a single passphrase.
///
/// The passphrase lives in a `SecretString` so that it is zeroised on drop;
/// drop the envelope as soon as the operation that needed it is finished.
pub struct DocumentEnvelope {
    passphrase: SecretString,
}

impl DocumentEnvelope {
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self {
            passphrase: SecretString::from(passphrase.into()),
        }
    }

    /// Seal `plaintext`, returning a complete age file.
    #[instrument(skip_all, fields(plaintext_len = plaintext.len()))]
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, ForgeError> {
        let encryptor = age::Encryptor::with_user_passphrase(self.passphrase.clone());
        let mut ciphertext = Vec::new();

        let mut writer = encryptor
            .wrap_output(&mut ciphertext)
            .map_err(|e| ForgeError::Encryption(e.to_string()))?;

        writer
            .write_all(plaintext)
            .map_err(|e| ForgeError::Encryption(e.to_string()))?;

        writer
            .finish()
            .map_err(|e| ForgeError::Encryption(e.to_string()))?;

        debug!(ciphertext_len = ciphertext.len(), "document sealed");
        Ok(ciphertext)
    }

    /// Unseal a complete age file.
    ///
    /// A passphrase that doesn't match yields [`ForgeError::CredentialInvalid`];
    /// a malformed envelope yields [`ForgeError::Decryption`].
    #[instrument(skip_all, fields(ciphertext_len = ciphertext.len()))]
    pub fn open(&self, ciphertext: &[u8]) -> Result<Vec<u8>, ForgeError> {
        let decryptor =
            age::Decryptor::new(ciphertext).map_err(|e| ForgeError::Decryption(e.to_string()))?;

        let identity = age::scrypt::Identity::new(self.passphrase.clone());

        let mut reader = decryptor
            .decrypt(std::iter::once(&identity as &dyn age::Identity))
            .map_err(classify_decrypt_error)?;

        let mut plaintext = Vec::new();
        reader
            .read_to_end(&mut plaintext)
            .map_err(|e| ForgeError::Decryption(e.to_string()))?;

        debug!(plaintext_len = plaintext.len(), "document unsealed");
        Ok(plaintext)
    }
}

fn classify_decrypt_error(err: age::DecryptError) -> ForgeError {
    match err {
        age::DecryptError::DecryptionFailed
        | age::DecryptError::KeyDecryptionFailed
        | age::DecryptError::NoMatchingKeys => ForgeError::CredentialInvalid,
        other => ForgeError::Decryption(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sealed_documents_are_detected() {
        let envelope = DocumentEnvelope::new("correct-horse-battery-staple");
        let sealed = envelope.seal(b"%PDF-1.5 body").expect("seal failed");

        assert!(is_sealed(&sealed));
        assert!(!is_sealed(b"%PDF-1.5 body"));
        assert_eq!(envelope.open(&sealed).expect("open failed"), b"%PDF-1.5 body");
    }

    #[test]
    fn wrong_passphrase_is_a_credential_error() {
        let sealed = DocumentEnvelope::new("passphrase-alpha")
            .seal(b"secret")
            .expect("seal failed");
        let result = DocumentEnvelope::new("passphrase-beta").open(&sealed);

        assert!(matches!(result, Err(ForgeError::CredentialInvalid)));
    }

    #[test]
    fn garbage_is_not_a_credential_error() {
        let result = DocumentEnvelope::new("x").open(b"age-encryption.org/v1\nnonsense");
        assert!(matches!(result, Err(ForgeError::Decryption(_))));
    }
}
