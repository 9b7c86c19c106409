// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Protected PDFs — detection and removal of the standard security handler's
// encryption.
//
// lopdf only parses the object bodies of an encrypted file when the empty
// password opens it. To decrypt with a real password the trailer's
// `/Encrypt` key is renamed in place (same length, so xref offsets stay
// valid), the ciphertext objects are loaded as if the file were clear, and
// the key is restored before `Document::decrypt` runs.

use forge_core::error::{ForgeError, Result};
use lopdf::Document;
use lopdf::encryption::DecryptionError;
use tracing::{debug, instrument};

const PDF_MAGIC: &[u8] = b"%PDF-";
/// lopdf accepts a header anywhere in the first kilobyte.
const HEADER_WINDOW: usize = 1024;
const ENCRYPT_KEY: &[u8] = b"/Encrypt";
const MASKED_KEY: &[u8] = b"/Xncrypt";

/// Whether `bytes` are a PDF whose trailer references an encryption
/// dictionary.
pub fn is_protected_pdf(bytes: &[u8]) -> bool {
    if !has_pdf_header(bytes) || encrypt_references(bytes).is_empty() {
        return false;
    }
    Document::load_mem(bytes)
        .map(|doc| doc.is_encrypted())
        .unwrap_or(false)
}

/// Decrypt a password-protected PDF and return it re-serialised without
/// encryption.
///
/// The password may be the user or the owner password. A document whose
/// user password is empty opens whatever password is supplied.
#[instrument(skip_all, fields(len = bytes.len()))]
pub fn unlock_pdf(bytes: &[u8], password: &str) -> Result<Vec<u8>> {
    let references = encrypt_references(bytes);
    if references.is_empty() {
        return Err(ForgeError::Decryption(
            "document is not password-protected".into(),
        ));
    }

    let mut masked = bytes.to_vec();
    for &at in &references {
        masked[at..at + MASKED_KEY.len()].copy_from_slice(MASKED_KEY);
    }
    let mut doc = Document::load_mem(&masked).map_err(|e| ForgeError::PdfError(e.to_string()))?;
    let encrypt = doc
        .trailer
        .remove(&MASKED_KEY[1..])
        .ok_or_else(|| ForgeError::PdfError("trailer has no encryption dictionary".into()))?;
    doc.trailer.set(&ENCRYPT_KEY[1..], encrypt);

    let password = if doc.authenticate_password(password).is_ok() {
        password
    } else if doc.authenticate_password("").is_ok() {
        debug!("document has no open password");
        ""
    } else {
        return Err(ForgeError::CredentialInvalid);
    };
    doc.decrypt(password).map_err(classify)?;

    if doc.get_pages().is_empty() {
        return Err(ForgeError::PdfError(
            "decrypted document has no readable pages".into(),
        ));
    }

    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|e| ForgeError::PdfError(e.to_string()))?;
    debug!(len = out.len(), "encryption removed");
    Ok(out)
}

fn has_pdf_header(bytes: &[u8]) -> bool {
    bytes[..bytes.len().min(HEADER_WINDOW)]
        .windows(PDF_MAGIC.len())
        .any(|w| w == PDF_MAGIC)
}

/// Offsets of `/Encrypt <num> ...` occurrences, i.e. the trailer key
/// followed by an indirect reference. Ciphertext never matches the name
/// token followed by whitespace and a digit in practice.
fn encrypt_references(bytes: &[u8]) -> Vec<usize> {
    bytes
        .windows(ENCRYPT_KEY.len())
        .enumerate()
        .filter(|(_, w)| *w == ENCRYPT_KEY)
        .map(|(at, _)| at)
        .filter(|&at| {
            let rest = &bytes[at + ENCRYPT_KEY.len()..];
            let skipped = rest
                .iter()
                .take_while(|b| matches!(b, b' ' | b'\t' | b'\r' | b'\n' | b'\x0c' | b'\0'))
                .count();
            skipped > 0 && rest.get(skipped).is_some_and(u8::is_ascii_digit)
        })
        .collect()
}

fn classify(err: lopdf::Error) -> ForgeError {
    match err {
        lopdf::Error::Decryption(DecryptionError::IncorrectPassword) => ForgeError::CredentialInvalid,
        lopdf::Error::UnsupportedSecurityHandler(_)
        | lopdf::Error::Decryption(
            DecryptionError::UnsupportedEncryption
            | DecryptionError::UnsupportedVersion
            | DecryptionError::UnsupportedRevision,
        ) => ForgeError::UnsupportedFormat("PDF encryption scheme".into()),
        other => ForgeError::Decryption(other.to_string()),
    }
}
