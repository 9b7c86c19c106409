// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// forge-security — password-protected document handling.
//
// Documents arrive in the clear, as password-protected PDFs, or sealed in a
// passphrase envelope. This crate detects both kinds of protection, removes
// it with a caller-supplied credential, and resolves encrypted inputs into
// operation-scoped scratch copies that are deleted when the operation ends.

pub mod envelope;
pub mod protected_pdf;
pub mod resolve;

pub use envelope::{DocumentEnvelope, is_sealed};
pub use protected_pdf::{is_protected_pdf, unlock_pdf};
pub use resolve::{ResolvedInput, is_encrypted, resolve, unseal_bytes};
