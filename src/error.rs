//! # Issuance Errors
//!
//! Typed errors surfaced at the issuance boundary. Each variant serialises
//! as an OAuth-style error object so transport layers can return it
//! verbatim.

use thiserror::Error;

/// Result type for issuance operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the issuance core.
#[derive(Error, Debug)]
pub enum Error {
    /// The requested credential format has no registered handler.
    #[error(r#"{{"error": "unsupported_credential_format", "error_description": "{0}"}}"#)]
    UnsupportedFormat(String),

    /// The requested proof suite is not recognised.
    #[error(r#"{{"error": "unsupported_proof_suite", "error_description": "{0}"}}"#)]
    UnsupportedSuite(String),

    /// The holder's device key uses a curve the MSO cannot carry.
    #[error(r#"{{"error": "unsupported_curve", "error_description": "{0}"}}"#)]
    UnsupportedCurve(String),

    /// A holder proof failed a header or claim check. The description names
    /// the failed check so the caller can decide whether to mint a fresh
    /// nonce.
    #[error(r#"{{"error": "invalid_proof", "error_description": "{0}"}}"#)]
    InvalidProof(String),

    /// A holder proof carried a signature that did not verify. Deliberately
    /// carries no detail.
    #[error(r#"{{"error": "invalid_proof"}}"#)]
    SignatureRejected,

    /// The issuance request is malformed or incomplete.
    #[error(r#"{{"error": "invalid_request", "error_description": "{0}"}}"#)]
    InvalidRequest(String),

    /// Canonicalization, CBOR, or serialization failed while constructing
    /// the credential. The whole construction is abandoned.
    #[error(r#"{{"error": "server_error", "error_description": "{0}"}}"#)]
    Encoding(String),

    /// The remote signer failed. Propagated unchanged, never retried here.
    #[error(transparent)]
    Signer(anyhow::Error),
}

impl Error {
    /// True when the failure relates to the proof-of-possession nonce, in
    /// which case the issuance boundary returns a fresh `c_nonce` to the
    /// wallet.
    #[must_use]
    pub fn is_nonce_related(&self) -> bool {
        matches!(self, Self::InvalidProof(hint) if hint.contains("nonce"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Encoding(e.to_string())
    }
}
