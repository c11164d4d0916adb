//! `COSE_Sign1` signing path. Operates on raw CBOR rather than JSON-LD:
//! no canonicalization, the certificate chain is always requested in the
//! protected header, and the result is the signed structure's raw bytes.

use crate::error::{Error, Result};
use crate::signer::{Algorithm, ProtectedHeader, Signer};

/// Request a `COSE_Sign1` over an already-encoded payload (base64url CBOR)
/// and return the signed structure's bytes.
///
/// # Errors
///
/// Propagates signer failures unchanged; wraps a malformed signer response
/// as `Error::Encoding`.
pub fn sign(
    payload: &str, key_ref: &str, alg: Algorithm, signer: &dyn Signer,
) -> Result<Vec<u8>> {
    tracing::debug!("cose::sign");

    let protected = ProtectedHeader { x5c: true, ..ProtectedHeader::default() };
    let signed = signer.cose_sign1(payload, key_ref, alg, &protected).map_err(Error::Signer)?;

    hex::decode(&signed.signed_data)
        .map_err(|e| Error::Encoding(format!("signer returned invalid hex: {e}")))
}
