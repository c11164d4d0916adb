//! # Signer Adapter
//!
//! Contract for the remote signing service. The issuance core never touches
//! private key material: every signature is produced by a single,
//! synchronous round-trip to the signer, which resolves `key_ref` to a key
//! it holds. Signer failures propagate unchanged; no retry happens here.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Signing algorithm identifiers as registered with IANA JOSE.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum Algorithm {
    /// Ed25519 signature.
    #[default]
    EdDSA,

    /// ECDSA over secp256k1 with SHA-256.
    ES256K,

    /// ECDSA over P-256 with SHA-256.
    ES256,

    /// ECDSA over P-384 with SHA-384.
    ES384,

    /// RSASSA-PKCS1-v1_5 with SHA-256.
    RS256,
}

impl Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Wire encoding requested for a raw `sign_v2` signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignatureEncoding {
    /// Base64url, no padding.
    Base64Url,

    /// Lowercase hex.
    Hex,
}

/// Options for compact JWS signing.
#[derive(Clone, Debug, Default)]
pub struct JwsOptions {
    /// Produce a detached JWS (empty payload segment in the result).
    pub detached: bool,

    /// Value for the protected `typ` header, when required.
    pub typ: Option<String>,
}

/// Options for the protected header of a `COSE_Sign1` structure.
#[derive(Clone, Debug, Default)]
pub struct ProtectedHeader {
    /// Include the signing certificate chain (`x5c`) in the protected
    /// header.
    pub x5c: bool,

    /// Protected content type, when required.
    pub content_type: Option<String>,
}

/// Result of a compact JWS signing call.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct JwsSigned {
    /// The signed data in compact JWS form.
    pub jwt_signed_data: String,
}

/// Result of a raw signing call.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Signed {
    /// The signature, in the requested encoding.
    pub signature: String,
}

/// Result of a `COSE_Sign1` signing call.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CoseSigned {
    /// The complete signed `COSE_Sign1` structure, hex-encoded.
    pub signed_data: String,
}

/// Remote signing capability. All calls are synchronous and blocking;
/// timeouts are the transport client's concern.
pub trait Signer: Send + Sync {
    /// Sign `payload` into a compact JWS using the key behind `key_ref`.
    ///
    /// # Errors
    ///
    /// Returns the signer's failure unchanged.
    fn jws_sign(
        &self, payload: &str, key_ref: &str, alg: Algorithm, opts: &JwsOptions,
    ) -> anyhow::Result<JwsSigned>;

    /// Produce a raw signature over `payload` in the requested encoding.
    ///
    /// # Errors
    ///
    /// Returns the signer's failure unchanged.
    fn sign_v2(
        &self, payload: &str, key_ref: &str, alg: Algorithm, encoding: SignatureEncoding,
    ) -> anyhow::Result<Signed>;

    /// Sign `payload` into a `COSE_Sign1` structure, returned hex-encoded.
    ///
    /// # Errors
    ///
    /// Returns the signer's failure unchanged.
    fn cose_sign1(
        &self, payload: &str, key_ref: &str, alg: Algorithm, protected: &ProtectedHeader,
    ) -> anyhow::Result<CoseSigned>;
}
