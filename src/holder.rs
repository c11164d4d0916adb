//! # Holder Proof of Possession
//!
//! Validates the wallet's key-possession JWT before issuance proceeds:
//! header, key material, signature, then claims, in one pass with no
//! retries. Header and claim failures name the failed check; a bad
//! signature is rejected without detail.

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Required `typ` header of a proof-of-possession JWT.
pub const PROOF_TYPE: &str = "openid4vci-proof+jwt";

/// Signing algorithms accepted on holder proofs.
pub const ALLOWED_ALGS: &[&str] = &["ES256", "ES256K", "EdDSA", "RS256"];

/// Simplified JSON Web Key structure, sufficient for proof verification
/// and device-key derivation.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Jwk {
    /// Key type: `EC`, `OKP`, or `RSA`.
    pub kty: String,

    /// Curve, for EC and OKP keys.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub crv: String,

    /// X coordinate (EC) or public key bytes (OKP), base64url.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub x: String,

    /// Y coordinate, EC keys only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,

    /// RSA modulus.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,

    /// RSA public exponent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,

    /// Private key material. Never legitimate in a proof header.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
}

/// Proof JWT header.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ProofHeader {
    /// Media type of the JWS. Must be [`PROOF_TYPE`].
    #[serde(default)]
    pub typ: String,

    /// Signing algorithm.
    pub alg: String,

    /// Key id (a DID URL). Mutually exclusive with `jwk`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    /// Inline key material. Mutually exclusive with `kid`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwk: Option<Jwk>,
}

/// Proof JWT claims.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ProofClaims {
    /// Audience: the credential issuer identifier.
    #[serde(default)]
    pub aud: Option<String>,

    /// Issued-at. Always required.
    #[serde(default)]
    pub iat: Option<i64>,

    /// The wallet's OAuth client id, when the flow has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// The issuer-provided `c_nonce` being proven.
    #[serde(default)]
    pub nonce: Option<String>,

    /// Expiry. Validated only when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

/// What the proof must attest to for this issuance session.
#[derive(Clone, Copy, Debug)]
pub struct Expected<'a> {
    /// The credential issuer identifier the proof must be addressed to.
    pub credential_issuer: &'a str,

    /// The `c_nonce` issued for this session.
    pub c_nonce: &'a str,

    /// The wallet's `client_id`, when the flow authenticated one.
    pub client_id: Option<&'a str>,
}

/// Outcome of a successful validation: the holder's key and, when the
/// proof was DID-bound, the DID to bind the credential to.
#[derive(Clone, Debug)]
pub struct ValidatedProof {
    /// Holder DID, when the proof referenced one via `kid`.
    pub holder_did: Option<String>,

    /// The verified public key.
    pub jwk: Jwk,

    /// The verified claims.
    pub claims: ProofClaims,
}

/// Validate a holder proof-of-possession JWT.
///
/// # Errors
///
/// `Error::InvalidProof` names the failed header or claim check;
/// `Error::SignatureRejected` is returned for a signature that does not
/// verify.
pub fn validate(proof_jwt: &str, expected: &Expected<'_>) -> Result<ValidatedProof> {
    tracing::debug!("holder::validate");

    let parts: Vec<&str> = proof_jwt.split('.').collect();
    if parts.len() != 3 {
        return Err(Error::InvalidProof("proof is not a compact JWS".into()));
    }

    // header
    let header_raw = Base64UrlUnpadded::decode_vec(parts[0])
        .map_err(|e| Error::InvalidProof(format!("header does not decode: {e}")))?;
    let header: ProofHeader = serde_json::from_slice(&header_raw)
        .map_err(|e| Error::InvalidProof(format!("header does not deserialize: {e}")))?;

    if header.typ != PROOF_TYPE {
        return Err(Error::InvalidProof(format!(
            "typ ({}) is not {PROOF_TYPE}",
            header.typ
        )));
    }
    if !ALLOWED_ALGS.contains(&header.alg.as_str()) {
        return Err(Error::InvalidProof(format!("alg {} is not allowed", header.alg)));
    }

    // key material: exactly one of kid and jwk
    let (jwk, holder_did) = match (&header.kid, &header.jwk) {
        (Some(_), Some(_)) => {
            return Err(Error::InvalidProof("header contains both kid and jwk".into()));
        }
        (None, None) => {
            return Err(Error::InvalidProof("header contains neither kid nor jwk".into()));
        }
        (None, Some(jwk)) => (jwk.clone(), None),
        (Some(kid), None) => {
            let did = kid
                .split('#')
                .next()
                .filter(|did| !did.is_empty())
                .ok_or_else(|| Error::InvalidProof("kid is not a DID URL".into()))?;
            (resolve_did_key(kid)?, Some(did.to_string()))
        }
    };

    if jwk.d.is_some() {
        return Err(Error::InvalidProof("proof key contains private material".into()));
    }

    // signature over the signing input
    let message = format!("{}.{}", parts[0], parts[1]);
    let signature = Base64UrlUnpadded::decode_vec(parts[2])
        .map_err(|_| Error::SignatureRejected)?;

    match header.alg.as_str() {
        "ES256K" => verify_es256k(&jwk, &message, &signature)?,
        "EdDSA" => verify_eddsa(&jwk, &message, &signature)?,
        _ => verify_generic(proof_jwt, &jwk, &header.alg)?,
    }

    // claims
    let claims_raw = Base64UrlUnpadded::decode_vec(parts[1])
        .map_err(|e| Error::InvalidProof(format!("claims do not decode: {e}")))?;
    let claims: ProofClaims = serde_json::from_slice(&claims_raw)
        .map_err(|e| Error::InvalidProof(format!("claims do not deserialize: {e}")))?;

    if claims.iat.is_none() {
        return Err(Error::InvalidProof("iat claim missing".into()));
    }
    if claims.aud.as_deref() != Some(expected.credential_issuer) {
        return Err(Error::InvalidProof("aud does not match the credential issuer".into()));
    }
    if claims.nonce.as_deref() != Some(expected.c_nonce) {
        return Err(Error::InvalidProof("nonce does not match the session c_nonce".into()));
    }
    if let Some(iss) = &claims.iss {
        if expected.client_id != Some(iss.as_str()) {
            return Err(Error::InvalidProof("iss does not match the client_id".into()));
        }
    }
    if let Some(exp) = claims.exp {
        if exp <= Utc::now().timestamp() {
            return Err(Error::InvalidProof("proof has expired".into()));
        }
    }

    Ok(ValidatedProof { holder_did, jwk, claims })
}

/// Resolve a `did:jwk` or `did:key` identifier (with or without a
/// fragment) to the public key it embeds.
///
/// # Errors
///
/// Returns `Error::InvalidProof` for unknown DID methods or undecodable
/// key material.
pub fn resolve_did_key(did: &str) -> Result<Jwk> {
    const DID_JWK: &str = "did:jwk:";
    const DID_KEY: &str = "did:key:";

    let base = did.split('#').next().unwrap_or(did);

    if let Some(encoded) = base.strip_prefix(DID_JWK) {
        let raw = Base64UrlUnpadded::decode_vec(encoded)
            .map_err(|e| Error::InvalidProof(format!("did:jwk does not decode: {e}")))?;
        return serde_json::from_slice(&raw)
            .map_err(|e| Error::InvalidProof(format!("did:jwk is not a JWK: {e}")));
    }

    if let Some(encoded) = base.strip_prefix(DID_KEY) {
        let (_, bytes) = multibase::decode(encoded)
            .map_err(|e| Error::InvalidProof(format!("did:key does not decode: {e}")))?;
        // multicodec ed25519-pub
        let Some(key_bytes) = bytes.strip_prefix(&[0xed, 0x01][..]) else {
            return Err(Error::InvalidProof("did:key multicodec is not ed25519-pub".into()));
        };
        return Ok(Jwk {
            kty: "OKP".into(),
            crv: "Ed25519".into(),
            x: Base64UrlUnpadded::encode_string(key_bytes),
            ..Jwk::default()
        });
    }

    Err(Error::InvalidProof(format!("unsupported DID method: {base}")))
}

// Dedicated secp256k1 verifier.
fn verify_es256k(jwk: &Jwk, message: &str, signature: &[u8]) -> Result<()> {
    use ecdsa::signature::Verifier as _;
    use k256::ecdsa::{Signature, VerifyingKey};

    let y = jwk.y.as_ref().ok_or_else(|| Error::InvalidProof("key y coordinate missing".into()))?;

    // uncompressed SEC1 point
    let mut sec1 = vec![0x04];
    sec1.append(
        &mut Base64UrlUnpadded::decode_vec(&jwk.x).map_err(|_| Error::SignatureRejected)?,
    );
    sec1.append(&mut Base64UrlUnpadded::decode_vec(y).map_err(|_| Error::SignatureRejected)?);

    let verifying_key =
        VerifyingKey::from_sec1_bytes(&sec1).map_err(|_| Error::SignatureRejected)?;
    let signature = Signature::from_slice(signature).map_err(|_| Error::SignatureRejected)?;

    verifying_key.verify(message.as_bytes(), &signature).map_err(|_| Error::SignatureRejected)
}

// Dedicated Ed25519 verifier.
fn verify_eddsa(jwk: &Jwk, message: &str, signature: &[u8]) -> Result<()> {
    use ed25519_dalek::{Signature, Verifier as _, VerifyingKey};

    let x_bytes =
        Base64UrlUnpadded::decode_vec(&jwk.x).map_err(|_| Error::SignatureRejected)?;
    let bytes: [u8; 32] = x_bytes.try_into().map_err(|_| Error::SignatureRejected)?;

    let verifying_key = VerifyingKey::from_bytes(&bytes).map_err(|_| Error::SignatureRejected)?;
    let signature = Signature::from_slice(signature).map_err(|_| Error::SignatureRejected)?;

    verifying_key.verify(message.as_bytes(), &signature).map_err(|_| Error::SignatureRejected)
}

// Generic JWS processor for the remaining allowed algorithms. Claims are
// verified by the caller; this checks the signature only.
fn verify_generic(token: &str, jwk: &Jwk, alg: &str) -> Result<()> {
    use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};

    let (algorithm, key) = match alg {
        "ES256" => {
            let y = jwk
                .y
                .as_ref()
                .ok_or_else(|| Error::InvalidProof("key y coordinate missing".into()))?;
            (Algorithm::ES256, DecodingKey::from_ec_components(&jwk.x, y)
                .map_err(|_| Error::SignatureRejected)?)
        }
        "RS256" => {
            let (Some(n), Some(e)) = (&jwk.n, &jwk.e) else {
                return Err(Error::InvalidProof("key RSA components missing".into()));
            };
            (Algorithm::RS256, DecodingKey::from_rsa_components(n, e)
                .map_err(|_| Error::SignatureRejected)?)
        }
        other => return Err(Error::InvalidProof(format!("alg {other} is not allowed"))),
    };

    let mut validation = Validation::new(algorithm);
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    decode::<serde_json::Value>(token, &key, &validation)
        .map(|_| ())
        .map_err(|_| Error::SignatureRejected)
}
