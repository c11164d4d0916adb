//! # Proof Generation
//!
//! One generator per linked-data proof suite, resolved by suite name.
//! Every linked-data suite canonicalizes the (proof configuration,
//! document) pair, base64url-encodes the bytes, and sends them to the
//! remote signer; they differ in how the signature comes back (compact JWS
//! for the legacy suites, a raw multibase value for the 2019/2020 suites).
//! `COSE_Sign1` is structurally distinct: it signs raw CBOR and returns
//! bytes, not a proof block.

pub mod cose;
pub mod ld;

use std::fmt::Display;
use std::str::FromStr;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canon::Canonicalizer;
use crate::error::{Error, Result};
use crate::signer::{Algorithm, Signer};

/// The proof suites this issuer can produce.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
pub enum ProofSuite {
    /// Ed25519 2018 suite (JWS form).
    Ed25519Signature2018,

    /// Ed25519 2020 suite (multibase form).
    Ed25519Signature2020,

    /// ECDSA secp256k1 2019 suite.
    EcdsaSecp256k1Signature2019,

    /// Legacy Koblitz 2016 suite (JWS form).
    EcdsaKoblitzSignature2016,

    /// ECDSA P-256 2019 suite.
    EcdsaSecp256r1Signature2019,

    /// RSA 2018 suite (JWS form).
    RsaSignature2018,

    /// COSE single-signer structure, for CBOR payloads.
    CoseSign1,
}

impl ProofSuite {
    /// The suite name as it appears in proof blocks and configuration.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ed25519Signature2018 => "Ed25519Signature2018",
            Self::Ed25519Signature2020 => "Ed25519Signature2020",
            Self::EcdsaSecp256k1Signature2019 => "EcdsaSecp256k1Signature2019",
            Self::EcdsaKoblitzSignature2016 => "EcdsaKoblitzSignature2016",
            Self::EcdsaSecp256r1Signature2019 => "EcdsaSecp256r1Signature2019",
            Self::RsaSignature2018 => "RsaSignature2018",
            Self::CoseSign1 => "COSE_Sign1",
        }
    }

    /// Canonicalization fixed by the suite.
    #[must_use]
    pub const fn canonicalizer(self) -> Canonicalizer {
        match self {
            Self::CoseSign1 => Canonicalizer::None,
            _ => Canonicalizer::Urdna2015,
        }
    }

    /// Signing algorithm requested from the signer for this suite.
    #[must_use]
    pub const fn algorithm(self) -> Algorithm {
        match self {
            Self::Ed25519Signature2018 | Self::Ed25519Signature2020 => Algorithm::EdDSA,
            Self::EcdsaSecp256k1Signature2019 | Self::EcdsaKoblitzSignature2016 => {
                Algorithm::ES256K
            }
            Self::EcdsaSecp256r1Signature2019 | Self::CoseSign1 => Algorithm::ES256,
            Self::RsaSignature2018 => Algorithm::RS256,
        }
    }

    // The 2016/2018 suites (and RSA) carry a compact JWS; the 2019/2020
    // suites carry a multibase `proofValue`.
    const fn uses_jws(self) -> bool {
        matches!(
            self,
            Self::Ed25519Signature2018 | Self::EcdsaKoblitzSignature2016 | Self::RsaSignature2018
        )
    }
}

impl Display for ProofSuite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ProofSuite {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Ed25519Signature2018" => Ok(Self::Ed25519Signature2018),
            "Ed25519Signature2020" => Ok(Self::Ed25519Signature2020),
            "EcdsaSecp256k1Signature2019" => Ok(Self::EcdsaSecp256k1Signature2019),
            "EcdsaKoblitzSignature2016" => Ok(Self::EcdsaKoblitzSignature2016),
            "EcdsaSecp256r1Signature2019" => Ok(Self::EcdsaSecp256r1Signature2019),
            "RsaSignature2018" => Ok(Self::RsaSignature2018),
            "COSE_Sign1" => Ok(Self::CoseSign1),
            other => Err(Error::UnsupportedSuite(other.to_string())),
        }
    }
}

/// A linked-data proof block, attached to the credential document once the
/// signature comes back. Exactly one of `jws` and `proof_value` is set.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct LdProof {
    /// Proof type: a suite name, or `DataIntegrityProof` on the generic
    /// path.
    #[serde(rename = "type")]
    pub type_: String,

    /// When the proof was created. Set once, immutable.
    pub created: String,

    /// Why the proof exists. Always `assertionMethod` for issuance.
    #[serde(rename = "proofPurpose")]
    pub proof_purpose: String,

    /// DID URL of the verification key: `didUrl#keyId`.
    #[serde(rename = "verificationMethod")]
    pub verification_method: String,

    /// Cryptosuite identifier, generic Data-Integrity path only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cryptosuite: Option<String>,

    /// Detached compact JWS (legacy suites).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jws: Option<String>,

    /// Multibase signature (2019/2020 suites and Data-Integrity).
    #[serde(rename = "proofValue", skip_serializing_if = "Option::is_none")]
    pub proof_value: Option<String>,
}

impl LdProof {
    /// Build the unsigned proof configuration for a suite.
    #[must_use]
    pub fn scaffold(type_: &str, verification_method: &str) -> Self {
        Self {
            type_: type_.to_string(),
            created: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            proof_purpose: "assertionMethod".into(),
            verification_method: verification_method.to_string(),
            ..Self::default()
        }
    }

    /// The proof configuration document that is canonicalized alongside
    /// the credential: this proof without any signature members.
    ///
    /// # Errors
    ///
    /// Returns `Error::Encoding` if serialization fails.
    pub fn options_document(&self) -> Result<Value> {
        let stripped = Self { jws: None, proof_value: None, ..self.clone() };
        serde_json::to_value(stripped).map_err(Into::into)
    }
}

/// A proof generator for one linked-data suite.
pub trait ProofGenerator: Send + Sync {
    /// The suite name this generator serves.
    fn name(&self) -> String;

    /// Canonicalization the suite mandates.
    fn canonicalizer(&self) -> Canonicalizer;

    /// Canonicalize, sign, and attach the signature to a copy of the
    /// scaffold.
    ///
    /// # Errors
    ///
    /// Wraps canonicalization failures as `Error::Encoding`; propagates
    /// signer failures unchanged.
    fn generate(
        &self, scaffold: &LdProof, document: &Value, key_ref: &str, signer: &dyn Signer,
    ) -> Result<LdProof>;
}

/// Resolve a generator for a named linked-data suite.
///
/// # Errors
///
/// Returns `Error::UnsupportedSuite` for unknown names and for
/// `COSE_Sign1`, which does not produce a linked-data proof (see
/// [`cose::sign`]).
pub fn for_name(name: &str) -> Result<Box<dyn ProofGenerator>> {
    generator(ProofSuite::from_str(name)?)
}

/// Resolve a generator for a linked-data suite.
///
/// # Errors
///
/// Returns `Error::UnsupportedSuite` for `COSE_Sign1`.
pub fn generator(suite: ProofSuite) -> Result<Box<dyn ProofGenerator>> {
    match suite {
        ProofSuite::CoseSign1 => Err(Error::UnsupportedSuite(
            "COSE_Sign1 does not produce a linked-data proof".into(),
        )),
        s if s.uses_jws() => Ok(Box::new(ld::JwsSuite::new(s))),
        s => Ok(Box::new(ld::MultibaseSuite::new(s))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_suite_is_a_checked_error() {
        let err = ProofSuite::from_str("BbsBlsSignature2020").expect_err("should fail");
        assert!(matches!(err, Error::UnsupportedSuite(name) if name == "BbsBlsSignature2020"));
    }

    #[test]
    fn names_roundtrip() {
        for suite in [
            ProofSuite::Ed25519Signature2018,
            ProofSuite::Ed25519Signature2020,
            ProofSuite::EcdsaSecp256k1Signature2019,
            ProofSuite::EcdsaKoblitzSignature2016,
            ProofSuite::EcdsaSecp256r1Signature2019,
            ProofSuite::RsaSignature2018,
            ProofSuite::CoseSign1,
        ] {
            assert_eq!(ProofSuite::from_str(suite.name()).expect("known"), suite);
        }
    }

    #[test]
    fn ld_suites_canonicalize_cose_does_not() {
        assert_eq!(
            ProofSuite::Ed25519Signature2018.canonicalizer(),
            Canonicalizer::Urdna2015
        );
        assert_eq!(
            ProofSuite::EcdsaSecp256r1Signature2019.canonicalizer(),
            Canonicalizer::Urdna2015
        );
        assert_eq!(ProofSuite::CoseSign1.canonicalizer(), Canonicalizer::None);
    }

    #[test]
    fn cose_has_no_ld_generator() {
        assert!(matches!(
            generator(ProofSuite::CoseSign1),
            Err(Error::UnsupportedSuite(_))
        ));
    }

    #[test]
    fn options_document_never_carries_signature_members() {
        let mut proof = LdProof::scaffold("Ed25519Signature2020", "did:web:x#key-1");
        proof.proof_value = Some("zsig".into());

        let options = proof.options_document().expect("should serialize");
        assert!(options.get("proofValue").is_none());
        assert!(options.get("jws").is_none());
        assert_eq!(options["proofPurpose"], "assertionMethod");
    }

    #[test]
    fn scaffold_created_is_rfc3339() {
        let proof = LdProof::scaffold("Ed25519Signature2018", "did:web:x#key-1");
        assert!(chrono::DateTime::parse_from_rfc3339(&proof.created).is_ok());
    }
}
