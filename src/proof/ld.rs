//! Linked-data suite generators. All of them canonicalize the (proof
//! configuration, document) pair and base64url-encode the result before
//! calling the signer; they differ in the signer entry point and in which
//! member carries the signature.

use base64ct::{Base64UrlUnpadded, Encoding};
use serde_json::Value;

use crate::canon::{self, Canonicalizer};
use crate::error::{Error, Result};
use crate::proof::{LdProof, ProofGenerator, ProofSuite};
use crate::signer::{JwsOptions, SignatureEncoding, Signer};

// Shared first half of every linked-data generation: canonical bytes of
// the proof configuration and the document, base64url.
fn signing_input(scaffold: &LdProof, document: &Value) -> Result<String> {
    let options = scaffold.options_document()?;
    let canonical = canon::canonize(&options, document)?;
    Ok(Base64UrlUnpadded::encode_string(&canonical))
}

/// Generator for the 2016/2018-era suites (and RSA): the signature is
/// attached as a detached compact JWS in the `jws` member.
pub struct JwsSuite {
    suite: ProofSuite,
}

impl JwsSuite {
    /// Generator for a JWS-carrying suite.
    #[must_use]
    pub const fn new(suite: ProofSuite) -> Self {
        Self { suite }
    }
}

impl ProofGenerator for JwsSuite {
    fn name(&self) -> String {
        self.suite.name().to_string()
    }

    fn canonicalizer(&self) -> Canonicalizer {
        self.suite.canonicalizer()
    }

    fn generate(
        &self, scaffold: &LdProof, document: &Value, key_ref: &str, signer: &dyn Signer,
    ) -> Result<LdProof> {
        tracing::debug!("ld::generate {}", self.suite);

        let payload = signing_input(scaffold, document)?;
        let opts = JwsOptions { detached: true, ..JwsOptions::default() };
        let signed = signer
            .jws_sign(&payload, key_ref, self.suite.algorithm(), &opts)
            .map_err(Error::Signer)?;

        Ok(LdProof { jws: Some(signed.jwt_signed_data), ..scaffold.clone() })
    }
}

/// Generator for the 2019/2020 suites: the raw signature is attached as a
/// base58btc multibase `proofValue`.
pub struct MultibaseSuite {
    suite: ProofSuite,
}

impl MultibaseSuite {
    /// Generator for a multibase-carrying suite.
    #[must_use]
    pub const fn new(suite: ProofSuite) -> Self {
        Self { suite }
    }
}

impl ProofGenerator for MultibaseSuite {
    fn name(&self) -> String {
        self.suite.name().to_string()
    }

    fn canonicalizer(&self) -> Canonicalizer {
        self.suite.canonicalizer()
    }

    fn generate(
        &self, scaffold: &LdProof, document: &Value, key_ref: &str, signer: &dyn Signer,
    ) -> Result<LdProof> {
        tracing::debug!("ld::generate {}", self.suite);

        let payload = signing_input(scaffold, document)?;
        let signed = signer
            .sign_v2(&payload, key_ref, self.suite.algorithm(), SignatureEncoding::Base64Url)
            .map_err(Error::Signer)?;

        let raw = Base64UrlUnpadded::decode_vec(&signed.signature)
            .map_err(|e| Error::Encoding(format!("signer returned invalid base64url: {e}")))?;
        let proof_value = multibase::encode(multibase::Base::Base58Btc, raw);

        Ok(LdProof { proof_value: Some(proof_value), ..scaffold.clone() })
    }
}

/// Generator for the generic Data-Integrity path: the proof type is
/// `DataIntegrityProof` and the suite is named by `cryptosuite`.
pub struct DataIntegritySuite {
    cryptosuite: String,
    algorithm: crate::signer::Algorithm,
}

impl DataIntegritySuite {
    /// Proof type emitted on the generic path.
    pub const PROOF_TYPE: &'static str = "DataIntegrityProof";

    /// Generator for a named cryptosuite.
    #[must_use]
    pub fn new(cryptosuite: impl Into<String>, algorithm: crate::signer::Algorithm) -> Self {
        Self { cryptosuite: cryptosuite.into(), algorithm }
    }
}

impl ProofGenerator for DataIntegritySuite {
    fn name(&self) -> String {
        self.cryptosuite.clone()
    }

    fn canonicalizer(&self) -> Canonicalizer {
        Canonicalizer::Urdna2015
    }

    fn generate(
        &self, scaffold: &LdProof, document: &Value, key_ref: &str, signer: &dyn Signer,
    ) -> Result<LdProof> {
        tracing::debug!("ld::generate DataIntegrityProof/{}", self.cryptosuite);

        let mut scaffold = LdProof {
            type_: Self::PROOF_TYPE.into(),
            cryptosuite: Some(self.cryptosuite.clone()),
            ..scaffold.clone()
        };

        let payload = signing_input(&scaffold, document)?;
        let signed = signer
            .sign_v2(&payload, key_ref, self.algorithm, SignatureEncoding::Base64Url)
            .map_err(Error::Signer)?;

        let raw = Base64UrlUnpadded::decode_vec(&signed.signature)
            .map_err(|e| Error::Encoding(format!("signer returned invalid base64url: {e}")))?;
        scaffold.proof_value = Some(multibase::encode(multibase::Base::Base58Btc, raw));

        Ok(scaffold)
    }
}
