//! # Credential Formats
//!
//! One strategy per wire encoding, selected by a factory from the
//! requested format string. Issuance is two calls on the selected
//! strategy: `create_credential` renders and post-processes the templated
//! claims, `add_proof` signs the result. Callers stay format-agnostic;
//! the returned credential is a JSON document or a compact string
//! depending on the format.

pub mod jsonld;
pub mod mdoc;
pub mod sdjwt;

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::holder::ValidatedProof;
use crate::sdjwt::Disclosure;
use crate::signer::Signer;
use crate::template::{TemplateMetadata, Templater};

/// The wire encodings this issuer can produce.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum Format {
    /// JSON-LD credential secured with a linked-data proof.
    #[serde(rename = "ldp_vc")]
    JsonLd,

    /// SD-JWT credential with selective disclosure.
    #[serde(rename = "vc+sd-jwt")]
    SdJwt,

    /// ISO 18013-5 mdoc, CBOR-encoded.
    #[serde(rename = "mso_mdoc")]
    MsoMdoc,
}

impl Format {
    /// The format identifier as requested by wallets.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::JsonLd => "ldp_vc",
            Self::SdJwt => "vc+sd-jwt",
            Self::MsoMdoc => "mso_mdoc",
        }
    }
}

impl Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A credential in its wire form.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Credential {
    /// A JSON document (JSON-LD formats).
    Json(Value),

    /// A compact string encoding (SD-JWT, mdoc).
    Compact(String),
}

/// A signed credential, tagged with the format it was issued in.
#[derive(Clone, Debug)]
pub struct IssuedCredential {
    /// The format the credential was issued in.
    pub format: Format,

    /// The signed credential.
    pub credential: Credential,
}

/// Output of `create_credential`: the templated (and post-processed)
/// payload, plus the disclosures split out of it where the format has
/// them.
#[derive(Clone, Debug)]
pub struct CreatedCredential {
    /// The payload `add_proof` will sign.
    pub payload: Value,

    /// Selective disclosures, in traversal order. Empty for formats
    /// without selective disclosure.
    pub disclosures: Vec<Disclosure>,
}

/// Everything one issuance call needs: resolved template settings and the
/// external collaborators.
pub struct Issuance<'a> {
    /// Resolved template metadata.
    pub template: &'a TemplateMetadata,

    /// The claim templating engine.
    pub templater: &'a dyn Templater,

    /// The remote signer.
    pub signer: &'a dyn Signer,

    /// The validated holder proof, when the flow bound one.
    pub holder: Option<&'a ValidatedProof>,
}

/// One credential format strategy.
pub trait CredentialFormat: std::fmt::Debug + Send + Sync {
    /// Whether this strategy serves the requested format string.
    fn can_handle(&self, format: &str) -> bool;

    /// Render the claim template and post-process it for this format.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRequest` for unusable template output.
    fn create_credential(
        &self, issuance: &Issuance<'_>, params: &Map<String, Value>,
    ) -> Result<CreatedCredential>;

    /// Sign the created payload and assemble the wire encoding.
    ///
    /// # Errors
    ///
    /// Propagates signer failures unchanged; any other failure aborts the
    /// construction.
    fn add_proof(
        &self, issuance: &Issuance<'_>, created: CreatedCredential, sign_algo: &str,
        key_ref: &str, public_key_uri: &str,
    ) -> Result<IssuedCredential>;
}

// Registration order decides which strategy answers first.
static HANDLERS: [&(dyn CredentialFormat); 3] =
    [&jsonld::JsonLdFormat, &sdjwt::SdJwtFormat, &mdoc::MdocFormat];

/// Select the first strategy that handles the requested format.
///
/// # Errors
///
/// Returns `Error::UnsupportedFormat` when no strategy matches.
pub fn handler(format: &str) -> Result<&'static dyn CredentialFormat> {
    HANDLERS
        .iter()
        .find(|h| h.can_handle(format))
        .copied()
        .ok_or_else(|| Error::UnsupportedFormat(format!("no handler for {format}")))
}

/// Issue a credential: select the strategy for the template's format,
/// render the claims, and sign.
///
/// # Errors
///
/// Returns the first failure of either phase; a partial credential is
/// never returned.
pub fn issue(issuance: &Issuance<'_>, params: &Map<String, Value>) -> Result<IssuedCredential> {
    tracing::debug!("format::issue {}", issuance.template.format);

    let handler = handler(issuance.template.format.as_str())?;
    let created = handler.create_credential(issuance, params)?;
    handler.add_proof(
        issuance,
        created,
        &issuance.template.proof_type,
        &issuance.template.key_ref,
        &issuance.template.public_key_uri,
    )
}

// Shared fixtures for the per-format test modules.
#[cfg(test)]
pub(crate) mod tests_support {
    use base64ct::{Base64UrlUnpadded, Encoding};
    use coset::CborSerializable;
    use serde_json::{Value, json};

    use super::*;
    use crate::holder::{Jwk, ProofClaims};
    use crate::sdjwt::PathSet;
    use crate::signer::{
        Algorithm, CoseSigned, JwsOptions, JwsSigned, ProtectedHeader, SignatureEncoding, Signed,
    };
    use crate::template::Validity;

    /// Returns its configured document whatever the parameters.
    pub(crate) struct EchoTemplater(pub Value);

    impl Templater for EchoTemplater {
        fn format(&self, _: &Map<String, Value>) -> anyhow::Result<Value> {
            Ok(self.0.clone())
        }
    }

    /// Deterministic stub covering all three signer entry points.
    pub(crate) struct StubSigner;

    impl Signer for StubSigner {
        fn jws_sign(
            &self, payload: &str, _: &str, _: Algorithm, opts: &JwsOptions,
        ) -> anyhow::Result<JwsSigned> {
            let jwt_signed_data = if opts.detached {
                format!("eyJhbGciOiJFZERTQSJ9..sig-{}", payload.len())
            } else {
                let claims = Base64UrlUnpadded::encode_string(payload.as_bytes());
                format!("eyJhbGciOiJFZERTQSJ9.{claims}.c2ln")
            };
            Ok(JwsSigned { jwt_signed_data })
        }

        fn sign_v2(
            &self, payload: &str, _: &str, _: Algorithm, _: SignatureEncoding,
        ) -> anyhow::Result<Signed> {
            use sha2::Digest;
            let digest = sha2::Sha256::digest(payload.as_bytes());
            Ok(Signed { signature: Base64UrlUnpadded::encode_string(&digest) })
        }

        fn cose_sign1(
            &self, payload: &str, _: &str, _: Algorithm, protected: &ProtectedHeader,
        ) -> anyhow::Result<CoseSigned> {
            anyhow::ensure!(protected.x5c, "certificate chain always requested");

            let mso_bytes = Base64UrlUnpadded::decode_vec(payload)?;
            let cose = coset::CoseSign1Builder::new()
                .protected(
                    coset::HeaderBuilder::new().algorithm(coset::iana::Algorithm::ES256).build(),
                )
                .payload(mso_bytes)
                .signature(vec![0u8; 64])
                .build();
            let bytes = cose.to_vec().map_err(|e| anyhow::anyhow!("{e}"))?;
            Ok(CoseSigned { signed_data: hex::encode(bytes) })
        }
    }

    pub(crate) fn metadata(
        format: Format, proof_type: &str, disclosable: PathSet, doc_type: Option<&str>,
    ) -> TemplateMetadata {
        TemplateMetadata {
            format,
            proof_type: proof_type.into(),
            algorithm: Algorithm::EdDSA,
            key_ref: "key-1".into(),
            public_key_uri: "did:web:issuer.example.com".into(),
            disclosable,
            doc_type: doc_type.map(Into::into),
            validity: Validity::default(),
        }
    }

    pub(crate) struct Fixture {
        pub meta: TemplateMetadata,
        pub templater: EchoTemplater,
        pub signer: StubSigner,
        pub params: Map<String, Value>,
        pub holder: Option<ValidatedProof>,
    }

    impl Fixture {
        pub(crate) fn issuance(&self) -> Issuance<'_> {
            Issuance {
                template: &self.meta,
                templater: &self.templater,
                signer: &self.signer,
                holder: self.holder.as_ref(),
            }
        }
    }

    pub(crate) fn fixture(meta: TemplateMetadata) -> Fixture {
        let templated = json!({
            "issuer": "did:web:issuer.example.com",
            "credentialSubject": {"given_name": "Normal", "family_name": "Person"}
        });
        let mut params = Map::new();
        params.insert("given_name".into(), json!("Normal"));
        params.insert("family_name".into(), json!("Person"));

        Fixture {
            meta,
            templater: EchoTemplater(templated),
            signer: StubSigner,
            params,
            holder: None,
        }
    }

    /// A DID-bound holder proof with a P-256 key, as mdoc issuance needs.
    pub(crate) fn p256_holder() -> ValidatedProof {
        let jwk = json!({
            "kty": "EC",
            "crv": "P-256",
            "x": Base64UrlUnpadded::encode_string(&[3u8; 32]),
            "y": Base64UrlUnpadded::encode_string(&[7u8; 32]),
        });
        let did =
            format!("did:jwk:{}", Base64UrlUnpadded::encode_string(jwk.to_string().as_bytes()));

        ValidatedProof {
            holder_did: Some(did),
            jwk: serde_json::from_value::<Jwk>(jwk).expect("jwk"),
            claims: ProofClaims::default(),
        }
    }

    /// A holder proof bound by DID only.
    pub(crate) fn did_holder(did: &str) -> ValidatedProof {
        ValidatedProof {
            holder_did: Some(did.to_string()),
            jwk: Jwk::default(),
            claims: ProofClaims::default(),
        }
    }
}
