//! JSON-LD strategy: the templated document is secured with an embedded
//! linked-data proof. Known suite names resolve through the suite
//! registry; anything else goes down the generic Data-Integrity path with
//! the name carried as the cryptosuite identifier.

use std::str::FromStr;

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::format::{
    CreatedCredential, Credential, CredentialFormat, Format, Issuance, IssuedCredential,
};
use crate::proof::{self, LdProof, ProofSuite, ld::DataIntegritySuite};

/// The JSON-LD / Data-Integrity strategy.
#[derive(Debug)]
pub struct JsonLdFormat;

impl CredentialFormat for JsonLdFormat {
    fn can_handle(&self, format: &str) -> bool {
        format == Format::JsonLd.as_str()
    }

    fn create_credential(
        &self, issuance: &Issuance<'_>, params: &Map<String, Value>,
    ) -> Result<CreatedCredential> {
        tracing::debug!("jsonld::create_credential");

        let mut payload = issuance
            .templater
            .format(params)
            .map_err(|e| Error::InvalidRequest(format!("templating failed: {e}")))?;

        // bind the credential to the holder proven in this request
        if let Some(holder) = issuance.holder {
            if let Some(did) = &holder.holder_did {
                if let Some(subject) =
                    payload.get_mut("credentialSubject").and_then(Value::as_object_mut)
                {
                    subject.entry("id").or_insert_with(|| Value::String(did.clone()));
                }
            }
        }

        Ok(CreatedCredential { payload, disclosures: Vec::new() })
    }

    fn add_proof(
        &self, issuance: &Issuance<'_>, created: CreatedCredential, sign_algo: &str,
        key_ref: &str, public_key_uri: &str,
    ) -> Result<IssuedCredential> {
        tracing::debug!("jsonld::add_proof");

        let mut payload = created.payload;
        let Some(document) = payload.as_object_mut() else {
            return Err(Error::InvalidRequest("templated credential is not an object".into()));
        };

        // both the 1.1 and 2.0 field names count; default to now if absent
        if !document.contains_key("issuanceDate") && !document.contains_key("validFrom") {
            document.insert(
                "issuanceDate".into(),
                Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
            );
        }

        let verification_method = format!("{public_key_uri}#{key_ref}");
        let scaffold = LdProof::scaffold(sign_algo, &verification_method);

        // registered suite names first, else the generic path
        let generator = match ProofSuite::from_str(sign_algo) {
            Ok(suite) => proof::generator(suite)?,
            Err(_) => Box::new(DataIntegritySuite::new(sign_algo, issuance.template.algorithm)),
        };

        let proof = generator.generate(&scaffold, &payload, key_ref, issuance.signer)?;

        let Some(document) = payload.as_object_mut() else {
            return Err(Error::InvalidRequest("templated credential is not an object".into()));
        };
        document.insert("proof".into(), serde_json::to_value(proof)?);

        Ok(IssuedCredential { format: Format::JsonLd, credential: Credential::Json(payload) })
    }
}
