//! mdoc strategy: templated fields map onto ISO namespaces (with leftover
//! template parameters synthesized in), then the MSO pipeline salts,
//! digests, and COSE-signs the result.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::format::{
    CreatedCredential, Credential, CredentialFormat, Format, Issuance, IssuedCredential,
};
use crate::mdoc::{self, NamespaceElement};

/// The mdoc strategy.
#[derive(Debug)]
pub struct MdocFormat;

impl CredentialFormat for MdocFormat {
    fn can_handle(&self, format: &str) -> bool {
        format == Format::MsoMdoc.as_str()
    }

    fn create_credential(
        &self, issuance: &Issuance<'_>, params: &Map<String, Value>,
    ) -> Result<CreatedCredential> {
        tracing::debug!("mdoc::create_credential");

        let Some(doc_type) = &issuance.template.doc_type else {
            return Err(Error::InvalidRequest("template has no document type".into()));
        };

        let templated = issuance
            .templater
            .format(params)
            .map_err(|e| Error::InvalidRequest(format!("templating failed: {e}")))?;

        let namespaces = mdoc::map_namespaces(&templated, params, doc_type)?;

        Ok(CreatedCredential { payload: serde_json::to_value(namespaces)?, disclosures: Vec::new() })
    }

    fn add_proof(
        &self, issuance: &Issuance<'_>, created: CreatedCredential, _sign_algo: &str,
        _key_ref: &str, _public_key_uri: &str,
    ) -> Result<IssuedCredential> {
        tracing::debug!("mdoc::add_proof");

        let namespaces: BTreeMap<String, Vec<NamespaceElement>> =
            serde_json::from_value(created.payload)?;

        let holder_did = issuance
            .holder
            .and_then(|proof| proof.holder_did.as_deref())
            .ok_or_else(|| {
                Error::InvalidRequest("mdoc issuance requires a DID-bound holder proof".into())
            })?;

        let encoded = mdoc::build(&namespaces, holder_did, issuance.template, issuance.signer)?;

        Ok(IssuedCredential { format: Format::MsoMdoc, credential: Credential::Compact(encoded) })
    }
}
