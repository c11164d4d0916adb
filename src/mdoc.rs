//! # mdoc / MSO Construction
//!
//! Builds the issuer-signed half of an ISO 18013-5 mobile document from
//! templated claim data: data elements are salted, tag-24 wrapped and
//! digested into a Mobile Security Object, which is then COSE-signed by
//! the remote signer. Any step failure aborts the whole construction; a
//! partial credential is never returned.

pub mod cbor;
pub mod model;

use std::collections::{BTreeMap, HashSet};

use base64ct::{Base64UrlUnpadded as Base64, Encoding};
use chrono::SecondsFormat;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::holder;
use crate::mdoc::cbor::Tag24;
use crate::mdoc::model::{
    CoseKey, DeviceKeyInfo, DigestAlgorithm, DigestIdGenerator, IssuerSigned, IssuerSignedItem,
    MobileSecurityObject, ValidityInfo, Version,
};
use crate::proof;
use crate::signer::Signer;
use crate::template::{self, TemplateMetadata};

/// A namespace data element before salting.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct NamespaceElement {
    /// Digest identifier, unique per namespace.
    pub digest_id: model::DigestId,

    /// Data element identifier.
    pub element_identifier: String,

    /// Data element value (plain JSON until CBOR conversion).
    pub element_value: Value,
}

/// Map templated output into namespace elements, synthesizing elements for
/// leftover template parameters.
///
/// Root-level objects in the templated output are namespaces; their fields
/// become elements with sequentially allocated digest identifiers.
/// Parameters that did not make it into the template land in the default
/// namespace (the document type), except reserved-prefixed and forbidden
/// names. Synthesized elements take the smallest digest identifier not
/// already used in their namespace.
///
/// # Errors
///
/// Returns `Error::InvalidRequest` if the templated output carries a
/// root-level value that is neither a namespace object nor synthesizable.
pub fn map_namespaces(
    templated: &Value, params: &Map<String, Value>, default_namespace: &str,
) -> Result<BTreeMap<String, Vec<NamespaceElement>>> {
    let Some(root) = templated.as_object() else {
        return Err(Error::InvalidRequest("templated mdoc output must be an object".into()));
    };

    let mut namespaces: BTreeMap<String, Vec<NamespaceElement>> = BTreeMap::new();
    let mut generators: BTreeMap<String, DigestIdGenerator> = BTreeMap::new();

    for (key, value) in root {
        let Some(elements) = value.as_object() else {
            return Err(Error::InvalidRequest(format!(
                "root-level claim {key} is not a namespace object"
            )));
        };

        let id_gen = generators.entry(key.clone()).or_default();
        let namespace = namespaces.entry(key.clone()).or_default();
        for (identifier, element_value) in elements {
            namespace.push(NamespaceElement {
                digest_id: id_gen.generate(),
                element_identifier: identifier.clone(),
                element_value: element_value.clone(),
            });
        }
    }

    // leftover parameters become elements of the default namespace
    for (name, value) in params {
        if template::is_reserved(name) {
            continue;
        }
        let already_mapped = namespaces
            .values()
            .flatten()
            .any(|element| element.element_identifier == *name);
        if already_mapped {
            continue;
        }

        let id_gen = generators.entry(default_namespace.to_string()).or_default();
        namespaces.entry(default_namespace.to_string()).or_default().push(NamespaceElement {
            digest_id: id_gen.generate(),
            element_identifier: name.clone(),
            element_value: value.clone(),
        });
    }

    Ok(namespaces)
}

/// Build, sign, and encode the `IssuerSigned` structure: salt every
/// element, digest the tag-24 forms into the MSO, COSE-sign the MSO, and
/// CBOR-encode the result for transport (base64url).
///
/// # Errors
///
/// Fails fast on an unsupported device-key curve; wraps CBOR failures as
/// `Error::Encoding`; propagates signer failures unchanged.
pub fn build(
    elements: &BTreeMap<String, Vec<NamespaceElement>>, holder_did: &str,
    meta: &TemplateMetadata, signer: &dyn Signer,
) -> Result<String> {
    tracing::debug!("mdoc::build");

    let Some(doc_type) = &meta.doc_type else {
        return Err(Error::InvalidRequest("template has no document type".into()));
    };

    // device key first: an unsupported curve must abort before any signing
    let holder_jwk = holder::resolve_did_key(holder_did)?;
    let device_key = CoseKey::from_jwk(&holder_jwk)?;

    let mut mdoc = IssuerSigned { name_spaces: BTreeMap::new(), issuer_auth: ciborium::Value::Null };
    let mut value_digests: BTreeMap<String, BTreeMap<model::DigestId, Vec<u8>>> = BTreeMap::new();
    let mut salts = HashSet::new();

    for (namespace, namespace_elements) in elements {
        for element in namespace_elements {
            let item = Tag24(IssuerSignedItem {
                digest_id: element.digest_id,
                random: unique_salt(&mut salts),
                element_identifier: element.element_identifier.clone(),
                element_value: cbor::element_value(&element.element_value)
                    .map_err(|e| Error::Encoding(e.to_string()))?,
            });

            let tagged_bytes =
                cbor::to_vec(&item).map_err(|e| Error::Encoding(e.to_string()))?;
            let digest = Sha256::digest(&tagged_bytes).to_vec();

            let ids = value_digests.entry(namespace.clone()).or_default();
            if ids.insert(item.digest_id, digest).is_some() {
                return Err(Error::Encoding(format!(
                    "duplicate digest id {} in namespace {namespace}",
                    item.digest_id
                )));
            }

            mdoc.name_spaces.entry(namespace.clone()).or_default().push(item);
        }
    }

    let mso = MobileSecurityObject {
        version: Version::V1_0,
        digest_algorithm: DigestAlgorithm::Sha256,
        value_digests,
        device_key_info: DeviceKeyInfo { device_key, key_authorizations: None },
        doc_type: doc_type.clone(),
        validity_info: validity_info(meta),
    };

    // sign the tag-24 wrapped MSO
    let mso_bytes = cbor::to_vec(&Tag24(mso)).map_err(|e| Error::Encoding(e.to_string()))?;
    let payload = Base64::encode_string(&mso_bytes);

    let signed_bytes = proof::cose::sign(&payload, &meta.key_ref, meta.algorithm, signer)?;
    mdoc.issuer_auth =
        cbor::from_slice(&signed_bytes).map_err(|e| Error::Encoding(e.to_string()))?;

    let transport = cbor::to_vec(&mdoc).map_err(|e| Error::Encoding(e.to_string()))?;
    Ok(Base64::encode_string(&transport))
}

// 24-byte CSPRNG salt, unique across the whole MSO.
fn unique_salt(seen: &mut HashSet<Vec<u8>>) -> Vec<u8> {
    loop {
        let mut salt = vec![0u8; 24];
        rand::thread_rng().fill_bytes(&mut salt);
        if seen.insert(salt.clone()) {
            return salt;
        }
    }
}

fn validity_info(meta: &TemplateMetadata) -> ValidityInfo {
    let rfc3339 = |dt: &chrono::DateTime<chrono::Utc>| dt.to_rfc3339_opts(SecondsFormat::Secs, true);

    ValidityInfo {
        signed: rfc3339(&chrono::Utc::now()),
        valid_from: rfc3339(&meta.validity.valid_from),
        valid_until: rfc3339(&meta.validity.valid_until),
        expected_update: meta.validity.expected_update.as_ref().map(|dt| rfc3339(dt)),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::format::Format;
    use crate::sdjwt::PathSet;
    use crate::signer::{
        Algorithm, CoseSigned, JwsOptions, JwsSigned, ProtectedHeader, SignatureEncoding, Signed,
    };
    use crate::template::Validity;

    const DOC_TYPE: &str = "org.iso.18013.5.1.mDL";

    // P-256 holder key as did:jwk (coordinates are placeholders of the
    // right length)
    fn holder_did() -> String {
        let jwk = json!({
            "kty": "EC",
            "crv": "P-256",
            "x": Base64::encode_string(&[3u8; 32]),
            "y": Base64::encode_string(&[7u8; 32]),
        });
        format!("did:jwk:{}", Base64::encode_string(jwk.to_string().as_bytes()))
    }

    fn metadata() -> TemplateMetadata {
        TemplateMetadata {
            format: Format::MsoMdoc,
            proof_type: "COSE_Sign1".into(),
            algorithm: Algorithm::ES256,
            key_ref: "issuer-key-1".into(),
            public_key_uri: "did:web:issuer.example.com".into(),
            disclosable: PathSet::default(),
            doc_type: Some(DOC_TYPE.into()),
            validity: Validity::default(),
        }
    }

    // Records protected-header options and returns a real COSE_Sign1.
    struct RecordingSigner {
        x5c_seen: std::sync::Mutex<Vec<bool>>,
    }

    impl RecordingSigner {
        fn new() -> Self {
            Self { x5c_seen: std::sync::Mutex::new(Vec::new()) }
        }
    }

    impl Signer for RecordingSigner {
        fn jws_sign(
            &self, _: &str, _: &str, _: Algorithm, _: &JwsOptions,
        ) -> anyhow::Result<JwsSigned> {
            unimplemented!("not used by the mdoc pipeline")
        }

        fn sign_v2(
            &self, _: &str, _: &str, _: Algorithm, _: SignatureEncoding,
        ) -> anyhow::Result<Signed> {
            unimplemented!("not used by the mdoc pipeline")
        }

        fn cose_sign1(
            &self, payload: &str, _: &str, _: Algorithm, protected: &ProtectedHeader,
        ) -> anyhow::Result<CoseSigned> {
            self.x5c_seen.lock().expect("lock").push(protected.x5c);

            let mso_bytes = Base64::decode_vec(payload)?;
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

    use coset::CborSerializable;

    fn sample_elements() -> BTreeMap<String, Vec<NamespaceElement>> {
        let templated = json!({
            "org.iso.18013.5.1": {
                "given_name": "Normal",
                "family_name": "Person",
                "birth_date": "1998-09-04"
            }
        });
        map_namespaces(&templated, &Map::new(), DOC_TYPE).expect("should map")
    }

    #[test]
    fn namespace_mapping_allocates_sequential_ids() {
        let namespaces = sample_elements();
        let elements = &namespaces["org.iso.18013.5.1"];

        let mut ids: Vec<_> = elements.iter().map(|e| e.digest_id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn leftover_params_are_synthesized_into_default_namespace() {
        let templated = json!({"org.iso.18013.5.1": {"given_name": "Normal"}});
        let mut params = Map::new();
        params.insert("portrait".into(), json!("aGVsbG8"));
        params.insert("issuerDid".into(), json!("did:web:x"));
        params.insert("_hidden".into(), json!("skip"));
        params.insert("given_name".into(), json!("Normal"));

        let namespaces = map_namespaces(&templated, &params, DOC_TYPE).expect("should map");

        let synthesized = &namespaces[DOC_TYPE];
        assert_eq!(synthesized.len(), 1);
        assert_eq!(synthesized[0].element_identifier, "portrait");
        assert_eq!(synthesized[0].digest_id, 0);
    }

    #[test]
    fn non_object_namespace_is_rejected() {
        let templated = json!({"org.iso.18013.5.1": "scalar"});
        assert!(matches!(
            map_namespaces(&templated, &Map::new(), DOC_TYPE),
            Err(Error::InvalidRequest(_))
        ));
    }

    #[test]
    fn every_element_is_digested_exactly_once() {
        let signer = RecordingSigner::new();
        let encoded =
            build(&sample_elements(), &holder_did(), &metadata(), &signer).expect("should build");

        let bytes = Base64::decode_vec(&encoded).expect("should decode");
        let mdoc: IssuerSigned = cbor::from_slice(&bytes).expect("should deserialize");

        // recover the MSO from the signed payload
        let cose = coset::CoseSign1::from_slice(
            &cbor::to_vec(&mdoc.issuer_auth).expect("reserialize"),
        )
        .expect("cose");
        let mso_bytes = cose.payload.expect("payload");
        let mso: Tag24<MobileSecurityObject> =
            cbor::from_slice(&mso_bytes).expect("should deserialize");

        let items = &mdoc.name_spaces["org.iso.18013.5.1"];
        let digests = &mso.0.value_digests["org.iso.18013.5.1"];
        assert_eq!(items.len(), 3);
        assert_eq!(digests.len(), 3);

        // each digest verifies as SHA-256 over the tagged salted element
        for item in items {
            let tagged = cbor::to_vec(item).expect("tagged bytes");
            let expect = Sha256::digest(&tagged).to_vec();
            assert_eq!(digests[&item.digest_id], expect);
        }
    }

    #[test]
    fn salts_are_distinct_and_24_bytes() {
        let signer = RecordingSigner::new();
        let encoded =
            build(&sample_elements(), &holder_did(), &metadata(), &signer).expect("should build");

        let bytes = Base64::decode_vec(&encoded).expect("should decode");
        let mdoc: IssuerSigned = cbor::from_slice(&bytes).expect("should deserialize");

        let items = &mdoc.name_spaces["org.iso.18013.5.1"];
        let mut salts: Vec<&Vec<u8>> = items.iter().map(|i| &i.random).collect();
        assert!(salts.iter().all(|s| s.len() == 24));
        salts.sort();
        salts.dedup();
        assert_eq!(salts.len(), items.len());
    }

    #[test]
    fn cose_signing_always_requests_x5c() {
        let signer = RecordingSigner::new();
        build(&sample_elements(), &holder_did(), &metadata(), &signer).expect("should build");

        let seen = signer.x5c_seen.lock().expect("lock");
        assert_eq!(seen.as_slice(), &[true]);
    }

    #[test]
    fn birth_date_is_tagged_1004() {
        let signer = RecordingSigner::new();
        let encoded =
            build(&sample_elements(), &holder_did(), &metadata(), &signer).expect("should build");

        let bytes = Base64::decode_vec(&encoded).expect("should decode");
        let mdoc: IssuerSigned = cbor::from_slice(&bytes).expect("should deserialize");

        let birth_date = mdoc.name_spaces["org.iso.18013.5.1"]
            .iter()
            .find(|i| i.element_identifier == "birth_date")
            .expect("birth_date element");
        assert!(matches!(&birth_date.element_value, ciborium::Value::Tag(1004, _)));
    }

    #[test]
    fn unsupported_holder_curve_fails_fast() {
        let jwk = json!({"kty": "EC", "crv": "secp256k1", "x": "AA", "y": "AA"});
        let did = format!("did:jwk:{}", Base64::encode_string(jwk.to_string().as_bytes()));

        let signer = RecordingSigner::new();
        let err = build(&sample_elements(), &did, &metadata(), &signer).expect_err("should fail");

        assert!(matches!(err, Error::UnsupportedCurve(_)));
        // the signer must never have been called
        assert!(signer.x5c_seen.lock().expect("lock").is_empty());
    }

    #[test]
    fn signer_failure_aborts_without_partial_output() {
        struct FailingSigner;
        impl Signer for FailingSigner {
            fn jws_sign(
                &self, _: &str, _: &str, _: Algorithm, _: &JwsOptions,
            ) -> anyhow::Result<JwsSigned> {
                unimplemented!()
            }
            fn sign_v2(
                &self, _: &str, _: &str, _: Algorithm, _: SignatureEncoding,
            ) -> anyhow::Result<Signed> {
                unimplemented!()
            }
            fn cose_sign1(
                &self, _: &str, _: &str, _: Algorithm, _: &ProtectedHeader,
            ) -> anyhow::Result<CoseSigned> {
                anyhow::bail!("HSM offline")
            }
        }

        let err = build(&sample_elements(), &holder_did(), &metadata(), &FailingSigner)
            .expect_err("should fail");
        assert!(matches!(err, Error::Signer(_)));
        assert!(err.to_string().contains("HSM offline"));
    }
}
