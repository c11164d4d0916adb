//! SD-JWT strategy: the templated claims are decomposed against the
//! template's disclosable paths, the remaining payload is signed as a JWT,
//! and the disclosures are appended in compact serialization.

use chrono::Utc;
use serde_json::{Map, Value, json};

use crate::error::{Error, Result};
use crate::format::{
    CreatedCredential, Credential, CredentialFormat, Format, Issuance, IssuedCredential,
};
use crate::sdjwt;
use crate::signer::JwsOptions;

/// Media type set on the credential JWT.
const SD_JWT_TYP: &str = "vc+sd-jwt";

/// The SD-JWT strategy.
#[derive(Debug)]
pub struct SdJwtFormat;

impl CredentialFormat for SdJwtFormat {
    fn can_handle(&self, format: &str) -> bool {
        format == Format::SdJwt.as_str()
    }

    fn create_credential(
        &self, issuance: &Issuance<'_>, params: &Map<String, Value>,
    ) -> Result<CreatedCredential> {
        tracing::debug!("sdjwt::create_credential");

        let templated = issuance
            .templater
            .format(params)
            .map_err(|e| Error::InvalidRequest(format!("templating failed: {e}")))?;

        let (payload, disclosures) =
            sdjwt::decompose(&templated, &issuance.template.disclosable)?;

        Ok(CreatedCredential { payload, disclosures })
    }

    fn add_proof(
        &self, issuance: &Issuance<'_>, created: CreatedCredential, _sign_algo: &str,
        key_ref: &str, public_key_uri: &str,
    ) -> Result<IssuedCredential> {
        tracing::debug!("sdjwt::add_proof");

        let mut payload = created.payload;
        let Some(claims) = payload.as_object_mut() else {
            return Err(Error::InvalidRequest("templated credential is not an object".into()));
        };

        claims.entry("iss").or_insert_with(|| Value::String(public_key_uri.to_string()));
        claims.entry("iat").or_insert_with(|| json!(Utc::now().timestamp()));

        // bind the credential to the holder proven in this request
        if let Some(holder) = issuance.holder {
            if let Some(did) = &holder.holder_did {
                claims.entry("sub").or_insert_with(|| Value::String(did.clone()));
            } else {
                claims
                    .entry("cnf")
                    .or_insert_with(|| json!({ "jwk": holder.jwk }));
            }
        }

        let opts = JwsOptions { detached: false, typ: Some(SD_JWT_TYP.into()) };
        let signed = issuance
            .signer
            .jws_sign(
                &serde_json::to_string(&payload)?,
                key_ref,
                issuance.template.algorithm,
                &opts,
            )
            .map_err(Error::Signer)?;

        let compact = sdjwt::compact(&signed.jwt_signed_data, &created.disclosures)?;

        Ok(IssuedCredential { format: Format::SdJwt, credential: Credential::Compact(compact) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::tests_support::{did_holder, fixture, metadata, p256_holder};
    use crate::sdjwt::PathSet;

    fn sdjwt_fixture(patterns: &[&str]) -> crate::format::tests_support::Fixture {
        let disclosable = PathSet::parse(patterns).expect("paths");
        fixture(metadata(Format::SdJwt, "EdDSA", disclosable, None))
    }

    #[test]
    fn compact_form_carries_each_disclosure() {
        let fixture = sdjwt_fixture(&[
            "$.credentialSubject.given_name",
            "$.credentialSubject.family_name",
        ]);

        let issued = crate::format::issue(&fixture.issuance(), &fixture.params).expect("issue");

        assert_eq!(issued.format, Format::SdJwt);
        let Credential::Compact(sd_jwt) = issued.credential else { panic!("compact credential") };

        // jwt + 2 disclosures + trailing tilde
        assert!(sd_jwt.ends_with('~'));
        assert_eq!(sd_jwt.split('~').count(), 4);
        assert!(sd_jwt.split('.').count() >= 3);
    }

    #[test]
    fn no_disclosable_paths_means_a_plain_jwt_payload() {
        let fixture = sdjwt_fixture(&[]);

        let issued = crate::format::issue(&fixture.issuance(), &fixture.params).expect("issue");

        let Credential::Compact(sd_jwt) = issued.credential else { panic!("compact credential") };
        assert_eq!(sd_jwt.split('~').count(), 2); // jwt + trailing tilde only
    }

    #[test]
    fn holder_did_becomes_sub() {
        let mut fixture = sdjwt_fixture(&["$.given_name"]);
        fixture.holder = Some(did_holder("did:key:z6MkHolder"));

        let issued = crate::format::issue(&fixture.issuance(), &fixture.params).expect("issue");

        let Credential::Compact(sd_jwt) = issued.credential else { panic!("compact credential") };
        let jwt = sd_jwt.split('~').next().expect("jwt");
        let claims = decode_claims(jwt);
        assert_eq!(claims["sub"], "did:key:z6MkHolder");
        assert_eq!(claims["iss"], fixture.meta.public_key_uri);
    }

    #[test]
    fn bare_key_holder_becomes_cnf() {
        let mut fixture = sdjwt_fixture(&["$.given_name"]);
        let mut holder = p256_holder();
        holder.holder_did = None;
        fixture.holder = Some(holder);

        let issued = crate::format::issue(&fixture.issuance(), &fixture.params).expect("issue");

        let Credential::Compact(sd_jwt) = issued.credential else { panic!("compact credential") };
        let claims = decode_claims(sd_jwt.split('~').next().expect("jwt"));
        assert_eq!(claims["cnf"]["jwk"]["kty"], "EC");
    }

    #[test]
    fn disclosed_members_leave_the_payload() {
        let fixture = sdjwt_fixture(&["$.credentialSubject.given_name"]);

        let issued = crate::format::issue(&fixture.issuance(), &fixture.params).expect("issue");

        let Credential::Compact(sd_jwt) = issued.credential else { panic!("compact credential") };
        let claims = decode_claims(sd_jwt.split('~').next().expect("jwt"));

        assert!(claims["credentialSubject"].get("given_name").is_none());
        assert_eq!(claims["credentialSubject"]["family_name"], "Person");
        assert_eq!(claims["credentialSubject"]["_sd"].as_array().map(Vec::len), Some(1));
        assert_eq!(claims["_sd_alg"], sdjwt::SD_ALG);
    }

    // The stub signer embeds the claims as the JWT payload segment.
    fn decode_claims(jwt: &str) -> Value {
        use base64ct::{Base64UrlUnpadded, Encoding};
        let payload = jwt.split('.').nth(1).expect("payload segment");
        let raw = Base64UrlUnpadded::decode_vec(payload).expect("base64");
        serde_json::from_slice(&raw).expect("json")
    }
}
