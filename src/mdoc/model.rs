//! # mdoc Data Model
//!
//! The issuer-signed half of an ISO 18013-5 mobile document: data elements
//! grouped by namespace, and the Mobile Security Object (MSO) that carries
//! a digest of every element for issuer data authentication.
//!
//! See 8.3.2.1.2.2 (device retrieval mdoc response) and 9.1.2.4 (signing
//! method and structure for the MSO).

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::holder::Jwk;
use crate::mdoc::cbor::Tag24;

/// Namespace identifier, e.g. `org.iso.18013.5.1`.
pub type NameSpace = String;

/// Digest identifier. Unique within a namespace, smaller than 2^31.
pub type DigestId = u32;

/// Data elements (claims) signed by the issuer, plus the MSO that
/// authenticates them. `issuer_auth` holds the decoded `COSE_Sign1`
/// structure produced by the signer.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuerSigned {
    /// Data elements for each namespace, each wrapped in tag 24.
    pub name_spaces: BTreeMap<NameSpace, Vec<Tag24<IssuerSignedItem>>>,

    /// `COSE_Sign1` over the MSO bytes.
    pub issuer_auth: ciborium::Value,
}

/// A salted data element. Digested (over its tag-24 form) into the MSO.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IssuerSignedItem {
    /// Matches the element's digest in the MSO `valueDigests`.
    #[serde(rename = "digestID")]
    pub digest_id: DigestId,

    /// Per-element random salt, 24 bytes.
    pub random: Vec<u8>,

    /// Data element identifier, e.g. `family_name`.
    pub element_identifier: String,

    /// Data element value, e.g. `Smith`.
    pub element_value: ciborium::Value,
}

/// The Mobile Security Object: a signed digest of every data element in
/// the mdoc.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MobileSecurityObject {
    /// MSO version. Must be `1.0`.
    pub version: Version,

    /// Digest algorithm used for `value_digests`.
    pub digest_algorithm: DigestAlgorithm,

    /// Digests for each data element in each namespace.
    pub value_digests: BTreeMap<NameSpace, BTreeMap<DigestId, Vec<u8>>>,

    /// Holder device key the credential is bound to.
    pub device_key_info: DeviceKeyInfo,

    /// Document type, e.g. `org.iso.18013.5.1.mDL`.
    pub doc_type: String,

    /// Validity of the MSO and its signature.
    pub validity_info: ValidityInfo,
}

/// MSO version.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum Version {
    /// Version 1.0
    #[default]
    #[serde(rename = "1.0")]
    V1_0,
}

/// Digest algorithm used by the MSO.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum DigestAlgorithm {
    /// SHA-256
    #[default]
    #[serde(rename = "SHA-256")]
    Sha256,
}

/// Holder device key and related information, carried as an untagged
/// `COSE_Key`.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceKeyInfo {
    /// The device public key.
    pub device_key: CoseKey,

    /// Namespaces and data elements the device key may sign for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_authorizations: Option<BTreeMap<NameSpace, Vec<String>>>,
}

/// An EC2 `COSE_Key` (RFC 9052 §7). Serialised as an integer-labelled map:
/// `1` kty, `-1` crv, `-2` x, `-3` y.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoseKey {
    /// Elliptic curve.
    pub crv: EcCurve,

    /// X coordinate.
    pub x: Vec<u8>,

    /// Y coordinate.
    pub y: Vec<u8>,
}

/// Curves the MSO device key supports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EcCurve {
    /// NIST P-256 (COSE crv 1).
    P256,

    /// NIST P-384 (COSE crv 2).
    P384,
}

impl CoseKey {
    /// Build a device key from the holder's JWK. Only EC P-256 and P-384
    /// keys can be carried; anything else fails fast.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsupportedCurve` for non-EC keys or other curves,
    /// and `Error::InvalidProof` when the coordinates do not decode.
    pub fn from_jwk(jwk: &Jwk) -> Result<Self> {
        if jwk.kty != "EC" {
            return Err(Error::UnsupportedCurve(format!(
                "device key must be EC, got {}",
                jwk.kty
            )));
        }
        let crv = match jwk.crv.as_str() {
            "P-256" => EcCurve::P256,
            "P-384" => EcCurve::P384,
            other => {
                return Err(Error::UnsupportedCurve(format!("device key curve {other}")));
            }
        };

        use base64ct::{Base64UrlUnpadded, Encoding};
        let x = Base64UrlUnpadded::decode_vec(&jwk.x)
            .map_err(|e| Error::InvalidProof(format!("device key x coordinate: {e}")))?;
        let y = jwk
            .y
            .as_ref()
            .ok_or_else(|| Error::InvalidProof("device key y coordinate missing".into()))
            .and_then(|y| {
                Base64UrlUnpadded::decode_vec(y)
                    .map_err(|e| Error::InvalidProof(format!("device key y coordinate: {e}")))
            })?;

        Ok(Self { crv, x, y })
    }
}

impl Serialize for CoseKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use ciborium::Value;

        let crv = match self.crv {
            EcCurve::P256 => 1,
            EcCurve::P384 => 2,
        };
        // kty(1) = EC2(2)
        Value::Map(vec![
            (Value::Integer(1.into()), Value::Integer(2.into())),
            (Value::Integer((-1).into()), Value::Integer(crv.into())),
            (Value::Integer((-2).into()), Value::Bytes(self.x.clone())),
            (Value::Integer((-3).into()), Value::Bytes(self.y.clone())),
        ])
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CoseKey {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        use ciborium::Value;
        use serde::de::Error as _;

        let Value::Map(entries) = Value::deserialize(deserializer)? else {
            return Err(D::Error::custom("COSE_Key must be a map"));
        };

        let mut crv = None;
        let mut x = None;
        let mut y = None;
        for (label, value) in entries {
            let Value::Integer(label) = label else { continue };
            match (i128::from(label), value) {
                (-1, Value::Integer(c)) => {
                    crv = match i128::from(c) {
                        1 => Some(EcCurve::P256),
                        2 => Some(EcCurve::P384),
                        other => return Err(D::Error::custom(format!("unknown crv {other}"))),
                    };
                }
                (-2, Value::Bytes(bytes)) => x = Some(bytes),
                (-3, Value::Bytes(bytes)) => y = Some(bytes),
                _ => {}
            }
        }

        Ok(Self {
            crv: crv.ok_or_else(|| D::Error::custom("COSE_Key crv missing"))?,
            x: x.ok_or_else(|| D::Error::custom("COSE_Key x missing"))?,
            y: y.ok_or_else(|| D::Error::custom("COSE_Key y missing"))?,
        })
    }
}

/// Validity of the MSO and its signature. RFC 3339 timestamps.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidityInfo {
    /// Time the MSO was signed.
    pub signed: String,

    /// Not valid before. Equal to or later than `signed`.
    pub valid_from: String,

    /// Not valid after. Later than `valid_from`.
    pub valid_until: String,

    /// When the issuer expects to re-sign, if scheduled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_update: Option<String>,
}

/// Allocates digest identifiers within one namespace: always the smallest
/// non-negative integer not already in use.
#[derive(Debug, Default)]
pub struct DigestIdGenerator {
    used: BTreeSet<DigestId>,
}

impl DigestIdGenerator {
    /// An allocator with no identifiers in use.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an identifier as already in use.
    pub fn reserve(&mut self, id: DigestId) {
        self.used.insert(id);
    }

    /// Allocate the smallest unused identifier.
    pub fn generate(&mut self) -> DigestId {
        let mut id = 0;
        while self.used.contains(&id) {
            id += 1;
        }
        self.used.insert(id);
        id
    }
}
