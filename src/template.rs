//! # Claim Templating
//!
//! The templating engine is an external collaborator: it renders a claim
//! template with the supplied parameters and returns plain JSON. This
//! module holds its call contract, the immutable per-template metadata the
//! issuance pipeline needs, and a read-through cache in front of the
//! metadata store.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::format::Format;
use crate::sdjwt::PathSet;
use crate::signer::Algorithm;

/// Template parameters that carry issuance plumbing rather than claim data.
/// They are never treated as disclosable claims or namespace data.
pub const RESERVED_PARAMS: &[&str] =
    &["id", "issuerDid", "subjectDid", "issuanceDate", "validFrom", "expirationDate"];

/// Parameters with this prefix are internal to the templating engine.
pub const RESERVED_PREFIX: &str = "_";

/// True if a template parameter must not become claim or namespace data.
#[must_use]
pub fn is_reserved(name: &str) -> bool {
    name.starts_with(RESERVED_PREFIX) || RESERVED_PARAMS.contains(&name)
}

/// Claim templating collaborator. Treated as a black box producing
/// templated JSON.
pub trait Templater: Send + Sync {
    /// Render the claim template with the supplied parameters.
    ///
    /// # Errors
    ///
    /// Returns the engine's failure unchanged.
    fn format(&self, params: &Map<String, Value>) -> anyhow::Result<Value>;
}

/// Validity window copied through to the credential unmodified.
#[derive(Clone, Debug)]
pub struct Validity {
    /// Time the credential becomes valid.
    pub valid_from: DateTime<Utc>,

    /// Time the credential ceases to be valid.
    pub valid_until: DateTime<Utc>,

    /// When the issuer expects to re-sign, if scheduled.
    pub expected_update: Option<DateTime<Utc>>,
}

impl Default for Validity {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            valid_from: now,
            valid_until: now + chrono::Duration::days(365),
            expected_update: None,
        }
    }
}

/// Immutable per-template issuance settings.
#[derive(Clone, Debug)]
pub struct TemplateMetadata {
    /// Wire encoding the template issues into.
    pub format: Format,

    /// Proof suite (linked-data formats) or signing algorithm name.
    pub proof_type: String,

    /// Signing algorithm requested from the signer.
    pub algorithm: Algorithm,

    /// Signer key reference.
    pub key_ref: String,

    /// Issuer DID URL the verification method is anchored to.
    pub public_key_uri: String,

    /// Paths selecting selectively-disclosable subtrees (SD-JWT).
    pub disclosable: PathSet,

    /// ISO document type (mdoc).
    pub doc_type: Option<String>,

    /// Credential validity window.
    pub validity: Validity,
}

/// Backing store for template metadata.
pub trait TemplateStore: Send + Sync {
    /// Resolve a template reference to its metadata.
    ///
    /// # Errors
    ///
    /// Returns the store's failure unchanged.
    fn metadata(&self, template_ref: &str) -> anyhow::Result<TemplateMetadata>;
}

/// Read-through cache over a [`TemplateStore`]. Values are immutable, so a
/// racing miss simply recomputes and the last write wins.
pub struct MetadataCache<S: TemplateStore> {
    store: S,
    cached: RwLock<HashMap<String, Arc<TemplateMetadata>>>,
}

impl<S: TemplateStore> MetadataCache<S> {
    /// Wrap a metadata store.
    pub fn new(store: S) -> Self {
        Self { store, cached: RwLock::new(HashMap::new()) }
    }

    /// Resolve `template_ref`, consulting the cache first.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRequest` when the store does not know the
    /// template.
    pub fn resolve(&self, template_ref: &str) -> Result<Arc<TemplateMetadata>> {
        if let Ok(cached) = self.cached.read() {
            if let Some(meta) = cached.get(template_ref) {
                return Ok(Arc::clone(meta));
            }
        }

        let meta = self
            .store
            .metadata(template_ref)
            .map(Arc::new)
            .map_err(|e| Error::InvalidRequest(format!("unknown template {template_ref}: {e}")))?;

        if let Ok(mut cached) = self.cached.write() {
            cached.insert(template_ref.to_string(), Arc::clone(&meta));
        }

        Ok(meta)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct CountingStore(AtomicUsize);

    impl TemplateStore for CountingStore {
        fn metadata(&self, template_ref: &str) -> anyhow::Result<TemplateMetadata> {
            self.0.fetch_add(1, Ordering::SeqCst);
            if template_ref == "missing" {
                anyhow::bail!("not found");
            }
            Ok(TemplateMetadata {
                format: Format::SdJwt,
                proof_type: "EdDSA".into(),
                algorithm: Algorithm::EdDSA,
                key_ref: "key-1".into(),
                public_key_uri: "did:web:issuer.example.com".into(),
                disclosable: PathSet::default(),
                doc_type: None,
                validity: Validity::default(),
            })
        }
    }

    #[test]
    fn second_resolve_hits_the_cache() {
        let cache = MetadataCache::new(CountingStore(AtomicUsize::new(0)));

        cache.resolve("VerifiableId").expect("should resolve");
        cache.resolve("VerifiableId").expect("should resolve");

        assert_eq!(cache.store.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unknown_template_is_invalid_request() {
        let cache = MetadataCache::new(CountingStore(AtomicUsize::new(0)));

        let err = cache.resolve("missing").expect_err("should fail");
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[test]
    fn reserved_parameters() {
        assert!(is_reserved("issuerDid"));
        assert!(is_reserved("_internal"));
        assert!(!is_reserved("given_name"));
    }
}
