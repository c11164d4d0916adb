//! # Credential Issuance Core
//!
//! Converts templated claim data into a signed credential in one of
//! several incompatible wire encodings (JSON-LD with linked-data proofs,
//! SD-JWT with selective disclosure, ISO 18013-5 mdoc/CBOR), and
//! validates a wallet's proof-of-possession JWT before issuance proceeds.
//!
//! Callers stay format-agnostic: a factory selects the strategy for the
//! requested format, `create_credential` renders and post-processes the
//! templated claims, and `add_proof` signs the result through a remote
//! signer. Every signature is produced by the signer behind the
//! [`signer::Signer`] trait; no private key material is handled here.
//!
//! All components are stateless per call. The only cross-request state is
//! a read-through cache of immutable template metadata.

pub mod canon;
pub mod error;
pub mod format;
pub mod holder;
pub mod mdoc;
pub mod proof;
pub mod sdjwt;
pub mod signer;
pub mod template;

pub use crate::error::{Error, Result};
pub use crate::format::{Credential, Format, Issuance, IssuedCredential, issue};
pub use crate::holder::{Expected, ValidatedProof, validate};
pub use crate::signer::Signer;
