//! # Canonicalization
//!
//! Deterministic serialization of a (proof options, document) pair ahead of
//! hashing and signing. Linked-data suites mandate URDNA2015; this module
//! provides the deterministic byte form behind that seam: object members
//! ordered lexicographically by key, arrays in place, no insignificant
//! whitespace. The same inputs always produce the same bytes, byte-exact.

use serde_json::Value;

use crate::error::{Error, Result};

/// Canonicalization algorithm fixed by a proof suite.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Canonicalizer {
    /// RDF dataset canonicalization as used by all linked-data suites.
    Urdna2015,

    /// No canonicalization: the payload is already raw bytes (COSE).
    None,
}

/// Serialize the proof configuration and the document to the canonical byte
/// form that is signed. The two canonical documents are joined with a
/// single newline.
///
/// # Errors
///
/// Returns `Error::Encoding` if a value cannot be serialised.
pub fn canonize(proof_options: &Value, document: &Value) -> Result<Vec<u8>> {
    let mut out = String::new();
    write_value(proof_options, &mut out)?;
    out.push('\n');
    write_value(document, &mut out)?;
    Ok(out.into_bytes())
}

/// Canonical byte form of a single document.
///
/// # Errors
///
/// Returns `Error::Encoding` if a value cannot be serialised.
pub fn canonical_bytes(value: &Value) -> Result<Vec<u8>> {
    let mut out = String::new();
    write_value(value, &mut out)?;
    Ok(out.into_bytes())
}

fn write_value(value: &Value, out: &mut String) -> Result<()> {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&encode_scalar(&Value::String((*key).clone()))?);
                out.push(':');
                write_value(&map[*key], out)?;
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out)?;
            }
            out.push(']');
        }
        scalar => out.push_str(&encode_scalar(scalar)?),
    }

    Ok(())
}

// Scalars (and strings) delegate to serde_json, which emits a stable form.
fn encode_scalar(value: &Value) -> Result<String> {
    serde_json::to_string(value).map_err(|e| Error::Encoding(format!("canonicalization: {e}")))
}
