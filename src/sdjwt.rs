//! # Selective Disclosure
//!
//! Decomposes a claim tree into an SD-JWT payload and its disclosures.
//! Claims selected by the template's disclosable paths are replaced by
//! salted digests (`_sd` arrays for object members, `{"...": digest}`
//! entries for array elements); everything else passes through unchanged.
//!
//! Disclosures accumulate in depth-first traversal order and that order is
//! preserved in the emitted credential. Wallets must treat them as
//! unordered.

use base64ct::{Base64UrlUnpadded, Encoding};
use rand::RngCore;
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Digest algorithm advertised in the SD payload's `_sd_alg` claim.
pub const SD_ALG: &str = "sha-256";

/// Claim name for object-member digests.
const SD_KEY: &str = "_sd";

/// Claim name for array-element digests.
const ELLIPSIS_KEY: &str = "...";

/// One segment of a disclosable-path pattern.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    /// `.name`
    Field(String),

    /// `[3]`
    Index(usize),

    /// `.*` matches any one object member.
    AnyField,

    /// `[*]` matches any one array element.
    AnyIndex,
}

/// A parsed path pattern in dot/bracket syntax, e.g. `$.address.street` or
/// `$.nationalities[*]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathPattern {
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Parse a dot/bracket pattern. The leading `$` (document root) is
    /// required.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRequest` for malformed patterns.
    pub fn parse(pattern: &str) -> Result<Self> {
        let rest = pattern
            .strip_prefix('$')
            .ok_or_else(|| Error::InvalidRequest(format!("path must start with $: {pattern}")))?;

        let mut segments = Vec::new();
        let mut chars = rest.char_indices().peekable();

        while let Some(&(start, c)) = chars.peek() {
            match c {
                '.' => {
                    chars.next();
                    let name: String = take_while(&mut chars, |c| c != '.' && c != '[');
                    if name.is_empty() {
                        return Err(Error::InvalidRequest(format!(
                            "empty member name in path: {pattern}"
                        )));
                    }
                    segments
                        .push(if name == "*" { Segment::AnyField } else { Segment::Field(name) });
                }
                '[' => {
                    chars.next();
                    let inner: String = take_while(&mut chars, |c| c != ']');
                    if chars.next().map(|(_, c)| c) != Some(']') {
                        return Err(Error::InvalidRequest(format!(
                            "unterminated index in path: {pattern}"
                        )));
                    }
                    if inner == "*" {
                        segments.push(Segment::AnyIndex);
                    } else {
                        let index = inner.parse::<usize>().map_err(|_| {
                            Error::InvalidRequest(format!("bad index `{inner}` in path: {pattern}"))
                        })?;
                        segments.push(Segment::Index(index));
                    }
                }
                _ => {
                    return Err(Error::InvalidRequest(format!(
                        "unexpected `{c}` at offset {start} in path: {pattern}"
                    )));
                }
            }
        }

        if segments.is_empty() {
            return Err(Error::InvalidRequest(format!("path selects nothing: {pattern}")));
        }

        Ok(Self { segments })
    }

    // A pattern matches only a path of equal segment count; wildcards match
    // any one segment of their kind.
    fn matches(&self, path: &[Step<'_>]) -> bool {
        if self.segments.len() != path.len() {
            return false;
        }

        self.segments.iter().zip(path).all(|(segment, step)| match (segment, step) {
            (Segment::Field(name), Step::Field(field)) => name == field,
            (Segment::AnyField, Step::Field(_)) => true,
            (Segment::Index(i), Step::Index(j)) => i == j,
            (Segment::AnyIndex, Step::Index(_)) => true,
            _ => false,
        })
    }
}

/// The set of disclosable paths configured for a template.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PathSet {
    patterns: Vec<PathPattern>,
}

impl PathSet {
    /// Parse a list of dot/bracket patterns.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRequest` for malformed patterns.
    pub fn parse<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns =
            patterns.iter().map(|p| PathPattern::parse(p.as_ref())).collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// True when no paths are disclosable.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    fn matches(&self, path: &[Step<'_>]) -> bool {
        self.patterns.iter().any(|p| p.matches(path))
    }
}

// One step of the concrete path to a node during traversal.
#[derive(Clone, Copy, Debug)]
enum Step<'a> {
    Field(&'a str),
    Index(usize),
}

/// A single disclosure: salt, optional claim name, value. Array-element
/// disclosures carry no name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Disclosure {
    /// 128-bit salt, base64url.
    pub salt: String,

    /// Claim name; `None` for array elements.
    pub name: Option<String>,

    /// The disclosed value, opaque to the payload.
    pub value: Value,
}

impl Disclosure {
    fn for_member(name: &str, value: Value) -> Self {
        Self { salt: new_salt(), name: Some(name.to_string()), value }
    }

    fn for_element(value: Value) -> Self {
        Self { salt: new_salt(), name: None, value }
    }

    /// The base64url-encoded disclosure string appended to the SD-JWT.
    ///
    /// # Errors
    ///
    /// Returns `Error::Encoding` if the value cannot be serialised.
    pub fn encoded(&self) -> Result<String> {
        let array = match &self.name {
            Some(name) => json!([self.salt, name, self.value]),
            None => json!([self.salt, self.value]),
        };
        let raw = serde_json::to_vec(&array)
            .map_err(|e| Error::Encoding(format!("disclosure: {e}")))?;
        Ok(Base64UrlUnpadded::encode_string(&raw))
    }

    /// SHA-256 digest of the encoded disclosure, base64url.
    ///
    /// # Errors
    ///
    /// Returns `Error::Encoding` if the value cannot be serialised.
    pub fn digest(&self) -> Result<String> {
        Ok(Base64UrlUnpadded::encode_string(&Sha256::digest(self.encoded()?.as_bytes())))
    }
}

fn new_salt() -> String {
    let mut salt = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);
    Base64UrlUnpadded::encode_string(&salt)
}

/// Decompose a claim tree against a disclosable-path set, producing the SD
/// payload and its disclosures in traversal order.
///
/// An empty path set returns the claim tree untouched with zero
/// disclosures.
///
/// # Errors
///
/// Returns `Error::Encoding` if a disclosure cannot be serialised.
pub fn decompose(claims: &Value, paths: &PathSet) -> Result<(Value, Vec<Disclosure>)> {
    if paths.is_empty() {
        return Ok((claims.clone(), Vec::new()));
    }

    let mut disclosures = Vec::new();
    let mut payload = walk(claims, &mut Vec::new(), paths, &mut disclosures)?;

    if !disclosures.is_empty() {
        if let Value::Object(map) = &mut payload {
            map.insert("_sd_alg".into(), Value::String(SD_ALG.into()));
        }
    }

    Ok((payload, disclosures))
}

// Pure recursive walk: each level returns an owned value, merged by the
// caller. `path` is the concrete path to the node being rebuilt.
fn walk<'a>(
    value: &'a Value, path: &mut Vec<Step<'a>>, paths: &PathSet, out: &mut Vec<Disclosure>,
) -> Result<Value> {
    match value {
        Value::Object(map) => {
            let mut plain = Map::new();
            let mut digests = Vec::new();

            for (name, child) in map {
                path.push(Step::Field(name));

                if paths.matches(path) {
                    // disclosable member: the whole subtree becomes one
                    // disclosure, no recursion inside it
                    let disclosure = Disclosure::for_member(name, child.clone());
                    digests.push(Value::String(disclosure.digest()?));
                    out.push(disclosure);
                } else {
                    plain.insert(name.clone(), walk(child, path, paths, out)?);
                }

                path.pop();
            }

            if !digests.is_empty() {
                plain.insert(SD_KEY.into(), Value::Array(digests));
            }
            Ok(Value::Object(plain))
        }
        Value::Array(items) => {
            let mut rebuilt = Vec::with_capacity(items.len());

            for (index, item) in items.iter().enumerate() {
                path.push(Step::Index(index));

                if paths.matches(path) {
                    // disclosable element, object or scalar alike
                    let disclosure = Disclosure::for_element(item.clone());
                    let mut entry = Map::new();
                    entry.insert(ELLIPSIS_KEY.into(), Value::String(disclosure.digest()?));
                    rebuilt.push(Value::Object(entry));
                    out.push(disclosure);
                } else if item.is_object() || item.is_array() {
                    rebuilt.push(walk(item, path, paths, out)?);
                } else {
                    rebuilt.push(item.clone());
                }

                path.pop();
            }

            Ok(Value::Array(rebuilt))
        }
        scalar => Ok(scalar.clone()),
    }
}

/// Assemble the compact SD-JWT serialization:
/// `<jwt>~<disclosure 1>~...~<disclosure N>~`.
///
/// # Errors
///
/// Returns `Error::Encoding` if a disclosure cannot be serialised.
pub fn compact(jwt: &str, disclosures: &[Disclosure]) -> Result<String> {
    let mut out = String::from(jwt);
    for disclosure in disclosures {
        out.push('~');
        out.push_str(&disclosure.encoded()?);
    }
    out.push('~');
    Ok(out)
}

fn take_while(
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>, keep: impl Fn(char) -> bool,
) -> String {
    let mut taken = String::new();
    while let Some(&(_, c)) = chars.peek() {
        if !keep(c) {
            break;
        }
        taken.push(c);
        chars.next();
    }
    taken
}
