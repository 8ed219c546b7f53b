//! Deterministic JSON canonicalization + SHA-256 fingerprint.
//!
//! `Canonicalize(Canonicalize(x)) == Canonicalize(x)` byte-for-byte, and any
//! two inputs representing the same JSON value produce identical bytes:
//! object keys are sorted lexicographically (recursively — `serde_json`'s
//! default `Map` is a `BTreeMap`, so this falls out of parsing into `Value`
//! without extra bookkeeping), strings are re-encoded with standard JSON
//! escaping, and numbers are re-emitted from their original decimal string
//! (the `arbitrary_precision` feature keeps the source digits instead of
//! round-tripping through `f64`, which would drop trailing zeros and change
//! the bytes for an equivalent value).

use serde::{Deserialize, Serialize};

/// The document kinds this core canonicalizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Config,
    Plan,
}

/// An uncanonicalized document submitted for canonicalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub kind: DocumentKind,
    pub content: String,
}

/// The canonical form of a [`Document`]: sorted-key JSON bytes plus their
/// SHA-256 fingerprint (lowercase hex).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalDocument {
    pub bytes: Vec<u8>,
    pub sha256: String,
}

impl CanonicalDocument {
    pub fn as_str(&self) -> &str {
        // canonicalize() only ever produces valid UTF-8 JSON text.
        std::str::from_utf8(&self.bytes).expect("canonical bytes are valid utf-8")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CanonicalizeError {
    #[error("content is not valid json: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("config document must be a json object")]
    ConfigNotObject,
    #[error("plan document must be a json object")]
    PlanNotObject,
}

/// Parse-validate `doc.content` against the shape expected for `doc.kind`,
/// then re-emit it in canonical form with a SHA-256 fingerprint over the
/// canonical bytes.
pub fn canonicalize(doc: &Document) -> Result<CanonicalDocument, CanonicalizeError> {
    let value: serde_json::Value = serde_json::from_str(&doc.content)?;

    match doc.kind {
        DocumentKind::Config if !value.is_object() => {
            return Err(CanonicalizeError::ConfigNotObject)
        }
        DocumentKind::Plan if !value.is_object() => return Err(CanonicalizeError::PlanNotObject),
        _ => {}
    }

    // serde_json's Map is a BTreeMap by default (no `preserve_order`
    // feature), so `to_string` already emits object keys in sorted order
    // at every nesting level.
    let bytes = serde_json::to_vec(&value).expect("canonical value always serializes");

    let digest = ring::digest::digest(&ring::digest::SHA256, &bytes);
    let sha256 = hex::encode(digest.as_ref());

    Ok(CanonicalDocument { bytes, sha256 })
}
