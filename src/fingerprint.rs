//! Deterministic request fingerprinting.
//!
//! A [`Fingerprint`] identifies a logical request independently of object
//! key order and of element order in arrays the caller declares
//! order-insensitive. The canonical form is written by hand rather than
//! through `serde_json::to_string`, so the result does not depend on
//! whether `serde_json`'s `preserve_order` feature is enabled anywhere in
//! the dependency graph. The digest is SHA-256, stable across processes
//! and restarts.
//!
//! ```rust
//! # use muninn::Fingerprinter;
//! # use serde_json::json;
//! let fp = Fingerprinter::new().order_insensitive("params.tags");
//! let a = fp.fingerprint(&json!({"type": "plan", "params": {"goal": "a", "tags": ["x", "y"]}})).unwrap();
//! let b = fp.fingerprint(&json!({"type": "plan", "params": {"tags": ["y", "x"], "goal": "a"}})).unwrap();
//! assert_eq!(a, b);
//! ```

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::{MuninnError, Result};

/// Deepest nesting accepted in a request.
pub const MAX_DEPTH: usize = 64;

/// Length of a fingerprint in hex characters.
const FINGERPRINT_LEN: usize = 64;

/// Opaque, deterministic identifier of a logical request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Parse a fingerprint received from outside (CLI, store keys).
    ///
    /// Accepts exactly 64 lowercase hex characters, which also makes the
    /// value safe to use as a file name.
    pub fn parse(s: &str) -> Result<Self> {
        if s.len() == FINGERPRINT_LEN
            && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            Ok(Self(s.to_string()))
        } else {
            Err(MuninnError::InvalidRequest(format!(
                "not a fingerprint: {s:?}"
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A request after canonicalization.
#[derive(Debug, Clone)]
pub struct CanonicalRequest {
    pub fingerprint: Fingerprint,
    /// Request with order-insensitive arrays sorted; passed to the generator.
    pub value: Value,
    /// Compact canonical serialization the fingerprint was computed from.
    pub text: String,
}

/// Computes fingerprints for structured requests.
///
/// Order-insensitive arrays are declared by dotted path relative to the
/// request root. A `*` segment matches any object key or array index, so
/// `"items.*.tags"` covers the `tags` array of every element of `items`.
#[derive(Debug, Clone, Default)]
pub struct Fingerprinter {
    order_insensitive: Vec<Vec<String>>,
    salt: Option<String>,
}

impl Fingerprinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an array field whose element order carries no meaning.
    pub fn order_insensitive(mut self, path: impl AsRef<str>) -> Self {
        let segments = path
            .as_ref()
            .split('.')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect::<Vec<_>>();
        if !segments.is_empty() {
            self.order_insensitive.push(segments);
        }
        self
    }

    /// Mix a version salt into every digest.
    ///
    /// Changing the salt orphans every existing cache entry, which is the
    /// only way to invalidate results after a prompt or schema change.
    pub fn salt(mut self, salt: impl Into<String>) -> Self {
        self.salt = Some(salt.into());
        self
    }

    /// Compute the fingerprint of a request.
    pub fn fingerprint<T: Serialize + ?Sized>(&self, request: &T) -> Result<Fingerprint> {
        Ok(self.canonicalize(request)?.fingerprint)
    }

    /// Canonicalize a request and compute its fingerprint.
    pub fn canonicalize<T: Serialize + ?Sized>(&self, request: &T) -> Result<CanonicalRequest> {
        let value = serde_json::to_value(request)
            .map_err(|e| MuninnError::InvalidRequest(format!("request is not serializable: {e}")))?;

        let mut path = Vec::new();
        let value = self.normalize(value, &mut path, 0)?;

        let mut text = String::new();
        write_canonical(&value, &mut text);

        let fingerprint = self.digest(&text);
        Ok(CanonicalRequest {
            fingerprint,
            value,
            text,
        })
    }

    fn digest(&self, canonical: &str) -> Fingerprint {
        let mut hasher = Sha256::new();
        if let Some(ref salt) = self.salt {
            hasher.update(salt.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update(canonical.as_bytes());
        let hash: String = hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect();
        Fingerprint(hash)
    }

    /// Sort declared arrays (recursively, children first) and check depth.
    fn normalize(&self, value: Value, path: &mut Vec<String>, depth: usize) -> Result<Value> {
        if depth > MAX_DEPTH {
            return Err(MuninnError::InvalidRequest(format!(
                "request nesting exceeds {MAX_DEPTH} levels"
            )));
        }
        match value {
            Value::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (key, child) in map {
                    path.push(key.clone());
                    let child = self.normalize(child, path, depth + 1)?;
                    path.pop();
                    out.insert(key, child);
                }
                Ok(Value::Object(out))
            }
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, child) in items.into_iter().enumerate() {
                    path.push(i.to_string());
                    out.push(self.normalize(child, path, depth + 1)?);
                    path.pop();
                }
                if self.is_order_insensitive(path) {
                    let mut keyed: Vec<(String, Value)> = out
                        .into_iter()
                        .map(|v| {
                            let mut s = String::new();
                            write_canonical(&v, &mut s);
                            (s, v)
                        })
                        .collect();
                    keyed.sort_by(|a, b| a.0.cmp(&b.0));
                    out = keyed.into_iter().map(|(_, v)| v).collect();
                }
                Ok(Value::Array(out))
            }
            scalar => Ok(scalar),
        }
    }

    fn is_order_insensitive(&self, path: &[String]) -> bool {
        self.order_insensitive.iter().any(|pattern| {
            pattern.len() == path.len()
                && pattern
                    .iter()
                    .zip(path)
                    .all(|(p, seg)| p == "*" || p == seg)
        })
    }
}

/// Write `value` compactly with object keys in lexicographic order.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::String(s) => write_string(s, out),
        Value::Number(n) => {
            let _ = write!(out, "{n}");
        }
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Null => out.push_str("null"),
    }
}

fn write_string(s: &str, out: &mut String) {
    // Value::String serialization cannot fail.
    out.push_str(&Value::String(s.to_string()).to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_does_not_matter() {
        let fp = Fingerprinter::new();
        let a = fp.fingerprint(&json!({"a": 1, "b": {"c": 2, "d": 3}})).unwrap();
        let b = fp.fingerprint(&json!({"b": {"d": 3, "c": 2}, "a": 1})).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn undeclared_array_order_matters() {
        let fp = Fingerprinter::new();
        let a = fp.fingerprint(&json!({"steps": ["mix", "bake"]})).unwrap();
        let b = fp.fingerprint(&json!({"steps": ["bake", "mix"]})).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wildcard_path_matches_array_elements() {
        let fp = Fingerprinter::new().order_insensitive("items.*.tags");
        let a = fp
            .fingerprint(&json!({"items": [{"tags": ["b", "a"]}, {"tags": [2, 1]}]}))
            .unwrap();
        let b = fp
            .fingerprint(&json!({"items": [{"tags": ["a", "b"]}, {"tags": [1, 2]}]}))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn canonical_text_is_sorted_and_compact() {
        let fp = Fingerprinter::new().order_insensitive("tags");
        let canonical = fp
            .canonicalize(&json!({"z": true, "a": null, "tags": ["y", "x"]}))
            .unwrap();
        assert_eq!(canonical.text, r#"{"a":null,"tags":["x","y"],"z":true}"#);
    }

    #[test]
    fn salt_changes_digest() {
        let req = json!({"q": "same"});
        let plain = Fingerprinter::new().fingerprint(&req).unwrap();
        let salted = Fingerprinter::new().salt("v2").fingerprint(&req).unwrap();
        assert_ne!(plain, salted);
    }

    #[test]
    fn fingerprint_is_hex_sha256() {
        let fp = Fingerprinter::new().fingerprint(&json!({})).unwrap();
        assert_eq!(fp.as_str().len(), 64);
        assert!(Fingerprint::parse(fp.as_str()).is_ok());
    }

    #[test]
    fn parse_rejects_non_hex() {
        assert!(Fingerprint::parse("../../etc/passwd").is_err());
        assert!(Fingerprint::parse(&"G".repeat(64)).is_err());
        assert!(Fingerprint::parse("abc").is_err());
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let mut value = json!("leaf");
        for _ in 0..(MAX_DEPTH + 2) {
            value = json!([value]);
        }
        let err = Fingerprinter::new().fingerprint(&value).unwrap_err();
        assert!(matches!(err, MuninnError::InvalidRequest(_)));
    }

    #[test]
    fn non_string_map_keys_are_rejected() {
        let mut map = std::collections::HashMap::new();
        map.insert((1, 2), "tuple key");
        let err = Fingerprinter::new().fingerprint(&map).unwrap_err();
        assert!(matches!(err, MuninnError::InvalidRequest(_)));
    }
}
