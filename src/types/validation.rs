//! Output validation before anything is cached.
//!
//! A single explicit step between the generator and the write-through:
//! [`OutputValidator::validate`] turns raw generator output into a
//! [`Validation`], and only `Valid` payloads ever reach a cache tier.

use serde_json::Value;

/// Outcome of validating generator output.
#[derive(Debug, Clone, PartialEq)]
pub enum Validation {
    /// Payload is structurally complete and may be cached.
    Valid(Value),
    /// Payload is missing or partial; the reason is surfaced to the caller.
    Invalid(String),
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        matches!(self, Validation::Valid(_))
    }
}

/// Checks generator output for structural completeness.
pub trait OutputValidator: Send + Sync {
    fn validate(&self, payload: Option<Value>) -> Validation;
}

/// Default validator: the payload must exist and be non-empty, and every
/// declared primary collection must be present and non-empty.
///
/// Collections are named by dotted path (`"plan.days"`).
///
/// ```rust
/// # use muninn::{OutputValidator, StructuralValidator, Validation};
/// # use serde_json::json;
/// let validator = StructuralValidator::new().require_collection("meals");
/// assert!(validator.validate(Some(json!({"meals": ["oats"]}))).is_valid());
/// assert!(!validator.validate(Some(json!({"meals": []}))).is_valid());
/// ```
#[derive(Debug, Clone, Default)]
pub struct StructuralValidator {
    required_collections: Vec<String>,
}

impl StructuralValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require a non-empty array or object at `path`.
    pub fn require_collection(mut self, path: impl Into<String>) -> Self {
        self.required_collections.push(path.into());
        self
    }

    pub fn required_collections(&self) -> &[String] {
        &self.required_collections
    }
}

impl OutputValidator for StructuralValidator {
    fn validate(&self, payload: Option<Value>) -> Validation {
        let payload = match payload {
            None | Some(Value::Null) => {
                return Validation::Invalid("generator returned no payload".into());
            }
            Some(p) => p,
        };

        if is_empty(&payload) {
            return Validation::Invalid("generator returned an empty payload".into());
        }

        for path in &self.required_collections {
            match lookup(&payload, path) {
                None | Some(Value::Null) => {
                    return Validation::Invalid(format!("missing required collection `{path}`"));
                }
                Some(v @ (Value::Array(_) | Value::Object(_))) => {
                    if is_empty(v) {
                        return Validation::Invalid(format!(
                            "required collection `{path}` is empty"
                        ));
                    }
                }
                Some(_) => {
                    return Validation::Invalid(format!("`{path}` is not a collection"));
                }
            }
        }

        Validation::Valid(payload)
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::String(s) => s.trim().is_empty(),
        Value::Null => true,
        _ => false,
    }
}

fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|s| !s.is_empty())
        .try_fold(value, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}
