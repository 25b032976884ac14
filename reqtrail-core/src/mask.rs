//! Redaction and size limiting applied before anything is persisted.
//!
//! Masking is shallow: only top-level keys of an object are compared against
//! the configured names. A sensitive field nested under a non-masked key is
//! left as is.

use serde::Serialize;
use serde_json::{Value, json};

/// Replacement for every masked value.
pub const MASK: &str = "****";

/// Message carried by the oversized-body placeholder.
pub const BODY_TOO_LARGE: &str = "Body too large to log";

/// Redacts configured top-level keys from structured values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMasker {
    fields: Vec<String>,
}

impl FieldMasker {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Mask any serialisable value.
    ///
    /// The value is first converted to plain JSON. That conversion is lossy:
    /// anything serde cannot represent as JSON becomes `null`, so masking is
    /// only meaningful for plain data.
    pub fn mask<T: Serialize + ?Sized>(&self, value: &T) -> Value {
        match serde_json::to_value(value) {
            Ok(plain) => self.mask_owned(plain),
            Err(e) => {
                tracing::debug!(error = %e, "value not representable as JSON, dropping");
                Value::Null
            }
        }
    }

    /// Mask a JSON value, leaving the input untouched.
    ///
    /// Non-objects are returned as an identical copy.
    pub fn mask_value(&self, value: &Value) -> Value {
        self.mask_owned(value.clone())
    }

    fn mask_owned(&self, mut value: Value) -> Value {
        if let Value::Object(map) = &mut value {
            for field in &self.fields {
                if let Some(slot) = map.get_mut(field) {
                    *slot = Value::String(MASK.to_string());
                }
            }
        }
        value
    }
}

/// Replace `value` with a placeholder when its serialised UTF-8 length
/// exceeds `max_bytes`. All-or-nothing: the value is never partially cut.
pub fn limit_size(value: Value, max_bytes: usize) -> Value {
    let len = serde_json::to_string(&value).map(|s| s.len()).unwrap_or(0);
    if len > max_bytes {
        too_large_placeholder()
    } else {
        value
    }
}

/// The object logged in place of an oversized body.
pub fn too_large_placeholder() -> Value {
    json!({ "message": BODY_TOO_LARGE })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn defaults() -> FieldMasker {
        FieldMasker::new(["password", "token"])
    }

    // ── FieldMasker ──────────────────────────────────────────────

    #[test]
    fn password_is_masked_other_keys_kept() {
        let body = json!({ "username": "a", "password": "secret" });
        assert_eq!(defaults().mask_value(&body), json!({ "username": "a", "password": "****" }));
    }

    #[test]
    fn original_value_is_not_mutated() {
        let body = json!({ "token": "abc" });
        let masked = defaults().mask_value(&body);
        assert_eq!(body["token"], "abc");
        assert_eq!(masked["token"], MASK);
    }

    #[test]
    fn absent_keys_are_not_added() {
        let body = json!({ "username": "a" });
        assert_eq!(defaults().mask_value(&body), body);
    }

    #[test]
    fn masking_is_shallow() {
        let body = json!({ "user": { "password": "nested" }, "password": "top" });
        let masked = defaults().mask_value(&body);
        assert_eq!(masked["password"], MASK);
        assert_eq!(masked["user"]["password"], "nested");
    }

    #[test]
    fn non_objects_are_returned_unchanged() {
        let m = defaults();
        for v in [json!("password"), json!(42), json!(null), json!(["password", "token"])] {
            assert_eq!(m.mask_value(&v), v);
        }
    }

    #[test]
    fn masking_is_idempotent() {
        let m = defaults();
        let once = m.mask_value(&json!({ "password": "p", "token": "t", "x": 1 }));
        assert_eq!(m.mask_value(&once), once);
    }

    #[test]
    fn key_matching_is_case_sensitive() {
        let masked = defaults().mask_value(&json!({ "Password": "p" }));
        assert_eq!(masked["Password"], "p");
    }

    #[test]
    fn mask_accepts_any_serialisable_value() {
        let mut form = BTreeMap::new();
        form.insert("token", "t-1");
        form.insert("page", "2");
        assert_eq!(defaults().mask(&form), json!({ "token": "****", "page": "2" }));
    }

    #[test]
    fn unserialisable_value_becomes_null() {
        // Maps with non-string keys cannot be represented as JSON objects.
        let mut weird = BTreeMap::new();
        weird.insert(vec![1u8], "x");
        assert_eq!(defaults().mask(&weird), Value::Null);
    }

    // ── limit_size ───────────────────────────────────────────────

    #[test]
    fn value_at_threshold_is_kept() {
        let v = json!({ "a": "1234" }); // {"a":"1234"} = 12 bytes
        assert_eq!(limit_size(v.clone(), 12), v);
    }

    #[test]
    fn value_over_threshold_is_replaced_wholesale() {
        let v = json!({ "a": "12345" });
        assert_eq!(limit_size(v, 12), json!({ "message": "Body too large to log" }));
    }

    #[test]
    fn threshold_counts_utf8_bytes_not_chars() {
        let v = json!("éé"); // "éé" = 2 quotes + 4 bytes
        assert_eq!(limit_size(v.clone(), 6), v);
        assert_eq!(limit_size(v, 5), too_large_placeholder());
    }
}
