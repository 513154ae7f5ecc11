//! `IdempotencyRecord` and the request-fingerprinting it depends on
//! (`spec.md` §3, §4.3 step 1).

use crate::ids::TenantId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Minimum/maximum accepted length of an `Idempotency-Key` header value,
/// per `spec.md` §4.3 preconditions.
pub const KEY_MIN_LEN: usize = 8;
/// See [`KEY_MIN_LEN`].
pub const KEY_MAX_LEN: usize = 128;

/// Validate an idempotency key's length. Does not check character set; any
/// opaque token the caller supplies is accepted as long as it fits the bound.
#[must_use]
pub fn is_valid_key(key: &str) -> bool {
    (KEY_MIN_LEN..=KEY_MAX_LEN).contains(&key.len())
}

/// Canonicalize a JSON request body (sort object keys recursively) and return
/// its SHA-256 digest, hex-encoded.
///
/// Canonicalization prevents two semantically-identical bodies that differ
/// only in key order from being treated as different fingerprints, and is
/// exactly what `spec.md` §4.3 step 1 requires: "SHA-256 over the
/// canonicalized (sorted-keys) request body".
#[must_use]
pub fn request_fingerprint(body: &serde_json::Value) -> String {
    let canonical = canonicalize(body);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn canonicalize(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let parts: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{:?}:{}", k, canonicalize(&map[k])))
                .collect();
            format!("{{{}}}", parts.join(","))
        }
        serde_json::Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(canonicalize).collect();
            format!("[{}]", parts.join(","))
        }
        other => other.to_string(),
    }
}

/// Lifecycle state of an [`IdempotencyRecord`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdempotencyStatus {
    /// Row just inserted; the owning request hasn't finished yet.
    InProgress,
    /// The owning request completed successfully; `response_json` is
    /// replayable verbatim.
    Succeeded,
    /// The owning request failed; the recorded error is replayed verbatim
    /// until `expires_at`.
    Failed,
}

impl IdempotencyStatus {
    /// Stable string stored in `idempotency_keys.status`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    /// Parse the stable string back into a variant, defaulting to
    /// `InProgress` for anything unrecognized (the row's own `CHECK`
    /// constraint never lets an unknown value in).
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "succeeded" => Self::Succeeded,
            "failed" => Self::Failed,
            _ => Self::InProgress,
        }
    }
}

/// `(tenant, key) -> {request_fingerprint, response, status, expires_at}`,
/// per `spec.md` §3.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Caller-supplied key.
    pub key: String,
    /// SHA-256 of the canonicalized request body that first claimed this key.
    pub request_sha256: String,
    /// Current lifecycle state.
    pub status: IdempotencyStatus,
    /// The serialized success response, once `status == Succeeded`.
    pub response_json: Option<serde_json::Value>,
    /// The stable error code, once `status == Failed`.
    pub error_code: Option<String>,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// When this record may be purged; drives replay availability.
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_length_bounds() {
        assert!(!is_valid_key("short"));
        assert!(is_valid_key("exactly8"));
        assert!(is_valid_key(&"a".repeat(128)));
        assert!(!is_valid_key(&"a".repeat(129)));
    }

    #[test]
    fn fingerprint_is_stable_under_key_reordering() {
        let a = serde_json::json!({"b": 1, "a": 2});
        let b = serde_json::json!({"a": 2, "b": 1});
        assert_eq!(request_fingerprint(&a), request_fingerprint(&b));
    }

    #[test]
    fn fingerprint_differs_on_value_change() {
        let a = serde_json::json!({"a": 1});
        let b = serde_json::json!({"a": 2});
        assert_ne!(request_fingerprint(&a), request_fingerprint(&b));
    }

    #[test]
    fn fingerprint_is_stable_under_nested_key_reordering() {
        let a = serde_json::json!({"outer": {"x": 1, "y": 2}, "z": [1, 2]});
        let b = serde_json::json!({"z": [1, 2], "outer": {"y": 2, "x": 1}});
        assert_eq!(request_fingerprint(&a), request_fingerprint(&b));
    }
}
