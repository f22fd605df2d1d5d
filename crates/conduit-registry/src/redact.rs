//! Credential redaction over configuration documents.
//!
//! Configuration documents are arbitrary JSON. Nested objects are walked
//! depth-first; every other value (string, number, bool, null, array) is a
//! leaf. A leaf's path is its parent's path plus `.` plus its key, so the
//! field `password` under `tunnel` is addressed as `tunnel.password`.
//!
//! * [`mask_credentials`] replaces every credential leaf with [`MASK_SENTINEL`].
//! * [`strip_masked_credentials`] removes every credential leaf whose value is
//!   exactly the sentinel, so that a subsequent [`merge_patch`] keeps the
//!   stored secret.

use serde_json::{Map, Value};

/// Placeholder shown in place of a credential value.
pub const MASK_SENTINEL: &str = "*****MASK*****";

/// Replace every credential leaf with [`MASK_SENTINEL`].
///
/// Objects are never replaced: a credential-classified object is descended
/// into so its own credential leaves are masked individually.
pub fn mask_credentials<F>(config: &mut Value, is_credential: &F)
where
    F: Fn(&str) -> bool + ?Sized,
{
    if let Value::Object(map) = config {
        mask_map(map, "", is_credential);
    }
}

fn mask_map<F>(map: &mut Map<String, Value>, prefix: &str, is_credential: &F)
where
    F: Fn(&str) -> bool + ?Sized,
{
    for (k, v) in map.iter_mut() {
        let key = format!("{prefix}{k}");
        match v {
            Value::Object(child) => mask_map(child, &format!("{key}."), is_credential),
            leaf => {
                if is_credential(&key) {
                    *leaf = Value::String(MASK_SENTINEL.to_string());
                }
            }
        }
    }
}

/// Remove every credential leaf whose value is exactly [`MASK_SENTINEL`].
///
/// Credential leaves holding any other value are kept: the caller supplied
/// a new secret.
pub fn strip_masked_credentials<F>(config: &mut Value, is_credential: &F)
where
    F: Fn(&str) -> bool + ?Sized,
{
    if let Value::Object(map) = config {
        strip_map(map, "", is_credential);
    }
}

fn strip_map<F>(map: &mut Map<String, Value>, prefix: &str, is_credential: &F)
where
    F: Fn(&str) -> bool + ?Sized,
{
    map.retain(|k, v| {
        let key = format!("{prefix}{k}");
        if let Value::Object(child) = v {
            strip_map(child, &format!("{key}."), is_credential);
            return true;
        }
        !(is_credential(&key) && v.as_str() == Some(MASK_SENTINEL))
    });
}

/// Apply a JSON merge patch (RFC 7386) to `target`.
///
/// Object members in `patch` are merged recursively, `null` members delete
/// the key, and any other value replaces the target outright.
pub fn merge_patch(target: &mut Value, patch: Value) {
    let Value::Object(patch) = patch else {
        *target = patch;
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(map) = target {
        for (k, v) in patch {
            if v.is_null() {
                map.remove(&k);
            } else {
                merge_patch(map.entry(k).or_insert(Value::Null), v);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn creds(path: &str) -> bool {
        matches!(path, "password" | "tunnel.private_key" | "api.token")
    }

    #[test]
    fn test_mask_top_level_and_nested() {
        let mut doc = json!({
            "host": "db.internal",
            "password": "hunter2",
            "tunnel": {"user": "ops", "private_key": "-----BEGIN"}
        });
        mask_credentials(&mut doc, &creds);
        assert_eq!(
            doc,
            json!({
                "host": "db.internal",
                "password": MASK_SENTINEL,
                "tunnel": {"user": "ops", "private_key": MASK_SENTINEL}
            })
        );
    }

    #[test]
    fn test_mask_uses_dotted_paths() {
        // `private_key` at the top level is not a credential; only the nested one is.
        let mut doc = json!({"private_key": "visible", "tunnel": {"private_key": "secret"}});
        mask_credentials(&mut doc, &creds);
        assert_eq!(doc["private_key"], "visible");
        assert_eq!(doc["tunnel"]["private_key"], MASK_SENTINEL);
    }

    #[test]
    fn test_mask_is_idempotent() {
        let mut once = json!({"password": "x", "api": {"token": "t", "url": "u"}});
        mask_credentials(&mut once, &creds);
        let mut twice = once.clone();
        mask_credentials(&mut twice, &creds);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_mask_non_string_leaf() {
        let mut doc = json!({"password": 1234, "api": {"token": ["a", "b"]}});
        mask_credentials(&mut doc, &creds);
        assert_eq!(doc["password"], MASK_SENTINEL);
        assert_eq!(doc["api"]["token"], MASK_SENTINEL);
    }

    #[test]
    fn test_mask_credential_object_is_descended() {
        let is_cred = |p: &str| p == "api" || p == "api.token";
        let mut doc = json!({"api": {"token": "t", "url": "u"}});
        mask_credentials(&mut doc, &is_cred);
        assert_eq!(doc, json!({"api": {"token": MASK_SENTINEL, "url": "u"}}));
    }

    #[test]
    fn test_mask_non_object_document_untouched() {
        let mut doc = json!("password");
        mask_credentials(&mut doc, &creds);
        assert_eq!(doc, json!("password"));
    }

    #[test]
    fn test_strip_after_mask_removes_exactly_credentials() {
        let mut doc = json!({
            "host": "h",
            "password": "p",
            "tunnel": {"user": "ops", "private_key": "k"}
        });
        mask_credentials(&mut doc, &creds);
        strip_masked_credentials(&mut doc, &creds);
        assert_eq!(doc, json!({"host": "h", "tunnel": {"user": "ops"}}));
    }

    #[test]
    fn test_strip_keeps_edited_secret() {
        let mut doc = json!({"password": "new-secret", "api": {"token": MASK_SENTINEL}});
        strip_masked_credentials(&mut doc, &creds);
        assert_eq!(doc, json!({"password": "new-secret", "api": {}}));
    }

    #[test]
    fn test_strip_keeps_sentinel_on_non_credential() {
        let mut doc = json!({"host": MASK_SENTINEL});
        strip_masked_credentials(&mut doc, &creds);
        assert_eq!(doc, json!({"host": MASK_SENTINEL}));
    }

    #[test]
    fn test_merge_patch_keeps_untouched_secret() {
        let mut stored = json!({"host": "old", "password": "s3cret", "tunnel": {"user": "a"}});
        let mut incoming = json!({"host": "new", "password": MASK_SENTINEL, "tunnel": {"user": "b"}});
        strip_masked_credentials(&mut incoming, &creds);
        merge_patch(&mut stored, incoming);
        assert_eq!(
            stored,
            json!({"host": "new", "password": "s3cret", "tunnel": {"user": "b"}})
        );
    }

    #[test]
    fn test_merge_patch_null_deletes() {
        let mut stored = json!({"a": 1, "b": {"c": 2, "d": 3}});
        merge_patch(&mut stored, json!({"a": null, "b": {"d": null, "e": 4}}));
        assert_eq!(stored, json!({"b": {"c": 2, "e": 4}}));
    }

    #[test]
    fn test_merge_patch_non_object_replaces() {
        let mut stored = json!({"a": 1});
        merge_patch(&mut stored, json!([1, 2]));
        assert_eq!(stored, json!([1, 2]));

        let mut scalar = json!("x");
        merge_patch(&mut scalar, json!({"a": 1}));
        assert_eq!(scalar, json!({"a": 1}));
    }
}
