use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Upstream provider routing preferences (order, fallbacks, data policy, ...)
///
/// Stored as an ordered map so the canonical signature does not depend on
/// insertion order. Later layers replace earlier ones key by key: global
/// defaults, then tenant overrides, then the request itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderPreferences(BTreeMap<String, Value>);

impl ProviderPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a single preference
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Whether no preference is set; `null` entries count as unset
    pub fn is_empty(&self) -> bool {
        self.0.values().all(Value::is_null)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Overlay `overrides` on top of `self`; override keys win
    ///
    /// An override set to `null` removes the key instead of storing it.
    #[must_use]
    pub fn merged_with(&self, overrides: &Self) -> Self {
        let mut merged = self.0.clone();
        for (key, value) in &overrides.0 {
            if value.is_null() {
                merged.remove(key);
            } else {
                merged.insert(key.clone(), value.clone());
            }
        }
        merged.retain(|_, value| !value.is_null());
        Self(merged)
    }

    /// Canonical, order-independent JSON signature used in cache keys
    ///
    /// Nested objects are key-sorted and `null` entries are dropped, so two
    /// preference tables that mean the same thing produce the same signature.
    pub fn signature(&self) -> String {
        let canonical: BTreeMap<&String, Value> = self
            .0
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k, canonicalize(v)))
            .collect();
        serde_json::to_string(&canonical).unwrap_or_default()
    }

    /// As a JSON object for upstream payloads
    pub fn to_value(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

impl FromIterator<(String, Value)> for ProviderPreferences {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> = map
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, canonicalize(v)))
                .collect();
            Value::Object(sorted.into_iter().map(|(k, v)| (k.clone(), v)).collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn signature_ignores_insertion_order() {
        let a = ProviderPreferences::new()
            .with("order", json!(["anthropic", "openai"]))
            .with("allow_fallbacks", false);
        let b = ProviderPreferences::new()
            .with("allow_fallbacks", false)
            .with("order", json!(["anthropic", "openai"]));

        assert_eq!(a.signature(), b.signature());
    }

    #[test]
    fn signature_distinguishes_values() {
        let a = ProviderPreferences::new().with("order", json!(["anthropic"]));
        let b = ProviderPreferences::new().with("order", json!(["openai"]));
        assert_ne!(a.signature(), b.signature());
    }

    #[test]
    fn null_entries_do_not_change_signature() {
        let a = ProviderPreferences::new().with("data_collection", "deny");
        let b = a.clone().with("quantizations", Value::Null);
        assert_eq!(a.signature(), b.signature());
    }

    #[test]
    fn overrides_replace_keys() {
        let base = ProviderPreferences::new()
            .with("allow_fallbacks", true)
            .with("data_collection", "allow");
        let overrides = ProviderPreferences::new().with("allow_fallbacks", false);

        let merged = base.merged_with(&overrides);
        assert_eq!(merged.get("allow_fallbacks"), Some(&json!(false)));
        assert_eq!(merged.get("data_collection"), Some(&json!("allow")));
    }

    #[test]
    fn null_override_removes_key() {
        let base = ProviderPreferences::new()
            .with("data_collection", "deny")
            .with("sort", "price");
        let overrides = ProviderPreferences::new().with("data_collection", Value::Null);

        let merged = base.merged_with(&overrides);
        assert_eq!(merged.get("data_collection"), None);
        assert_eq!(merged.to_value(), json!({"sort": "price"}));

        let cleared = merged.merged_with(&ProviderPreferences::new().with("sort", Value::Null));
        assert!(cleared.is_empty());
        assert_eq!(cleared.to_value(), json!({}));
    }
}
