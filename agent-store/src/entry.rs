use serde::Serialize;
use serde_json::{Map, Value};

/// The dynamic-typed buffer entries from spec.md §9's REDESIGN FLAGS, modeled as a tagged
/// variant instead of heterogeneous create/update structs and bare delete strings.
///
/// `Full` carries at minimum `{name, uid, resourceVersion}` plus whatever kind-specific status
/// fields the watcher captured; `Name` is the best-effort bare-name fallback used when a Delete
/// arrives for an object the identity map never saw (spec.md invariant I2).
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Entry {
    Full(Value),
    Name(String),
}

impl Entry {
    /// Builds a `Full` entry, merging `name`/`uid`/`resourceVersion` into whatever
    /// kind-specific status fields are already present on `status`.
    pub fn full(name: &str, uid: &str, resource_version: &str, status: Value) -> Entry {
        let mut fields = match status {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        fields.insert("name".into(), Value::String(name.into()));
        fields.insert("uid".into(), Value::String(uid.into()));
        fields.insert("resourceVersion".into(), Value::String(resource_version.into()));
        Entry::Full(Value::Object(fields))
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Entry::Full(v) => v.get("name").and_then(Value::as_str),
            Entry::Name(n) => Some(n.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_entry_merges_identity_fields() {
        let entry = Entry::full("p1", "u1", "2", serde_json::json!({"phase": "Running"}));
        let Entry::Full(v) = &entry else { panic!("expected Full") };
        assert_eq!(v["name"], "p1");
        assert_eq!(v["uid"], "u1");
        assert_eq!(v["resourceVersion"], "2");
        assert_eq!(v["phase"], "Running");
    }

    #[test]
    fn test_name_entry_serializes_as_bare_string() {
        let entry = Entry::Name("ghost".into());
        assert_eq!(serde_json::to_value(&entry).unwrap(), serde_json::json!("ghost"));
    }

    #[test]
    fn test_name_accessor() {
        assert_eq!(Entry::Name("ghost".into()).name(), Some("ghost"));
        assert_eq!(Entry::full("p1", "u", "1", Value::Null).name(), Some("p1"));
    }
}
