use std::collections::HashMap;

use serde_json::Value;

/// One watcher's private view of the objects it currently believes exist (spec.md §3 "Identity
/// map (per kind)"). Each kind watcher owns exactly one of these and is its only writer, so no
/// locking is needed (spec.md §5 "Shared-resource policy").
#[derive(Default)]
pub struct IdentityMap {
    next_slot: u64,
    by_name: HashMap<String, IdentityEntry>,
}

pub struct IdentityEntry {
    pub slot_id: u64,
    pub value: Value,
}

impl IdentityMap {
    pub fn new() -> IdentityMap {
        IdentityMap::default()
    }

    /// Stores `value` under `name` and returns the freshly assigned slot id.
    pub fn insert(&mut self, name: String, value: Value) -> u64 {
        let slot_id = self.next_slot;
        self.next_slot += 1;
        self.by_name.insert(name, IdentityEntry { slot_id, value });
        slot_id
    }

    /// Looks a stored entry up by `name`, falling back to `generate_name` when `name` misses —
    /// the original's node identity lookup tries both candidate keys before giving up.
    pub fn get(&self, name: &str, generate_name: Option<&str>) -> Option<&IdentityEntry> {
        self.by_name.get(name).or_else(|| generate_name.and_then(|g| self.by_name.get(g)))
    }

    /// Overwrites the stored value for whichever of `name`/`generate_name` is already present,
    /// keeping its slot id. Returns `None` (no match) when neither key is known, leaving the
    /// caller to treat the event as an Add instead.
    pub fn update(&mut self, name: &str, generate_name: Option<&str>, value: Value) -> Option<u64> {
        let key = if self.by_name.contains_key(name) {
            Some(name.to_string())
        } else {
            generate_name.filter(|g| self.by_name.contains_key(*g)).map(|g| g.to_string())
        }?;

        let entry = self.by_name.get_mut(&key).expect("key just confirmed present");
        entry.value = value;
        Some(entry.slot_id)
    }

    /// Removes whichever of `name`/`generate_name` is known, returning `None` when the delete is
    /// best-effort against an object the map never saw (spec.md invariant I2).
    pub fn remove(&mut self, name: &str, generate_name: Option<&str>) -> Option<IdentityEntry> {
        if let Some(entry) = self.by_name.remove(name) {
            return Some(entry);
        }
        generate_name.and_then(|g| self.by_name.remove(g))
    }

    /// Snapshot of every currently known key, used by the relist-diff on stream restart to figure
    /// out which previously-seen objects dropped out of the new list.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.by_name.len()
    }
}

#[cfg(test)]
mod tests {
    use assertables::*;

    use super::*;

    #[test]
    fn test_insert_then_get_by_name() {
        let mut map = IdentityMap::new();
        map.insert("n1".into(), serde_json::json!({"phase": "Ready"}));
        let entry = map.get("n1", None);
        assert_some!(entry);
        assert_eq!(entry.unwrap().value["phase"], "Ready");
    }

    #[test]
    fn test_get_falls_back_to_generate_name() {
        let mut map = IdentityMap::new();
        map.insert("generated-abc123".into(), serde_json::json!({}));
        assert_some!(map.get("generated-abc123", None));
        assert_some!(map.get("missing", Some("generated-abc123")));
        assert_none!(map.get("missing", Some("also-missing")));
    }

    #[test]
    fn test_update_keeps_slot_id_and_returns_none_when_unknown() {
        let mut map = IdentityMap::new();
        let slot = map.insert("n1".into(), serde_json::json!({"phase": "Pending"}));

        let updated_slot = map.update("n1", None, serde_json::json!({"phase": "Ready"}));
        assert_some!(updated_slot);
        assert_eq!(updated_slot.unwrap(), slot);
        assert_eq!(map.get("n1", None).unwrap().value["phase"], "Ready");

        assert_none!(map.update("ghost", None, serde_json::json!({})));
    }

    #[test]
    fn test_remove_is_best_effort() {
        let mut map = IdentityMap::new();
        map.insert("n1".into(), serde_json::json!({}));

        assert_none!(map.remove("ghost", None));
        assert_some!(map.remove("n1", None));
        assert_eq!(map.len(), 0);
    }
}
