use chrono::{DateTime, Utc};
use dashmap::DashMap;
use model::uuid::OnlineDdlUuid;
use std::collections::HashSet;

/// In-memory set of migration uuids this executor currently drives. The
/// metadata store remains the source of truth; this set is advisory and
/// reconciled against the store on every tick.
#[derive(Debug, Default)]
pub struct OwnershipSet {
    owned: DashMap<OnlineDdlUuid, DateTime<Utc>>,
}

impl OwnershipSet {
    pub fn new() -> Self {
        OwnershipSet {
            owned: DashMap::new(),
        }
    }

    pub fn add(&self, uuid: &OnlineDdlUuid) {
        self.owned.insert(uuid.clone(), Utc::now());
    }

    pub fn remove(&self, uuid: &OnlineDdlUuid) {
        self.owned.remove(uuid);
    }

    pub fn contains(&self, uuid: &OnlineDdlUuid) -> bool {
        self.owned.contains_key(uuid)
    }

    pub fn uuids(&self) -> Vec<OnlineDdlUuid> {
        self.owned.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.owned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owned.is_empty()
    }

    /// Drops every uuid not present in `keep`: migrations that are neither
    /// running nor pending anymore do not belong to anyone.
    pub fn prune_except(&self, keep: &HashSet<OnlineDdlUuid>) {
        self.owned.retain(|uuid, _| keep.contains(uuid));
    }

    pub fn clear(&self) {
        self.owned.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_remove_contains() {
        let set = OwnershipSet::new();
        let uuid = OnlineDdlUuid::generate();
        assert!(!set.contains(&uuid));
        set.add(&uuid);
        assert!(set.contains(&uuid));
        assert_eq!(set.len(), 1);
        set.remove(&uuid);
        assert!(set.is_empty());
    }

    #[test]
    fn prune_keeps_only_listed() {
        let set = OwnershipSet::new();
        let keep_uuid = OnlineDdlUuid::generate();
        let drop_uuid = OnlineDdlUuid::generate();
        set.add(&keep_uuid);
        set.add(&drop_uuid);
        let keep: HashSet<OnlineDdlUuid> = [keep_uuid.clone()].into_iter().collect();
        set.prune_except(&keep);
        assert!(set.contains(&keep_uuid));
        assert!(!set.contains(&drop_uuid));
    }
}
