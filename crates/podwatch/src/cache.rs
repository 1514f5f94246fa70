use std::collections::{BTreeMap, HashSet};

use podwatch_model::{OwnerSummary, PodKey, RawPod, ResourceVersion};

/// Latest observed state of one pod
#[derive(Debug, Clone)]
pub struct PodRecord {
    pub pod: RawPod,
    pub version: ResourceVersion,
    pub owner: OwnerSummary,
    /// failed owner resolutions since the record was last replaced
    pub owner_retries: u32,
}

impl PodRecord {
    pub fn new(pod: RawPod, owner: OwnerSummary) -> Self {
        let version = ResourceVersion::parse(&pod.metadata.resource_version);
        Self {
            pod,
            version,
            owner,
            owner_retries: 0,
        }
    }
}

/// Every pod seen on a live namespace stream, matched or not
#[derive(Debug, Default)]
pub struct PodRecordCache {
    records: BTreeMap<PodKey, PodRecord>,
}

impl PodRecordCache {
    pub fn upsert(&mut self, key: PodKey, record: PodRecord) {
        self.records.insert(key, record);
    }

    pub fn get(&self, key: &PodKey) -> Option<&PodRecord> {
        self.records.get(key)
    }

    pub fn get_mut(&mut self, key: &PodKey) -> Option<&mut PodRecord> {
        self.records.get_mut(key)
    }

    pub fn remove(&mut self, key: &PodKey) -> Option<PodRecord> {
        self.records.remove(key)
    }

    pub fn keys(&self) -> Vec<PodKey> {
        self.records.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PodKey, &PodRecord)> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// drop every record in `namespace`, returning the evicted records
    pub fn evict_namespace(&mut self, namespace: &str) -> Vec<(PodKey, PodRecord)> {
        self.evict_where(|key| key.namespace == namespace)
    }

    /// drop records in `namespace` whose uid is not in `live`
    pub fn retain_live(
        &mut self,
        namespace: &str,
        live: &HashSet<String>,
    ) -> Vec<(PodKey, PodRecord)> {
        self.evict_where(|key| key.namespace == namespace && !live.contains(&key.uid))
    }

    fn evict_where<F>(&mut self, predicate: F) -> Vec<(PodKey, PodRecord)>
    where
        F: Fn(&PodKey) -> bool,
    {
        let keys: Vec<PodKey> = self
            .records
            .keys()
            .filter(|key| predicate(key))
            .cloned()
            .collect();
        keys.into_iter()
            .filter_map(|key| self.records.remove(&key).map(|record| (key, record)))
            .collect()
    }

    /// records whose owner chain could not be resolved yet and that have
    /// been retried fewer than `retry_limit` times
    pub fn unknown_owners(&self, retry_limit: u32) -> Vec<(PodKey, RawPod)> {
        self.records
            .iter()
            .filter(|(_, record)| record.owner.is_unknown() && record.owner_retries < retry_limit)
            .map(|(key, record)| (key.clone(), record.pod.clone()))
            .collect()
    }
}

#[cfg(test)]
mod test {
    use podwatch_model::fixture::PodBuilder;

    use super::*;

    fn insert(cache: &mut PodRecordCache, builder: PodBuilder, owner: OwnerSummary) -> PodKey {
        let pod = builder.build();
        let key = PodKey::of(&pod);
        cache.upsert(key.clone(), PodRecord::new(pod, owner));
        key
    }

    #[test]
    fn test_record_version() {
        let pod = PodBuilder::new("a").with_resource_version("12").build();
        let record = PodRecord::new(pod, OwnerSummary::NoOwner);
        assert_eq!(record.version, ResourceVersion::Numeric(12));
    }

    #[test]
    fn test_evict_namespace() {
        let mut cache = PodRecordCache::default();
        insert(&mut cache, PodBuilder::new("a"), OwnerSummary::NoOwner);
        let kept = insert(
            &mut cache,
            PodBuilder::new("b").with_namespace("dev"),
            OwnerSummary::NoOwner,
        );

        let evicted = cache.evict_namespace("default");
        assert_eq!(evicted.len(), 1);
        assert_eq!(cache.keys(), vec![kept]);
    }

    #[test]
    fn test_retain_live() {
        let mut cache = PodRecordCache::default();
        let live = insert(&mut cache, PodBuilder::new("a"), OwnerSummary::NoOwner);
        let gone = insert(&mut cache, PodBuilder::new("b"), OwnerSummary::NoOwner);
        let other_ns = insert(
            &mut cache,
            PodBuilder::new("c").with_namespace("dev"),
            OwnerSummary::NoOwner,
        );

        let live_uids: HashSet<String> = [live.uid.clone()].into_iter().collect();
        let evicted = cache.retain_live("default", &live_uids);
        let evicted_keys: Vec<PodKey> = evicted.into_iter().map(|(key, _)| key).collect();
        assert_eq!(evicted_keys, vec![gone]);
        assert!(cache.get(&live).is_some());
        assert!(cache.get(&other_ns).is_some());
    }

    #[test]
    fn test_unknown_owners() {
        let mut cache = PodRecordCache::default();
        insert(&mut cache, PodBuilder::new("a"), OwnerSummary::NoOwner);
        let unknown = insert(&mut cache, PodBuilder::new("b"), OwnerSummary::Unknown);

        let pending = cache.unknown_owners(3);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].0, unknown);

        cache.get_mut(&unknown).expect("record").owner_retries = 3;
        assert!(cache.unknown_owners(3).is_empty());
    }
}
