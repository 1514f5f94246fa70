use std::collections::{BTreeSet, HashSet};

use tracing::{debug, trace};

use podwatch_model::{
    OwnerSummary, PodChangeAction, PodKey, PodWatchEvent, StoreSnapshot, WatchEventKind,
};
use podwatch_types::{ManifestName, Namespace};

use crate::cache::{PodRecord, PodRecordCache};
use crate::dedup::{Admission, DispatchMemory};
use crate::matcher::match_pod;
use crate::normalize::PodNormalizer;
use crate::registry::ManifestTargetRegistry;

#[derive(Debug, Default)]
pub struct RebuildOutcome {
    pub removed: Vec<ManifestName>,
    pub namespaces: BTreeSet<Namespace>,
}

/// Registry, pod cache and dispatch memory of one watcher instance.
///
/// All three are mutated together under one lock by the watcher; this type
/// itself does no locking and no io.
#[derive(Debug)]
pub struct WatcherState {
    default_namespace: Namespace,
    registry: ManifestTargetRegistry,
    cache: PodRecordCache,
    memory: DispatchMemory,
}

impl WatcherState {
    pub fn new(default_namespace: impl Into<Namespace>) -> Self {
        Self {
            default_namespace: default_namespace.into(),
            registry: ManifestTargetRegistry::default(),
            cache: PodRecordCache::default(),
            memory: DispatchMemory::default(),
        }
    }

    pub fn registry(&self) -> &ManifestTargetRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &PodRecordCache {
        &self.cache
    }

    pub fn memory(&self) -> &DispatchMemory {
        &self.memory
    }

    pub fn namespaces(&self) -> BTreeSet<Namespace> {
        self.registry.namespaces(&self.default_namespace)
    }

    /// swap in the registry for `snapshot` and forget what was dispatched for removed manifests
    pub fn rebuild(&mut self, snapshot: &StoreSnapshot) -> RebuildOutcome {
        let removed = self.registry.rebuild(snapshot);
        for manifest in &removed {
            debug!(%manifest, "manifest removed, purging dispatch memory");
            self.memory.purge_manifest(manifest);
        }

        RebuildOutcome {
            removed,
            namespaces: self.namespaces(),
        }
    }

    pub fn cached_owner(&self, key: &PodKey) -> Option<OwnerSummary> {
        self.cache.get(key).map(|record| record.owner.clone())
    }

    /// Record a watch event and return the action to dispatch, if any.
    /// Deleted pods are evaluated one last time and then evicted.
    pub fn apply_event(
        &mut self,
        event: PodWatchEvent,
        owner: OwnerSummary,
        normalizer: &dyn PodNormalizer,
    ) -> Option<PodChangeAction> {
        let key = event.key();
        let deleting = event.kind == WatchEventKind::Deleted;
        let record = PodRecord::new(event.pod, owner);

        let action = evaluate(
            &self.registry,
            &mut self.memory,
            &record,
            deleting,
            normalizer,
        );

        if deleting {
            trace!(%key, "pod deleted, evicting record");
            self.cache.remove(&key);
            self.memory.forget_pod(&key.uid);
        } else {
            self.cache.upsert(key, record);
        }
        action
    }

    /// re-evaluate every cached pod against the current registry
    pub fn replay(&mut self, normalizer: &dyn PodNormalizer) -> Vec<PodChangeAction> {
        let mut actions = vec![];
        for (_, record) in self.cache.iter() {
            if let Some(action) =
                evaluate(&self.registry, &mut self.memory, record, false, normalizer)
            {
                actions.push(action);
            }
        }
        debug!(
            cached = self.cache.len(),
            dispatched = actions.len(),
            "replayed pod cache"
        );
        actions
    }

    /// store a late owner resolution, unless the record moved on meanwhile
    pub fn update_owner(&mut self, key: &PodKey, resource_version: &str, owner: OwnerSummary) {
        if let Some(record) = self.cache.get_mut(key) {
            if record.pod.metadata.resource_version == resource_version {
                record.owner = owner;
            }
        }
    }

    /// count a failed late resolution against the record
    pub fn note_owner_retry(&mut self, key: &PodKey) {
        if let Some(record) = self.cache.get_mut(key) {
            record.owner_retries += 1;
        }
    }

    /// Namespace is no longer watched. Its records and their dispatch memory are
    /// dropped; reopening the namespace relists and dispatches current state.
    pub fn evict_namespace(&mut self, namespace: &str) -> usize {
        let evicted = self.cache.evict_namespace(namespace);
        for (key, _) in &evicted {
            self.memory.forget_pod(&key.uid);
        }
        evicted.len()
    }

    /// Relist of `namespace` returned `live`; anything else was deleted while
    /// disconnected. Matched pods among them are reported as deleting.
    pub fn retain_live(
        &mut self,
        namespace: &str,
        live: &HashSet<String>,
        normalizer: &dyn PodNormalizer,
    ) -> Vec<PodChangeAction> {
        let mut actions = vec![];
        for (key, record) in self.cache.retain_live(namespace, live) {
            let meta = &record.pod.metadata;
            if let Some(matched) = match_pod(&self.registry, &record.owner, &meta.labels) {
                trace!(pod = %meta.name, manifest = matched.manifest, "pod gone from relist");
                actions.push(PodChangeAction::new(
                    matched.manifest,
                    normalizer.normalize(&record.pod, &record.owner, true),
                ));
            }
            self.memory.forget_pod(&key.uid);
        }
        actions
    }
}

fn evaluate(
    registry: &ManifestTargetRegistry,
    memory: &mut DispatchMemory,
    record: &PodRecord,
    deleting: bool,
    normalizer: &dyn PodNormalizer,
) -> Option<PodChangeAction> {
    let meta = &record.pod.metadata;
    let Some(matched) = match_pod(registry, &record.owner, &meta.labels) else {
        trace!(pod = %meta.name, "pod matches no manifest");
        return None;
    };

    match memory.admit(matched.manifest, &meta.uid, &meta.resource_version) {
        Admission::Accept => {
            trace!(pod = %meta.name, manifest = matched.manifest, kind = ?matched.kind, version = %meta.resource_version, "pod admitted");
            Some(PodChangeAction::new(
                matched.manifest,
                normalizer.normalize(&record.pod, &record.owner, deleting),
            ))
        }
        Admission::Drop => None,
    }
}

#[cfg(test)]
mod test {
    use podwatch_model::fixture::PodBuilder;
    use podwatch_model::{LabelSelector, ManifestSnapshot, ObjectRef, RawPod};

    use crate::normalize::DefaultPodNormalizer;

    use super::*;

    fn modified(pod: RawPod) -> PodWatchEvent {
        PodWatchEvent::new(WatchEventKind::Modified, pod)
    }

    fn owned_by(builder: &PodBuilder) -> OwnerSummary {
        OwnerSummary::Resolved(builder.deployment_ref())
    }

    fn with_entity(name: &str, entity: ObjectRef) -> StoreSnapshot {
        StoreSnapshot::new(vec![
            ManifestSnapshot::new(name).with_deployed_entities(vec![entity]),
        ])
    }

    #[test]
    fn test_versions_compared_numerically() {
        let mut state = WatcherState::new("default");
        let builder = PodBuilder::new("server");
        state.rebuild(&with_entity("server", builder.deployment_ref()));

        let first = builder.clone().with_resource_version("9").build();
        let second = builder.clone().with_resource_version("10").build();

        let a = state.apply_event(modified(first), owned_by(&builder), &DefaultPodNormalizer);
        let b = state.apply_event(modified(second), owned_by(&builder), &DefaultPodNormalizer);
        assert_eq!(a.expect("9").pod.resource_version, "9");
        assert_eq!(b.expect("10").pod.resource_version, "10");
    }

    #[test]
    fn test_duplicate_dropped() {
        let mut state = WatcherState::new("default");
        let builder = PodBuilder::new("server");
        state.rebuild(&with_entity("server", builder.deployment_ref()));

        let pod = builder.build();
        assert!(
            state
                .apply_event(modified(pod.clone()), owned_by(&builder), &DefaultPodNormalizer)
                .is_some()
        );
        assert!(
            state
                .apply_event(modified(pod), owned_by(&builder), &DefaultPodNormalizer)
                .is_none()
        );
        assert!(state.replay(&DefaultPodNormalizer).is_empty());
    }

    #[test]
    fn test_replay_after_entity_appears() {
        let mut state = WatcherState::new("default");
        let builder = PodBuilder::new("server");
        state.rebuild(&StoreSnapshot::new(vec![ManifestSnapshot::new("server")]));

        let action =
            state.apply_event(modified(builder.build()), owned_by(&builder), &DefaultPodNormalizer);
        assert!(action.is_none());
        assert_eq!(state.cache().len(), 1);

        state.rebuild(&with_entity("server", builder.deployment_ref()));
        let actions = state.replay(&DefaultPodNormalizer);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].manifest_name, "server");

        assert!(state.replay(&DefaultPodNormalizer).is_empty());
    }

    #[test]
    fn test_readd_redispatches() {
        let mut state = WatcherState::new("default");
        let builder = PodBuilder::new("server");
        let snapshot = with_entity("server", builder.deployment_ref());
        state.rebuild(&snapshot);
        assert!(
            state
                .apply_event(modified(builder.build()), owned_by(&builder), &DefaultPodNormalizer)
                .is_some()
        );

        let outcome = state.rebuild(&StoreSnapshot::default());
        assert_eq!(outcome.removed, vec!["server".to_owned()]);
        assert!(state.memory().is_empty());
        assert!(state.replay(&DefaultPodNormalizer).is_empty());

        state.rebuild(&snapshot);
        assert_eq!(state.replay(&DefaultPodNormalizer).len(), 1);
    }

    #[test]
    fn test_selector_replacement_is_total() {
        let mut state = WatcherState::new("default");
        state.rebuild(&StoreSnapshot::new(vec![
            ManifestSnapshot::new("a")
                .with_selectors(vec![LabelSelector::new_labels(vec![("foo", "bar")])]),
        ]));
        state.rebuild(&StoreSnapshot::new(vec![
            ManifestSnapshot::new("b")
                .with_selectors(vec![LabelSelector::new_labels(vec![("baz", "quu")])]),
        ]));

        let foo = PodBuilder::new("b")
            .with_pod_id("foo")
            .with_pod_label("foo", "bar")
            .build();
        let baz = PodBuilder::new("b")
            .with_pod_id("baz")
            .with_pod_label("baz", "quu")
            .build();

        assert!(
            state
                .apply_event(modified(foo), OwnerSummary::Unknown, &DefaultPodNormalizer)
                .is_none()
        );
        let action = state
            .apply_event(modified(baz), OwnerSummary::Unknown, &DefaultPodNormalizer)
            .expect("baz");
        assert_eq!(action.manifest_name, "b");
    }

    #[test]
    fn test_delete_evicts_record() {
        let mut state = WatcherState::new("default");
        let builder = PodBuilder::new("server");
        state.rebuild(&with_entity("server", builder.deployment_ref()));

        state.apply_event(
            modified(builder.clone().with_resource_version("1").build()),
            owned_by(&builder),
            &DefaultPodNormalizer,
        );
        let action = state
            .apply_event(
                PodWatchEvent::new(
                    WatchEventKind::Deleted,
                    builder.clone().with_resource_version("2").build(),
                ),
                owned_by(&builder),
                &DefaultPodNormalizer,
            )
            .expect("delete dispatched");

        assert!(action.pod.deleting);
        assert!(state.cache().is_empty());
        assert!(state.memory().is_empty());
    }

    #[test]
    fn test_late_owner_resolution() {
        let mut state = WatcherState::new("default");
        let builder = PodBuilder::new("server");
        state.rebuild(&with_entity("server", builder.deployment_ref()));

        let pod = builder.build();
        let key = PodKey::of(&pod);
        assert!(
            state
                .apply_event(modified(pod), OwnerSummary::Unknown, &DefaultPodNormalizer)
                .is_none()
        );

        state.update_owner(&key, "2", owned_by(&builder));
        assert_eq!(state.cached_owner(&key), Some(OwnerSummary::Unknown));

        state.update_owner(&key, "1", owned_by(&builder));
        assert_eq!(state.replay(&DefaultPodNormalizer).len(), 1);
    }

    #[test]
    fn test_retain_live_reports_deleting() {
        let mut state = WatcherState::new("default");
        let builder = PodBuilder::new("server");
        state.rebuild(&with_entity("server", builder.deployment_ref()));
        state.apply_event(modified(builder.build()), owned_by(&builder), &DefaultPodNormalizer);
        state.apply_event(
            modified(PodBuilder::new("stray").without_owner().build()),
            OwnerSummary::NoOwner,
            &DefaultPodNormalizer,
        );

        let actions = state.retain_live("default", &HashSet::new(), &DefaultPodNormalizer);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].manifest_name, "server");
        assert_eq!(actions[0].pod.resource_version, "1");
        assert!(actions[0].pod.deleting);
        assert!(state.cache().is_empty());
        assert!(state.memory().is_empty());
    }

    #[test]
    fn test_evict_namespace_forgets_memory() {
        let mut state = WatcherState::new("default");
        let builder = PodBuilder::new("api").with_namespace("dev");
        state.rebuild(&with_entity("api", builder.deployment_ref()));
        state.apply_event(modified(builder.build()), owned_by(&builder), &DefaultPodNormalizer);
        assert_eq!(state.memory().len(), 1);

        assert_eq!(state.evict_namespace("default"), 0);
        assert_eq!(state.memory().len(), 1);
        assert_eq!(state.evict_namespace("dev"), 1);
        assert!(state.cache().is_empty());
        assert!(state.memory().is_empty());
    }

    #[test]
    fn test_owner_retries_counted() {
        let mut state = WatcherState::new("default");
        let pod = PodBuilder::new("server").build();
        let key = PodKey::of(&pod);
        state.apply_event(modified(pod), OwnerSummary::Unknown, &DefaultPodNormalizer);

        state.note_owner_retry(&key);
        state.note_owner_retry(&key);
        assert_eq!(state.cache().unknown_owners(3).len(), 1);
        state.note_owner_retry(&key);
        assert!(state.cache().unknown_owners(3).is_empty());
    }
}
