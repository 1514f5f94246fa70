//! In-memory cluster, for tests and for running without an api server.
//!
//! Each namespace keeps its pods, a monotonic revision and a log of every
//! event. Watch cursors are revisions; `compact` drops the log so older
//! cursors expire and watchers have to relist.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_channel::{Sender, unbounded};
use async_lock::{Mutex, RwLock};
use async_trait::async_trait;
use futures_util::StreamExt;
use tracing::{debug, trace};

use k8_types::{K8List, ListMetadata, ObjectMeta, Spec};
use k8_types::core::pod::PodSpec;

use podwatch_model::{
    LabelSelector, ObjectRef, PodWatchEvent, RawPod, WatchEventKind,
};

use crate::client::{
    ObjectLookup, PodList, PodWatchClient, PodWatchStream, WatchError, WatchStreamResult,
};

struct WatchSender {
    selector: Option<LabelSelector>,
    sender: Sender<WatchStreamResult>,
}

impl WatchSender {
    fn selects(&self, pod: &RawPod) -> bool {
        self.selector
            .as_ref()
            .is_none_or(|selector| selector.matches(&pod.metadata.labels))
    }
}

#[derive(Default)]
struct NamespaceStore {
    revision: u64,
    compacted: u64,
    pods: BTreeMap<String, RawPod>,
    log: Vec<(u64, PodWatchEvent)>,
    watchers: Vec<WatchSender>,
}

impl NamespaceStore {
    fn record(&mut self, kind: WatchEventKind, pod: RawPod) -> u64 {
        self.revision += 1;
        let event = PodWatchEvent::new(kind, pod).with_cursor(self.revision.to_string());

        self.watchers.retain(|watcher| {
            if !watcher.selects(&event.pod) {
                return !watcher.sender.is_closed();
            }
            watcher.sender.try_send(Ok(vec![event.clone()])).is_ok()
        });
        self.log.push((self.revision, event));
        self.revision
    }
}

#[derive(Default)]
pub struct MemoryPodClient {
    namespaces: Mutex<HashMap<String, NamespaceStore>>,
    entities: RwLock<HashMap<String, (String, ObjectMeta)>>,
    watch_failures: AtomicUsize,
    list_calls: AtomicUsize,
    watch_calls: AtomicUsize,
}

impl MemoryPodClient {
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// create or update a pod, returning the revision of the event
    pub async fn emit_pod(&self, pod: RawPod) -> u64 {
        let mut namespaces = self.namespaces.lock().await;
        let store = namespaces
            .entry(pod.metadata.namespace.clone())
            .or_default();

        let kind = if store
            .pods
            .insert(pod.metadata.uid.clone(), pod.clone())
            .is_some()
        {
            WatchEventKind::Modified
        } else {
            WatchEventKind::Added
        };
        trace!(pod = %pod.metadata.name, ?kind, "memory emit");
        store.record(kind, pod)
    }

    /// delete a pod; `pod` is its final state as carried by the delete event
    pub async fn delete_pod(&self, pod: RawPod) -> Option<u64> {
        let mut namespaces = self.namespaces.lock().await;
        let store = namespaces.get_mut(&pod.metadata.namespace)?;
        store.pods.remove(&pod.metadata.uid)?;
        Some(store.record(WatchEventKind::Deleted, pod))
    }

    /// forget the event log of `namespace`; cursors before now expire
    pub async fn compact(&self, namespace: &str) {
        let mut namespaces = self.namespaces.lock().await;
        let store = namespaces.entry(namespace.to_owned()).or_default();
        store.compacted = store.revision;
        store.log.clear();
        debug!(namespace, revision = store.revision, "memory compacted");
    }

    /// end every live stream of `namespace`
    pub async fn disconnect_watches(&self, namespace: &str) {
        let mut namespaces = self.namespaces.lock().await;
        if let Some(store) = namespaces.get_mut(namespace) {
            debug!(namespace, watchers = store.watchers.len(), "memory disconnect");
            store.watchers.clear();
        }
    }

    pub async fn active_watches(&self, namespace: &str) -> usize {
        let namespaces = self.namespaces.lock().await;
        namespaces
            .get(namespace)
            .map(|store| {
                store
                    .watchers
                    .iter()
                    .filter(|watcher| !watcher.sender.is_closed())
                    .count()
            })
            .unwrap_or(0)
    }

    /// the next `count` watch calls fail with a transient error
    pub fn fail_next_watches(&self, count: usize) {
        self.watch_failures.store(count, Ordering::SeqCst);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn watch_calls(&self) -> usize {
        self.watch_calls.load(Ordering::SeqCst)
    }

    pub async fn inject_entity(&self, kind: impl Into<String>, meta: ObjectMeta) {
        let mut entities = self.entities.write().await;
        entities.insert(meta.uid.clone(), (kind.into(), meta));
    }

    pub async fn inject_entities(&self, objects: Vec<(String, ObjectMeta)>) {
        for (kind, meta) in objects {
            self.inject_entity(kind, meta).await;
        }
    }

    pub async fn clear_entities(&self) {
        self.entities.write().await.clear();
    }

    fn take_watch_failure(&self) -> bool {
        self.watch_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl PodWatchClient for MemoryPodClient {
    async fn list_pods(
        &self,
        namespace: &str,
        selector: Option<&LabelSelector>,
    ) -> Result<PodList, WatchError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let namespaces = self.namespaces.lock().await;
        let (items, revision) = match namespaces.get(namespace) {
            Some(store) => (
                store
                    .pods
                    .values()
                    .filter(|pod| selector.is_none_or(|s| s.matches(&pod.metadata.labels)))
                    .cloned()
                    .collect(),
                store.revision,
            ),
            None => (vec![], 0),
        };

        Ok(K8List {
            api_version: PodSpec::api_version(),
            kind: PodSpec::kind(),
            metadata: ListMetadata {
                _continue: None,
                resource_version: revision.to_string(),
            },
            items,
        })
    }

    async fn watch_pods_since(
        &self,
        namespace: &str,
        selector: Option<&LabelSelector>,
        resource_version: Option<String>,
    ) -> Result<PodWatchStream, WatchError> {
        self.watch_calls.fetch_add(1, Ordering::SeqCst);
        if self.take_watch_failure() {
            return Err(WatchError::Transient("injected watch failure".to_owned()));
        }

        let mut namespaces = self.namespaces.lock().await;
        let store = namespaces.entry(namespace.to_owned()).or_default();

        let since = match resource_version {
            Some(version) => match version.parse::<u64>() {
                Ok(since) if since >= store.compacted => since,
                _ => return Err(WatchError::Expired(version)),
            },
            None => store.revision,
        };

        let (sender, receiver) = unbounded();
        let watcher = WatchSender {
            selector: selector.cloned(),
            sender,
        };

        let backlog: Vec<PodWatchEvent> = store
            .log
            .iter()
            .filter(|(revision, event)| *revision > since && watcher.selects(&event.pod))
            .map(|(_, event)| event.clone())
            .collect();
        trace!(namespace, since, backlog = backlog.len(), "memory watch");
        if !backlog.is_empty() && watcher.sender.try_send(Ok(backlog)).is_err() {
            return Err(WatchError::Disconnected);
        }
        store.watchers.push(watcher);

        Ok(receiver.boxed())
    }
}

#[async_trait]
impl ObjectLookup for MemoryPodClient {
    async fn object_meta(&self, object: &ObjectRef) -> Result<ObjectMeta, WatchError> {
        let entities = self.entities.read().await;
        let found = if object.uid.is_empty() {
            entities
                .values()
                .find(|(kind, meta)| ObjectRef::from_meta(kind.as_str(), meta).same_object(object))
        } else {
            entities.get(&object.uid)
        };

        found
            .map(|(_, meta)| meta.clone())
            .ok_or_else(|| WatchError::NotFound(object.clone()))
    }
}
