use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use async_lock::Mutex;
use tracing::{debug, instrument, trace, warn};

use podwatch_model::object::controller_owner;
use podwatch_model::{
    ObjectRef, OwnerSummary, PodWatchEvent, RawPod, SnapshotSource, StoreSnapshot,
    WatchEventKind,
};
use podwatch_types::Namespace;
use podwatch_types::event::StickyEvent;

use crate::client::{PodWatchClient, SharedClient};
use crate::config::{ConfigError, PodWatchConfig};
use crate::dispatcher::ActionSink;
use crate::normalize::{DefaultPodNormalizer, PodNormalizer};
use crate::owner::OwnerResolver;
use crate::state::WatcherState;
use crate::subscription::WatchSubscriptionManager;

/// State and collaborators shared by the reconcile trigger and every namespace worker
pub(crate) struct WatchContext {
    state: Mutex<WatcherState>,
    owners: Arc<dyn OwnerResolver>,
    normalizer: Arc<dyn PodNormalizer>,
    sink: Arc<dyn ActionSink>,
    shutdown: Arc<StickyEvent>,
    owner_retry_limit: u32,
}

impl WatchContext {
    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.is_set()
    }

    pub(crate) fn shutdown_token(&self) -> Arc<StickyEvent> {
        self.shutdown.clone()
    }

    async fn resolve_owner(&self, pod: &RawPod) -> OwnerSummary {
        let Some(owner) = controller_owner(&pod.metadata) else {
            return OwnerSummary::NoOwner;
        };

        let start = ObjectRef::from_owner(owner, &pod.metadata.namespace);
        match self.owners.resolve_owner_chain(&start).await {
            Ok(root) => OwnerSummary::Resolved(root),
            Err(err) => {
                warn!(pod = %pod.metadata.name, %err, "owner resolution failed, matching by selector only");
                OwnerSummary::Unknown
            }
        }
    }

    /// Run one event through cache, match and dedup, dispatching the result.
    /// Returns false once `stop` has fired; nothing is recorded after that.
    pub(crate) async fn process_event(&self, event: PodWatchEvent, stop: &StickyEvent) -> bool {
        let key = event.key();
        let cached = self.state.lock().await.cached_owner(&key);

        // owner refs of a pod are fixed once set; deleted pods may no longer resolve
        let owner = match cached {
            Some(owner @ OwnerSummary::Resolved(_)) => owner,
            Some(owner) if event.kind == WatchEventKind::Deleted => owner,
            _ => self.resolve_owner(&event.pod).await,
        };

        let mut state = self.state.lock().await;
        if stop.is_set() || self.is_shutdown() {
            trace!(%key, "worker stopped, dropping event");
            return false;
        }

        trace!(%key, kind = ?event.kind, version = %event.pod.metadata.resource_version, "processing pod event");
        if let Some(action) = state.apply_event(event, owner, self.normalizer.as_ref()) {
            self.sink.dispatch(action);
        }
        true
    }

    /// evict pods missing from a relist, reporting the matched ones as deleting
    pub(crate) async fn retain_live(&self, namespace: &str, live: &HashSet<String>, stop: &StickyEvent) {
        let mut state = self.state.lock().await;
        if stop.is_set() || self.is_shutdown() {
            return;
        }
        let deleted = state.retain_live(namespace, live, self.normalizer.as_ref());
        if !deleted.is_empty() {
            debug!(namespace, deleted = deleted.len(), "pods deleted while disconnected");
        }
        for action in deleted {
            self.sink.dispatch(action);
        }
    }

    pub(crate) async fn evict_namespace(&self, namespace: &str) -> usize {
        self.state.lock().await.evict_namespace(namespace)
    }

    async fn rebuild(&self, snapshot: &StoreSnapshot) -> BTreeSet<Namespace> {
        self.state.lock().await.rebuild(snapshot).namespaces
    }

    /// Give records with an unknown owner another chance before replay.
    /// A record stops being retried after `owner_retry_limit` failures; its
    /// next watch event resolves the owner afresh.
    async fn retry_unknown_owners(&self) {
        let pending = self
            .state
            .lock()
            .await
            .cache()
            .unknown_owners(self.owner_retry_limit);
        if pending.is_empty() {
            return;
        }

        debug!(pending = pending.len(), "retrying owner resolution");
        for (key, pod) in pending {
            let owner = self.resolve_owner(&pod).await;
            let mut state = self.state.lock().await;
            if owner.is_unknown() {
                state.note_owner_retry(&key);
            } else {
                state.update_owner(&key, &pod.metadata.resource_version, owner);
            }
        }
    }

    async fn replay(&self) {
        let mut state = self.state.lock().await;
        if self.is_shutdown() {
            return;
        }
        for action in state.replay(self.normalizer.as_ref()) {
            self.sink.dispatch(action);
        }
    }
}

/// Correlates pods with manifests and forwards their updates to an [`ActionSink`].
///
/// Call [`PodWatcher::on_change`] from the store's control loop whenever the
/// manifest state changes. The watcher opens one watch per namespace the
/// manifests need, plus the configured default namespace, and replays every
/// cached pod against the new state. Dropping the watcher or calling
/// [`PodWatcher::shutdown`] stops every worker.
pub struct PodWatcher<C> {
    ctx: Arc<WatchContext>,
    subscriptions: WatchSubscriptionManager<C>,
}

impl<C> PodWatcher<C>
where
    C: PodWatchClient + 'static,
{
    pub fn new(
        config: PodWatchConfig,
        client: SharedClient<C>,
        owners: Arc<dyn OwnerResolver>,
        sink: Arc<dyn ActionSink>,
    ) -> Result<Self, ConfigError> {
        Self::new_with_normalizer(config, client, owners, sink, Arc::new(DefaultPodNormalizer))
    }

    pub fn new_with_normalizer(
        config: PodWatchConfig,
        client: SharedClient<C>,
        owners: Arc<dyn OwnerResolver>,
        sink: Arc<dyn ActionSink>,
        normalizer: Arc<dyn PodNormalizer>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let ctx = Arc::new(WatchContext {
            state: Mutex::new(WatcherState::new(config.default_namespace.clone())),
            owners,
            normalizer,
            sink,
            shutdown: StickyEvent::shared(),
            owner_retry_limit: config.owner_retry_limit,
        });
        let subscriptions = WatchSubscriptionManager::new(client, ctx.clone(), config);

        Ok(Self { ctx, subscriptions })
    }

    /// Reconcile against the latest store state: rebuild the registry, adjust
    /// namespace subscriptions and replay cached pods. No-op after shutdown.
    #[instrument(skip_all)]
    pub async fn on_change<S>(&self, source: &S)
    where
        S: SnapshotSource + ?Sized,
    {
        if self.ctx.is_shutdown() {
            trace!("watcher shut down, ignoring change");
            return;
        }

        let snapshot = source.manifest_snapshot();
        let namespaces = self.ctx.rebuild(&snapshot).await;
        self.subscriptions.sync(&namespaces).await;
        self.ctx.retry_unknown_owners().await;
        self.ctx.replay().await;
        debug!(
            manifests = snapshot.manifests.len(),
            namespaces = namespaces.len(),
            "reconciled"
        );
    }

    pub async fn shutdown(&self) {
        debug!("shutting down pod watcher");
        self.ctx.shutdown.notify();
        self.subscriptions.close_all().await;
    }

    pub fn is_shutdown(&self) -> bool {
        self.ctx.is_shutdown()
    }

    /// namespaces with an open subscription
    pub async fn namespaces(&self) -> BTreeSet<Namespace> {
        self.subscriptions.namespaces().await
    }

    pub async fn cached_pods(&self) -> usize {
        self.ctx.state.lock().await.cache().len()
    }
}

impl<C> Drop for PodWatcher<C> {
    fn drop(&mut self) {
        self.ctx.shutdown.notify();
    }
}
