//! Per-namespace watch workers.
//!
//! Every required namespace gets one worker task that lists the namespace,
//! then follows its watch stream, reconnecting from the last cursor with
//! capped exponential backoff. An expired cursor forces a relist.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use adaptive_backoff::prelude::{Backoff, ExponentialBackoff};
use async_lock::Mutex;
use futures_util::StreamExt;
use tracing::{debug, error, instrument, trace, warn};

use fluvio_future::task::spawn;
use fluvio_future::timer::sleep;

use podwatch_model::{LabelSelector, PodWatchEvent, WatchEventKind};
use podwatch_types::Namespace;
use podwatch_types::event::StickyEvent;

use crate::client::{PodWatchClient, SharedClient, WatchError};
use crate::config::PodWatchConfig;
use crate::watcher::WatchContext;

struct Subscription {
    stop: Arc<StickyEvent>,
}

/// Keeps exactly one live worker per required namespace
pub(crate) struct WatchSubscriptionManager<C> {
    client: SharedClient<C>,
    ctx: Arc<WatchContext>,
    config: PodWatchConfig,
    subscriptions: Mutex<BTreeMap<Namespace, Subscription>>,
}

impl<C> WatchSubscriptionManager<C>
where
    C: PodWatchClient + 'static,
{
    pub(crate) fn new(client: SharedClient<C>, ctx: Arc<WatchContext>, config: PodWatchConfig) -> Self {
        Self {
            client,
            ctx,
            config,
            subscriptions: Mutex::new(BTreeMap::new()),
        }
    }

    /// open workers for new namespaces and close the ones no longer required
    pub(crate) async fn sync(&self, required: &BTreeSet<Namespace>) {
        let mut subscriptions = self.subscriptions.lock().await;

        let released: Vec<Namespace> = subscriptions
            .keys()
            .filter(|namespace| !required.contains(*namespace))
            .cloned()
            .collect();
        for namespace in released {
            if let Some(subscription) = subscriptions.remove(&namespace) {
                subscription.stop.notify();
            }
            let evicted = self.ctx.evict_namespace(&namespace).await;
            debug!(%namespace, evicted, "closed namespace subscription");
        }

        if self.ctx.is_shutdown() {
            return;
        }

        for namespace in required {
            if subscriptions.contains_key(namespace) {
                continue;
            }
            let stop = StickyEvent::shared();
            NamespaceWatcher::start(
                namespace.clone(),
                self.client.clone(),
                self.ctx.clone(),
                &self.config,
                stop.clone(),
            );
            debug!(%namespace, "opened namespace subscription");
            subscriptions.insert(namespace.clone(), Subscription { stop });
        }
    }

    pub(crate) async fn close_all(&self) {
        let mut subscriptions = self.subscriptions.lock().await;
        for (namespace, subscription) in std::mem::take(&mut *subscriptions) {
            trace!(%namespace, "stopping worker");
            subscription.stop.notify();
        }
    }

    pub(crate) async fn namespaces(&self) -> BTreeSet<Namespace> {
        self.subscriptions.lock().await.keys().cloned().collect()
    }
}

struct NamespaceWatcher<C> {
    namespace: Namespace,
    client: SharedClient<C>,
    ctx: Arc<WatchContext>,
    config: PodWatchConfig,
    selector: Option<LabelSelector>,
    stop: Arc<StickyEvent>,
    cursor: Option<String>,
    needs_relist: bool,
}

impl<C> NamespaceWatcher<C>
where
    C: PodWatchClient + 'static,
{
    fn start(
        namespace: Namespace,
        client: SharedClient<C>,
        ctx: Arc<WatchContext>,
        config: &PodWatchConfig,
        stop: Arc<StickyEvent>,
    ) {
        let watcher = Self {
            namespace,
            client,
            ctx,
            selector: config.label_selector.clone(),
            config: config.clone(),
            stop,
            cursor: None,
            needs_relist: true,
        };

        spawn(watcher.outer_loop());
    }

    fn is_stopped(&self) -> bool {
        self.stop.is_set() || self.ctx.is_shutdown()
    }

    #[instrument(skip(self), fields(namespace = %self.namespace))]
    async fn outer_loop(mut self) {
        let mut backoff = match self.config.create_backoff() {
            Ok(backoff) => backoff,
            Err(err) => {
                error!(%err, "unable to create reconnect backoff");
                return;
            }
        };

        debug!("starting namespace watcher");
        while !self.is_stopped() {
            match self.inner_loop(&mut backoff).await {
                Ok(()) => break,
                Err(err) if err.is_expired() && !self.needs_relist => {
                    debug!(%err, "watch cursor expired, relisting");
                    self.needs_relist = true;
                }
                Err(err) => {
                    let wait = backoff.wait();
                    warn!(%err, ?wait, "pod watch failed, reconnecting");
                    if !self.sleep_unless_stopped(wait).await {
                        break;
                    }
                }
            }
        }
        debug!("namespace watcher stopped");
    }

    /// Follow one watch stream until it ends.
    /// `Ok` means the worker was asked to stop.
    async fn inner_loop(&mut self, backoff: &mut ExponentialBackoff) -> Result<(), WatchError> {
        use tokio::select;

        if self.needs_relist {
            self.relist().await?;
            if self.is_stopped() {
                return Ok(());
            }
        }

        let mut stream = self
            .client
            .watch_pods_since(&self.namespace, self.selector.as_ref(), self.cursor.clone())
            .await?;
        self.needs_relist = false;
        debug!(cursor = ?self.cursor, "watching pods");

        let stop = self.stop.clone();
        let shutdown = self.ctx.shutdown_token();

        loop {
            select! {
                _ = stop.listen() => {
                    debug!("subscription closed");
                    return Ok(());
                },

                _ = shutdown.listen() => {
                    debug!("watcher shut down");
                    return Ok(());
                },

                item = stream.next() => {
                    match item {
                        Some(Ok(events)) => {
                            trace!(events = events.len(), "received pod events");
                            backoff.reset();
                            for event in events {
                                if !event.resource_version.is_empty() {
                                    self.cursor = Some(event.resource_version.clone());
                                }
                                if !self.ctx.process_event(event, &stop).await {
                                    return Ok(());
                                }
                            }
                        }
                        Some(Err(err)) => return Err(err),
                        None => return Err(WatchError::Disconnected),
                    }
                }
            }
        }
    }

    /// feed every listed pod as an update, then drop records of pods that are gone
    async fn relist(&mut self) -> Result<(), WatchError> {
        let list = self
            .client
            .list_pods(&self.namespace, self.selector.as_ref())
            .await?;
        let version = list.metadata.resource_version;
        debug!(pods = list.items.len(), %version, "relisted namespace");

        let mut live = HashSet::new();
        for pod in list.items {
            live.insert(pod.metadata.uid.clone());
            let event = PodWatchEvent::new(WatchEventKind::Modified, pod).with_cursor(version.clone());
            if !self.ctx.process_event(event, &self.stop).await {
                return Ok(());
            }
        }
        self.ctx.retain_live(&self.namespace, &live, &self.stop).await;

        self.cursor = (!version.is_empty()).then_some(version);
        Ok(())
    }

    /// false if stopped while waiting
    async fn sleep_unless_stopped(&self, wait: Duration) -> bool {
        use tokio::select;

        let shutdown = self.ctx.shutdown_token();
        select! {
            _ = sleep(wait) => true,
            _ = self.stop.listen() => false,
            _ = shutdown.listen() => false,
        }
    }
}
