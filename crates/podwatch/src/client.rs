//! Capabilities consumed from the cluster api.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use thiserror::Error;

use k8_types::{K8List, ObjectMeta};
use k8_types::core::pod::PodSpec;

use podwatch_model::{LabelSelector, ObjectRef, PodWatchEvent};

pub type SharedClient<C> = Arc<C>;

pub type PodList = K8List<PodSpec>;

/// one batch of events off a watch stream
pub type WatchStreamResult = Result<Vec<PodWatchEvent>, WatchError>;

pub type PodWatchStream = BoxStream<'static, WatchStreamResult>;

#[derive(Debug, Error)]
pub enum WatchError {
    /// cursor is too old to resume from, caller must relist
    #[error("resource version {0} has expired")]
    Expired(String),
    #[error("watch stream disconnected")]
    Disconnected,
    #[error("object not found: {0}")]
    NotFound(ObjectRef),
    #[error("owner chain of {object} deeper than {depth}")]
    OwnerChainTooDeep { object: ObjectRef, depth: usize },
    #[error("transient error: {0}")]
    Transient(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WatchError {
    pub fn is_expired(&self) -> bool {
        matches!(self, Self::Expired(_))
    }
}

/// Pod list and watch against one namespace
#[async_trait]
pub trait PodWatchClient: Send + Sync {
    /// current state of every pod in the namespace, with the version to resume watching from
    async fn list_pods(
        &self,
        namespace: &str,
        selector: Option<&LabelSelector>,
    ) -> Result<PodList, WatchError>;

    /// stream of pod events after `resource_version`, or from now if none is given.
    /// Returns `WatchError::Expired` when the version can no longer be resumed.
    async fn watch_pods_since(
        &self,
        namespace: &str,
        selector: Option<&LabelSelector>,
        resource_version: Option<String>,
    ) -> Result<PodWatchStream, WatchError>;
}

/// Fetch metadata of arbitrary objects, used to walk owner chains
#[async_trait]
pub trait ObjectLookup: Send + Sync {
    async fn object_meta(&self, object: &ObjectRef) -> Result<ObjectMeta, WatchError>;
}
