use std::collections::HashMap;
use std::sync::Arc;

use async_lock::Mutex;
use async_trait::async_trait;
use tracing::{debug, trace};

use podwatch_model::ObjectRef;
use podwatch_model::object::controller_owner;

use crate::client::{ObjectLookup, WatchError};

/// Resolves an object to the root controller of its owner chain
#[async_trait]
pub trait OwnerResolver: Send + Sync {
    async fn resolve_owner_chain(&self, object: &ObjectRef) -> Result<ObjectRef, WatchError>;
}

/// Walks owner references through an [`ObjectLookup`], caching roots by uid.
pub struct OwnerFetcher<L> {
    lookup: Arc<L>,
    max_depth: usize,
    capacity: usize,
    cache: Mutex<HashMap<String, ObjectRef>>,
}

impl<L> OwnerFetcher<L>
where
    L: ObjectLookup,
{
    pub fn new(lookup: Arc<L>, max_depth: usize, capacity: usize) -> Self {
        Self {
            lookup,
            max_depth,
            capacity,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn shared(lookup: Arc<L>, max_depth: usize, capacity: usize) -> Arc<Self> {
        Arc::new(Self::new(lookup, max_depth, capacity))
    }

    pub async fn cached_len(&self) -> usize {
        self.cache.lock().await.len()
    }

    async fn cached_root(&self, object: &ObjectRef) -> Option<ObjectRef> {
        if object.uid.is_empty() {
            return None;
        }
        self.cache.lock().await.get(&object.uid).cloned()
    }

    async fn remember(&self, visited: Vec<String>, root: &ObjectRef) {
        let mut cache = self.cache.lock().await;
        if cache.len() + visited.len() > self.capacity {
            debug!(entries = cache.len(), "owner cache full, clearing");
            cache.clear();
        }
        for uid in visited {
            cache.insert(uid, root.clone());
        }
    }
}

#[async_trait]
impl<L> OwnerResolver for OwnerFetcher<L>
where
    L: ObjectLookup,
{
    async fn resolve_owner_chain(&self, object: &ObjectRef) -> Result<ObjectRef, WatchError> {
        if let Some(root) = self.cached_root(object).await {
            trace!(%object, %root, "owner cache hit");
            return Ok(root);
        }

        let mut visited = vec![];
        let mut current = object.clone();
        for _ in 0..self.max_depth {
            let meta = self.lookup.object_meta(&current).await?;
            if !meta.uid.is_empty() {
                visited.push(meta.uid.clone());
            }

            match controller_owner(&meta) {
                Some(owner) => {
                    let next = ObjectRef::from_owner(owner, &meta.namespace);
                    if let Some(root) = self.cached_root(&next).await {
                        self.remember(visited, &root).await;
                        return Ok(root);
                    }
                    trace!(from = %current, to = %next, "following owner");
                    current = next;
                }
                None => {
                    let root = ObjectRef::from_meta(current.kind.clone(), &meta);
                    debug!(%object, %root, "resolved owner chain");
                    self.remember(visited, &root).await;
                    return Ok(root);
                }
            }
        }

        Err(WatchError::OwnerChainTooDeep {
            object: object.clone(),
            depth: self.max_depth,
        })
    }
}
