//! Typed caches of the registry resources
//!
//! Each cache keeps the last object seen per key, fed by a ResourceCache.
//! Keys are `namespace/name`, or the bare name of an object without a
//! namespace. Local writes go through the same ordered queues as informer
//! events.

use crate::informer::{object_key, InformerFactory};
use crate::resource_cache::{
    CacheConfig, CachedResource, ResourceCache, StopHandle, DEFAULT_QUEUE_CAPACITY,
};
use nsm_api::v1;
use nsm_core::Result;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Change applied to an object cache
#[derive(Clone, Debug, PartialEq)]
pub enum CacheEvent<K> {
    Added(K),
    Updated(K),
    Deleted(String),
}

pub type Listener<K> = Arc<dyn Fn(&CacheEvent<K>) + Send + Sync>;

type Store<K> = Arc<RwLock<HashMap<String, K>>>;

pub struct ObjectCache<K> {
    cache: ResourceCache<K>,
    store: Store<K>,
}

pub type NetworkServiceEndpointCache = ObjectCache<v1::NetworkServiceEndpoint>;
pub type NetworkServiceCache = ObjectCache<v1::NetworkService>;
pub type NetworkServiceManagerCache = ObjectCache<v1::NetworkServiceManager>;

impl<K: CachedResource> ObjectCache<K> {
    pub fn new() -> Self {
        Self::with_listener(DEFAULT_QUEUE_CAPACITY, None)
    }

    /// Cache whose listener is called after each change is applied
    pub fn with_listener(queue_capacity: usize, listener: Option<Listener<K>>) -> Self {
        let store: Store<K> = Arc::new(RwLock::new(HashMap::new()));

        let (added, updated, deleted) = (store.clone(), store.clone(), store.clone());
        let (on_added, on_updated, on_deleted) = (listener.clone(), listener.clone(), listener);
        let config = CacheConfig::<K>::new()
            .queue_capacity(queue_capacity)
            .on_added(move |obj: K| {
                let key = object_key(&obj);
                debug!("{} {} added to cache", K::kind(&()), key);
                added
                    .write()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(key, obj.clone());
                notify(&on_added, CacheEvent::Added(obj));
            })
            .on_updated(move |obj: K| {
                let key = object_key(&obj);
                debug!("{} {} updated in cache", K::kind(&()), key);
                updated
                    .write()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(key, obj.clone());
                notify(&on_updated, CacheEvent::Updated(obj));
            })
            .on_deleted(move |key: String| {
                debug!("{} {} deleted from cache", K::kind(&()), key);
                deleted
                    .write()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(&key);
                notify(&on_deleted, CacheEvent::Deleted(key));
            });

        Self {
            cache: ResourceCache::new(config),
            store,
        }
    }

    pub fn start(&self, informers: &dyn InformerFactory) -> Result<StopHandle> {
        self.cache.start(informers)
    }

    pub fn get(&self, key: &str) -> Option<K> {
        self.store
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    pub fn list(&self) -> Vec<K> {
        self.store
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.store.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record a locally created object
    pub async fn add(&self, obj: K) {
        self.cache.add(obj).await
    }

    pub async fn delete(&self, key: &str) {
        self.cache.delete(key.to_string()).await
    }
}

impl<K: CachedResource> Default for ObjectCache<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectCache<v1::NetworkServiceEndpoint> {
    /// Cached endpoints implementing the given network service
    pub fn endpoints_for_service(&self, network_service: &str) -> Vec<v1::NetworkServiceEndpoint> {
        self.store
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|nse| nse.spec.network_service_name == network_service)
            .cloned()
            .collect()
    }
}

fn notify<K>(listener: &Option<Listener<K>>, event: CacheEvent<K>) {
    if let Some(listener) = listener {
        listener(&event);
    }
}
