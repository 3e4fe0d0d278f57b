//! ResourceCache bridges an informer into an ordered stream of hook calls
//!
//! Informer callbacks arrive concurrently. The cache pushes them onto three
//! bounded queues (add, update, delete) and a single consumer thread applies
//! the configured hooks one at a time. A full queue suspends the informer,
//! so a slow consumer throttles the watch instead of losing events.

use crate::informer::{object_key, InformerFactory, ResourceEventHandler};
use async_trait::async_trait;
use kube::api::DynamicObject;
use kube::{Resource, ResourceExt};
use nsm_core::{CoreError, Result};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Capacity of each event queue unless configured otherwise
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// Resources a cache can be specialised for
pub trait CachedResource:
    Resource<DynamicType = ()> + Clone + Debug + DeserializeOwned + Send + Sync + 'static
{
}

impl<K> CachedResource for K where
    K: Resource<DynamicType = ()> + Clone + Debug + DeserializeOwned + Send + Sync + 'static
{
}

pub type KeyFn<K> = Arc<dyn Fn(&K) -> String + Send + Sync>;
pub type ResourceHook<K> = Arc<dyn Fn(K) + Send + Sync>;
pub type DeleteHook = Arc<dyn Fn(String) + Send + Sync>;

/// Configuration of one cache instance.
///
/// Hooks run on the cache's own consumer thread. A hook that never returns
/// stalls every event kind of this cache but no other cache. Unset hooks
/// discard their events.
pub struct CacheConfig<K> {
    /// Resource kind used to resolve the informer
    resource: String,
    key_fn: KeyFn<K>,
    resource_added: Option<ResourceHook<K>>,
    resource_updated: Option<ResourceHook<K>>,
    resource_deleted: Option<DeleteHook>,
    queue_capacity: usize,
}

impl<K: CachedResource> CacheConfig<K> {
    /// Config keyed by `namespace/name`, resolving the informer by the
    /// resource plural of `K`, with no hooks
    pub fn new() -> Self {
        Self {
            resource: K::plural(&()).to_string(),
            key_fn: Arc::new(|obj: &K| object_key(obj)),
            resource_added: None,
            resource_updated: None,
            resource_deleted: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    pub fn for_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = resource.into();
        self
    }

    pub fn key_fn(mut self, f: impl Fn(&K) -> String + Send + Sync + 'static) -> Self {
        self.key_fn = Arc::new(f);
        self
    }

    pub fn on_added(mut self, f: impl Fn(K) + Send + Sync + 'static) -> Self {
        self.resource_added = Some(Arc::new(f));
        self
    }

    pub fn on_updated(mut self, f: impl Fn(K) + Send + Sync + 'static) -> Self {
        self.resource_updated = Some(Arc::new(f));
        self
    }

    pub fn on_deleted(mut self, f: impl Fn(String) + Send + Sync + 'static) -> Self {
        self.resource_deleted = Some(Arc::new(f));
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn capacity(&self) -> usize {
        self.queue_capacity
    }
}

impl<K: CachedResource> Default for CacheConfig<K> {
    fn default() -> Self {
        Self::new()
    }
}

struct Queues<K> {
    add_rx: mpsc::Receiver<K>,
    update_rx: mpsc::Receiver<K>,
    delete_rx: mpsc::Receiver<String>,
}

struct Inner<K> {
    config: CacheConfig<K>,
    add_tx: mpsc::Sender<K>,
    update_tx: mpsc::Sender<K>,
    delete_tx: mpsc::Sender<String>,
    // taken by the consumer on start
    queues: Mutex<Option<Queues<K>>>,
}

/// Cache for one resource kind. Clones share the same queues.
pub struct ResourceCache<K> {
    inner: Arc<Inner<K>>,
}

impl<K> Clone for ResourceCache<K> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K: CachedResource> ResourceCache<K> {
    pub fn new(mut config: CacheConfig<K>) -> Self {
        // mpsc::channel panics on zero capacity
        config.queue_capacity = config.queue_capacity.max(1);
        let (add_tx, add_rx) = mpsc::channel(config.queue_capacity);
        let (update_tx, update_rx) = mpsc::channel(config.queue_capacity);
        let (delete_tx, delete_rx) = mpsc::channel(config.queue_capacity);
        Self {
            inner: Arc::new(Inner {
                config,
                add_tx,
                update_tx,
                delete_tx,
                queues: Mutex::new(Some(Queues {
                    add_rx,
                    update_rx,
                    delete_rx,
                })),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig<K> {
        &self.inner.config
    }

    /// Resolve the informer, install handlers and start the consumer.
    ///
    /// On error nothing is started and the cache stays inert.
    pub fn start(&self, informers: &dyn InformerFactory) -> Result<StopHandle> {
        let resource = &self.inner.config.resource;
        let mut queues = self.inner.queues.lock().unwrap_or_else(|e| e.into_inner());
        if queues.is_none() {
            return Err(CoreError::Configuration(format!(
                "{} cache is already started",
                resource
            )));
        }

        let mut informer = informers.for_resource(resource).map_err(|e| {
            let err = match e {
                CoreError::Configuration(msg) => CoreError::Configuration(msg),
                other => CoreError::Configuration(other.to_string()),
            };
            error!("Cannot start {} cache: {}", resource, err);
            err
        })?;
        let Some(queues) = queues.take() else {
            return Err(CoreError::Configuration(format!(
                "{} cache is already started",
                resource
            )));
        };

        informer.add_event_handler(Arc::new(CacheEventHandler {
            cache: self.clone(),
        }));

        let stop = CancellationToken::new();
        let consumer = {
            let (inner, stop) = (self.inner.clone(), stop.clone());
            let runtime = Handle::current();
            // hooks are synchronous; give them a thread of their own
            tokio::task::spawn_blocking(move || runtime.block_on(run(inner, queues, stop)))
        };
        let informer = informer.run(stop.clone());
        info!("Started {} cache", resource);

        Ok(StopHandle {
            resource: resource.clone(),
            stop,
            tasks: vec![informer, consumer],
        })
    }

    /// Enqueue an added object, waiting while the add queue is full
    pub async fn add(&self, obj: K) {
        if self.inner.add_tx.send(obj).await.is_err() {
            debug!("{} cache is stopped, add dropped", self.inner.config.resource);
        }
    }

    /// Enqueue an updated object, waiting while the update queue is full
    pub async fn update(&self, obj: K) {
        if self.inner.update_tx.send(obj).await.is_err() {
            debug!("{} cache is stopped, update dropped", self.inner.config.resource);
        }
    }

    /// Enqueue a deleted key, waiting while the delete queue is full
    pub async fn delete(&self, key: String) {
        if self.inner.delete_tx.send(key).await.is_err() {
            debug!("{} cache is stopped, delete dropped", self.inner.config.resource);
        }
    }

    fn parse(&self, obj: DynamicObject) -> Option<K> {
        let name = obj.name_any();
        match obj.try_parse::<K>() {
            Ok(obj) => Some(obj),
            Err(e) => {
                warn!(
                    "Dropping {} event for {}: not a {}: {}",
                    self.inner.config.resource,
                    name,
                    K::kind(&()),
                    e
                );
                None
            }
        }
    }
}

/// Stops the informer and the consumer of a started cache
pub struct StopHandle {
    resource: String,
    stop: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl StopHandle {
    /// Signal the informer and consumer to stop. Queued events that were
    /// not consumed yet may be dropped; a running hook is not interrupted.
    pub fn stop(&self) {
        if !self.stop.is_cancelled() {
            info!("Stopping {} cache", self.resource);
            self.stop.cancel();
        }
    }

    /// Stop and wait for the background tasks to finish
    pub async fn join(self) {
        self.stop();
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("{} cache task failed: {}", self.resource, e);
            }
        }
    }
}

async fn run<K: CachedResource>(
    inner: Arc<Inner<K>>,
    mut queues: Queues<K>,
    stop: CancellationToken,
) {
    let config = &inner.config;
    loop {
        // select! polls ready branches in random order, so no queue starves
        tokio::select! {
            _ = stop.cancelled() => break,
            Some(obj) = queues.add_rx.recv() => {
                if let Some(hook) = &config.resource_added {
                    invoke(&config.resource, "add", || hook(obj));
                }
            }
            Some(obj) = queues.update_rx.recv() => {
                if let Some(hook) = &config.resource_updated {
                    invoke(&config.resource, "update", || hook(obj));
                }
            }
            Some(key) = queues.delete_rx.recv() => {
                if let Some(hook) = &config.resource_deleted {
                    invoke(&config.resource, "delete", || hook(key));
                }
            }
        }
    }
    debug!("{} cache consumer exited", config.resource);
}

fn invoke(resource: &str, event: &str, hook: impl FnOnce()) {
    if std::panic::catch_unwind(AssertUnwindSafe(hook)).is_err() {
        error!("{} {} hook panicked, event dropped", resource, event);
    }
}

struct CacheEventHandler<K> {
    cache: ResourceCache<K>,
}

#[async_trait]
impl<K: CachedResource> ResourceEventHandler for CacheEventHandler<K> {
    async fn on_add(&self, obj: DynamicObject) {
        let config = self.cache.config();
        if config.resource_added.is_none() {
            return;
        }
        info!("Add from k8s-registry: {} {}", config.resource, obj.name_any());
        if let Some(obj) = self.cache.parse(obj) {
            self.cache.add(obj).await;
        }
    }

    async fn on_update(&self, old: DynamicObject, new: DynamicObject) {
        let config = self.cache.config();
        if config.resource_updated.is_none() {
            return;
        }
        if !is_kind::<K>(&old) {
            debug!("Ignoring update of {}: not a {}", old.name_any(), K::kind(&()));
            return;
        }
        info!("Update from k8s-registry: {} {}", config.resource, new.name_any());
        if let Some(obj) = self.cache.parse(new) {
            self.cache.update(obj).await;
        }
    }

    async fn on_delete(&self, obj: DynamicObject) {
        let config = self.cache.config();
        if config.resource_deleted.is_none() {
            return;
        }
        info!("Delete from k8s-registry: {} {}", config.resource, obj.name_any());
        // tombstones may carry a partial body; the metadata still names the object
        let fallback = object_key(&obj);
        let key = match obj.try_parse::<K>() {
            Ok(obj) => (config.key_fn)(&obj),
            Err(e) => {
                warn!(
                    "Deleting {} by metadata key {}: body is not a {}: {}",
                    config.resource,
                    fallback,
                    K::kind(&()),
                    e
                );
                fallback
            }
        };
        self.cache.delete(key).await;
    }
}

fn is_kind<K: CachedResource>(obj: &DynamicObject) -> bool {
    match &obj.types {
        Some(types) => types.kind == K::kind(&()),
        None => obj.clone().try_parse::<K>().is_ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::informer::testing::{dynamic, FakeInformerFactory};
    use nsm_api::v1::network_service_manager::NetworkServiceManagerSpec;
    use nsm_api::v1::{NetworkService, NetworkServiceManager};
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
    use tokio::time::timeout;

    fn nsm(name: &str) -> NetworkServiceManager {
        NetworkServiceManager::new(
            name,
            NetworkServiceManagerSpec {
                url: format!("{}.nsm:5001", name),
            },
        )
    }

    fn nsm_object(name: &str) -> DynamicObject {
        dynamic::<NetworkServiceManager>(
            name,
            json!({"spec": {"url": format!("{}.nsm:5001", name)}}),
        )
    }

    async fn next(rx: &mut UnboundedReceiver<String>) -> String {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("hook was not invoked")
            .expect("hook channel closed")
    }

    fn recording_config() -> (CacheConfig<NetworkServiceManager>, UnboundedReceiver<String>) {
        let (tx, rx) = unbounded_channel();
        let (added, updated, deleted) = (tx.clone(), tx.clone(), tx);
        let config = CacheConfig::new()
            .on_added(move |obj: NetworkServiceManager| {
                let _ = added.send(format!("add {}", obj.name_any()));
            })
            .on_updated(move |obj: NetworkServiceManager| {
                let _ = updated.send(format!("update {}", obj.name_any()));
            })
            .on_deleted(move |key| {
                let _ = deleted.send(format!("delete {}", key));
            });
        (config, rx)
    }

    #[tokio::test]
    async fn test_same_kind_events_keep_delivery_order() {
        let (config, mut rx) = recording_config();
        let cache = ResourceCache::new(config);
        let informers = FakeInformerFactory::default();
        let handle = cache.start(&informers).unwrap();
        let handler = informers.handler();

        for i in 0..25 {
            handler.on_add(nsm_object(&format!("nsm-{}", i))).await;
        }
        for i in 0..25 {
            assert_eq!(next(&mut rx).await, format!("add nsm-{}", i));
        }

        for i in 0..25 {
            let obj = nsm_object(&format!("nsm-{}", i));
            handler.on_update(obj.clone(), obj).await;
        }
        for i in 0..25 {
            assert_eq!(next(&mut rx).await, format!("update nsm-{}", i));
        }

        for i in 0..25 {
            handler.on_delete(nsm_object(&format!("nsm-{}", i))).await;
        }
        for i in 0..25 {
            assert_eq!(next(&mut rx).await, format!("delete default/nsm-{}", i));
        }

        handle.join().await;
    }

    #[tokio::test]
    async fn test_unset_hook_discards_events() {
        let (tx, mut rx) = unbounded_channel();
        let config = CacheConfig::<NetworkServiceManager>::new().on_deleted(move |key| {
            let _ = tx.send(key);
        });
        let cache = ResourceCache::new(config);
        let informers = FakeInformerFactory::default();
        let handle = cache.start(&informers).unwrap();

        // well past the queue capacity: the consumer keeps draining
        timeout(Duration::from_secs(5), async {
            for i in 0..3 * DEFAULT_QUEUE_CAPACITY {
                cache.add(nsm(&format!("nsm-{}", i))).await;
                informers.handler().on_add(nsm_object("nsm-x")).await;
            }
        })
        .await
        .expect("add blocked without an add hook");

        cache.delete("nsm-0".to_string()).await;
        assert_eq!(next(&mut rx).await, "nsm-0");
        assert!(rx.try_recv().is_err());

        handle.join().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_full_queue_blocks_producer_until_consumer_resumes() {
        let (tx, mut rx) = unbounded_channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);
        let config = CacheConfig::<NetworkServiceManager>::new().on_added(move |obj| {
            let name = obj.name_any();
            let _ = tx.send(name.clone());
            if name == "nsm-0" {
                let _ = release_rx.lock().unwrap().recv();
            }
        });
        let cache = ResourceCache::new(config);
        let informers = FakeInformerFactory::default();
        let handle = cache.start(&informers).unwrap();

        // the consumer takes nsm-0 off the queue and blocks in the hook
        cache.add(nsm("nsm-0")).await;
        assert_eq!(next(&mut rx).await, "nsm-0");

        for i in 1..=DEFAULT_QUEUE_CAPACITY {
            timeout(Duration::from_secs(1), cache.add(nsm(&format!("nsm-{}", i))))
                .await
                .expect("queue should have room");
        }

        let overflow = DEFAULT_QUEUE_CAPACITY + 1;
        let blocked = tokio::spawn({
            let cache = cache.clone();
            async move { cache.add(nsm(&format!("nsm-{}", overflow))).await }
        });
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!blocked.is_finished());

        release_tx.send(()).unwrap();
        timeout(Duration::from_secs(5), blocked)
            .await
            .expect("enqueue still blocked")
            .unwrap();

        for i in 1..=overflow {
            assert_eq!(next(&mut rx).await, format!("nsm-{}", i));
        }

        handle.join().await;
    }

    #[tokio::test]
    async fn test_update_of_other_kind_is_dropped() {
        let (config, mut rx) = recording_config();
        let cache = ResourceCache::new(config);
        let informers = FakeInformerFactory::default();
        let handle = cache.start(&informers).unwrap();
        let handler = informers.handler();

        let foreign =
            dynamic::<NetworkService>("icmp-responder", json!({"spec": {"payload": "IP"}}));
        handler.on_update(foreign, nsm_object("nsm-1")).await;
        handler
            .on_update(nsm_object("nsm-2"), nsm_object("nsm-2"))
            .await;

        assert_eq!(next(&mut rx).await, "update nsm-2");
        assert!(rx.try_recv().is_err());

        handle.join().await;
    }

    #[tokio::test]
    async fn test_delete_carries_extracted_key() {
        let (tx, mut rx) = unbounded_channel();
        let config = CacheConfig::<NetworkServiceManager>::new()
            .key_fn(|obj| format!("{}@{}", obj.name_any(), obj.spec.url))
            .on_deleted(move |key| {
                let _ = tx.send(key);
            });
        let cache = ResourceCache::new(config);
        let informers = FakeInformerFactory::default();
        let handle = cache.start(&informers).unwrap();

        informers.handler().on_delete(nsm_object("nsm-1")).await;
        assert_eq!(next(&mut rx).await, "nsm-1@nsm-1.nsm:5001");

        handle.join().await;
    }

    #[tokio::test]
    async fn test_start_with_unknown_resource_leaves_cache_inert() {
        let (config, mut rx) = recording_config();
        let cache = ResourceCache::new(config.for_resource("pods"));
        let informers = FakeInformerFactory::default();

        let err = cache.start(&informers).err().unwrap();
        assert!(matches!(err, CoreError::Configuration(_)));
        assert_eq!(informers.handler_count(), 0);

        cache.add(nsm("nsm-1")).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let (config, _rx) = recording_config();
        let cache = ResourceCache::new(config);
        let informers = FakeInformerFactory::default();

        let handle = cache.start(&informers).unwrap();
        assert!(matches!(
            cache.start(&informers),
            Err(CoreError::Configuration(_))
        ));
        assert_eq!(informers.handler_count(), 1);

        handle.join().await;
    }

    #[tokio::test]
    async fn test_panicking_hook_does_not_stop_consumer() {
        let (tx, mut rx) = unbounded_channel();
        let config = CacheConfig::<NetworkServiceManager>::new().on_added(move |obj| {
            if obj.name_any() == "bad" {
                panic!("hook failure");
            }
            let _ = tx.send(obj.name_any());
        });
        let cache = ResourceCache::new(config);
        let informers = FakeInformerFactory::default();
        let handle = cache.start(&informers).unwrap();

        cache.add(nsm("bad")).await;
        cache.add(nsm("good")).await;
        assert_eq!(next(&mut rx).await, "good");

        handle.join().await;
    }

    #[tokio::test]
    async fn test_add_after_stop_does_not_block() {
        let (config, _rx) = recording_config();
        let cache = ResourceCache::new(config.queue_capacity(1));
        let informers = FakeInformerFactory::default();
        let handle = cache.start(&informers).unwrap();
        handle.join().await;

        timeout(Duration::from_secs(1), async {
            cache.add(nsm("nsm-1")).await;
            cache.add(nsm("nsm-2")).await;
        })
        .await
        .expect("add blocked on a stopped cache");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_blocked_hook_does_not_stall_other_caches() {
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);
        let (entered_tx, mut entered_rx) = unbounded_channel();
        let stuck = ResourceCache::new(CacheConfig::<NetworkServiceManager>::new().on_added(
            move |obj| {
                let _ = entered_tx.send(obj.name_any());
                let _ = release_rx
                    .lock()
                    .unwrap()
                    .recv_timeout(Duration::from_secs(10));
            },
        ));
        let (config, mut rx) = recording_config();
        let other = ResourceCache::new(config);

        let informers = FakeInformerFactory::default();
        let stuck_handle = stuck.start(&informers).unwrap();
        let other_handle = other.start(&informers).unwrap();

        stuck.add(nsm("nsm-0")).await;
        assert_eq!(next(&mut entered_rx).await, "nsm-0");

        other.add(nsm("nsm-1")).await;
        let delivered = timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("other cache stalled behind a blocked hook");
        assert_eq!(delivered.as_deref(), Some("add nsm-1"));

        release_tx.send(()).unwrap();
        stuck_handle.join().await;
        other_handle.join().await;
    }

    #[tokio::test]
    async fn test_zero_capacity_is_clamped() {
        let (tx, mut rx) = unbounded_channel();
        let config = CacheConfig::<NetworkServiceManager> {
            queue_capacity: 0,
            ..CacheConfig::new()
        }
        .on_added(move |obj: NetworkServiceManager| {
            let _ = tx.send(obj.name_any());
        });
        let cache = ResourceCache::new(config);
        assert_eq!(cache.config().capacity(), 1);

        let informers = FakeInformerFactory::default();
        let handle = cache.start(&informers).unwrap();
        cache.add(nsm("nsm-1")).await;
        assert_eq!(next(&mut rx).await, "nsm-1");

        handle.join().await;
    }

    #[tokio::test]
    async fn test_delete_with_unparsable_body_uses_metadata_key() {
        let (config, mut rx) = recording_config();
        let cache = ResourceCache::new(config);
        let informers = FakeInformerFactory::default();
        let handle = cache.start(&informers).unwrap();

        let tombstone = dynamic::<NetworkServiceManager>("nsm-1", json!({"spec": {"url": 5001}}));
        informers.handler().on_delete(tombstone).await;
        assert_eq!(next(&mut rx).await, "delete default/nsm-1");

        handle.join().await;
    }
}
