//! Informers over the registry custom resources
//!
//! An informer watches one resource kind and calls its handlers with
//! add, update (old and new object) and delete events. Handlers may be
//! called from the informer's own task; nothing here serialises handlers of
//! different informers against each other.

use async_trait::async_trait;
use futures::StreamExt;
use kube::api::{Api, ApiResource, DynamicObject};
use kube::{Client, ResourceExt};
use kube_runtime::watcher::{self, watcher, Event};
use kube_runtime::WatchStreamExt;
use nsm_api::v1;
use nsm_core::{CoreError, Result};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// The registry resource kinds an informer can be resolved for
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    NetworkServiceEndpoints,
    NetworkServices,
    NetworkServiceManagers,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [
        ResourceKind::NetworkServiceEndpoints,
        ResourceKind::NetworkServices,
        ResourceKind::NetworkServiceManagers,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::NetworkServiceEndpoints => "network-service-endpoints",
            ResourceKind::NetworkServices => "network-services",
            ResourceKind::NetworkServiceManagers => "network-service-managers",
        }
    }

    /// Plural of the custom resource in the Kubernetes API
    pub fn plural(&self) -> &'static str {
        match self {
            ResourceKind::NetworkServiceEndpoints => "networkserviceendpoints",
            ResourceKind::NetworkServices => "networkservices",
            ResourceKind::NetworkServiceManagers => "networkservicemanagers",
        }
    }

    pub fn api_resource(&self) -> ApiResource {
        match self {
            ResourceKind::NetworkServiceEndpoints => {
                ApiResource::erase::<v1::NetworkServiceEndpoint>(&())
            }
            ResourceKind::NetworkServices => ApiResource::erase::<v1::NetworkService>(&()),
            ResourceKind::NetworkServiceManagers => {
                ApiResource::erase::<v1::NetworkServiceManager>(&())
            }
        }
    }
}

impl FromStr for ResourceKind {
    type Err = CoreError;

    /// Accepts the kind names as well as the API plurals
    fn from_str(s: &str) -> Result<Self> {
        ResourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s || kind.plural() == s)
            .ok_or_else(|| CoreError::Configuration(format!("unknown resource kind: {}", s)))
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Callbacks installed on an informer. Each callback may suspend the
/// informer until the handler is ready to accept the event.
#[async_trait]
pub trait ResourceEventHandler: Send + Sync {
    async fn on_add(&self, obj: DynamicObject);

    async fn on_update(&self, old: DynamicObject, new: DynamicObject);

    async fn on_delete(&self, obj: DynamicObject);
}

pub trait Informer: Send {
    fn add_event_handler(&mut self, handler: Arc<dyn ResourceEventHandler>);

    /// Start delivering events until `stop` is cancelled
    fn run(self: Box<Self>, stop: CancellationToken) -> JoinHandle<()>;
}

/// Resolves informers by resource kind name
pub trait InformerFactory: Send + Sync {
    fn for_resource(&self, resource: &str) -> Result<Box<dyn Informer>>;
}

/// InformerFactory backed by Kubernetes watches
#[derive(Clone)]
pub struct KubeInformerFactory {
    client: Client,
    namespace: Option<String>,
}

impl KubeInformerFactory {
    pub fn new(client: Client, namespace: Option<String>) -> Self {
        Self { client, namespace }
    }
}

impl InformerFactory for KubeInformerFactory {
    fn for_resource(&self, resource: &str) -> Result<Box<dyn Informer>> {
        let kind: ResourceKind = resource.parse()?;
        let ar = kind.api_resource();
        let api: Api<DynamicObject> = match &self.namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
            None => Api::all_with(self.client.clone(), &ar),
        };
        Ok(Box::new(KubeInformer {
            kind,
            api,
            dispatcher: EventDispatcher::default(),
        }))
    }
}

/// Informer running a watcher over one resource kind
pub struct KubeInformer {
    kind: ResourceKind,
    api: Api<DynamicObject>,
    dispatcher: EventDispatcher,
}

impl Informer for KubeInformer {
    fn add_event_handler(&mut self, handler: Arc<dyn ResourceEventHandler>) {
        self.dispatcher.handlers.push(handler);
    }

    fn run(self: Box<Self>, stop: CancellationToken) -> JoinHandle<()> {
        let KubeInformer {
            kind,
            api,
            mut dispatcher,
        } = *self;

        tokio::spawn(async move {
            info!("Starting {} informer", kind);
            let mut stream = watcher(api, watcher::Config::default())
                .default_backoff()
                .boxed();

            loop {
                let event = tokio::select! {
                    _ = stop.cancelled() => break,
                    event = stream.next() => event,
                };
                match event {
                    Some(Ok(event)) => dispatcher.dispatch(event).await,
                    Some(Err(e)) => warn!("{} watch error: {}", kind, e),
                    None => break,
                }
            }
            info!("Stopped {} informer", kind);
        })
    }
}

/// Turns watcher events into add/update/delete callbacks by remembering
/// the last object seen per key
#[derive(Default)]
pub(crate) struct EventDispatcher {
    handlers: Vec<Arc<dyn ResourceEventHandler>>,
    known: HashMap<String, DynamicObject>,
    relisted: Option<HashSet<String>>,
}

impl EventDispatcher {
    pub(crate) async fn dispatch(&mut self, event: Event<DynamicObject>) {
        match event {
            Event::Apply(obj) => self.apply(obj).await,
            Event::InitApply(obj) => {
                if let Some(seen) = self.relisted.as_mut() {
                    seen.insert(object_key(&obj));
                }
                self.apply(obj).await
            }
            Event::Delete(obj) => {
                self.known.remove(&object_key(&obj));
                for handler in &self.handlers {
                    handler.on_delete(obj.clone()).await;
                }
            }
            Event::Init => self.relisted = Some(HashSet::new()),
            Event::InitDone => {
                // objects missing from the relist were deleted while the watch was down
                let Some(seen) = self.relisted.take() else {
                    return;
                };
                let stale: Vec<String> = self
                    .known
                    .keys()
                    .filter(|key| !seen.contains(*key))
                    .cloned()
                    .collect();
                for key in stale {
                    if let Some(obj) = self.known.remove(&key) {
                        debug!("Object {} vanished during relist", key);
                        for handler in &self.handlers {
                            handler.on_delete(obj.clone()).await;
                        }
                    }
                }
            }
        }
    }

    async fn apply(&mut self, obj: DynamicObject) {
        let key = object_key(&obj);
        match self.known.insert(key, obj.clone()) {
            Some(old) => {
                for handler in &self.handlers {
                    handler.on_update(old.clone(), obj.clone()).await;
                }
            }
            None => {
                for handler in &self.handlers {
                    handler.on_add(obj.clone()).await;
                }
            }
        }
    }
}

/// `namespace/name` for namespaced objects, `name` otherwise
pub fn object_key(obj: &impl ResourceExt) -> String {
    match obj.namespace() {
        Some(ns) => format!("{}/{}", ns, obj.name_any()),
        None => obj.name_any(),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ResourceEventHandler for Recorder {
        async fn on_add(&self, obj: DynamicObject) {
            self.events.lock().unwrap().push(format!("add {}", obj.name_any()));
        }

        async fn on_update(&self, old: DynamicObject, new: DynamicObject) {
            self.events
                .lock()
                .unwrap()
                .push(format!("update {} {}", old.name_any(), new.name_any()));
        }

        async fn on_delete(&self, obj: DynamicObject) {
            self.events.lock().unwrap().push(format!("delete {}", obj.name_any()));
        }
    }

    fn nsm(name: &str) -> DynamicObject {
        testing::dynamic::<v1::NetworkServiceManager>(
            name,
            json!({"spec": {"url": "10.0.0.1:5001"}}),
        )
    }

    #[test]
    fn test_resource_kind_from_str() {
        assert_eq!(
            "network-service-endpoints".parse::<ResourceKind>().unwrap(),
            ResourceKind::NetworkServiceEndpoints
        );
        assert_eq!(
            "networkservicemanagers".parse::<ResourceKind>().unwrap(),
            ResourceKind::NetworkServiceManagers
        );
        assert!(matches!(
            "pods".parse::<ResourceKind>(),
            Err(CoreError::Configuration(_))
        ));
    }

    #[test]
    fn test_resource_kind_api_resource() {
        let ar = ResourceKind::NetworkServices.api_resource();
        assert_eq!(ar.group, v1::API_GROUP);
        assert_eq!(ar.version, v1::API_VERSION);
        assert_eq!(ar.plural, ResourceKind::NetworkServices.plural());
    }

    #[tokio::test]
    async fn test_dispatcher_add_then_update_then_delete() {
        let recorder = Arc::new(Recorder::default());
        let mut dispatcher = EventDispatcher::default();
        dispatcher.handlers.push(recorder.clone());

        dispatcher.dispatch(Event::Apply(nsm("nsm-1"))).await;
        dispatcher.dispatch(Event::Apply(nsm("nsm-1"))).await;
        dispatcher.dispatch(Event::Delete(nsm("nsm-1"))).await;
        dispatcher.dispatch(Event::Apply(nsm("nsm-1"))).await;

        assert_eq!(
            *recorder.events.lock().unwrap(),
            vec!["add nsm-1", "update nsm-1 nsm-1", "delete nsm-1", "add nsm-1"]
        );
    }

    #[tokio::test]
    async fn test_dispatcher_relist_deletes_vanished_objects() {
        let recorder = Arc::new(Recorder::default());
        let mut dispatcher = EventDispatcher::default();
        dispatcher.handlers.push(recorder.clone());

        dispatcher.dispatch(Event::Apply(nsm("nsm-1"))).await;
        dispatcher.dispatch(Event::Apply(nsm("nsm-2"))).await;

        dispatcher.dispatch(Event::Init).await;
        dispatcher.dispatch(Event::InitApply(nsm("nsm-2"))).await;
        dispatcher.dispatch(Event::InitDone).await;

        assert_eq!(
            *recorder.events.lock().unwrap(),
            vec!["add nsm-1", "add nsm-2", "update nsm-2 nsm-2", "delete nsm-1"]
        );
    }
}
