use anyhow::Result;
use nsm_api::{registry, v1};
use nsm_core::{
    InMemoryModel, InMemoryWorkspaceRegistry, Model, NoUpstream, RegistryServer, UpstreamResolver,
    Workspace,
};
use nsm_k8s::object_cache::Listener;
use nsm_k8s::{
    CacheEvent, K8sClient, KubeUpstreamResolver, NetworkServiceCache, NetworkServiceEndpointCache,
    NetworkServiceManagerCache,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

mod config;

use config::NsmdConfig;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting nsmd...");

    let config = NsmdConfig::load()?;
    info!("Configuration: {:?}", config);

    let k8s = K8sClient::new().await?;
    let informers = k8s.informer_factory(config.namespace.as_deref());

    let model = Arc::new(InMemoryModel::new(config.nsm_url.clone()));
    let workspaces = Arc::new(InMemoryWorkspaceRegistry::new());

    // Registry caches
    let ns_listener: Listener<v1::NetworkService> =
        Arc::new(|event: &CacheEvent<v1::NetworkService>| match event {
            CacheEvent::Added(ns) | CacheEvent::Updated(ns) => {
                let ns = registry::NetworkService::from(ns);
                info!("NetworkService {} carries {} payload", ns.name, ns.payload);
            }
            CacheEvent::Deleted(key) => info!("NetworkService {} removed", key),
        });
    let nsm_listener: Listener<v1::NetworkServiceManager> =
        Arc::new(|event: &CacheEvent<v1::NetworkServiceManager>| match event {
            CacheEvent::Added(nsm) | CacheEvent::Updated(nsm) => {
                let nsm = registry::NetworkServiceManager::from(nsm);
                info!("NetworkServiceManager {} reachable at {}", nsm.name, nsm.url);
            }
            CacheEvent::Deleted(key) => info!("NetworkServiceManager {} removed", key),
        });
    let capacity = config.cache_queue_capacity;
    let nse_cache = NetworkServiceEndpointCache::with_listener(capacity, None);
    let ns_cache = NetworkServiceCache::with_listener(capacity, Some(ns_listener));
    let nsm_cache = NetworkServiceManagerCache::with_listener(capacity, Some(nsm_listener));

    let handles = vec![
        nse_cache.start(&informers)?,
        ns_cache.start(&informers)?,
        nsm_cache.start(&informers)?,
    ];
    info!("Registry caches started");

    let upstream: Arc<dyn UpstreamResolver> = match &config.upstream {
        Some(upstream) => {
            info!("Passing registrations through to namespace {}", upstream.namespace);
            Arc::new(KubeUpstreamResolver::from_client(
                k8s.clone_client(),
                &upstream.namespace,
                Some(config.nsm_name.clone()),
            ))
        }
        None => {
            info!("No upstream registry configured, endpoints stay local to this nsm");
            Arc::new(NoUpstream)
        }
    };

    let server = RegistryServer::new(
        model.clone(),
        workspaces,
        upstream,
        Workspace::new(config.workspace.clone()),
    );
    info!("Registry server ready for workspace {}", server.workspace().name);

    let mut ticker = tokio::time::interval(Duration::from_secs(30));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                debug!(
                    "Registry state: {} local endpoints, {} cached endpoints, {} services, {} managers",
                    model.endpoint_count(),
                    nse_cache.len(),
                    ns_cache.len(),
                    nsm_cache.len()
                );
            }
        }
    }

    info!("Shutdown signal received, exiting...");
    server.close();
    for handle in handles {
        handle.join().await;
    }

    Ok(())
}
