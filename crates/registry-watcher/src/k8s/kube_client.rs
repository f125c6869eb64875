//! [`PodClient`] backed by the Kubernetes API.

use std::path::Path;
use std::path::PathBuf;

use async_trait::async_trait;
use error_stack::Report;
use error_stack::ResultExt;
use futures::stream;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::api::ListParams;
use kube::config::KubeConfigOptions;
use kube::config::Kubeconfig;
use kube::runtime::watcher;
use kube::runtime::WatchStreamExt;
use kube::Api;
use kube::Client;
use kube::Config;
use tracing::info;
use tracing::warn;

use crate::k8s::client::PodClient;
use crate::k8s::client::PodList;
use crate::k8s::client::PodWatch;
use crate::k8s::types::EventType;
use crate::k8s::types::LabelSelector;
use crate::k8s::types::WatchEvent;
use crate::k8s::types::WatcherError;

/// Resolve the client configuration for an explicit kubeconfig path.
async fn config_from_file(path: &Path) -> Result<Config, Report<WatcherError>> {
    let unusable = || WatcherError::ConnectionFailed {
        message: format!("unusable kubeconfig {}", path.display()),
    };

    let kubeconfig = Kubeconfig::read_from(path).change_context_lazy(unusable)?;
    Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .change_context_lazy(unusable)
}

/// Build a Kubernetes client from a kubeconfig file, or from the inferred
/// configuration (in-cluster or ~/.kube/config) when no path is given.
///
/// # Errors
///
/// - [`WatcherError::ConnectionFailed`] if no usable configuration is found
pub async fn init_kube_client(kubeconfig: Option<PathBuf>) -> Result<Client, Report<WatcherError>> {
    let config = match kubeconfig.as_deref() {
        Some(path) => config_from_file(path).await?,
        None => Config::infer()
            .await
            .change_context(WatcherError::ConnectionFailed {
                message: "no in-cluster or default kubeconfig".to_string(),
            })?,
    };

    info!(cluster_url = %config.cluster_url, "Using Kubernetes API server");
    Client::try_from(config).change_context(WatcherError::ConnectionFailed {
        message: "Failed to create Kubernetes client".to_string(),
    })
}

/// Lists and watches pods through the Kubernetes API.
#[derive(Clone)]
pub struct KubePodClient {
    client: Client,
    namespace: Option<String>,
}

impl KubePodClient {
    /// `namespace` of `None` watches all namespaces.
    pub fn new(client: Client, namespace: Option<String>) -> Self {
        Self { client, namespace }
    }

    fn api(&self) -> Api<Pod> {
        match &self.namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }
}

/// Serialize a pod into a watch event, dropping pods that fail to serialize.
fn pod_event(event_type: EventType, pod: &Pod) -> Option<WatchEvent> {
    match serde_json::to_vec(pod) {
        Ok(object) => Some(WatchEvent::new(event_type, object)),
        Err(e) => {
            warn!(pod = ?pod.metadata.name, "Failed to serialize pod: {e}");
            None
        }
    }
}

/// Map a runtime watcher event onto registry watch events.
///
/// Applied objects are reported as modifications and a re-list after a
/// reconnect re-reports every pod as modified.
fn map_event(event: watcher::Event<Pod>) -> Vec<WatchEvent> {
    match event {
        watcher::Event::Applied(pod) => pod_event(EventType::Modified, &pod).into_iter().collect(),
        watcher::Event::Deleted(pod) => pod_event(EventType::Deleted, &pod).into_iter().collect(),
        watcher::Event::Restarted(pods) => pods
            .iter()
            .filter_map(|pod| pod_event(EventType::Modified, pod))
            .collect(),
    }
}

#[async_trait]
impl PodClient for KubePodClient {
    async fn list_pods(&self, selector: &LabelSelector) -> Result<PodList, Report<WatcherError>> {
        let params = ListParams::default().labels(&selector.to_string());
        let pods = self
            .api()
            .list(&params)
            .await
            .change_context(WatcherError::ListFailed {
                message: format!("selector {selector}"),
            })?;

        Ok(PodList {
            items: pods.items.into_iter().map(Into::into).collect(),
        })
    }

    async fn watch_pods(&self, selector: &LabelSelector) -> Result<PodWatch, Report<WatcherError>> {
        let config = watcher::Config::default().labels(&selector.to_string());

        let events = watcher(self.api(), config)
            .default_backoff()
            .filter_map(|event| async move {
                match event {
                    Ok(event) => Some(stream::iter(map_event(event))),
                    Err(e) => {
                        warn!("Pod watch stream error: {e}");
                        None
                    }
                }
            })
            .flatten();

        Ok(PodWatch::new(events))
    }
}
