//! Service watcher lifecycle: cache seeding, background dispatch and shutdown.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use error_stack::Report;
use futures::StreamExt;
use registry_types::ChangeResult;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::k8s::annotations::selector_for;
use crate::k8s::cache::PodCache;
use crate::k8s::client::PodClient;
use crate::k8s::dispatcher::EventDispatcher;
use crate::k8s::reconcile::reconcile;
use crate::k8s::types::LabelSelector;
use crate::k8s::types::WatcherError;

/// State shared between the watcher handle and its background task.
struct Shared {
    cache: Arc<PodCache>,
    /// Cancelled exactly once, when the result channel is closed
    closed: CancellationToken,
    close_guard: AtomicBool,
    watch_stop: CancellationToken,
}

impl Shared {
    /// Stop the upstream watch and close the result channel.
    ///
    /// Returns `true` for the single call that performed the close.
    fn stop(&self) -> bool {
        self.watch_stop.cancel();

        if self
            .close_guard
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.closed.cancel();
            info!("Service watcher stopped");
            true
        } else {
            false
        }
    }
}

/// Watches pods and hands out registry change results one at a time.
pub struct ServiceWatcher {
    shared: Arc<Shared>,
    results: Mutex<mpsc::Receiver<ChangeResult>>,
}

impl ServiceWatcher {
    /// Start watching pods, optionally narrowed to a single service.
    ///
    /// The current pods are listed once to seed the cache without emitting
    /// changes, then the live watch is consumed on a background task.
    ///
    /// # Errors
    ///
    /// - [`WatcherError::ListFailed`] or [`WatcherError::WatchFailed`] if the
    ///   orchestrator cannot be reached; no watcher is returned
    pub async fn start<C>(client: &C, service: Option<&str>) -> Result<Self, Report<WatcherError>>
    where
        C: PodClient + ?Sized,
    {
        Self::start_with_selector(client, &selector_for(service)).await
    }

    #[tracing::instrument(skip(client, selector), fields(selector = %selector))]
    pub async fn start_with_selector<C>(
        client: &C,
        selector: &LabelSelector,
    ) -> Result<Self, Report<WatcherError>>
    where
        C: PodClient + ?Sized,
    {
        let cache = Arc::new(PodCache::new());

        let pods = client.list_pods(selector).await?;
        for pod in &pods.items {
            // first observation is not a change
            let discarded = reconcile(pod, None);
            debug!(pod = ?pod.name(), services = discarded.len(), "Seeding pod");
        }
        cache.seed_all(pods.items);
        info!(pods = cache.len(), "Seeded pod cache");

        let watch = client.watch_pods(selector).await?;
        let (mut events, watch_stop) = watch.into_parts();

        let (tx, rx) = mpsc::channel(1);
        let shared = Arc::new(Shared {
            cache: Arc::clone(&cache),
            closed: CancellationToken::new(),
            close_guard: AtomicBool::new(false),
            watch_stop,
        });

        let dispatcher = EventDispatcher::new(cache, tx, shared.closed.clone());
        let task_shared = Arc::clone(&shared);
        tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let Err(e) = dispatcher.handle_event(&event).await {
                    debug!("Stopping event dispatch: {e:?}");
                    break;
                }
            }
            debug!("Pod watch stream ended");
            task_shared.stop();
        });

        Ok(Self {
            shared,
            results: Mutex::new(rx),
        })
    }

    /// Wait for the next change result.
    ///
    /// # Errors
    ///
    /// - [`WatcherError::Closed`] once the watcher has been stopped
    pub async fn next(&self) -> Result<ChangeResult, Report<WatcherError>> {
        let closed = &self.shared.closed;
        if closed.is_cancelled() {
            return Err(Report::new(WatcherError::Closed));
        }

        let mut results = tokio::select! {
            biased;
            _ = closed.cancelled() => return Err(Report::new(WatcherError::Closed)),
            guard = self.results.lock() => guard,
        };

        tokio::select! {
            biased;
            _ = closed.cancelled() => Err(Report::new(WatcherError::Closed)),
            result = results.recv() => result.ok_or_else(|| Report::new(WatcherError::Closed)),
        }
    }

    /// Stop the watcher. Safe to call any number of times from any task.
    ///
    /// Results not yet pulled are dropped.
    pub fn stop(&self) {
        if !self.shared.stop() {
            warn!("Service watcher already stopped");
        }
    }

    /// Whether [`ServiceWatcher::stop`] has taken effect.
    pub fn is_stopped(&self) -> bool {
        self.shared.closed.is_cancelled()
    }

    /// Read access to the pod snapshot cache.
    pub fn cache(&self) -> &PodCache {
        &self.shared.cache
    }

    #[cfg(test)]
    fn stop_and_report(&self) -> bool {
        self.shared.stop()
    }
}

impl Drop for ServiceWatcher {
    fn drop(&mut self) {
        self.shared.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use registry_types::Action;
    use similar_asserts::assert_eq;
    use test_log::test;

    use super::*;
    use crate::k8s::client::PodList;
    use crate::k8s::client::PodWatch;
    use crate::k8s::pod::PodRecord;
    use crate::k8s::types::EventType;
    use crate::k8s::types::WatchEvent;

    /// Client whose watch is fed through a channel held by the test.
    struct ChannelClient {
        pods: Vec<PodRecord>,
        events: StdMutex<Option<mpsc::Receiver<WatchEvent>>>,
        fail_watch: bool,
    }

    #[async_trait]
    impl PodClient for ChannelClient {
        async fn list_pods(&self, _: &LabelSelector) -> Result<PodList, Report<WatcherError>> {
            Ok(PodList {
                items: self.pods.clone(),
            })
        }

        async fn watch_pods(&self, _: &LabelSelector) -> Result<PodWatch, Report<WatcherError>> {
            if self.fail_watch {
                return Err(Report::new(WatcherError::WatchFailed {
                    message: "connection refused".to_string(),
                }));
            }
            let rx = self.events.lock().unwrap().take().expect("watch opened once");
            Ok(PodWatch::from_receiver(rx))
        }
    }

    fn client(pods: Vec<PodRecord>) -> (ChannelClient, mpsc::Sender<WatchEvent>) {
        let (tx, rx) = mpsc::channel(16);
        let client = ChannelClient {
            pods,
            events: StdMutex::new(Some(rx)),
            fail_watch: false,
        };
        (client, tx)
    }

    fn running_pod(name: &str, annotations: &[(&str, &str)]) -> serde_json::Value {
        let annotations: serde_json::Map<_, _> = annotations
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::from(*v)))
            .collect();
        serde_json::json!({
            "metadata": {"name": name, "annotations": annotations},
            "status": {"phase": "Running"},
        })
    }

    #[test(tokio::test)]
    async fn seeding_emits_nothing() {
        let pod = running_pod("a", &[("micro.mu/service-web", r#"{"name":"web"}"#)]);
        let (client, tx) = client(vec![serde_json::from_value(pod).unwrap()]);

        let watcher = ServiceWatcher::start(&client, None).await.unwrap();
        assert!(watcher.cache().contains("a"));

        drop(tx);
        let err = watcher.next().await.unwrap_err();
        assert!(matches!(err.current_context(), WatcherError::Closed));
    }

    #[test(tokio::test)]
    async fn watch_failure_fails_construction() {
        let client = ChannelClient {
            pods: Vec::new(),
            events: StdMutex::new(None),
            fail_watch: true,
        };

        let err = ServiceWatcher::start(&client, Some("greeter"))
            .await
            .err()
            .expect("construction must fail");
        assert!(matches!(
            err.current_context(),
            WatcherError::WatchFailed { .. }
        ));
    }

    #[test(tokio::test)]
    async fn delivers_results_in_order() {
        let (client, tx) = client(Vec::new());
        let watcher = ServiceWatcher::start(&client, None).await.unwrap();

        for name in ["a", "b", "c"] {
            let service = format!(r#"{{"name":"{name}"}}"#);
            let pod = running_pod(name, &[("micro.mu/service-x", service.as_str())]);
            tx.send(WatchEvent::new(
                EventType::Modified,
                serde_json::to_vec(&pod).unwrap(),
            ))
            .await
            .unwrap();
        }

        for name in ["a", "b", "c"] {
            let result = watcher.next().await.unwrap();
            assert_eq!(result.action, Action::Create);
            assert_eq!(result.service.name, name);
        }
        watcher.stop();
    }

    #[test(tokio::test)]
    async fn concurrent_stop_closes_once() {
        let (client, _tx) = client(Vec::new());
        let watcher = Arc::new(ServiceWatcher::start(&client, None).await.unwrap());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let watcher = Arc::clone(&watcher);
                tokio::spawn(async move { watcher.stop_and_report() })
            })
            .collect();

        let mut closes = 0;
        for handle in handles {
            if handle.await.unwrap() {
                closes += 1;
            }
        }
        assert_eq!(closes, 1);
        assert!(watcher.is_stopped());
        watcher.stop();
    }

    #[test(tokio::test)]
    async fn next_after_stop_is_closed() {
        let (client, _tx) = client(Vec::new());
        let watcher = ServiceWatcher::start(&client, None).await.unwrap();

        watcher.stop();
        for _ in 0..3 {
            let err = watcher.next().await.unwrap_err();
            assert!(matches!(err.current_context(), WatcherError::Closed));
        }
    }

    #[test(tokio::test)]
    async fn stop_unblocks_pending_next() {
        let (client, _tx) = client(Vec::new());
        let watcher = Arc::new(ServiceWatcher::start(&client, None).await.unwrap());

        let pending = {
            let watcher = Arc::clone(&watcher);
            tokio::spawn(async move { watcher.next().await })
        };
        tokio::task::yield_now().await;
        watcher.stop();

        let err = pending.await.unwrap().unwrap_err();
        assert!(matches!(err.current_context(), WatcherError::Closed));
    }

    #[test(tokio::test)]
    async fn stop_discards_unread_result() {
        let (client, tx) = client(Vec::new());
        let watcher = ServiceWatcher::start(&client, None).await.unwrap();

        let pod = running_pod("a", &[("micro.mu/service-web", r#"{"name":"web"}"#)]);
        tx.send(WatchEvent::new(
            EventType::Modified,
            serde_json::to_vec(&pod).unwrap(),
        ))
        .await
        .unwrap();

        // let the background task park the result in the handoff slot
        while !watcher.cache().contains("a") {
            tokio::task::yield_now().await;
        }

        watcher.stop();
        let err = watcher.next().await.unwrap_err();
        assert!(matches!(err.current_context(), WatcherError::Closed));
    }
}
