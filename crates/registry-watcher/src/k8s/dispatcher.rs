//! Turns pod watch events into registry change results.

use std::sync::Arc;

use error_stack::Report;
use registry_types::ChangeResult;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use crate::k8s::cache::PodCache;
use crate::k8s::pod::PodRecord;
use crate::k8s::reconcile::force_delete;
use crate::k8s::reconcile::reconcile;
use crate::k8s::types::EventType;
use crate::k8s::types::WatchEvent;
use crate::k8s::types::WatcherError;

/// Results for a `Modified` event.
///
/// A pod that is not running contributes no current services, so every
/// service it still carries comes out as a delete.
pub fn modified_results(current: &PodRecord, prior: Option<&PodRecord>) -> Vec<ChangeResult> {
    let mut results = if current.is_running() {
        reconcile(current, prior)
    } else {
        reconcile(current, None)
    };

    if !current.is_running() || current.is_terminating() {
        force_delete(&mut results);
    }
    results
}

/// Results for a `Deleted` event: every service on the final snapshot goes away.
pub fn deleted_results(current: &PodRecord) -> Vec<ChangeResult> {
    let mut results = reconcile(current, None);
    force_delete(&mut results);
    results
}

/// Applies watch events to the pod cache and forwards the resulting changes.
pub struct EventDispatcher {
    cache: Arc<PodCache>,
    output: mpsc::Sender<ChangeResult>,
    closed: CancellationToken,
}

impl EventDispatcher {
    pub fn new(
        cache: Arc<PodCache>,
        output: mpsc::Sender<ChangeResult>,
        closed: CancellationToken,
    ) -> Self {
        Self {
            cache,
            output,
            closed,
        }
    }

    /// Handle one watch event.
    ///
    /// Malformed payloads are dropped with a warning.
    ///
    /// # Errors
    ///
    /// - [`WatcherError::Closed`] if the output was closed before every result was delivered
    pub async fn handle_event(&self, event: &WatchEvent) -> Result<(), Report<WatcherError>> {
        let pod = match PodRecord::from_slice(&event.object) {
            Ok(pod) => pod,
            Err(e) => {
                warn!("Couldn't unmarshal event object from pod: {e:?}");
                return Ok(());
            }
        };

        let Some(name) = pod.name().map(str::to_string) else {
            warn!(event_type = ?event.event_type, "Dropping pod event without metadata");
            return Ok(());
        };

        match event.event_type {
            EventType::Modified => {
                let prior = self.cache.get(&name);
                let results = modified_results(&pod, prior.as_deref());
                self.send_all(&name, results).await?;
                self.cache.set(name, pod);
            }
            EventType::Deleted => {
                let results = deleted_results(&pod);
                self.send_all(&name, results).await?;
                self.cache.delete(&name);
            }
            EventType::Added => {
                debug!(pod = %name, "Ignoring added event");
            }
        }

        Ok(())
    }

    async fn send_all(
        &self,
        pod: &str,
        results: Vec<ChangeResult>,
    ) -> Result<(), Report<WatcherError>> {
        for result in results {
            debug!(%pod, action = %result.action, service = %result.service.name, "Sending change result");
            tokio::select! {
                biased;
                _ = self.closed.cancelled() => return Err(Report::new(WatcherError::Closed)),
                sent = self.output.send(result) => {
                    if sent.is_err() {
                        return Err(Report::new(WatcherError::Closed));
                    }
                }
            }
        }
        Ok(())
    }
}
