//! Interface to the orchestrator the watcher reads pods from.

use async_trait::async_trait;
use error_stack::Report;
use futures::stream::BoxStream;
use futures::Stream;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::k8s::pod::PodRecord;
use crate::k8s::types::LabelSelector;
use crate::k8s::types::WatchEvent;
use crate::k8s::types::WatcherError;

/// Point-in-time listing of pods.
#[derive(Debug, Clone, Default)]
pub struct PodList {
    pub items: Vec<PodRecord>,
}

/// Handle to a live pod watch.
///
/// The event stream ends once the stop token from [`PodWatch::into_parts`]
/// is cancelled.
pub struct PodWatch {
    events: BoxStream<'static, WatchEvent>,
    stop: CancellationToken,
}

impl PodWatch {
    pub fn new<S>(events: S) -> Self
    where
        S: Stream<Item = WatchEvent> + Send + 'static,
    {
        let stop = CancellationToken::new();
        let stopped = stop.clone();
        let events = events
            .take_until(async move { stopped.cancelled().await })
            .boxed();
        Self { events, stop }
    }

    /// Build a watch fed by a channel; the stream ends when all senders drop.
    pub fn from_receiver(rx: mpsc::Receiver<WatchEvent>) -> Self {
        Self::new(ReceiverStream::new(rx))
    }

    /// Split into the event stream and a handle that stops it.
    pub fn into_parts(self) -> (BoxStream<'static, WatchEvent>, CancellationToken) {
        (self.events, self.stop)
    }
}

/// Orchestrator operations the watcher depends on.
///
/// Connection setup and reconnecting a broken watch belong to the
/// implementation.
#[async_trait]
pub trait PodClient: Send + Sync {
    /// List pods currently matching `selector`.
    async fn list_pods(&self, selector: &LabelSelector) -> Result<PodList, Report<WatcherError>>;

    /// Open a watch on pods matching `selector`.
    async fn watch_pods(&self, selector: &LabelSelector) -> Result<PodWatch, Report<WatcherError>>;
}
