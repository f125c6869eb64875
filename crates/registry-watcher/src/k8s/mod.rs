//! Kubernetes registry integration.
//!
//! Pods advertise services through annotations; this module watches those
//! pods and turns annotation changes into registry change results.
//!
//! The main components are:
//! - [`ServiceWatcher`]: Owns the background dispatch and hands out results
//! - [`EventDispatcher`]: Applies watch events to the [`PodCache`]
//! - [`reconcile`]: Diffs the service annotations of two pod snapshots
//! - [`PodClient`]: What the watcher needs from the orchestrator, implemented
//!   by [`KubePodClient`]

pub mod annotations;
pub mod cache;
pub mod client;
pub mod dispatcher;
pub mod kube_client;
pub mod pod;
pub mod reconcile;
pub mod types;
pub mod watcher;

pub use cache::PodCache;
pub use client::PodClient;
pub use client::PodList;
pub use client::PodWatch;
pub use dispatcher::EventDispatcher;
pub use kube_client::KubePodClient;
pub use pod::PodRecord;
pub use reconcile::reconcile;
pub use types::EventType;
pub use types::LabelSelector;
pub use types::WatchEvent;
pub use types::WatcherError;
pub use watcher::ServiceWatcher;
