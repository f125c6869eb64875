//! Service registry fed by Kubernetes pod annotations.
//!
//! Pods carrying `micro.mu/service-*` annotations are watched and every
//! service they start, change or stop advertising becomes a
//! [`registry_types::ChangeResult`] handed out by a [`k8s::ServiceWatcher`].

pub mod config;
pub mod k8s;
pub mod logging;

pub use registry_types;
