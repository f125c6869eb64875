use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

/// Label selector used for both listing and watching pods.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector(pub BTreeMap<String, String>);

impl LabelSelector {
    pub fn new<K, V>(labels: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            labels
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Renders as `key=value` pairs joined by commas, the form the API server accepts.
impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, value) in &self.0 {
            if !first {
                write!(f, ",")?;
            }
            write!(f, "{key}={value}")?;
            first = false;
        }
        Ok(())
    }
}

/// Kind of a pod watch event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Added,
    Modified,
    Deleted,
}

/// A single pod watch event with its still-serialized pod object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub event_type: EventType,
    pub object: Vec<u8>,
}

impl WatchEvent {
    pub fn new(event_type: EventType, object: impl Into<Vec<u8>>) -> Self {
        Self {
            event_type,
            object: object.into(),
        }
    }
}

/// Errors that can occur while watching pods for registry changes.
#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("Failed to connect to Kubernetes API: {message}")]
    ConnectionFailed { message: String },
    #[error("Failed to list pods: {message}")]
    ListFailed { message: String },
    #[error("Failed to watch pods: {message}")]
    WatchFailed { message: String },
    #[error("Failed to decode service annotation")]
    AnnotationDecode,
    #[error("Failed to unmarshal pod object")]
    Unmarshal,
    #[error("result chan closed")]
    Closed,
}
