//! Shared registry type definitions
//!
//! This crate contains the service registry data model exchanged between the
//! pod watcher and its consumers: service records with their nodes and
//! endpoints, and the change results describing how a service appeared,
//! changed or disappeared.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

/// Kind of change a [`ChangeResult`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    #[display("create")]
    Create,
    #[display("update")]
    Update,
    #[display("delete")]
    Delete,
}

/// A named service as advertised by one pod.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Service {
    /// Service name
    #[serde(default)]
    pub name: String,
    /// Service version
    #[serde(default)]
    pub version: String,
    /// Free-form service metadata
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Endpoints exposed by the service
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
    /// Instances serving this service
    #[serde(default)]
    pub nodes: Vec<Node>,
}

/// A single instance of a service.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Node {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// A callable endpoint of a service.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Endpoint {
    pub name: String,
    /// Request shape, kept as opaque JSON
    #[serde(default)]
    pub request: Option<serde_json::Value>,
    /// Response shape, kept as opaque JSON
    #[serde(default)]
    pub response: Option<serde_json::Value>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// One service change delivered to registry consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeResult {
    pub action: Action,
    pub service: Service,
}

impl ChangeResult {
    pub fn new(action: Action, service: Service) -> Self {
        Self { action, service }
    }

    pub fn create(service: Service) -> Self {
        Self::new(Action::Create, service)
    }

    pub fn update(service: Service) -> Self {
        Self::new(Action::Update, service)
    }

    pub fn delete(service: Service) -> Self {
        Self::new(Action::Delete, service)
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn action_serializes_lowercase() {
        let json = serde_json::to_string(&Action::Update).expect("serialize action");
        assert_eq!(json, "\"update\"");
        assert_eq!(Action::Delete.to_string(), "delete");
    }

    #[test]
    fn service_defaults_missing_fields_and_ignores_unknown() {
        let service: Service = serde_json::from_str(r#"{"name":"web","eps":["10.0.0.1:80"]}"#)
            .expect("decode service");
        assert_eq!(service.name, "web");
        assert!(service.version.is_empty());
        assert!(service.nodes.is_empty());
        assert!(service.endpoints.is_empty());
    }

    #[test]
    fn service_without_name_still_decodes() {
        let service: Service =
            serde_json::from_str(r#"{"version":"1.0.0"}"#).expect("decode service");
        assert!(service.name.is_empty());
        assert_eq!(service.version, "1.0.0");
    }

    #[test]
    fn change_result_wire_shape() {
        let result = ChangeResult::create(Service {
            name: "api".to_string(),
            version: "2".to_string(),
            nodes: vec![Node {
                id: "api-1".to_string(),
                address: "10.0.0.2:8080".to_string(),
                metadata: BTreeMap::new(),
            }],
            ..Default::default()
        });
        let value = serde_json::to_value(&result).expect("serialize result");
        assert_eq!(value["action"], "create");
        assert_eq!(value["service"]["nodes"][0]["address"], "10.0.0.2:8080");
    }
}
