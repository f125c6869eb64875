use std::collections::BTreeMap;

use error_stack::Report;
use error_stack::ResultExt;
use k8s_openapi::api::core::v1::Pod;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;

use crate::k8s::types::WatcherError;

/// Last observed state of a pod, reduced to what the registry cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodRecord {
    #[serde(default)]
    pub metadata: Option<PodMetadata>,
    #[serde(default)]
    pub status: Option<PodStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodMetadata {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    /// Annotation values may be explicitly `null`
    #[serde(default, deserialize_with = "null_as_default")]
    pub annotations: BTreeMap<String, Option<String>>,
    #[serde(default)]
    pub deletion_timestamp: Option<String>,
}

/// Treat an explicit `null` the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodStatus {
    #[serde(default)]
    pub phase: Option<PodPhase>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PodPhase {
    Running,
    Other(String),
}

impl From<String> for PodPhase {
    fn from(phase: String) -> Self {
        if phase == "Running" {
            Self::Running
        } else {
            Self::Other(phase)
        }
    }
}

impl From<PodPhase> for String {
    fn from(phase: PodPhase) -> Self {
        match phase {
            PodPhase::Running => "Running".to_string(),
            PodPhase::Other(phase) => phase,
        }
    }
}

impl PodRecord {
    /// Parse a serialized pod object as delivered by a watch event.
    ///
    /// # Errors
    ///
    /// - [`WatcherError::Unmarshal`] if the payload is not a pod object
    pub fn from_slice(object: &[u8]) -> Result<Self, Report<WatcherError>> {
        serde_json::from_slice(object).change_context(WatcherError::Unmarshal)
    }

    pub fn name(&self) -> Option<&str> {
        self.metadata.as_ref().map(|m| m.name.as_str())
    }

    pub fn annotations(&self) -> Option<&BTreeMap<String, Option<String>>> {
        self.metadata.as_ref().map(|m| &m.annotations)
    }

    pub fn is_running(&self) -> bool {
        matches!(
            self.status.as_ref().and_then(|s| s.phase.as_ref()),
            Some(PodPhase::Running)
        )
    }

    /// Whether the pod carries a non-empty deletion timestamp.
    pub fn is_terminating(&self) -> bool {
        self.metadata
            .as_ref()
            .and_then(|m| m.deletion_timestamp.as_deref())
            .is_some_and(|ts| !ts.is_empty())
    }
}

impl From<Pod> for PodRecord {
    fn from(pod: Pod) -> Self {
        let metadata = pod.metadata;
        let annotations = metadata
            .annotations
            .unwrap_or_default()
            .into_iter()
            .map(|(k, v)| (k, Some(v)))
            .collect();

        Self {
            metadata: Some(PodMetadata {
                name: metadata.name.unwrap_or_default(),
                annotations,
                deletion_timestamp: metadata.deletion_timestamp.map(|ts| ts.0.to_rfc3339()),
            }),
            status: pod.status.map(|status| PodStatus {
                phase: status.phase.map(PodPhase::from),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::PodStatus as K8sPodStatus;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn parse_pod_object() {
        let object = br#"{
            "metadata": {
                "name": "a",
                "annotations": {"micro.mu/service-web": "{\"name\":\"web\"}", "gone": null},
                "deletionTimestamp": "2024-01-01T00:00:00Z"
            },
            "status": {"phase": "Running"}
        }"#;
        let pod = PodRecord::from_slice(object).unwrap();
        assert_eq!(pod.name(), Some("a"));
        assert!(pod.is_running());
        assert!(pod.is_terminating());
        let annotations = pod.annotations().unwrap();
        assert_eq!(annotations.get("gone"), Some(&None));
        assert_eq!(annotations.len(), 2);
    }

    #[test]
    fn missing_status_is_not_running() {
        let pod = PodRecord::from_slice(br#"{"metadata":{"name":"a"},"status":null}"#).unwrap();
        assert!(!pod.is_running());
        assert!(!pod.is_terminating());
    }

    #[test]
    fn other_phase_round_trips() {
        let pod = PodRecord::from_slice(br#"{"metadata":{"name":"a"},"status":{"phase":"Pending"}}"#)
            .unwrap();
        assert!(!pod.is_running());
        let json = serde_json::to_value(&pod).unwrap();
        assert_eq!(json["status"]["phase"], "Pending");
    }

    #[test]
    fn empty_deletion_timestamp_is_not_terminating() {
        let pod = PodRecord::from_slice(br#"{"metadata":{"name":"a","deletionTimestamp":""}}"#)
            .unwrap();
        assert!(!pod.is_terminating());
    }

    #[test]
    fn missing_metadata_has_no_name() {
        let pod = PodRecord::from_slice(br#"{"status":{"phase":"Running"}}"#).unwrap();
        assert_eq!(pod.name(), None);
        assert!(pod.annotations().is_none());
    }

    #[test]
    fn null_metadata_fields_parse_as_empty() {
        let pod = PodRecord::from_slice(
            br#"{"metadata":{"name":"a","annotations":null},"status":{"phase":"Running"}}"#,
        )
        .unwrap();
        assert_eq!(pod.name(), Some("a"));
        assert!(pod.annotations().unwrap().is_empty());

        let pod = PodRecord::from_slice(br#"{"metadata":{"name":null,"deletionTimestamp":null}}"#)
            .unwrap();
        assert_eq!(pod.name(), Some(""));
        assert!(!pod.is_terminating());
    }

    #[test]
    fn malformed_object_fails() {
        let err = PodRecord::from_slice(b"{not a pod").unwrap_err();
        assert!(matches!(err.current_context(), WatcherError::Unmarshal));
    }

    #[test]
    fn convert_kubernetes_pod() {
        let pod = Pod {
            metadata: ObjectMeta {
                name: Some("test-pod".to_string()),
                annotations: Some(BTreeMap::from([(
                    "micro.mu/service-web".to_string(),
                    "{}".to_string(),
                )])),
                ..Default::default()
            },
            spec: None,
            status: Some(K8sPodStatus {
                phase: Some("Running".to_string()),
                ..Default::default()
            }),
        };

        let record = PodRecord::from(pod.clone());
        assert_eq!(record.name(), Some("test-pod"));
        assert!(record.is_running());

        // the serialized pod must parse into the same record
        let bytes = serde_json::to_vec(&pod).unwrap();
        assert_eq!(PodRecord::from_slice(&bytes).unwrap(), record);
    }
}
