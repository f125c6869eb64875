use error_stack::Report;
use error_stack::ResultExt;
use registry_types::Service;

use crate::k8s::types::LabelSelector;
use crate::k8s::types::WatcherError;

/// Annotation key prefix marking a serialized service on a pod.
pub const ANNOTATION_SERVICE_KEY_PREFIX: &str = "micro.mu/service-";

/// Label put on every pod that takes part in the registry.
pub const LABEL_TYPE_KEY: &str = "micro.mu/type";
pub const LABEL_TYPE_VALUE_SERVICE: &str = "service";

/// Label prefix used to select pods of one particular service.
pub const SVC_SELECTOR_PREFIX: &str = "micro.mu/selector-";
pub const SVC_SELECTOR_VALUE: &str = "service";

/// Whether an annotation key carries a service descriptor.
pub fn is_service_key(key: &str) -> bool {
    key.starts_with(ANNOTATION_SERVICE_KEY_PREFIX)
}

/// Decode one annotation value into a service descriptor.
///
/// # Errors
///
/// - [`WatcherError::AnnotationDecode`] if the value is not a valid service record
pub fn decode_service(value: &str) -> Result<Service, Report<WatcherError>> {
    serde_json::from_str(value)
        .change_context(WatcherError::AnnotationDecode)
        .attach_printable_lazy(|| format!("annotation value: {value}"))
}

/// Selector matching every pod labelled as a registry service.
pub fn pod_selector() -> LabelSelector {
    LabelSelector::new([(LABEL_TYPE_KEY, LABEL_TYPE_VALUE_SERVICE)])
}

/// Selector narrowed to pods labelled for a single service.
pub fn service_selector(service: &str) -> LabelSelector {
    LabelSelector::new([(
        format!("{SVC_SELECTOR_PREFIX}{}", service_name(service)),
        SVC_SELECTOR_VALUE.to_string(),
    )])
}

/// Selector for an optional service filter.
pub fn selector_for(service: Option<&str>) -> LabelSelector {
    match service {
        Some(name) if !name.is_empty() => service_selector(name),
        _ => pod_selector(),
    }
}

/// Turn a service name into something usable inside a label key.
pub fn service_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect()
}
