//! Annotation diffing between two snapshots of the same pod.

use std::collections::HashSet;

use registry_types::Action;
use registry_types::ChangeResult;
use registry_types::Service;
use tracing::debug;

use crate::k8s::annotations::decode_service;
use crate::k8s::annotations::is_service_key;
use crate::k8s::pod::PodRecord;

/// Compare the service annotations of `current` against a cached `prior`
/// snapshot and return the registry changes they imply.
///
/// Creates and updates found on `current` come first, followed by deletes for
/// service keys that only `prior` still carries. Values that fail to decode
/// produce no result.
pub fn reconcile(current: &PodRecord, prior: Option<&PodRecord>) -> Vec<ChangeResult> {
    let prior_annotations = prior.and_then(PodRecord::annotations);

    let mut results = Vec::new();
    let mut handled: HashSet<&str> = HashSet::new();

    if let Some(annotations) = current.annotations() {
        for (key, value) in annotations {
            if !is_service_key(key) {
                continue;
            }
            let Some(value) = value else {
                continue;
            };

            // from here on the key is accounted for, even if it fails to decode
            handled.insert(key.as_str());

            // a key that was present before is an update, even if its value was null
            let result: fn(Service) -> ChangeResult =
                match prior_annotations.and_then(|prior| prior.get(key)) {
                    Some(Some(prior_value)) if prior_value == value => continue,
                    Some(_) => ChangeResult::update,
                    None => ChangeResult::create,
                };

            match decode_service(value) {
                Ok(service) => results.push(result(service)),
                Err(e) => debug!(pod = ?current.name(), %key, "skipping service annotation: {e:?}"),
            }
        }
    }

    if let Some(prior_annotations) = prior_annotations {
        for (key, value) in prior_annotations {
            if handled.contains(key.as_str()) || !is_service_key(key) {
                continue;
            }
            let Some(value) = value else {
                continue;
            };

            match decode_service(value) {
                Ok(service) => results.push(ChangeResult::delete(service)),
                Err(e) => {
                    debug!(pod = ?current.name(), %key, "skipping removed service annotation: {e:?}");
                }
            }
        }
    }

    results
}

/// Force every result to a delete.
pub fn force_delete(results: &mut [ChangeResult]) {
    for result in results {
        result.action = Action::Delete;
    }
}
