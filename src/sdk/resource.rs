//! # Resource
//!
//! A `Resource` is an immutable representation of the entity producing
//! telemetry. For example, a process producing telemetry that is running in
//! a container on Kubernetes has a pod name, a namespace, and possibly a
//! deployment name. All three of these attributes can be included in the
//! `Resource`.
//!
//! The resource is attached to every exported `Record`, decoupling discovery
//! of process-level attributes from exporters.
use crate::api::labels::{self, Encoder};
use crate::api::KeyValue;

/// Describes an entity about which identifying information and metadata is
/// exposed.
#[derive(Clone, Debug, Default)]
pub struct Resource {
    labels: labels::Set,
}

impl Resource {
    /// Create a new `Resource` from key value pairs.
    ///
    /// Values are de-duplicated by key, and the last key-value pair seen for
    /// a key is retained.
    pub fn new<T: IntoIterator<Item = KeyValue>>(kvs: T) -> Self {
        Resource {
            labels: labels::Set::from(kvs.into_iter().collect::<Vec<_>>()),
        }
    }

    /// Create an empty resource.
    pub fn empty() -> Self {
        Resource::default()
    }

    /// Create a new `Resource` by combining two resources.
    ///
    /// Keys from this resource have priority over keys from the merged
    /// resource.
    pub fn merge(&self, other: &Self) -> Self {
        if self.labels.is_empty() {
            return other.clone();
        }
        if other.labels.is_empty() {
            return self.clone();
        }

        Resource {
            labels: labels::Set::from(
                labels::merge_iters(self.labels.iter(), other.labels.iter())
                    .cloned()
                    .collect::<Vec<_>>(),
            ),
        }
    }

    /// Returns the number of attributes for this resource.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Returns `true` if the resource contains no attributes.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// An iterator over the resource attributes, sorted by key.
    pub fn iter(&self) -> labels::Iter<'_> {
        self.labels.iter()
    }

    /// Encode the resource attributes with the given encoder.
    pub fn encoded(&self, encoder: Option<&dyn Encoder>) -> String {
        self.labels.encoded(encoder)
    }
}
