use crate::api::KeyValue;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

static ENCODER_ID_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Encoder is a mechanism for serializing a label set into a specific string
/// representation that supports caching, to avoid repeated serialization. An
/// example could be an exporter encoding the label set into a wire
/// representation.
pub trait Encoder: fmt::Debug {
    /// Encode returns the serialized encoding of the label set using its
    /// `Iter`. This result may be cached by a `labels::Set`.
    fn encode(&self, labels: &mut dyn Iterator<Item = &KeyValue>) -> String;

    /// A value that is unique for each class of label encoder. Label encoders
    /// allocate these using `new_encoder_id`.
    fn id(&self) -> EncoderId;
}

/// EncoderId is used to identify distinct `Encoder` implementations, for
/// caching encoded results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderId(usize);

impl EncoderId {
    /// Check if the id is valid
    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

/// Build a new default label encoder.
pub fn default_encoder() -> Box<dyn Encoder + Send + Sync> {
    Box::new(DefaultLabelEncoder(new_encoder_id()))
}

/// Allocate a unique id for an `Encoder` instance.
pub fn new_encoder_id() -> EncoderId {
    EncoderId(ENCODER_ID_COUNTER.fetch_add(1, Ordering::AcqRel) + 1)
}

/// A label encoder that encodes the label set as a comma separated list of
/// `key=value` pairs.
#[derive(Debug)]
pub struct DefaultLabelEncoder(EncoderId);

impl Encoder for DefaultLabelEncoder {
    fn encode(&self, labels: &mut dyn Iterator<Item = &KeyValue>) -> String {
        labels
            .enumerate()
            .fold(String::new(), |mut acc, (idx, kv)| {
                if idx > 0 {
                    acc.push(',');
                }
                acc.push_str(kv.key.as_str());
                acc.push('=');
                acc.push_str(String::from(&kv.value).as_str());
                acc
            })
    }

    fn id(&self) -> EncoderId {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::labels::Set;

    #[test]
    fn default_encoding() {
        let set = Set::from(&[KeyValue::new("b", 2i64), KeyValue::new("a", "1")]);
        let encoder = default_encoder();
        assert_eq!(encoder.encode(&mut set.iter()), "a=1,b=2");
    }

    #[test]
    fn encoder_ids_are_unique_and_valid() {
        let a = new_encoder_id();
        let b = new_encoder_id();
        assert!(a.is_valid());
        assert!(b.is_valid());
        assert_ne!(a, b);
    }
}
