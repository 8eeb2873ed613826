//! Canonical label sets.
use crate::api::{KeyValue, Value};
use std::cmp::{self, Ordering};
use std::hash::{Hash, Hasher};
use std::iter::Peekable;
use std::sync::{Arc, Mutex};

const MAX_CONCURRENT_ENCODERS: usize = 3;
type CachedEncoders = [Option<(EncoderId, String)>; MAX_CONCURRENT_ENCODERS];

mod encoder;
pub use encoder::{default_encoder, new_encoder_id, DefaultLabelEncoder, Encoder, EncoderId};

/// Set is the representation for a distinct label set.  It manages an
/// immutable set of labels, with an internal cache for storing label
/// encodings.
///
/// Labels are sorted by key and duplicate keys are eliminated at
/// construction, keeping the last value seen for a key, so two sets built
/// from permutations of the same input are identical.
///
/// This type supports the `equivalent` method of comparison using values of
/// type `Distinct`.
#[derive(Clone, Debug, Default)]
pub struct Set {
    equivalent: Distinct,
    cached_encodings: Arc<Mutex<CachedEncoders>>,
}

impl Set {
    /// Construct a new label set from a distinct set of labels.
    pub fn with_equivalent(equivalent: Distinct) -> Self {
        Set {
            equivalent,
            cached_encodings: Arc::new(Mutex::new([None, None, None])),
        }
    }

    /// The label set length.
    pub fn len(&self) -> usize {
        self.equivalent.len()
    }

    /// Returns the underlying distinct set of labels for equivalence checks.
    pub fn equivalent(&self) -> &Distinct {
        &self.equivalent
    }

    /// Check if the set of labels is empty.
    pub fn is_empty(&self) -> bool {
        self.equivalent.is_empty()
    }

    /// Iterate over the label key value pairs.
    pub fn iter(&self) -> Iter<'_> {
        self.into_iter()
    }

    /// Encode the label set with the given encoder and cache the result.
    pub fn encoded(&self, encoder: Option<&dyn Encoder>) -> String {
        if self.is_empty() || encoder.is_none() {
            return String::new();
        }
        let encoder = encoder.unwrap();

        let id = encoder.id();
        if !id.is_valid() {
            // Invalid IDs are not cached.
            return encoder.encode(&mut self.iter());
        }

        self.cached_encodings
            .lock()
            .map_or(String::new(), |mut encoders| {
                for cached in encoders.iter().flatten() {
                    if cached.0 == id {
                        return cached.1.clone();
                    }
                }

                let encoded = encoder.encode(&mut self.iter());

                for slot in encoders.iter_mut() {
                    if slot.is_none() {
                        *slot = Some((id, encoded.clone()));
                        return encoded;
                    }
                }

                // All slots taken by other encoders, compute without caching.
                encoded
            })
    }
}

impl<T> From<T> for Set
where
    T: AsRef<[KeyValue]>,
{
    fn from(kvs: T) -> Self {
        let kvs = kvs.as_ref();
        if kvs.is_empty() {
            return Set::default();
        }

        Set {
            equivalent: Distinct::from(kvs),
            cached_encodings: Arc::new(Mutex::new([None, None, None])),
        }
    }
}

impl<'a> IntoIterator for &'a Set {
    type Item = &'a KeyValue;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        Iter(self.equivalent.0.iter())
    }
}

/// An iterator over the entries of a `Set`.
#[allow(missing_debug_implementations)]
pub struct Iter<'a>(std::slice::Iter<'a, KeyValue>);

impl<'a> Iterator for Iter<'a> {
    type Item = &'a KeyValue;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next()
    }
}

/// Distinct wraps a variable-size array of `KeyValue`, constructed with keys
/// in sorted order and duplicates removed.  This can be used as a map key or
/// for equality checking between `Set`s.
#[derive(Clone, Debug, Default)]
pub struct Distinct(Vec<KeyValue>);

impl Distinct {
    /// Check if the labels are empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The length of the set of labels
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<&[KeyValue]> for Distinct {
    fn from(kvs: &[KeyValue]) -> Self {
        let mut inner = kvs.to_vec();
        // Stable sort preserves input order within equal keys, so the final
        // element of each run is the last write.
        inner.sort_by(|a, b| a.key.cmp(&b.key));

        let mut deduped: Vec<KeyValue> = Vec::with_capacity(inner.len());
        for kv in inner {
            match deduped.last_mut() {
                Some(last) if last.key == kv.key => *last = kv,
                _ => deduped.push(kv),
            }
        }

        Distinct(deduped)
    }
}

impl Eq for Distinct {}
impl cmp::PartialEq for Distinct {
    fn eq(&self, other: &Self) -> bool {
        if self.0.len() != other.0.len() {
            return false;
        }

        for idx in 0..self.0.len() {
            if self.0.get(idx) != other.0.get(idx) {
                return false;
            }
        }

        true
    }
}

impl Hash for Distinct {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_labels(state, self.0.iter())
    }
}

/// Hash a sorted sequence of labels.
///
/// This is used to key accumulator and processor tables directly from
/// caller-supplied slices without first materializing a `Set`.
pub fn hash_labels<'a, H: Hasher, I: IntoIterator<Item = &'a KeyValue>>(state: &mut H, labels: I) {
    for kv in labels.into_iter() {
        kv.key.hash(state);

        match &kv.value {
            Value::Bool(b) => b.hash(state),
            Value::I64(i) => i.hash(state),
            Value::U64(u) => u.hash(state),
            Value::F64(f) => f.to_bits().hash(state),
            Value::String(s) => s.hash(state),
        }
    }
}

/// Merge two sorted iterators, yielding sorted results.
///
/// On key collision the pair from `a` wins and the colliding pair from `b`
/// is dropped, so the output contains each key exactly once.
pub fn merge_iters<'a, 'b, A: Iterator<Item = &'a KeyValue>, B: Iterator<Item = &'b KeyValue>>(
    a: A,
    b: B,
) -> MergeIter<'a, 'b, A, B> {
    MergeIter {
        a: a.peekable(),
        b: b.peekable(),
    }
}

/// Merge two iterators, sorting by key
#[derive(Debug)]
pub struct MergeIter<'a, 'b, A, B>
where
    A: Iterator<Item = &'a KeyValue>,
    B: Iterator<Item = &'b KeyValue>,
{
    a: Peekable<A>,
    b: Peekable<B>,
}

impl<'a, A: Iterator<Item = &'a KeyValue>, B: Iterator<Item = &'a KeyValue>> Iterator
    for MergeIter<'a, 'a, A, B>
{
    type Item = &'a KeyValue;
    fn next(&mut self) -> Option<Self::Item> {
        let which = match (self.a.peek(), self.b.peek()) {
            (Some(a), Some(b)) => Some(a.key.cmp(&b.key)),
            (Some(_), None) => Some(Ordering::Less),
            (None, Some(_)) => Some(Ordering::Greater),
            (None, None) => None,
        };

        match which {
            Some(Ordering::Less) => self.a.next(),
            Some(Ordering::Equal) => {
                // The primary set wins, consume the duplicate key from `b`.
                self.b.next();
                self.a.next()
            }
            Some(Ordering::Greater) => self.b.next(),
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Key;

    #[test]
    fn set_sorts_and_dedups_keeping_last() {
        let set = Set::from(&[
            KeyValue::new("B", 2i64),
            KeyValue::new("A", 1i64),
            KeyValue::new("B", 3i64),
        ]);

        let pairs = set
            .iter()
            .map(|kv| (kv.key.as_str().to_string(), String::from(&kv.value)))
            .collect::<Vec<_>>();
        assert_eq!(
            pairs,
            vec![
                ("A".to_string(), "1".to_string()),
                ("B".to_string(), "3".to_string())
            ]
        );
    }

    #[test]
    fn permutations_encode_identically() {
        let encoder = default_encoder();
        let inputs = [
            KeyValue::new("a", "1"),
            KeyValue::new("b", "2"),
            KeyValue::new("c", "3"),
        ];
        let expected = Set::from(&inputs).encoded(Some(encoder.as_ref()));

        let permutations: [[usize; 3]; 6] = [
            [0, 1, 2],
            [0, 2, 1],
            [1, 0, 2],
            [1, 2, 0],
            [2, 0, 1],
            [2, 1, 0],
        ];
        for perm in permutations {
            let shuffled = [
                inputs[perm[0]].clone(),
                inputs[perm[1]].clone(),
                inputs[perm[2]].clone(),
            ];
            assert_eq!(Set::from(&shuffled).encoded(Some(encoder.as_ref())), expected);
        }
    }

    #[test]
    fn encoded_is_cached_per_encoder() {
        let set = Set::from(&[KeyValue::new("a", "1")]);
        let enc1 = default_encoder();
        let enc2 = default_encoder();

        assert_eq!(set.encoded(Some(enc1.as_ref())), "a=1");
        assert_eq!(set.encoded(Some(enc1.as_ref())), "a=1");
        assert_eq!(set.encoded(Some(enc2.as_ref())), "a=1");
    }

    #[test]
    fn equivalent_sets_hash_equal() {
        let a = Set::from(&[KeyValue::new("x", 1i64), KeyValue::new("y", 2i64)]);
        let b = Set::from(&[KeyValue::new("y", 2i64), KeyValue::new("x", 1i64)]);
        assert_eq!(a.equivalent(), b.equivalent());

        let mut ha = fnv::FnvHasher::default();
        a.equivalent().hash(&mut ha);
        let mut hb = fnv::FnvHasher::default();
        b.equivalent().hash(&mut hb);
        assert_eq!(std::hash::Hasher::finish(&ha), std::hash::Hasher::finish(&hb));
    }

    #[test]
    fn merge_iters_primary_wins_on_collision() {
        let l1 = Set::from(&[
            KeyValue::new(Key::new("A"), 1i64),
            KeyValue::new(Key::new("B"), 1i64),
        ]);
        let l2 = Set::from(&[
            KeyValue::new(Key::new("B"), 2i64),
            KeyValue::new(Key::new("C"), 2i64),
        ]);

        let merged = merge_iters(l1.iter(), l2.iter())
            .map(|kv| (kv.key.as_str().to_string(), String::from(&kv.value)))
            .collect::<Vec<_>>();

        assert_eq!(
            merged,
            vec![
                ("A".to_string(), "1".to_string()),
                ("B".to_string(), "1".to_string()),
                ("C".to_string(), "2".to_string()),
            ]
        );
    }

    #[test]
    fn merge_iters_is_stable() {
        let l1 = Set::from(&[KeyValue::new("A", 1i64), KeyValue::new("B", 1i64)]);
        let l2 = Set::from(&[KeyValue::new("B", 2i64), KeyValue::new("C", 2i64)]);

        let first = merge_iters(l1.iter(), l2.iter()).cloned().collect::<Vec<_>>();
        for _ in 0..16 {
            let again = merge_iters(l1.iter(), l2.iter()).cloned().collect::<Vec<_>>();
            assert_eq!(first, again);
        }
    }
}
