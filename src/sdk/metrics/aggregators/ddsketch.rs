//! DDSketch quantile sketch with relative-error guarantees.
//!
//! DDSketch is a fast and fully-mergeable quantile sketch. Rather than
//! bounding rank error, it bounds the relative error of reported quantile
//! values, which behaves well on long-tailed distributions. The detail of
//! the algorithm can be found in <https://arxiv.org/pdf/1908.10693>.
use crate::api::metrics::{Descriptor, MetricsError, Number, NumberKind, Result};
use crate::sdk::export::metrics::{
    Aggregation, AggregationKind, Aggregator, Count, Distribution, Max, Min, MinMaxSumCount,
    Quantile, Sum,
};
use std::any::Any;
use std::cmp::Ordering;
use std::mem;
use std::sync::{Arc, RwLock};

const INITIAL_NUM_BINS: usize = 128;
const GROW_LEFT_BY: i64 = 128;

const DEFAULT_MAX_NUM_BINS: i64 = 2048;
const DEFAULT_ALPHA: f64 = 0.01;
const DEFAULT_MIN_BOUNDARY: f64 = 1.0e-9;

/// Configuration for a [`DDSketchAggregator`].
#[derive(Debug, Clone)]
pub struct DDSketchConfig {
    alpha: f64,
    max_num_bins: i64,
    min_boundary: f64,
}

impl DDSketchConfig {
    /// Create a new configuration with the given relative-error guarantee
    /// `alpha`, maximum number of bins, and minimum representable boundary.
    pub fn new(alpha: f64, max_num_bins: i64, min_boundary: f64) -> Self {
        DDSketchConfig {
            alpha,
            max_num_bins,
            min_boundary,
        }
    }
}

impl Default for DDSketchConfig {
    fn default() -> Self {
        DDSketchConfig {
            alpha: DEFAULT_ALPHA,
            max_num_bins: DEFAULT_MAX_NUM_BINS,
            min_boundary: DEFAULT_MIN_BOUNDARY,
        }
    }
}

/// Create a new `DDSketchAggregator` for the given number kind.
pub fn ddsketch(config: &DDSketchConfig, kind: NumberKind) -> DDSketchAggregator {
    DDSketchAggregator {
        inner: RwLock::new(Inner::new(config.clone(), kind)),
    }
}

/// DDSketch quantile sketch aggregator.
///
/// It can answer q-quantiles with α-accuracy for any 0 <= q <= 1.
#[derive(Debug)]
pub struct DDSketchAggregator {
    inner: RwLock<Inner>,
}

impl Sum for DDSketchAggregator {
    fn sum(&self) -> Result<Number> {
        self.inner
            .read()
            .map_err(From::from)
            .map(|inner| inner.sum.clone())
    }
}

impl Min for DDSketchAggregator {
    fn min(&self) -> Result<Number> {
        self.inner
            .read()
            .map_err(From::from)
            .map(|inner| inner.min_value.clone())
    }
}

impl Max for DDSketchAggregator {
    fn max(&self) -> Result<Number> {
        self.inner
            .read()
            .map_err(From::from)
            .map(|inner| inner.max_value.clone())
    }
}

impl Count for DDSketchAggregator {
    fn count(&self) -> Result<u64> {
        self.inner
            .read()
            .map_err(From::from)
            .map(|inner| inner.store.count)
    }
}

impl MinMaxSumCount for DDSketchAggregator {}

impl Distribution for DDSketchAggregator {}

impl Quantile for DDSketchAggregator {
    fn quantile(&self, q: f64) -> Result<Number> {
        if !(0.0..=1.0).contains(&q) {
            return Err(MetricsError::InvalidQuantile);
        }
        self.inner.read().map_err(From::from).and_then(|inner| {
            if inner.store.count == 0 {
                return Err(MetricsError::NoDataCollected);
            }
            if q == 0.0 {
                return Ok(inner.min_value.clone());
            }

            if (q - 1.0).abs() < f64::EPSILON {
                return Ok(inner.max_value.clone());
            }

            let rank = (q * (inner.store.count - 1) as f64).ceil() as u64 + 1;
            let mut key = inner.store.key_at_rank(rank);
            // Calculate the actual value based on the key of bins.
            let quantile_val = match key.cmp(&0) {
                Ordering::Less => {
                    key += inner.offset;
                    -2.0 * inner.gamma_ln * (-key as f64) / (1.0 + inner.gamma)
                }
                Ordering::Greater => {
                    key -= inner.offset;
                    2.0 * inner.gamma_ln * (key as f64) / (1.0 + inner.gamma)
                }
                Ordering::Equal => 0f64,
            };

            let mut quantile = match inner.kind {
                NumberKind::F64 => Number::from(quantile_val),
                NumberKind::U64 => Number::from(quantile_val as u64),
                NumberKind::I64 => Number::from(quantile_val as i64),
            };

            // Clamp the result within [min_value, max_value].
            if quantile.partial_cmp(&inner.kind, &inner.min_value) == Some(Ordering::Less) {
                quantile = inner.min_value.clone();
            }

            if quantile.partial_cmp(&inner.kind, &inner.max_value) == Some(Ordering::Greater) {
                quantile = inner.max_value.clone();
            }

            Ok(quantile)
        })
    }
}

impl Aggregation for DDSketchAggregator {
    fn kind(&self) -> &AggregationKind {
        &AggregationKind::SKETCH
    }
}

impl Aggregator for DDSketchAggregator {
    fn aggregation(&self) -> &dyn Aggregation {
        self
    }

    fn update(&self, number: &Number, descriptor: &Descriptor) -> Result<()> {
        self.inner
            .write()
            .map_err(From::from)
            .map(|mut inner| inner.add(number, descriptor.number_kind()))
    }

    fn synchronized_move(
        &self,
        destination: &Arc<dyn Aggregator + Send + Sync>,
        _descriptor: &Descriptor,
    ) -> Result<()> {
        if let Some(other) = destination.as_any().downcast_ref::<Self>() {
            self.inner.write().map_err(From::from).and_then(|mut inner| {
                other.inner.write().map_err(From::from).map(|mut oi| {
                    *oi = inner.checkpoint();
                })
            })
        } else {
            Err(MetricsError::InconsistentAggregator(format!(
                "Expected {:?}, got: {:?}",
                self, destination
            )))
        }
    }

    fn merge(&self, other: &(dyn Aggregator + Send + Sync), _descriptor: &Descriptor) -> Result<()> {
        if let Some(other) = other.as_any().downcast_ref::<DDSketchAggregator>() {
            self.inner.write().map_err(From::from).and_then(|mut inner| {
                other.inner.read().map_err(From::from).and_then(|oi| {
                    if inner.store.max_num_bins != oi.store.max_num_bins {
                        return Err(MetricsError::InconsistentAggregator(format!(
                            "Sketches must use the same max number of bins to merge, expected {:?}, got {:?}",
                            inner.store.max_num_bins, oi.store.max_num_bins
                        )));
                    }
                    if (inner.gamma - oi.gamma).abs() > f64::EPSILON {
                        return Err(MetricsError::InconsistentAggregator(format!(
                            "Sketches must use the same gamma to merge, expected {:?}, got {:?}",
                            inner.gamma, oi.gamma
                        )));
                    }

                    if oi.store.count == 0 {
                        return Ok(());
                    }

                    inner.store.merge(&oi.store);

                    inner.sum.saturating_add(&inner.kind, &oi.sum);

                    if inner.min_value.partial_cmp(&inner.kind, &oi.min_value)
                        == Some(Ordering::Greater)
                    {
                        inner.min_value = oi.min_value.clone();
                    }

                    if inner.max_value.partial_cmp(&inner.kind, &oi.max_value)
                        == Some(Ordering::Less)
                    {
                        inner.max_value = oi.max_value.clone();
                    }

                    Ok(())
                })
            })
        } else {
            Err(MetricsError::InconsistentAggregator(format!(
                "Expected {:?}, got: {:?}",
                self, other
            )))
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The raw sketch state.
///
/// `Inner` is not thread-safe; all operations are protected by the
/// aggregator's lock.
#[derive(Debug)]
struct Inner {
    store: Store,
    kind: NumberKind,
    config: DDSketchConfig,
    // sum of all values within the store
    sum: Number,
    // γ = (1 + α)/(1 - α)
    gamma: f64,
    // ln(γ)
    gamma_ln: f64,
    // offset ensures that keys for positive numbers larger than min_boundary
    // are >= 1 while keys for negative numbers are <= -1.
    offset: i64,

    // minimum number in the store.
    min_value: Number,
    // maximum number in the store.
    max_value: Number,
}

impl Inner {
    fn new(config: DDSketchConfig, kind: NumberKind) -> Inner {
        let gamma: f64 = 1.0 + 2.0 * config.alpha / (1.0 - config.alpha);
        let mut inner = Inner {
            store: Store::new(config.max_num_bins),
            min_value: kind.max(),
            max_value: kind.min(),
            sum: kind.zero(),
            gamma,
            gamma_ln: gamma.ln(),
            offset: 0,
            config,
            kind,
        };
        // reset offset based on min_boundary
        inner.offset = -(inner.log_gamma(inner.config.min_boundary)).ceil() as i64 + 1i64;
        inner
    }

    /// Take the current state, leaving a freshly-reset sketch with the same
    /// configuration in place.
    fn checkpoint(&mut self) -> Inner {
        let empty = Inner::new(self.config.clone(), self.kind.clone());
        mem::replace(self, empty)
    }

    fn add(&mut self, v: &Number, kind: &NumberKind) {
        let key = self.key(v, kind);
        self.store.add(key);

        // update min and max
        if self.min_value.partial_cmp(&self.kind, v) == Some(Ordering::Greater) {
            self.min_value = v.clone();
        }

        if self.max_value.partial_cmp(&self.kind, v) == Some(Ordering::Less) {
            self.max_value = v.clone();
        }

        self.sum.saturating_add(&self.kind, v);
    }

    fn key(&self, num: &Number, kind: &NumberKind) -> i64 {
        if num.to_f64(kind) < -self.config.min_boundary {
            let positive = -num.to_f64(kind);
            (-self.log_gamma(positive).ceil()) as i64 - self.offset
        } else if num.to_f64(kind) > self.config.min_boundary {
            self.log_gamma(num.to_f64(kind)).ceil() as i64 + self.offset
        } else {
            0i64
        }
    }

    /// Index of the bucket for `num`.
    fn log_gamma(&self, num: f64) -> f64 {
        num.ln() / self.gamma_ln
    }
}

#[derive(Debug)]
struct Store {
    bins: Vec<u64>,
    count: u64,
    min_key: i64,
    max_key: i64,
    // maximum number of bins the store can have.
    // In the worst case the bucket can grow as large as the number of
    // elements inserted, so max_num_bins bounds the memory use; when the
    // limit is hit, underflowing keys collapse into the left-most bin.
    max_num_bins: i64,
}

impl Store {
    fn new(max_num_bins: i64) -> Store {
        Store {
            bins: vec![0; INITIAL_NUM_BINS],
            count: 0u64,
            min_key: 0i64,
            max_key: 0i64,
            max_num_bins,
        }
    }

    /// Add a count for the given key.
    ///
    /// If key is not in [min_key, max_key] the bins grow to the left or
    /// right. Keys are offset by `min_key` before indexing into bins.
    fn add(&mut self, key: i64) {
        if self.count == 0 {
            self.max_key = key;
            self.min_key = key - self.bins.len() as i64 + 1
        }

        if key < self.min_key {
            self.grow_left(key)
        } else if key > self.max_key {
            self.grow_right(key)
        }
        let idx = if key - self.min_key < 0 {
            0
        } else {
            key - self.min_key
        };
        // grow_left and grow_right ensure the index is within bounds
        let bin_count = self.bins.get_mut(idx as usize).unwrap();
        *bin_count += 1;
        self.count += 1;
    }

    fn grow_left(&mut self, key: i64) {
        if self.min_key < key || self.bins.len() >= self.max_num_bins as usize {
            return;
        }

        let min_key = if self.max_key - key >= self.max_num_bins {
            self.max_key - self.max_num_bins + 1
        } else {
            let mut min_key = self.min_key;
            while min_key > key {
                min_key -= GROW_LEFT_BY;
            }
            min_key
        };

        // The new vector has three parts: the zeroed expansion, the
        // existing bins, and whatever is left.
        let expected_len = (self.max_key - min_key + 1) as usize;
        let mut new_bins = vec![0u64; expected_len];
        let old_bin_slice = &mut new_bins[(self.min_key - min_key) as usize..];
        old_bin_slice.copy_from_slice(&self.bins);

        self.bins = new_bins;
        self.min_key = min_key;
    }

    fn grow_right(&mut self, key: i64) {
        if self.max_key > key {
            return;
        }

        if key - self.max_key >= self.max_num_bins {
            // The new key is so far ahead that all existing counts collapse
            // into the left-most bin.
            self.bins = vec![0; self.max_num_bins as usize];
            self.max_key = key;
            self.min_key = key - self.max_num_bins + 1;
            self.bins[0] = self.count;
        } else if key - self.min_key >= self.max_num_bins {
            let min_key = key - self.max_num_bins + 1;
            let upper_bound = if min_key < self.max_key + 1 {
                min_key
            } else {
                self.max_key + 1
            } - self.min_key;
            let n = self.bins.iter().take(upper_bound as usize).sum::<u64>();

            if self.bins.len() < self.max_num_bins as usize {
                let mut new_bins = vec![0; self.max_num_bins as usize];
                new_bins[..self.bins.len() - (min_key - self.min_key) as usize]
                    .copy_from_slice(&self.bins[(min_key - self.min_key) as usize..]);
                self.bins = new_bins;
            } else {
                // bins length is equal to the max number of bins
                self.bins.drain(0..(min_key - self.min_key) as usize);

                for _ in self.max_key - min_key + 1..self.max_num_bins {
                    self.bins.push(0);
                }
            }
            self.max_key = key;
            self.min_key = min_key;
            self.bins[0] += n;
        } else {
            let mut new_bins = vec![0; (key - self.min_key + 1) as usize];
            new_bins[0..self.bins.len()]
                .as_mut()
                .copy_from_slice(&self.bins);
            self.bins = new_bins;
            self.max_key = key;
        }
    }

    /// Returns the key of the value at the given rank.
    fn key_at_rank(&self, rank: u64) -> i64 {
        self.bins
            .iter()
            .enumerate()
            .scan(0, |state, (key, &count)| {
                *state += count;
                Some((key, *state))
            })
            .filter(|(_key, accumulated)| *accumulated >= rank)
            .map(|(key, _)| key as i64 + self.min_key)
            .next()
            .unwrap_or(self.max_key)
    }

    /// Merge another store into this one.
    fn merge(&mut self, other: &Store) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            self.bins = other.bins.clone();
            self.min_key = other.min_key;
            self.max_key = other.max_key;
            self.count = other.count;
            return;
        }

        if self.max_key > other.max_key {
            if other.min_key < self.min_key {
                self.grow_left(other.min_key);
            }
            let start = other.min_key.max(self.min_key);
            for i in start..=other.max_key {
                self.bins[(i - self.min_key) as usize] += other.bins[(i - other.min_key) as usize];
            }
            let mut n = 0;
            for i in other.min_key..self.min_key {
                n += other.bins[(i - other.min_key) as usize]
            }
            self.bins[0] += n;
        } else if other.min_key < self.min_key {
            let mut tmp_bins = other.bins.clone();

            for i in self.min_key..=self.max_key {
                tmp_bins[(i - other.min_key) as usize] += self.bins[(i - self.min_key) as usize];
            }

            self.bins = tmp_bins;
            self.max_key = other.max_key;
            self.min_key = other.min_key;
        } else {
            self.grow_right(other.max_key);
            for i in other.min_key..=other.max_key {
                self.bins[(i - self.min_key) as usize] += other.bins[(i - other.min_key) as usize];
            }
        }

        self.count += other.count;
    }
}
