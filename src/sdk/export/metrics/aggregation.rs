//! Read views over aggregator state.
//!
//! Each concrete aggregator exposes a subset of these capability traits;
//! exporters downcast through [`Aggregator::as_any`] to the views they can
//! present.
//!
//! [`Aggregator::as_any`]: crate::sdk::export::metrics::Aggregator::as_any
use crate::api::metrics::{Number, Result};
use std::time::SystemTime;

/// An interface returned by an aggregator containing an interval of metric
/// data.
pub trait Aggregation {
    /// A short identifying string for the kind of aggregator that produced
    /// this aggregation (e.g., [`AggregationKind::SUM`]).
    fn kind(&self) -> &AggregationKind;
}

/// Sum returns an aggregated sum.
pub trait Sum: Aggregation {
    /// The sum of the currently aggregated metrics
    fn sum(&self) -> Result<Number>;
}

/// Count returns the number of values that were aggregated.
pub trait Count: Aggregation {
    /// The count of the currently aggregated metrics
    fn count(&self) -> Result<u64>;
}

/// Min returns the minimum value over the set of values that were aggregated.
pub trait Min: Aggregation {
    /// The min of the currently aggregated metrics
    fn min(&self) -> Result<Number>;
}

/// Max returns the maximum value over the set of values that were aggregated.
pub trait Max: Aggregation {
    /// The max of the currently aggregated metrics
    fn max(&self) -> Result<Number>;
}

/// LastValue returns the latest value that was aggregated and the timestamp
/// at which it was observed.
pub trait LastValue: Aggregation {
    /// The last value of the currently aggregated metrics
    fn last_value(&self) -> Result<(Number, SystemTime)>;
}

/// Points return the raw set of values that were aggregated.
pub trait Points: Aggregation {
    /// The raw set of points in the current aggregation
    fn points(&self) -> Result<Vec<Number>>;
}

/// Quantile values are calculated over the set of values that were
/// aggregated.
///
/// `q` must lie in `[0, 1]`: 0 returns the minimum, 1 returns the maximum,
/// interior values use nearest-rank semantics (or the sketch's native
/// algorithm). `InvalidQuantile` is returned for out-of-range `q`,
/// `NoDataCollected` when nothing was aggregated.
pub trait Quantile: Aggregation {
    /// The quantile of the currently aggregated metrics
    fn quantile(&self, q: f64) -> Result<Number>;
}

/// MinMaxSumCount is a common interface for aggregators that expose the four
/// basic distribution fields.
pub trait MinMaxSumCount: Min + Max + Sum + Count {}

/// Distribution additionally supports quantile queries.
pub trait Distribution: MinMaxSumCount + Quantile {}

/// Buckets represent histogram bucket boundaries and counts.
///
/// For a histogram with N defined boundaries, e.g, [x, y, z], there are N+1
/// counts: [-inf, x), [x, y), [y, z), [z, +inf].
#[derive(Debug)]
pub struct Buckets {
    /// Boundaries are floating point numbers, even when aggregating
    /// integers.
    boundaries: Vec<f64>,

    /// Counts are floating point numbers to account for the possibility of
    /// sampling which allows for non-integer count values.
    counts: Vec<f64>,
}

impl Buckets {
    /// Create new buckets
    pub fn new(boundaries: Vec<f64>, counts: Vec<f64>) -> Self {
        Buckets { boundaries, counts }
    }

    /// Boundaries of the histogram buckets
    pub fn boundaries(&self) -> &Vec<f64> {
        &self.boundaries
    }

    /// Counts of the histogram buckets
    pub fn counts(&self) -> &Vec<f64> {
        &self.counts
    }
}

/// Histogram returns the count of events in pre-determined buckets.
pub trait Histogram: Sum + Count + Aggregation {
    /// Buckets for this histogram.
    fn histogram(&self) -> Result<Buckets>;
}

/// A short name for the aggregator that produces an `Aggregation`.
///
/// Kind is a string to allow user-defined aggregators.
///
/// When deciding how to handle an aggregation, exporters are encouraged to
/// decide based on conversion to the above interfaces based on strength, not
/// on kind value. For example, test for a histogram before testing for a
/// sum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationKind(&'static str);

impl AggregationKind {
    /// Aggregations that return an aggregated sum.
    pub const SUM: Self = AggregationKind("SUM");

    /// Aggregations that return only the latest value.
    pub const LAST_VALUE: Self = AggregationKind("LAST_VALUE");

    /// Aggregations that return the min, max, sum, and count of the values.
    pub const MIN_MAX_SUM_COUNT: Self = AggregationKind("MIN_MAX_SUM_COUNT");

    /// Aggregations that return a distribution in pre-determined buckets.
    pub const HISTOGRAM: Self = AggregationKind("HISTOGRAM");

    /// Aggregations that keep every observed value.
    pub const EXACT: Self = AggregationKind("EXACT");

    /// Aggregations that summarize a distribution with a relative-error
    /// sketch.
    pub const SKETCH: Self = AggregationKind("SKETCH");

    /// Create a new custom aggregation kind
    pub const fn new(name: &'static str) -> Self {
        AggregationKind(name)
    }
}
