//! Simple aggregator selectors.
use crate::api::metrics::{Descriptor, InstrumentKind};
use crate::sdk::export::metrics::{Aggregator, AggregatorSelector};
use crate::sdk::metrics::aggregators::{self, DDSketchConfig};
use std::sync::Arc;

/// Aggregation selection strategies.
///
/// Adding instruments always aggregate with a sum; the variants differ in
/// how grouping instruments (ValueRecorder, ValueObserver) are summarized.
#[derive(Debug, Clone)]
pub enum Selector {
    /// A simple aggregation selector that uses min-max-sum-count
    /// aggregators for grouping instruments. This selector is faster and
    /// uses less memory than the others because it does not aggregate
    /// quantile information.
    Inexpensive,
    /// A simple aggregation selector that uses array aggregators for
    /// grouping instruments. This selector is able to compute exact
    /// quantiles at the cost of keeping every observation.
    Exact,
    /// A simple aggregation selector that uses histogram aggregators with
    /// the given boundaries for grouping instruments. This selector uses
    /// more memory than `Inexpensive` because it uses a counter per bucket.
    Histogram(Vec<f64>),
    /// A simple aggregation selector that uses DDSketch aggregators for
    /// grouping instruments, supporting quantiles with a relative-error
    /// guarantee at fixed memory cost.
    Sketch(DDSketchConfig),
}

impl AggregatorSelector for Selector {
    fn aggregator_for(&self, descriptor: &Descriptor) -> Option<Arc<dyn Aggregator + Send + Sync>> {
        match self {
            Selector::Inexpensive => match descriptor.instrument_kind() {
                InstrumentKind::ValueObserver | InstrumentKind::ValueRecorder => {
                    Some(Arc::new(aggregators::min_max_sum_count(descriptor)))
                }
                _ => Some(Arc::new(aggregators::sum())),
            },
            Selector::Exact => match descriptor.instrument_kind() {
                InstrumentKind::ValueObserver | InstrumentKind::ValueRecorder => {
                    Some(Arc::new(aggregators::array()))
                }
                _ => Some(Arc::new(aggregators::sum())),
            },
            Selector::Histogram(boundaries) => match descriptor.instrument_kind() {
                InstrumentKind::ValueObserver | InstrumentKind::ValueRecorder => {
                    Some(Arc::new(aggregators::histogram(descriptor, boundaries)))
                }
                _ => Some(Arc::new(aggregators::sum())),
            },
            Selector::Sketch(config) => match descriptor.instrument_kind() {
                InstrumentKind::ValueObserver | InstrumentKind::ValueRecorder => Some(Arc::new(
                    aggregators::ddsketch(config, descriptor.number_kind().clone()),
                )),
                _ => Some(Arc::new(aggregators::sum())),
            },
        }
    }
}
