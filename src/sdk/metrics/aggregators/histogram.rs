use crate::api::metrics::{Descriptor, MetricsError, Number, NumberKind, Result};
use crate::sdk::export::metrics::{
    Aggregation, AggregationKind, Aggregator, Buckets, Count, Histogram, Sum,
};
use std::any::Any;
use std::mem;
use std::sync::{Arc, Mutex};

/// Create a new `HistogramAggregator` with the given bucket boundaries.
///
/// Boundaries are sorted at construction; a value `v` is counted in bucket
/// `i` when `v < boundaries[i]`, with one final bucket for values past the
/// last boundary.
pub fn histogram(descriptor: &Descriptor, boundaries: &[f64]) -> HistogramAggregator {
    let mut sorted_boundaries = boundaries.to_vec();
    sorted_boundaries.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Less));
    let state = State::empty(&sorted_boundaries);

    HistogramAggregator {
        inner: Mutex::new(Inner {
            boundaries: sorted_boundaries,
            kind: descriptor.number_kind().clone(),
            state,
        }),
    }
}

/// This aggregator observes events and counts them in pre-determined
/// buckets. It also calculates the sum and count of all events.
#[derive(Debug)]
pub struct HistogramAggregator {
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    boundaries: Vec<f64>,
    kind: NumberKind,
    state: State,
}

#[derive(Debug)]
struct State {
    bucket_counts: Vec<f64>,
    count: u64,
    sum: Number,
}

impl State {
    fn empty(boundaries: &[f64]) -> Self {
        State {
            bucket_counts: vec![0.0; boundaries.len() + 1],
            count: 0,
            sum: Number::default(),
        }
    }
}

impl Sum for HistogramAggregator {
    fn sum(&self) -> Result<Number> {
        self.inner
            .lock()
            .map_err(From::from)
            .map(|inner| inner.state.sum.clone())
    }
}

impl Count for HistogramAggregator {
    fn count(&self) -> Result<u64> {
        self.inner
            .lock()
            .map_err(From::from)
            .map(|inner| inner.state.count)
    }
}

impl Histogram for HistogramAggregator {
    fn histogram(&self) -> Result<Buckets> {
        self.inner.lock().map_err(From::from).map(|inner| {
            Buckets::new(inner.boundaries.clone(), inner.state.bucket_counts.clone())
        })
    }
}

impl Aggregation for HistogramAggregator {
    fn kind(&self) -> &AggregationKind {
        &AggregationKind::HISTOGRAM
    }
}

impl Aggregator for HistogramAggregator {
    fn aggregation(&self) -> &dyn Aggregation {
        self
    }

    fn update(&self, number: &Number, descriptor: &Descriptor) -> Result<()> {
        self.inner
            .lock()
            .map_err(From::from)
            .map(|mut inner| {
                let kind = descriptor.number_kind();
                let as_float = number.to_f64(kind);

                let mut bucket_id = inner.boundaries.len();
                for (idx, boundary) in inner.boundaries.iter().enumerate() {
                    if as_float < *boundary {
                        bucket_id = idx;
                        break;
                    }
                }

                inner.state.count = inner.state.count.saturating_add(1);
                inner.state.sum.saturating_add(kind, number);
                inner.state.bucket_counts[bucket_id] += 1.0;
            })
    }

    fn synchronized_move(
        &self,
        other: &Arc<dyn Aggregator + Send + Sync>,
        _descriptor: &Descriptor,
    ) -> Result<()> {
        if let Some(other) = other.as_any().downcast_ref::<Self>() {
            self.inner.lock().map_err(From::from).and_then(|mut inner| {
                other.inner.lock().map_err(From::from).map(|mut oi| {
                    let empty = State::empty(&inner.boundaries);
                    oi.state = mem::replace(&mut inner.state, empty);
                })
            })
        } else {
            Err(MetricsError::InconsistentAggregator(format!(
                "Expected {:?}, got: {:?}",
                self, other
            )))
        }
    }

    fn merge(&self, other: &(dyn Aggregator + Send + Sync), desc: &Descriptor) -> Result<()> {
        if let Some(other) = other.as_any().downcast_ref::<Self>() {
            self.inner.lock().map_err(From::from).and_then(|mut inner| {
                other.inner.lock().map_err(From::from).and_then(|oi| {
                    if inner.boundaries != oi.boundaries {
                        return Err(MetricsError::InconsistentAggregator(format!(
                            "Bucket boundaries must match to merge histograms, expected {:?}, got {:?}",
                            inner.boundaries, oi.boundaries
                        )));
                    }

                    inner.state.count = inner.state.count.saturating_add(oi.state.count);
                    inner.state.sum.saturating_add(desc.number_kind(), &oi.state.sum);
                    for idx in 0..inner.state.bucket_counts.len() {
                        inner.state.bucket_counts[idx] += oi.state.bucket_counts[idx];
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::metrics::InstrumentKind;

    fn descriptor() -> Descriptor {
        Descriptor::new(
            "recorder".into(),
            "test",
            None,
            InstrumentKind::ValueRecorder,
            NumberKind::F64,
        )
    }

    #[test]
    fn counts_in_buckets() {
        let desc = descriptor();
        let agg = histogram(&desc, &[10.0, 20.0]);
        for v in [5.0f64, 15.0, 25.0, 12.0] {
            agg.update(&Number::from(v), &desc).unwrap();
        }

        assert_eq!(agg.count().unwrap(), 4);
        assert_eq!(agg.sum().unwrap().to_f64(&NumberKind::F64), 57.0);
        let buckets = agg.histogram().unwrap();
        assert_eq!(buckets.boundaries(), &vec![10.0, 20.0]);
        assert_eq!(buckets.counts(), &vec![1.0, 2.0, 1.0]);
    }

    #[test]
    fn boundaries_are_sorted_at_construction() {
        let desc = descriptor();
        let agg = histogram(&desc, &[20.0, 10.0]);
        agg.update(&Number::from(5.0f64), &desc).unwrap();
        let buckets = agg.histogram().unwrap();
        assert_eq!(buckets.boundaries(), &vec![10.0, 20.0]);
        assert_eq!(buckets.counts(), &vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn synchronized_move_resets_counts() {
        let desc = descriptor();
        let agg = histogram(&desc, &[10.0]);
        agg.update(&Number::from(3.0f64), &desc).unwrap();

        let checkpoint: Arc<dyn Aggregator + Send + Sync> = Arc::new(histogram(&desc, &[10.0]));
        agg.synchronized_move(&checkpoint, &desc).unwrap();

        assert_eq!(agg.count().unwrap(), 0);
        assert_eq!(agg.sum().unwrap().to_f64(&NumberKind::F64), 0.0);
        let checkpoint = checkpoint
            .as_any()
            .downcast_ref::<HistogramAggregator>()
            .unwrap();
        assert_eq!(checkpoint.count().unwrap(), 1);
    }

    #[test]
    fn merge_requires_matching_boundaries() {
        let desc = descriptor();
        let a = histogram(&desc, &[10.0]);
        let b = histogram(&desc, &[10.0, 20.0]);
        assert!(matches!(
            a.merge(&b, &desc),
            Err(MetricsError::InconsistentAggregator(_))
        ));

        let c = histogram(&desc, &[10.0]);
        a.update(&Number::from(1.0f64), &desc).unwrap();
        c.update(&Number::from(11.0f64), &desc).unwrap();
        a.merge(&c, &desc).unwrap();
        assert_eq!(a.count().unwrap(), 2);
        let buckets = a.histogram().unwrap();
        assert_eq!(buckets.counts(), &vec![1.0, 1.0]);
    }
}
