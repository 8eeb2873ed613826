use crate::api::metrics::{Descriptor, MetricsError, Number, NumberKind, Result};
use crate::sdk::export::metrics::{
    Aggregation, AggregationKind, Aggregator, Count, Max, Min, MinMaxSumCount, Sum,
};
use std::any::Any;
use std::cmp::Ordering;
use std::sync::{Arc, Mutex};

/// Create a new `MinMaxSumCountAggregator`
pub fn min_max_sum_count(descriptor: &Descriptor) -> MinMaxSumCountAggregator {
    let kind = descriptor.number_kind().clone();
    MinMaxSumCountAggregator {
        inner: Mutex::new(Inner { state: None }),
        kind,
    }
}

#[derive(Debug)]
struct Inner {
    state: Option<State>,
}

/// An `Aggregator` that aggregates events that form a distribution, keeping
/// only the min, max, sum, and count.
#[derive(Debug)]
pub struct MinMaxSumCountAggregator {
    inner: Mutex<Inner>,
    kind: NumberKind,
}

impl Min for MinMaxSumCountAggregator {
    fn min(&self) -> Result<Number> {
        self.inner.lock().map_err(From::from).map(|inner| {
            inner
                .state
                .as_ref()
                .map_or(0u64.into(), |state| state.min.clone())
        })
    }
}

impl Max for MinMaxSumCountAggregator {
    fn max(&self) -> Result<Number> {
        self.inner.lock().map_err(From::from).map(|inner| {
            inner
                .state
                .as_ref()
                .map_or(0u64.into(), |state| state.max.clone())
        })
    }
}

impl Sum for MinMaxSumCountAggregator {
    fn sum(&self) -> Result<Number> {
        self.inner.lock().map_err(From::from).map(|inner| {
            inner
                .state
                .as_ref()
                .map_or(0u64.into(), |state| state.sum.clone())
        })
    }
}

impl Count for MinMaxSumCountAggregator {
    fn count(&self) -> Result<u64> {
        self.inner
            .lock()
            .map_err(From::from)
            .map(|inner| inner.state.as_ref().map_or(0u64, |state| state.count))
    }
}

impl MinMaxSumCount for MinMaxSumCountAggregator {}

impl Aggregation for MinMaxSumCountAggregator {
    fn kind(&self) -> &AggregationKind {
        &AggregationKind::MIN_MAX_SUM_COUNT
    }
}

impl Aggregator for MinMaxSumCountAggregator {
    fn aggregation(&self) -> &dyn Aggregation {
        self
    }

    fn update(&self, number: &Number, descriptor: &Descriptor) -> Result<()> {
        self.inner
            .lock()
            .map(|mut inner| {
                if let Some(state) = &mut inner.state {
                    let kind = descriptor.number_kind();

                    state.count = state.count.saturating_add(1);
                    state.sum.saturating_add(kind, number);
                    if number.partial_cmp(kind, &state.min) == Some(Ordering::Less) {
                        state.min = number.clone();
                    }
                    if number.partial_cmp(kind, &state.max) == Some(Ordering::Greater) {
                        state.max = number.clone();
                    }
                } else {
                    inner.state = Some(State {
                        count: 1,
                        sum: number.clone(),
                        min: number.clone(),
                        max: number.clone(),
                    })
                }
            })
            .map_err(From::from)
    }

    fn synchronized_move(
        &self,
        other: &Arc<dyn Aggregator + Send + Sync>,
        _descriptor: &Descriptor,
    ) -> Result<()> {
        if let Some(other) = other.as_any().downcast_ref::<Self>() {
            self.inner.lock().map_err(From::from).and_then(|mut inner| {
                other.inner.lock().map_err(From::from).map(|mut oi| {
                    oi.state = inner.state.take();
                })
            })
        } else {
            Err(MetricsError::InconsistentAggregator(format!(
                "Expected {:?}, got: {:?}",
                self, other
            )))
        }
    }

    fn merge(&self, aggregator: &(dyn Aggregator + Send + Sync), desc: &Descriptor) -> Result<()> {
        if let Some(other) = aggregator.as_any().downcast_ref::<Self>() {
            self.inner.lock().map_err(From::from).and_then(|mut inner| {
                other.inner.lock().map_err(From::from).map(|oi| {
                    match (inner.state.as_mut(), oi.state.as_ref()) {
                        (None, Some(other_checkpoint)) => {
                            inner.state = Some(other_checkpoint.clone());
                        }
                        (Some(_), None) | (None, None) => (),
                        (Some(state), Some(other)) => {
                            state.count = state.count.saturating_add(other.count);
                            state.sum.saturating_add(desc.number_kind(), &other.sum);

                            if state.min.partial_cmp(desc.number_kind(), &other.min)
                                == Some(Ordering::Greater)
                            {
                                state.min.assign(desc.number_kind(), &other.min);
                            }
                            if state.max.partial_cmp(desc.number_kind(), &other.max)
                                == Some(Ordering::Less)
                            {
                                state.max.assign(desc.number_kind(), &other.max);
                            }
                        }
                    }
                })
            })
        } else {
            Err(MetricsError::InconsistentAggregator(format!(
                "Expected {:?}, got: {:?}",
                self, aggregator
            )))
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Clone, Debug)]
struct State {
    count: u64,
    sum: Number,
    min: Number,
    max: Number,
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
            NumberKind::I64,
        )
    }

    #[test]
    fn tracks_four_fields() {
        let desc = descriptor();
        let agg = min_max_sum_count(&desc);
        for v in [3i64, -1, 7, 2] {
            agg.update(&Number::from(v), &desc).unwrap();
        }

        assert_eq!(agg.count().unwrap(), 4);
        assert_eq!(agg.sum().unwrap().to_i64(&NumberKind::I64), 11);
        assert_eq!(agg.min().unwrap().to_i64(&NumberKind::I64), -1);
        assert_eq!(agg.max().unwrap().to_i64(&NumberKind::I64), 7);
    }

    #[test]
    fn synchronized_move_resets_to_identity() {
        let desc = descriptor();
        let agg = min_max_sum_count(&desc);
        agg.update(&Number::from(5i64), &desc).unwrap();

        let checkpoint: Arc<dyn Aggregator + Send + Sync> = Arc::new(min_max_sum_count(&desc));
        agg.synchronized_move(&checkpoint, &desc).unwrap();

        assert_eq!(agg.count().unwrap(), 0);
        let checkpoint = checkpoint
            .as_any()
            .downcast_ref::<MinMaxSumCountAggregator>()
            .unwrap();
        assert_eq!(checkpoint.count().unwrap(), 1);
        assert_eq!(checkpoint.sum().unwrap().to_i64(&NumberKind::I64), 5);
    }

    #[test]
    fn merge_combines_extremes() {
        let desc = descriptor();
        let a = min_max_sum_count(&desc);
        let b = min_max_sum_count(&desc);
        a.update(&Number::from(1i64), &desc).unwrap();
        a.update(&Number::from(10i64), &desc).unwrap();
        b.update(&Number::from(-4i64), &desc).unwrap();
        b.update(&Number::from(6i64), &desc).unwrap();

        a.merge(&b, &desc).unwrap();
        assert_eq!(a.count().unwrap(), 4);
        assert_eq!(a.sum().unwrap().to_i64(&NumberKind::I64), 13);
        assert_eq!(a.min().unwrap().to_i64(&NumberKind::I64), -4);
        assert_eq!(a.max().unwrap().to_i64(&NumberKind::I64), 10);
    }
}
