use crate::api::metrics::{Descriptor, MetricsError, Number, Result};
use crate::sdk::export::metrics::{Aggregation, AggregationKind, Aggregator, LastValue};
use std::any::Any;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

/// Create a new `LastValueAggregator`
pub fn last_value() -> LastValueAggregator {
    LastValueAggregator {
        inner: Mutex::new(None),
    }
}

/// An `Aggregator` that keeps the latest observed value and its observation
/// timestamp.
#[derive(Debug)]
pub struct LastValueAggregator {
    inner: Mutex<Option<LastValueData>>,
}

#[derive(Debug, Clone)]
struct LastValueData {
    value: Number,
    timestamp: SystemTime,
}

impl LastValue for LastValueAggregator {
    fn last_value(&self) -> Result<(Number, SystemTime)> {
        self.inner.lock().map_err(From::from).and_then(|inner| {
            inner
                .as_ref()
                .map(|data| (data.value.clone(), data.timestamp))
                .ok_or(MetricsError::NoDataCollected)
        })
    }
}

impl Aggregation for LastValueAggregator {
    fn kind(&self) -> &AggregationKind {
        &AggregationKind::LAST_VALUE
    }
}

impl Aggregator for LastValueAggregator {
    fn aggregation(&self) -> &dyn Aggregation {
        self
    }

    fn update(&self, number: &Number, _descriptor: &Descriptor) -> Result<()> {
        self.inner.lock().map_err(From::from).map(|mut inner| {
            *inner = Some(LastValueData {
                value: number.clone(),
                timestamp: SystemTime::now(),
            });
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
                    *oi = inner.take();
                })
            })
        } else {
            Err(MetricsError::InconsistentAggregator(format!(
                "Expected {:?}, got: {:?}",
                self, other
            )))
        }
    }

    fn merge(&self, other: &(dyn Aggregator + Send + Sync), _descriptor: &Descriptor) -> Result<()> {
        if let Some(other) = other.as_any().downcast_ref::<Self>() {
            self.inner.lock().map_err(From::from).and_then(|mut inner| {
                other.inner.lock().map_err(From::from).map(|oi| {
                    // The more recent observation wins.
                    let newer = match (inner.as_ref(), oi.as_ref()) {
                        (Some(ours), Some(theirs)) => ours.timestamp < theirs.timestamp,
                        (None, Some(_)) => true,
                        _ => false,
                    };
                    if newer {
                        *inner = oi.clone();
                    }
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
    use crate::api::metrics::{InstrumentKind, NumberKind};

    fn descriptor() -> Descriptor {
        Descriptor::new(
            "observer".into(),
            "test",
            None,
            InstrumentKind::ValueObserver,
            NumberKind::I64,
        )
    }

    #[test]
    fn keeps_latest_value() {
        let desc = descriptor();
        let agg = last_value();
        agg.update(&Number::from(1i64), &desc).unwrap();
        agg.update(&Number::from(2i64), &desc).unwrap();

        let (value, _) = agg.last_value().unwrap();
        assert_eq!(value.to_i64(&NumberKind::I64), 2);
    }

    #[test]
    fn empty_reports_no_data() {
        let agg = last_value();
        assert!(matches!(
            agg.last_value(),
            Err(MetricsError::NoDataCollected)
        ));
    }

    #[test]
    fn synchronized_move_transfers_and_clears() {
        let desc = descriptor();
        let agg = last_value();
        agg.update(&Number::from(5i64), &desc).unwrap();

        let checkpoint: Arc<dyn Aggregator + Send + Sync> = Arc::new(last_value());
        agg.synchronized_move(&checkpoint, &desc).unwrap();

        assert!(matches!(
            agg.last_value(),
            Err(MetricsError::NoDataCollected)
        ));
        let checkpoint = checkpoint
            .as_any()
            .downcast_ref::<LastValueAggregator>()
            .unwrap();
        let (value, _) = checkpoint.last_value().unwrap();
        assert_eq!(value.to_i64(&NumberKind::I64), 5);
    }

    #[test]
    fn merge_takes_newer() {
        let desc = descriptor();
        let older = last_value();
        let newer = last_value();
        older.update(&Number::from(1i64), &desc).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        newer.update(&Number::from(2i64), &desc).unwrap();

        older.merge(&newer, &desc).unwrap();
        let (value, _) = older.last_value().unwrap();
        assert_eq!(value.to_i64(&NumberKind::I64), 2);

        // Merging the older state back does not regress the value.
        let stale = last_value();
        stale.update(&Number::from(3i64), &desc).unwrap();
        newer.merge(&stale, &desc).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        newer.update(&Number::from(4i64), &desc).unwrap();
        newer.merge(&older, &desc).unwrap();
        let (value, _) = newer.last_value().unwrap();
        assert_eq!(value.to_i64(&NumberKind::I64), 4);
    }
}
