use crate::api::metrics::{Descriptor, MetricsError, Number, Result};
use crate::sdk::export::metrics::{Aggregation, AggregationKind, Aggregator, Subtractor, Sum};
use std::any::Any;
use std::sync::Arc;

/// Create a new sum aggregator.
pub fn sum() -> SumAggregator {
    SumAggregator::default()
}

/// An aggregator for counter events.
#[derive(Debug, Default)]
pub struct SumAggregator {
    value: Number,
}

impl Sum for SumAggregator {
    fn sum(&self) -> Result<Number> {
        Ok(self.value.clone())
    }
}

impl Aggregation for SumAggregator {
    fn kind(&self) -> &AggregationKind {
        &AggregationKind::SUM
    }
}

impl Aggregator for SumAggregator {
    fn aggregation(&self) -> &dyn Aggregation {
        self
    }

    fn update(&self, number: &Number, descriptor: &Descriptor) -> Result<()> {
        self.value.saturating_add(descriptor.number_kind(), number);
        Ok(())
    }

    fn synchronized_move(
        &self,
        other: &Arc<dyn Aggregator + Send + Sync>,
        descriptor: &Descriptor,
    ) -> Result<()> {
        if let Some(other) = other.as_any().downcast_ref::<Self>() {
            let kind = descriptor.number_kind();
            // A single swap keeps the handoff wait-free for concurrent
            // updaters.
            let checkpointed = self.value.swap(&kind.zero());
            other.value.assign(kind, &checkpointed);
            Ok(())
        } else {
            Err(MetricsError::InconsistentAggregator(format!(
                "Expected {:?}, got: {:?}",
                self, other
            )))
        }
    }

    fn merge(&self, other: &(dyn Aggregator + Send + Sync), descriptor: &Descriptor) -> Result<()> {
        if let Some(other_sum) = other.as_any().downcast_ref::<SumAggregator>() {
            self.value
                .saturating_add(descriptor.number_kind(), &other_sum.value);
            Ok(())
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

impl Subtractor for SumAggregator {
    fn subtract(
        &self,
        operand: &(dyn Aggregator + Send + Sync),
        result: &(dyn Aggregator + Send + Sync),
        descriptor: &Descriptor,
    ) -> Result<()> {
        match (
            operand.as_any().downcast_ref::<Self>(),
            result.as_any().downcast_ref::<Self>(),
        ) {
            (Some(op), Some(res)) => {
                let kind = descriptor.number_kind();
                res.value.assign(kind, &self.value);
                res.value.saturating_sub(kind, &op.value);
                Ok(())
            }
            _ => Err(MetricsError::InconsistentAggregator(format!(
                "Expected {:?}, got: {:?} and {:?}",
                self, operand, result
            ))),
        }
    }
}
