//! Metric aggregators.
use crate::api::metrics::{Descriptor, InstrumentKind, MetricsError, Number, NumberKind, Result};

mod array;
mod ddsketch;
mod histogram;
mod last_value;
mod min_max_sum_count;
mod sum;

pub use array::{array, ArrayAggregator};
pub use ddsketch::{ddsketch, DDSketchAggregator, DDSketchConfig};
pub use histogram::{histogram, HistogramAggregator};
pub use last_value::{last_value, LastValueAggregator};
pub use min_max_sum_count::{min_max_sum_count, MinMaxSumCountAggregator};
pub use sum::{sum, SumAggregator};

/// RangeTest is a common routine for testing for valid input values. This
/// rejects NaN values. This rejects negative values when the metric
/// instrument does not support negative values, i.e. monotonic sum
/// instruments.
pub fn range_test(number: &Number, descriptor: &Descriptor) -> Result<()> {
    if descriptor.number_kind() == &NumberKind::F64 && number.is_nan() {
        return Err(MetricsError::NaNInput);
    }

    match descriptor.instrument_kind() {
        InstrumentKind::Counter | InstrumentKind::SumObserver => {
            if number.is_negative(descriptor.number_kind()) {
                return Err(MetricsError::NegativeInput);
            }
        }
        _ => (),
    };
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(kind: InstrumentKind, number_kind: NumberKind) -> Descriptor {
        Descriptor::new("inst".into(), "test", None, kind, number_kind)
    }

    #[test]
    fn rejects_nan() {
        let desc = descriptor(InstrumentKind::ValueRecorder, NumberKind::F64);
        assert!(matches!(
            range_test(&Number::from(f64::NAN), &desc),
            Err(MetricsError::NaNInput)
        ));
    }

    #[test]
    fn rejects_negative_on_monotonic() {
        for kind in [InstrumentKind::Counter, InstrumentKind::SumObserver] {
            let desc = descriptor(kind, NumberKind::I64);
            assert!(matches!(
                range_test(&Number::from(-1i64), &desc),
                Err(MetricsError::NegativeInput)
            ));
        }
    }

    #[test]
    fn accepts_negative_on_up_down() {
        let desc = descriptor(InstrumentKind::UpDownCounter, NumberKind::I64);
        assert!(range_test(&Number::from(-1i64), &desc).is_ok());
    }
}
