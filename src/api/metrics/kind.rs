/// Kinds of metric instruments.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum InstrumentKind {
    /// A synchronous per-request part of a monotonic sum.
    Counter,
    /// A synchronous per-request part of a non-monotonic sum.
    UpDownCounter,
    /// A synchronous instrument for recording grouped values.
    ValueRecorder,
    /// An asynchronous per-interval recorder of a monotonic sum.
    SumObserver,
    /// An asynchronous per-interval recorder of a non-monotonic sum.
    UpDownSumObserver,
    /// An asynchronous instrument for observing grouped values.
    ValueObserver,
}

impl InstrumentKind {
    /// Whether this is a synchronous kind of instrument.
    pub fn synchronous(&self) -> bool {
        matches!(
            self,
            InstrumentKind::Counter | InstrumentKind::UpDownCounter | InstrumentKind::ValueRecorder
        )
    }

    /// Whether this is an asynchronous kind of instrument.
    pub fn asynchronous(&self) -> bool {
        !self.synchronous()
    }

    /// Whether this kind of instrument adds its inputs (as opposed to
    /// grouping).
    pub fn adding(&self) -> bool {
        matches!(
            self,
            InstrumentKind::Counter
                | InstrumentKind::UpDownCounter
                | InstrumentKind::SumObserver
                | InstrumentKind::UpDownSumObserver
        )
    }

    /// Whether this kind of instrument groups its inputs (as opposed to
    /// adding).
    pub fn grouping(&self) -> bool {
        !self.adding()
    }

    /// Whether this kind of instrument exposes a non-decreasing sum.
    pub fn monotonic(&self) -> bool {
        matches!(self, InstrumentKind::Counter | InstrumentKind::SumObserver)
    }

    /// Whether this kind of instrument receives precomputed sums rather than
    /// increments.
    pub fn precomputed_sum(&self) -> bool {
        self.adding() && self.asynchronous()
    }
}

#[cfg(test)]
mod tests {
    use super::InstrumentKind::*;

    #[test]
    fn predicates() {
        for kind in [Counter, UpDownCounter, ValueRecorder] {
            assert!(kind.synchronous());
            assert!(!kind.asynchronous());
        }
        for kind in [SumObserver, UpDownSumObserver, ValueObserver] {
            assert!(kind.asynchronous());
        }
        for kind in [SumObserver, UpDownSumObserver] {
            assert!(kind.precomputed_sum());
        }
        for kind in [Counter, UpDownCounter, ValueRecorder, ValueObserver] {
            assert!(!kind.precomputed_sum());
        }
        assert!(Counter.monotonic());
        assert!(SumObserver.monotonic());
        assert!(!UpDownCounter.monotonic());
        assert!(ValueRecorder.grouping());
        assert!(ValueObserver.grouping());
    }
}
