use crate::api::labels::{hash_labels, Set};
use crate::api::metrics::{Descriptor, MetricsError, Result};
use crate::sdk::{
    export::metrics::{
        self, Accumulation, Aggregation, Aggregator, AggregatorSelector, CheckpointSet, ExportKind,
        ExportKindSelector, LockedProcessor, Processor, Record, Subtractor,
    },
    metrics::aggregators::SumAggregator,
    Resource,
};
use fnv::FnvHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::SystemTime;

/// Create a new basic processor.
///
/// When `memory` is true the processor remembers metric instruments and
/// label sets that were previously reported and re-emits their last state in
/// intervals with no updates; when false, entries that received no update in
/// the period are pruned.
pub fn basic(
    aggregator_selector: Box<dyn AggregatorSelector + Send + Sync>,
    export_selector: Box<dyn ExportKindSelector + Send + Sync>,
    memory: bool,
) -> BasicProcessor {
    BasicProcessor {
        aggregator_selector,
        export_selector,
        state: RwLock::new(BasicProcessorState::with_memory(memory)),
    }
}

/// Basic metric integration strategy.
///
/// The processor keys stateful entries by (instrument, labels, resource),
/// performs per-collection checkpointing, and converts between delta and
/// cumulative temporality according to the exporter's
/// [`ExportKindSelector`].
///
/// Collection runs under the write lock obtained through [`lock`]; readers
/// iterate the latest checkpoint under the read lock obtained through
/// [`checkpoint_set`].
///
/// [`lock`]: BasicProcessor::lock
/// [`checkpoint_set`]: BasicProcessor::checkpoint_set
#[derive(Debug)]
pub struct BasicProcessor {
    aggregator_selector: Box<dyn AggregatorSelector + Send + Sync>,
    export_selector: Box<dyn ExportKindSelector + Send + Sync>,
    state: RwLock<BasicProcessorState>,
}

impl BasicProcessor {
    /// Acquire the write lock, returning the locked processor used for the
    /// collection sequence.
    pub fn lock(&self) -> Result<BasicLockedProcessor<'_>> {
        self.state
            .write()
            .map_err(From::from)
            .map(|locked| BasicLockedProcessor {
                parent: self,
                state: locked,
            })
    }

    /// Acquire the read lock over the most recent checkpoint.
    ///
    /// The returned guard implements [`CheckpointSet`]; collection cannot
    /// proceed while it is held.
    pub fn checkpoint_set(&self) -> Result<RwLockReadGuard<'_, BasicProcessorState>> {
        self.state.read().map_err(From::from)
    }

    /// The export kind selector this processor converts temporality for.
    pub fn export_selector(&self) -> &dyn ExportKindSelector {
        self.export_selector.as_ref()
    }
}

impl Processor for BasicProcessor {
    fn aggregation_selector(&self) -> &dyn AggregatorSelector {
        self.aggregator_selector.as_ref()
    }
}

/// A write-locked view of the processor, passed through the collection
/// state machine.
#[derive(Debug)]
pub struct BasicLockedProcessor<'a> {
    parent: &'a BasicProcessor,
    state: RwLockWriteGuard<'a, BasicProcessorState>,
}

impl LockedProcessor for BasicLockedProcessor<'_> {
    fn process(&mut self, accumulation: Accumulation<'_>) -> Result<()> {
        if self.state.started_collection != self.state.finished_collection.wrapping_add(1) {
            return Err(MetricsError::InconsistentState);
        }

        let desc = accumulation.descriptor();
        let mut hasher = FnvHasher::default();
        desc.attribute_hash().hash(&mut hasher);
        hash_labels(&mut hasher, accumulation.labels().into_iter());
        hash_labels(&mut hasher, accumulation.resource().iter());
        let key = StateKey(hasher.finish());
        let agg = accumulation.aggregator();
        let finished_collection = self.state.finished_collection;
        if let Some(value) = self.state.values.get_mut(&key) {
            // Advance the update sequence number.
            let same_collection = finished_collection == value.updated;
            value.updated = finished_collection;

            // At this point in the code, we have located an existing value
            // for some state key. This can be because:
            //
            // (a) stateful aggregation is being used, the entry was entered
            // during a prior collection, and this is the first time
            // processing an accumulation for this state key in the current
            // collection. Since this is the first time processing an
            // accumulation for this state key during this collection, we
            // don't know yet whether there are multiple accumulators at
            // work. If there are multiple accumulators, they'll hit case (b)
            // the second time through.
            //
            // (b) multiple accumulators are being used, whether stateful or
            // not.
            //
            // Case (a) occurs when the instrument and the exporter require
            // memory to work correctly, either because the instrument
            // reports a precomputed sum to a delta exporter or the reverse,
            // a non-precomputed-sum instrument with a cumulative exporter.
            // This logic is encapsulated in `ExportKind::memory_required`.
            //
            // Case (b) occurs when the variable `same_collection` is true,
            // indicating that the state key for the accumulation has already
            // been seen in the same collection. When this happens, it
            // implies that multiple accumulators are being used because the
            // accumulator outputs a maximum of one accumulation per
            // instrument and label set.
            //
            // The following logic distinguishes between asynchronous and
            // synchronous instruments in order to ensure that the use of
            // multiple accumulators does not change instrument semantics.
            // To maintain the instrument semantics, multiple synchronous
            // accumulations are merged, whereas when multiple asynchronous
            // accumulations are processed, the last value is kept.

            if !same_collection {
                // This is the first accumulation we've seen for this state
                // key during this collection. Just keep a reference to the
                // accumulator's aggregator.
                value.current = agg.clone();
                return Ok(());
            }
            if desc.instrument_kind().asynchronous() {
                // The last value across multiple accumulators is taken.
                // Just keep a reference to the accumulator's aggregator.
                value.current = agg.clone();
                return Ok(());
            }

            // The above two cases are keeping a reference to the
            // accumulator's aggregator. The remaining cases address
            // synchronous instruments, which always merge multiple
            // accumulations using `value.delta` for temporary storage.

            if value.delta.is_none() {
                // The temporary `value.delta` may have been allocated
                // already, either in a prior pass through this block of code
                // or in the insert branch below (which allocates it up front
                // for stateful precomputed-sum instruments).
                value.delta = self.parent.aggregator_selector.aggregator_for(desc);
            }

            let delta = match value.delta.as_ref() {
                // The selector can disable an instrument by declining to
                // allocate; drop the extra accumulation in that case.
                None => return Ok(()),
                Some(delta) => delta,
            };
            if !Arc::ptr_eq(&value.current, delta) {
                // If `current` does not refer to `delta` it is the first
                // accumulator's aggregator, taken by reference above. Move
                // its state into `delta` so this and any further
                // accumulations can be merged without touching aggregators
                // owned by the accumulators.
                value.current.synchronized_move(delta, desc)?;
                value.current = delta.clone();
            }

            // `value.current` now refers to `value.delta`. Combine this
            // accumulation with the prior accumulation.
            return delta.merge(agg.as_ref(), desc);
        }

        let stateful = self
            .parent
            .export_selector
            .export_kind_for(desc, agg.aggregation().kind())
            .memory_required(desc.instrument_kind());

        let mut delta = None;
        let cumulative = if stateful {
            if desc.instrument_kind().precomputed_sum() {
                // This instrument reports a cumulative total and the
                // exporter wants deltas, so allocate the subtraction output
                // up front.
                delta = self.parent.aggregator_selector.aggregator_for(desc);
            }
            // We are not certain to need a delta, only allocate a cumulative
            // aggregator. A delta accumulator is allocated above when
            // multiple synchronous accumulators produce an accumulation.
            self.parent.aggregator_selector.aggregator_for(desc)
        } else {
            None
        };

        self.state.values.insert(
            key,
            StateValue {
                current: agg.clone(),
                delta,
                cumulative,
                stateful,
                updated: finished_collection,
                descriptor: desc.clone(),
                labels: accumulation.labels().clone(),
                resource: accumulation.resource().clone(),
            },
        );

        Ok(())
    }

    fn start_collection(&mut self) {
        if self.state.started_collection != 0 {
            self.state.interval_start = self.state.interval_end;
        }
        self.state.started_collection = self.state.started_collection.wrapping_add(1);
    }

    fn finish_collection(&mut self) -> Result<()> {
        self.state.interval_end = SystemTime::now();
        if self.state.started_collection != self.state.finished_collection.wrapping_add(1) {
            return Err(MetricsError::InconsistentState);
        }
        let finished_collection = self.state.finished_collection;
        self.state.finished_collection = self.state.finished_collection.wrapping_add(1);
        let has_memory = self.state.config.memory;

        let mut result = Ok(());

        self.state.values.retain(|_key, value| {
            // Keep the remaining entries untouched after the first error.
            if result.is_err() {
                return true;
            }

            let mkind = value.descriptor.instrument_kind();

            let stale = value.updated != finished_collection;
            let stateless = !value.stateful;

            // The following branch updates stateful aggregators. Skip these
            // updates if the aggregator is not stateful or is stale.
            if stale || stateless {
                // If this processor does not require memory, stale,
                // stateless entries can be removed. This implies that they
                // were not updated over the previous full collection
                // interval.
                if stale && stateless && !has_memory {
                    return false;
                }
                return true;
            }

            if mkind.precomputed_sum() {
                // The exporter wants deltas from a cumulative input:
                // value.delta = value.current - value.cumulative, then the
                // current total becomes the new subtraction basis.
                match value.current.as_any().downcast_ref::<SumAggregator>() {
                    Some(current_subtractor) => {
                        if let (Some(cumulative), Some(delta)) =
                            (value.cumulative.as_ref(), value.delta.as_ref())
                        {
                            result = current_subtractor
                                .subtract(cumulative.as_ref(), delta.as_ref(), &value.descriptor)
                                .and_then(|_| {
                                    value
                                        .current
                                        .synchronized_move(cumulative, &value.descriptor)
                                });
                        }
                    }
                    None => result = Err(MetricsError::NoSubtraction),
                }
            } else {
                // This line is equivalent to:
                // value.cumulative = value.cumulative + value.current
                if let Some(cumulative) = value.cumulative.as_ref() {
                    result = cumulative.merge(value.current.as_ref(), &value.descriptor)
                }
            }

            true
        });

        result
    }
}

#[derive(Debug, Default)]
struct BasicProcessorConfig {
    /// Controls whether the processor remembers metric instruments and label
    /// sets that were previously reported. When memory is true,
    /// `CheckpointSet::try_for_each` will visit metrics that were not
    /// updated in the most recent interval.
    memory: bool,
}

/// The state table and timestamps guarded by the processor's lock.
///
/// This type is only exposed through [`BasicProcessor::checkpoint_set`],
/// where it serves as the [`CheckpointSet`] consumed by exporters.
#[derive(Debug)]
pub struct BasicProcessorState {
    config: BasicProcessorConfig,
    values: HashMap<StateKey, StateValue>,
    process_start: SystemTime,
    interval_start: SystemTime,
    interval_end: SystemTime,
    started_collection: u64,
    finished_collection: u64,
}

impl BasicProcessorState {
    fn with_memory(memory: bool) -> Self {
        let mut state = BasicProcessorState::default();
        state.config.memory = memory;
        state
    }
}

impl Default for BasicProcessorState {
    fn default() -> Self {
        BasicProcessorState {
            config: BasicProcessorConfig::default(),
            values: HashMap::default(),
            process_start: SystemTime::now(),
            interval_start: SystemTime::now(),
            interval_end: SystemTime::now(),
            started_collection: 0,
            finished_collection: 0,
        }
    }
}

impl CheckpointSet for BasicProcessorState {
    fn try_for_each(
        &self,
        exporter: &dyn ExportKindSelector,
        f: &mut dyn FnMut(&Record<'_>) -> Result<()>,
    ) -> Result<()> {
        if self.started_collection != self.finished_collection {
            return Err(MetricsError::InconsistentState);
        }

        self.values.iter().try_for_each(|(_key, value)| {
            let instrument_kind = value.descriptor.instrument_kind();

            // If the processor does not have memory and it was not updated
            // in the prior round, do not visit this value.
            if !self.config.memory && value.updated != self.finished_collection.wrapping_sub(1) {
                return Ok(());
            }

            let agg;
            let start;

            match exporter.export_kind_for(&value.descriptor, value.current.aggregation().kind()) {
                kind if kind == ExportKind::PASS_THROUGH => {
                    // No state is required, pass through the checkpointed
                    // value.
                    agg = Some(&value.current);

                    if instrument_kind.precomputed_sum() {
                        start = self.process_start;
                    } else {
                        start = self.interval_start;
                    }
                }

                kind if kind == ExportKind::CUMULATIVE => {
                    // If stateful, the sum has been computed. If stateless,
                    // the input was already cumulative. Either way, use the
                    // checkpointed value:
                    if value.stateful {
                        agg = value.cumulative.as_ref();
                    } else {
                        agg = Some(&value.current);
                    }

                    start = self.process_start;
                }

                kind if kind == ExportKind::DELTA => {
                    // Precomputed sums are a special case.
                    if instrument_kind.precomputed_sum() {
                        agg = value.delta.as_ref();
                    } else {
                        agg = Some(&value.current);
                    }

                    start = self.interval_start;
                }

                _ => return Err(MetricsError::InvalidExporterKind),
            }

            let res = f(&metrics::record(
                &value.descriptor,
                &value.labels,
                &value.resource,
                agg,
                start,
                self.interval_end,
            ));
            if matches!(res, Err(MetricsError::NoDataCollected)) {
                Ok(())
            } else {
                res
            }
        })
    }
}

#[derive(Debug, PartialEq, Eq, Hash)]
struct StateKey(u64);

#[derive(Debug)]
struct StateValue {
    /// Indicates the last sequence number when this value had `process`
    /// called by an accumulator.
    updated: u64,

    /// Indicates that a cumulative aggregation is being maintained, taken
    /// from the process start time.
    stateful: bool,

    /// Refers to the single-accumulator checkpoint or to `delta`, depending
    /// on how many accumulations were seen this collection.
    current: Arc<dyn Aggregator + Send + Sync>,

    /// Owned by the processor to merge accumulations from multiple
    /// accumulators, and to store the output of subtraction for
    /// precomputed-sum instruments; `None` otherwise.
    delta: Option<Arc<dyn Aggregator + Send + Sync>>,

    /// Owned by the processor to store the last cumulative value when the
    /// exporter requires memory; `None` otherwise.
    cumulative: Option<Arc<dyn Aggregator + Send + Sync>>,

    descriptor: Descriptor,
    labels: Set,
    resource: Resource,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::labels;
    use crate::api::metrics::{InstrumentKind, Number, NumberKind};
    use crate::api::KeyValue;
    use crate::sdk::export::metrics::{accumulation, AggregationKind};
    use crate::sdk::metrics::aggregators::{self, DDSketchConfig};
    use crate::testing::metrics::Output;
    use std::collections::BTreeMap;

    #[derive(Debug, Clone)]
    struct TestSelector(AggregationKind);

    impl AggregatorSelector for TestSelector {
        fn aggregator_for(
            &self,
            descriptor: &Descriptor,
        ) -> Option<Arc<dyn Aggregator + Send + Sync>> {
            if self.0 == AggregationKind::SUM {
                Some(Arc::new(aggregators::sum()))
            } else if self.0 == AggregationKind::MIN_MAX_SUM_COUNT {
                Some(Arc::new(aggregators::min_max_sum_count(descriptor)))
            } else if self.0 == AggregationKind::HISTOGRAM {
                Some(Arc::new(aggregators::histogram(descriptor, &[25.0, 500.0])))
            } else if self.0 == AggregationKind::LAST_VALUE {
                Some(Arc::new(aggregators::last_value()))
            } else if self.0 == AggregationKind::EXACT {
                Some(Arc::new(aggregators::array()))
            } else if self.0 == AggregationKind::SKETCH {
                Some(Arc::new(aggregators::ddsketch(
                    &DDSketchConfig::default(),
                    descriptor.number_kind().clone(),
                )))
            } else {
                None
            }
        }
    }

    fn as_number(nkind: &NumberKind, value: i64) -> Number {
        match nkind {
            NumberKind::I64 => Number::from(value),
            NumberKind::U64 => Number::from(value as u64),
            NumberKind::F64 => Number::from(value as f64),
        }
    }

    fn process_update(
        locked: &mut BasicLockedProcessor<'_>,
        desc: &Descriptor,
        selector: &dyn AggregatorSelector,
        res: &Resource,
        value: i64,
        kvs: &[KeyValue],
    ) -> Result<()> {
        let ls = labels::Set::from(kvs);
        let agg = selector.aggregator_for(desc).expect("aggregator selected");
        agg.update(&as_number(desc.number_kind(), value), desc)
            .expect("update succeeds");
        locked.process(accumulation(desc, &ls, res, &agg))
    }

    fn render(processor: &BasicProcessor, ekind: ExportKind) -> (BTreeMap<String, f64>, Result<()>) {
        let mut output = Output::new();
        let result = processor
            .checkpoint_set()
            .expect("read lock")
            .try_for_each(&ekind, &mut |record| output.add_record(record));
        (output.into_map(), result)
    }

    /// Exercises all the non-error paths: every export kind crossed with
    /// every instrument kind, number kind, aggregator kind, memory setting,
    /// accumulator count, and checkpoint count.
    fn test_processor(ekind: ExportKind) {
        let instrument_kinds = [
            InstrumentKind::Counter,
            InstrumentKind::UpDownCounter,
            InstrumentKind::ValueRecorder,
            InstrumentKind::SumObserver,
            InstrumentKind::UpDownSumObserver,
            InstrumentKind::ValueObserver,
        ];
        let number_kinds = [NumberKind::I64, NumberKind::F64];
        let aggregation_kinds = [
            AggregationKind::SUM,
            AggregationKind::MIN_MAX_SUM_COUNT,
            AggregationKind::HISTOGRAM,
            AggregationKind::LAST_VALUE,
            AggregationKind::EXACT,
            AggregationKind::SKETCH,
        ];

        for mkind in &instrument_kinds {
            for nkind in &number_kinds {
                for akind in &aggregation_kinds {
                    for has_memory in [false, true] {
                        for n_accum in 1..=3 {
                            for n_checkpoint in 1..=3 {
                                test_body(
                                    ekind,
                                    mkind.clone(),
                                    nkind.clone(),
                                    akind.clone(),
                                    has_memory,
                                    n_accum,
                                    n_checkpoint,
                                );
                            }
                        }
                    }
                }
            }
        }
    }

    fn test_body(
        ekind: ExportKind,
        mkind: InstrumentKind,
        nkind: NumberKind,
        akind: AggregationKind,
        has_memory: bool,
        n_accum: usize,
        n_checkpoint: usize,
    ) {
        let selector = TestSelector(akind.clone());
        let res = Resource::new(vec![KeyValue::new("R", "V")]);
        let labs1 = [KeyValue::new("L1", "V")];
        let labs2 = [KeyValue::new("L2", "V")];
        let desc1 = Descriptor::new("inst1".into(), "test", None, mkind.clone(), nkind.clone());
        let desc2 = Descriptor::new("inst2".into(), "test", None, mkind.clone(), nkind.clone());

        let processor = basic(Box::new(selector.clone()), Box::new(ekind), has_memory);

        for nc in 0..n_checkpoint {
            // The input is 10 per update, scaled by the number of
            // checkpoints for cumulative instruments:
            let mut input = 10i64;
            let cumulative_multiplier = (nc + 1) as i64;
            if mkind.precomputed_sum() {
                input *= cumulative_multiplier;
            }

            {
                let mut locked = processor.lock().expect("write lock");
                locked.start_collection();

                for _na in 0..n_accum {
                    process_update(&mut locked, &desc1, &selector, &res, input, &labs1)
                        .expect("process");
                    process_update(&mut locked, &desc2, &selector, &res, input, &labs2)
                        .expect("process");
                }

                match locked.finish_collection() {
                    Err(MetricsError::NoSubtraction) => {
                        let agg = selector.aggregator_for(&desc1).expect("selected");
                        let can_sub = agg.as_any().downcast_ref::<SumAggregator>().is_some();

                        // Subtraction is only expected to be missing for
                        // precomputed sums under a delta exporter with a
                        // non-subtractable aggregator.
                        assert!(
                            mkind.precomputed_sum() && ekind == ExportKind::DELTA && !can_sub,
                            "unexpected NoSubtraction for {:?}/{:?}/{:?}",
                            mkind,
                            akind,
                            ekind
                        );
                        return;
                    }
                    Err(err) => panic!("unexpected finish_collection error: {:?}", err),
                    Ok(()) => {}
                }
            }

            if nc < n_checkpoint - 1 {
                continue;
            }

            for repetition_after_empty_interval in [false, true] {
                if repetition_after_empty_interval {
                    let mut locked = processor.lock().expect("write lock");
                    locked.start_collection();
                    locked
                        .finish_collection()
                        .expect("empty interval finishes cleanly");
                }

                // Check the final checkpoint state.
                let (map, result) = render(&processor, ekind);
                if let Err(err) = result {
                    panic!("unexpected checkpoint error: {:?}", err);
                }

                let multiplier: i64;
                if mkind.asynchronous() {
                    // Because async instruments take the last value, the
                    // number of accumulators doesn't matter.
                    if mkind.precomputed_sum() {
                        if ekind == ExportKind::DELTA {
                            multiplier = 1;
                        } else {
                            multiplier = cumulative_multiplier;
                        }
                    } else if ekind == ExportKind::CUMULATIVE && akind != AggregationKind::LAST_VALUE
                    {
                        multiplier = cumulative_multiplier;
                    } else {
                        multiplier = 1;
                    }
                } else {
                    // Synchronous instruments accumulate results from
                    // multiple accumulators; use that number as the baseline
                    // multiplier.
                    let mut m = n_accum as i64;
                    if ekind == ExportKind::CUMULATIVE {
                        // A cumulative exporter includes prior checkpoints.
                        m *= cumulative_multiplier;
                    }
                    if akind == AggregationKind::LAST_VALUE {
                        m = 1;
                    }
                    multiplier = m;
                }

                let mut exp = BTreeMap::new();
                if has_memory || !repetition_after_empty_interval {
                    exp.insert("inst1/L1=V/R=V".to_string(), (multiplier * 10) as f64);
                    exp.insert("inst2/L2=V/R=V".to_string(), (multiplier * 10) as f64);
                }

                assert_eq!(
                    map, exp,
                    "mismatch for {:?}/{:?}/{:?}/{:?} memory={} n_accum={} n_checkpoint={} repetition={}",
                    ekind, mkind, nkind, akind, has_memory, n_accum, n_checkpoint,
                    repetition_after_empty_interval
                );
            }
        }
    }

    #[test]
    fn processor_cumulative() {
        test_processor(ExportKind::CUMULATIVE);
    }

    #[test]
    fn processor_delta() {
        test_processor(ExportKind::DELTA);
    }

    #[test]
    fn processor_pass_through() {
        test_processor(ExportKind::PASS_THROUGH);
    }

    fn sum_processor(ekind: ExportKind, memory: bool) -> BasicProcessor {
        basic(
            Box::new(TestSelector(AggregationKind::SUM)),
            Box::new(ekind),
            memory,
        )
    }

    #[test]
    fn inconsistent_state_machine() {
        let selector = TestSelector(AggregationKind::SUM);
        let res = Resource::empty();
        let desc = Descriptor::new(
            "inst".into(),
            "test",
            None,
            InstrumentKind::Counter,
            NumberKind::I64,
        );

        // Double start.
        let processor = sum_processor(ExportKind::PASS_THROUGH, false);
        {
            let mut locked = processor.lock().unwrap();
            locked.start_collection();
            locked.start_collection();
            assert!(matches!(
                locked.finish_collection(),
                Err(MetricsError::InconsistentState)
            ));
        }

        // Finish without start.
        let processor = sum_processor(ExportKind::PASS_THROUGH, false);
        assert!(matches!(
            processor.lock().unwrap().finish_collection(),
            Err(MetricsError::InconsistentState)
        ));

        // ForEach without finish.
        let processor = sum_processor(ExportKind::PASS_THROUGH, false);
        processor.lock().unwrap().start_collection();
        let (_, result) = render(&processor, ExportKind::PASS_THROUGH);
        assert!(matches!(result, Err(MetricsError::InconsistentState)));

        // Process without start.
        let processor = sum_processor(ExportKind::PASS_THROUGH, false);
        {
            let mut locked = processor.lock().unwrap();
            assert!(matches!(
                process_update(&mut locked, &desc, &selector, &res, 10, &[]),
                Err(MetricsError::InconsistentState)
            ));
        }

        // A selector returning combined bits is not a valid record kind.
        let processor = sum_processor(ExportKind::PASS_THROUGH, false);
        {
            let mut locked = processor.lock().unwrap();
            locked.start_collection();
            process_update(&mut locked, &desc, &selector, &res, 10, &[]).unwrap();
            locked.finish_collection().unwrap();
        }
        let (_, result) = render(&processor, ExportKind::CUMULATIVE | ExportKind::DELTA);
        assert!(matches!(result, Err(MetricsError::InvalidExporterKind)));
    }

    /// Consecutive intervals chain: the first start is the processor
    /// construction time and every later interval starts where the previous
    /// one ended.
    #[test]
    fn timestamp_chaining() {
        let before_new = SystemTime::now();
        let processor = sum_processor(ExportKind::PASS_THROUGH, false);
        let after_new = SystemTime::now();

        let selector = TestSelector(AggregationKind::SUM);
        let res = Resource::empty();
        let desc = Descriptor::new(
            "inst".into(),
            "test",
            None,
            InstrumentKind::Counter,
            NumberKind::I64,
        );

        let collect = |processor: &BasicProcessor| {
            let mut locked = processor.lock().unwrap();
            locked.start_collection();
            process_update(&mut locked, &desc, &selector, &res, 10, &[]).unwrap();
            locked.finish_collection().unwrap();
        };

        let times = |processor: &BasicProcessor| {
            let mut times = None;
            processor
                .checkpoint_set()
                .unwrap()
                .try_for_each(&ExportKind::PASS_THROUGH, &mut |record| {
                    times = Some((*record.start_time(), *record.end_time()));
                    Ok(())
                })
                .unwrap();
            times.expect("one record")
        };

        collect(&processor);
        let (mut start, mut end) = times(&processor);

        // The first interval starts at construction.
        assert!(before_new <= start && start <= after_new);
        assert!(start <= end);

        for _ in 0..2 {
            collect(&processor);
            let (next_start, next_end) = times(&processor);

            // Subsequent intervals have their start and end aligned.
            assert_eq!(next_start, end);
            assert!(next_start <= next_end);
            start = next_start;
            end = next_end;
        }
        let _ = start;
    }

    /// A cumulative exporter without memory: entries disappear in empty
    /// intervals but the running total survives.
    #[test]
    fn stateful_no_memory_cumulative() {
        let ekind = ExportKind::CUMULATIVE;
        let selector = TestSelector(AggregationKind::SUM);
        let res = Resource::new(vec![KeyValue::new("R", "V")]);
        let desc = Descriptor::new(
            "inst".into(),
            "test",
            None,
            InstrumentKind::Counter,
            NumberKind::I64,
        );
        let processor = sum_processor(ekind, false);

        for i in 1..3 {
            // Empty interval.
            {
                let mut locked = processor.lock().unwrap();
                locked.start_collection();
                locked.finish_collection().unwrap();
            }
            let (map, result) = render(&processor, ekind);
            result.unwrap();
            assert!(map.is_empty());

            // Add 10.
            {
                let mut locked = processor.lock().unwrap();
                locked.start_collection();
                process_update(&mut locked, &desc, &selector, &res, 10, &[KeyValue::new("A", "B")])
                    .unwrap();
                locked.finish_collection().unwrap();
            }
            let (map, result) = render(&processor, ekind);
            result.unwrap();
            assert_eq!(map.get("inst/A=B/R=V"), Some(&((i * 10) as f64)));
        }
    }

    /// A delta exporter for a precomputed sum: each interval reports the
    /// difference between consecutive observations.
    #[test]
    fn stateful_no_memory_delta() {
        let ekind = ExportKind::DELTA;
        let selector = TestSelector(AggregationKind::SUM);
        let res = Resource::new(vec![KeyValue::new("R", "V")]);
        let desc = Descriptor::new(
            "inst".into(),
            "test",
            None,
            InstrumentKind::SumObserver,
            NumberKind::I64,
        );
        let processor = sum_processor(ekind, false);

        for i in 1..3 {
            // Empty interval.
            {
                let mut locked = processor.lock().unwrap();
                locked.start_collection();
                locked.finish_collection().unwrap();
            }
            let (map, result) = render(&processor, ekind);
            result.unwrap();
            assert!(map.is_empty());

            // Observe a running total of i*10; the delta is always 10.
            {
                let mut locked = processor.lock().unwrap();
                locked.start_collection();
                process_update(
                    &mut locked,
                    &desc,
                    &selector,
                    &res,
                    i * 10,
                    &[KeyValue::new("A", "B")],
                )
                .unwrap();
                locked.finish_collection().unwrap();
            }
            let (map, result) = render(&processor, ekind);
            result.unwrap();
            assert_eq!(map.get("inst/A=B/R=V"), Some(&10.0));
        }
    }

    /// A precomputed sum with a non-subtractable aggregator under a delta
    /// exporter fails with `NoSubtraction` and emits nothing.
    #[test]
    fn no_subtraction_fallback() {
        let selector = TestSelector(AggregationKind::LAST_VALUE);
        let res = Resource::empty();
        let desc = Descriptor::new(
            "inst".into(),
            "test",
            None,
            InstrumentKind::SumObserver,
            NumberKind::I64,
        );
        let processor = basic(
            Box::new(selector.clone()),
            Box::new(ExportKind::DELTA),
            false,
        );

        let mut locked = processor.lock().unwrap();
        locked.start_collection();
        process_update(&mut locked, &desc, &selector, &res, 10, &[]).unwrap();
        assert!(matches!(
            locked.finish_collection(),
            Err(MetricsError::NoSubtraction)
        ));
    }
}
