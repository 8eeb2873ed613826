//! # Metrics SDK
//!
//! The SDK supports producing diagnostic measurements using synchronous and
//! asynchronous instruments. Synchronous instruments (counters, up-down
//! counters, value recorders) are updated inline from application threads;
//! asynchronous instruments (observers) are read by invoking registered
//! callbacks once per collection.
//!
//! The [`Accumulator`] owns the hot path: a concurrent table mapping
//! (descriptor, label set) to a record holding the current aggregator.
//! Updates are non-blocking and allocation-light once a record exists;
//! bound instruments keep a reference to their record so tight loops skip
//! the table lookup entirely.
use crate::api::labels::{self, hash_labels};
use crate::api::metrics::sdk_api::{
    AsyncInstrumentCore, AsyncRunner, InstrumentCore, SyncBoundInstrumentCore, SyncInstrumentCore,
};
use crate::api::metrics::{Descriptor, MetricsError, Number, NumberKind, Result};
use crate::api::KeyValue;
use crate::global;
use crate::sdk::export::metrics::{self, Aggregator, LockedProcessor, Processor};
use crate::sdk::Resource;
use dashmap::DashMap;
use fnv::FnvHasher;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

pub mod aggregators;
pub mod controllers;
pub mod processors;
pub mod selectors;

/// Returns a builder for creating an [`Accumulator`] with the given
/// processor.
pub fn accumulator(processor: Arc<dyn Processor + Send + Sync>) -> AccumulatorBuilder {
    AccumulatorBuilder {
        processor,
        resource: None,
    }
}

/// Configuration for an [`Accumulator`].
#[derive(Debug)]
pub struct AccumulatorBuilder {
    processor: Arc<dyn Processor + Send + Sync>,
    resource: Option<Resource>,
}

impl AccumulatorBuilder {
    /// The resource attached to every accumulation this accumulator
    /// produces.
    pub fn with_resource(self, resource: Resource) -> Self {
        AccumulatorBuilder {
            resource: Some(resource),
            ..self
        }
    }

    /// Create a new [`Accumulator`] from the current configuration.
    pub fn build(self) -> Accumulator {
        Accumulator(Arc::new(AccumulatorCore::new(
            self.processor,
            self.resource.unwrap_or_default(),
        )))
    }
}

/// Accumulator implements the instrument hot path and the collection sweep.
///
/// Exactly one record exists per live (descriptor, label set) pair. Records
/// are created on first update or bind and released once no bound handles
/// remain and no updates arrived during the last completed collection cycle.
#[derive(Debug, Clone)]
pub struct Accumulator(pub(crate) Arc<AccumulatorCore>);

impl Accumulator {
    /// Create a new synchronous instrument for the given descriptor.
    pub fn new_sync_instrument(
        &self,
        descriptor: Descriptor,
    ) -> Result<Arc<dyn SyncInstrumentCore + Send + Sync>> {
        Ok(Arc::new(SyncInstrument {
            descriptor,
            core: self.0.clone(),
        }))
    }

    /// Create a new asynchronous instrument for the given descriptor,
    /// registering the observer callback to be run once per collection.
    pub fn new_async_instrument(
        &self,
        descriptor: Descriptor,
        runner: AsyncRunner,
    ) -> Result<Arc<dyn AsyncInstrumentCore + Send + Sync>> {
        let instrument = Arc::new(AsyncInstrument {
            descriptor,
            core: self.0.clone(),
            recorders: Mutex::new(HashMap::new()),
        });
        self.0
            .async_instruments
            .lock()
            .map_err(From::from)
            .map(|mut instruments| {
                instruments.push((runner, instrument.clone()));
                instrument as Arc<dyn AsyncInstrumentCore + Send + Sync>
            })
    }

    /// Traverses the list of active records and observers, checkpointing
    /// every aggregator that received updates and handing each resulting
    /// accumulation to the locked processor.
    ///
    /// The caller serializes collection by holding the processor's write
    /// lock; instrument updates proceed concurrently. Returns the number of
    /// checkpoints processed. Processor errors do not stop the sweep; the
    /// first one is returned once the sweep completes.
    pub fn collect(&self, locked_processor: &mut dyn LockedProcessor) -> Result<usize> {
        self.0.collect(locked_processor)
    }
}

pub(crate) struct AccumulatorCore {
    /// The set of records for synchronous instruments, keyed by the hash of
    /// the instrument descriptor and label set.
    current: DashMap<MapKey, Arc<Record>>,

    /// Registered observer callbacks and their instruments, run in
    /// registration order during collection.
    async_instruments: Mutex<Vec<(AsyncRunner, Arc<AsyncInstrument>)>>,

    /// The current collection epoch, advanced at the end of every sweep.
    current_epoch: Number,

    processor: Arc<dyn Processor + Send + Sync>,
    resource: Resource,
}

impl AccumulatorCore {
    fn new(processor: Arc<dyn Processor + Send + Sync>, resource: Resource) -> Self {
        AccumulatorCore {
            current: DashMap::new(),
            async_instruments: Mutex::new(Vec::new()),
            current_epoch: NumberKind::U64.zero(),
            processor,
            resource,
        }
    }

    fn collect(&self, locked_processor: &mut dyn LockedProcessor) -> Result<usize> {
        let mut first_err = None;
        let mut checkpointed = self.observe_async_instruments(locked_processor, &mut first_err);
        checkpointed += self.collect_sync_instruments(locked_processor, &mut first_err);
        self.current_epoch
            .saturating_add(&NumberKind::U64, &1u64.into());

        match first_err {
            None => Ok(checkpointed),
            Some(err) => Err(err),
        }
    }

    fn observe_async_instruments(
        &self,
        locked_processor: &mut dyn LockedProcessor,
        first_err: &mut Option<MetricsError>,
    ) -> usize {
        self.async_instruments
            .lock()
            .map_or(0, |async_instruments| {
                let mut checkpointed = 0;

                for (runner, instrument) in async_instruments.iter() {
                    runner.run(instrument.clone() as Arc<dyn AsyncInstrumentCore + Send + Sync>);
                    checkpointed += self.checkpoint_async(instrument, locked_processor, first_err);
                }

                checkpointed
            })
    }

    fn checkpoint_async(
        &self,
        instrument: &AsyncInstrument,
        locked_processor: &mut dyn LockedProcessor,
        first_err: &mut Option<MetricsError>,
    ) -> usize {
        instrument.recorders.lock().map_or(0, |mut recorders| {
            let mut checkpointed = 0;
            let current_epoch = self.current_epoch.to_u64(&NumberKind::U64);

            recorders.retain(|_key, recorder| {
                let epoch_diff = current_epoch.saturating_sub(recorder.observed_epoch);
                if epoch_diff == 0 {
                    if let Some(observed) = &recorder.observed {
                        let accumulation = metrics::accumulation(
                            &instrument.descriptor,
                            &recorder.labels,
                            &self.resource,
                            observed,
                        );
                        if let Err(err) = locked_processor.process(accumulation) {
                            if first_err.is_none() {
                                *first_err = Some(err);
                            }
                        }
                        checkpointed += 1;
                    }
                    true
                } else {
                    // This is second collection cycle with no
                    // observations for this labelset. Remove the
                    // recorder.
                    epoch_diff <= 1
                }
            });

            checkpointed
        })
    }

    fn collect_sync_instruments(
        &self,
        locked_processor: &mut dyn LockedProcessor,
        first_err: &mut Option<MetricsError>,
    ) -> usize {
        let mut checkpointed = 0;

        self.current.retain(|_key, value| {
            let mods = value.update_count.to_u64(&NumberKind::U64);
            let coll = value.collected_count.to_u64(&NumberKind::U64);

            if mods != coll {
                // Updates happened in this interval, checkpoint and
                // continue.
                checkpointed += self.checkpoint_record(value, locked_processor, first_err);
                value.collected_count.assign(&NumberKind::U64, &mods.into());
                return true;
            }

            // Having no updates since the last collection, try to remove if
            // there are no bound handles.
            if Arc::strong_count(value) == 1 {
                // There's a potential race between loading the collected
                // count and loading the strong count in this function. Since
                // this is the last we'll see of this record, checkpoint.
                let mods = value.update_count.to_u64(&NumberKind::U64);
                if mods != coll {
                    checkpointed += self.checkpoint_record(value, locked_processor, first_err);
                }
                return false;
            }

            true
        });

        checkpointed
    }

    fn checkpoint_record(
        &self,
        record: &Record,
        locked_processor: &mut dyn LockedProcessor,
        first_err: &mut Option<MetricsError>,
    ) -> usize {
        if let (Some(current), Some(checkpoint)) = (&record.current, &record.checkpoint) {
            if let Err(err) = current.synchronized_move(checkpoint, &record.descriptor) {
                if first_err.is_none() {
                    *first_err = Some(err);
                }
                return 0;
            }

            let accumulation = metrics::accumulation(
                &record.descriptor,
                &record.labels,
                &self.resource,
                checkpoint,
            );
            if let Err(err) = locked_processor.process(accumulation) {
                if first_err.is_none() {
                    *first_err = Some(err);
                }
            }
            1
        } else {
            0
        }
    }
}

impl fmt::Debug for AccumulatorCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccumulatorCore")
            .field("resource", &self.resource)
            .finish()
    }
}

#[derive(Debug, PartialEq, Eq, Hash, Clone)]
struct MapKey {
    instrument_hash: u64,
}

#[derive(Debug)]
struct Record {
    /// Incremented on every update, atomically.
    update_count: Number,

    /// Set to `update_count` as of the last collection sweep that visited
    /// this record. A record whose counts are equal received no updates in
    /// the cycle.
    collected_count: Number,

    /// The processed label set for this record.
    labels: labels::Set,

    /// The descriptor of the instrument this record serves.
    descriptor: Descriptor,

    /// `None` when the aggregator selector disabled this instrument.
    current: Option<Arc<dyn Aggregator + Send + Sync>>,
    checkpoint: Option<Arc<dyn Aggregator + Send + Sync>>,
}

impl Record {
    fn update(&self, number: &Number) {
        if let Some(current) = &self.current {
            if let Err(err) = aggregators::range_test(number, &self.descriptor)
                .and_then(|_| current.update(number, &self.descriptor))
            {
                global::handle_error(err);
                return;
            }
            self.update_count
                .saturating_add(&NumberKind::U64, &1u64.into());
        }
    }
}

#[derive(Debug)]
struct SyncInstrument {
    descriptor: Descriptor,
    core: Arc<AccumulatorCore>,
}

impl SyncInstrument {
    fn acquire_handle(&self, kvs: &[KeyValue]) -> Arc<Record> {
        let labels = labels::Set::from(kvs);
        let mut hasher = FnvHasher::default();
        self.descriptor.attribute_hash().hash(&mut hasher);
        labels.equivalent().hash(&mut hasher);
        let map_key = MapKey {
            instrument_hash: hasher.finish(),
        };

        if let Some(existing_record) = self.core.current.get(&map_key) {
            return existing_record.value().clone();
        }

        let record = Arc::new(Record {
            update_count: NumberKind::U64.zero(),
            collected_count: NumberKind::U64.zero(),
            labels,
            descriptor: self.descriptor.clone(),
            current: self
                .core
                .processor
                .aggregation_selector()
                .aggregator_for(&self.descriptor),
            checkpoint: self
                .core
                .processor
                .aggregation_selector()
                .aggregator_for(&self.descriptor),
        });
        self.core
            .current
            .entry(map_key)
            .or_insert(record)
            .value()
            .clone()
    }
}

impl InstrumentCore for SyncInstrument {
    fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }
}

impl SyncInstrumentCore for SyncInstrument {
    fn bind(&self, labels: &'_ [KeyValue]) -> Arc<dyn SyncBoundInstrumentCore + Send + Sync> {
        Arc::new(SyncHandle(self.acquire_handle(labels)))
    }

    fn record_one(&self, number: Number, labels: &'_ [KeyValue]) {
        self.acquire_handle(labels).update(&number)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A bound synchronous instrument, holding its record so repeated updates
/// skip the record table.
#[derive(Debug)]
struct SyncHandle(Arc<Record>);

impl SyncBoundInstrumentCore for SyncHandle {
    fn record_one(&self, number: Number) {
        self.0.update(&number)
    }
}

struct AsyncInstrument {
    descriptor: Descriptor,
    core: Arc<AccumulatorCore>,
    recorders: Mutex<HashMap<u64, LabeledRecorder>>,
}

#[derive(Debug)]
struct LabeledRecorder {
    observed_epoch: u64,
    labels: labels::Set,
    observed: Option<Arc<dyn Aggregator + Send + Sync>>,
}

impl AsyncInstrument {
    fn observe(&self, number: &Number, kvs: &[KeyValue]) {
        if let Err(err) = aggregators::range_test(number, &self.descriptor) {
            global::handle_error(err);
            return;
        }

        if let Ok(mut recorders) = self.recorders.lock() {
            let labels = labels::Set::from(kvs);
            let mut hasher = FnvHasher::default();
            hash_labels(&mut hasher, labels.iter());
            let labels_hash = hasher.finish();

            // Observers report state, not increments: each observation
            // replaces the recorder's aggregator so the last value for a
            // label set within a callback wins and prior epochs do not
            // accumulate.
            let observed = self
                .core
                .processor
                .aggregation_selector()
                .aggregator_for(&self.descriptor);
            if let Some(observed) = &observed {
                if let Err(err) = observed.update(number, &self.descriptor) {
                    global::handle_error(err);
                    return;
                }
            }

            let current_epoch = self.core.current_epoch.to_u64(&NumberKind::U64);
            recorders.insert(
                labels_hash,
                LabeledRecorder {
                    observed_epoch: current_epoch,
                    labels,
                    observed,
                },
            );
        }
    }
}

impl fmt::Debug for AsyncInstrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncInstrument")
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

impl InstrumentCore for AsyncInstrument {
    fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }
}

impl AsyncInstrumentCore for AsyncInstrument {
    fn observe_one(&self, number: Number, labels: &'_ [KeyValue]) {
        self.observe(&number, labels)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
