//! Metrics export contracts.
//!
//! These are the interfaces between the accumulator, the processor, and
//! exporters: aggregation behavior ([`Aggregator`]), aggregator selection
//! ([`AggregatorSelector`]), the collection state machine
//! ([`LockedProcessor`]), checkpoint access ([`CheckpointSet`]), and export
//! temporality ([`ExportKind`]).
use crate::api::labels;
use crate::api::metrics::{Descriptor, InstrumentKind, Number, Result};
use crate::sdk::Resource;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

pub mod aggregation;

pub use aggregation::{
    Aggregation, AggregationKind, Buckets, Count, Distribution, Histogram, LastValue, Max, Min,
    MinMaxSumCount, Points, Quantile, Sum,
};

/// Processor is responsible for deciding which kind of aggregation to use
/// (via `aggregation_selector`), gathering exported results from the SDK
/// during collection, and deciding over which dimensions to group the
/// exported data.
///
/// The SDK supports binding only one of these interfaces, as it has the sole
/// responsibility of determining which aggregator to use for each record.
///
/// The embedded selector is called (concurrently) in instrumentation context
/// to select the appropriate aggregator for an instrument.
pub trait Processor: fmt::Debug {
    /// The selector used when a new accumulator record requires an
    /// aggregator.
    ///
    /// The result should be the same type for a given descriptor, because
    /// aggregators only know how to merge with their own type. If the result
    /// is `None`, the metric instrument is disabled.
    fn aggregation_selector(&self) -> &dyn AggregatorSelector;
}

/// A locked processor.
///
/// The `process` method is called during collection in a single-threaded
/// context from the SDK, after the aggregator is checkpointed, allowing the
/// processor to build the set of metrics currently being exported.
///
/// `process` calls are bracketed by `start_collection` and
/// `finish_collection`; calling it outside that window is a programmer
/// error surfaced as `MetricsError::InconsistentState`.
pub trait LockedProcessor {
    /// Process is called by the SDK once per internal record, passing the
    /// export [`Accumulation`] (a descriptor, the corresponding labels and
    /// resource, and the checkpointed aggregator).
    fn process(&mut self, accumulation: Accumulation<'_>) -> Result<()>;

    /// Begins a collection interval.
    fn start_collection(&mut self);

    /// Ends a collection interval.
    fn finish_collection(&mut self) -> Result<()>;
}

/// AggregatorSelector supports selecting the kind of [`Aggregator`] to use
/// at runtime for a specific metric instrument.
pub trait AggregatorSelector: fmt::Debug {
    /// This allocates an aggregator of a kind suitable for the requested
    /// export.
    ///
    /// When the call returns `None`, the metric instrument is explicitly
    /// disabled.
    ///
    /// This must return a consistent type to avoid confusion in later stages
    /// of the metrics export process, e.g., when merging or checkpointing
    /// aggregators for a specific instrument.
    ///
    /// This call should not block.
    fn aggregator_for(&self, descriptor: &Descriptor) -> Option<Arc<dyn Aggregator + Send + Sync>>;
}

/// Aggregator implements a specific aggregation behavior, i.e., a behavior
/// to track a sequence of updates to an instrument. Sum-only instruments
/// commonly use a simple sum aggregator, but for the distribution
/// instruments (ValueRecorder, ValueObserver) there are a number of possible
/// aggregators with different cost and accuracy tradeoffs.
///
/// Note that any aggregator may be attached to any instrument--this is the
/// result of the API/SDK separation. It is possible to attach a sum
/// aggregator to a ValueRecorder instrument or a min-max-sum-count
/// aggregator to a Counter instrument.
pub trait Aggregator: fmt::Debug {
    /// The interface to access the current state of this aggregator.
    ///
    /// The caller is responsible for synchronization and must not call the
    /// other methods in this trait concurrently while using the
    /// `Aggregation`.
    fn aggregation(&self) -> &dyn Aggregation;

    /// Update receives a new measured value and incorporates it into the
    /// aggregation. Update calls may be called concurrently.
    ///
    /// `Descriptor::number_kind` should be consulted to determine whether
    /// the provided number is an `i64`, `u64` or `f64`.
    fn update(&self, number: &Number, descriptor: &Descriptor) -> Result<()>;

    /// This method is called during collection to finish one period of
    /// aggregation by atomically saving the currently-updating state into
    /// the argument aggregator AND resetting the current value to the zero
    /// state.
    ///
    /// `synchronized_move` is called concurrently with `update`. These two
    /// methods must be synchronized with respect to each other, for
    /// correctness: an update either fully occurs before the move or is
    /// fully reflected in the next checkpoint.
    ///
    /// This method will return an `InconsistentAggregator` error if this
    /// aggregator cannot be copied into the destination due to an
    /// incompatible type.
    fn synchronized_move(
        &self,
        destination: &Arc<dyn Aggregator + Send + Sync>,
        descriptor: &Descriptor,
    ) -> Result<()>;

    /// This combines the checkpointed state from the argument aggregator
    /// into this aggregator. `merge` is not synchronized with respect to
    /// `update` or `synchronized_move`.
    ///
    /// The owner of an aggregator being merged is responsible for
    /// synchronization of both aggregator states.
    fn merge(&self, other: &(dyn Aggregator + Send + Sync), descriptor: &Descriptor) -> Result<()>;

    /// Returns the implementing aggregator as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;
}

/// Subtractor is an optional capability implemented by some aggregators. An
/// aggregator must support `subtract` in order to be configured for a
/// precomputed-sum instrument (SumObserver, UpDownSumObserver) using a delta
/// exporter.
pub trait Subtractor {
    /// Subtract the `operand` from this aggregator and output the value in
    /// `result`.
    fn subtract(
        &self,
        operand: &(dyn Aggregator + Send + Sync),
        result: &(dyn Aggregator + Send + Sync),
        descriptor: &Descriptor,
    ) -> Result<()>;
}

/// Exporter handles presentation of the checkpoint of aggregate metrics.
/// This is the final stage of a metrics export pipeline, where metric data
/// are formatted for a specific system.
///
/// The embedded [`ExportKindSelector`] is consulted by the processor when
/// deciding whether to compute delta or cumulative aggregations for the
/// records passed to this exporter.
pub trait Exporter: ExportKindSelector {
    /// Export is called immediately after completing a collection pass.
    ///
    /// The `CheckpointSet` interface refers to the processor that just
    /// completed collection; it is read-locked for the duration of the call.
    fn export(&self, checkpoint_set: &dyn CheckpointSet) -> Result<()>;
}

/// ExportKindSelector is a sub-interface of [`Exporter`] used to indicate
/// whether the processor should compute delta or cumulative aggregations.
pub trait ExportKindSelector: fmt::Debug + Send + Sync {
    /// Return the correct export kind that should be used when exporting
    /// data for the given metric instrument and aggregator kind.
    fn export_kind_for(&self, descriptor: &Descriptor, kind: &AggregationKind) -> ExportKind;
}

/// CheckpointSet allows a controller to access a complete checkpoint of
/// aggregated metrics from the processor. This is passed to the exporter
/// which may then use `try_for_each` to iterate over the collection of
/// aggregated metrics.
pub trait CheckpointSet: fmt::Debug {
    /// This iterates over aggregated checkpoints for all metrics that were
    /// updated during the last collection period. Each aggregated checkpoint
    /// returned by the function parameter may return an error.
    ///
    /// The [`ExportKindSelector`] argument is used to determine whether the
    /// `Record` is computed using delta or cumulative aggregation.
    ///
    /// `try_for_each` tolerates `NoDataCollected` errors silently, as these
    /// are expected from the aggregator implementations. Any other kind of
    /// error will immediately halt the iteration and be returned to the
    /// caller.
    fn try_for_each(
        &self,
        export_selector: &dyn ExportKindSelector,
        f: &mut dyn FnMut(&Record<'_>) -> Result<()>,
    ) -> Result<()>;
}

/// ExportKind indicates the kind of data exported by an exporter.
/// These bits may be OR-d together when multiple exporters are in use.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ExportKind(u32);

impl ExportKind {
    /// Indicates that the exporter expects a cumulative aggregation.
    pub const CUMULATIVE: ExportKind = ExportKind(1);

    /// Indicates that the exporter expects a delta aggregation.
    pub const DELTA: ExportKind = ExportKind(2);

    /// Indicates that the exporter expects either a cumulative or a delta
    /// aggregation, whichever does not require maintaining state for the
    /// given instrument.
    pub const PASS_THROUGH: ExportKind = ExportKind(4);

    /// Tests whether this kind includes a specific kind of exporter.
    pub fn includes(&self, other: &Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Returns whether an exporter of this kind requires the processor to
    /// maintain state for the given instrument kind across collections.
    pub fn memory_required(&self, kind: &InstrumentKind) -> bool {
        match kind {
            InstrumentKind::Counter
            | InstrumentKind::UpDownCounter
            | InstrumentKind::ValueRecorder
            | InstrumentKind::ValueObserver => {
                // Delta-oriented instruments:
                self.includes(&ExportKind::CUMULATIVE)
            }
            InstrumentKind::SumObserver | InstrumentKind::UpDownSumObserver => {
                // Cumulative-oriented instruments:
                self.includes(&ExportKind::DELTA)
            }
        }
    }
}

impl std::ops::BitOr for ExportKind {
    type Output = ExportKind;

    /// Combine the requirements of multiple exporters.
    fn bitor(self, rhs: Self) -> Self::Output {
        ExportKind(self.0 | rhs.0)
    }
}

impl ExportKindSelector for ExportKind {
    fn export_kind_for(&self, _descriptor: &Descriptor, _kind: &AggregationKind) -> ExportKind {
        *self
    }
}

/// A selector that avoids long-term state by choosing cumulative temporality
/// for precomputed sums and delta temporality for everything else.
#[derive(Debug, Clone)]
pub struct StatelessExportKindSelector;

/// Return an [`ExportKindSelector`] that never requires processor memory.
pub fn stateless_export_kind_selector() -> StatelessExportKindSelector {
    StatelessExportKindSelector
}

impl ExportKindSelector for StatelessExportKindSelector {
    fn export_kind_for(&self, descriptor: &Descriptor, kind: &AggregationKind) -> ExportKind {
        if kind == &AggregationKind::SUM && descriptor.instrument_kind().precomputed_sum() {
            ExportKind::CUMULATIVE
        } else {
            ExportKind::DELTA
        }
    }
}

/// A container for the common elements of exported metric data that are
/// shared by the accumulator->processor and processor->exporter steps.
#[derive(Debug)]
pub struct Metadata<'a> {
    descriptor: &'a Descriptor,
    labels: &'a labels::Set,
    resource: &'a Resource,
}

impl<'a> Metadata<'a> {
    /// Create a new `Metadata` instance.
    pub fn new(descriptor: &'a Descriptor, labels: &'a labels::Set, resource: &'a Resource) -> Self {
        Metadata {
            descriptor,
            labels,
            resource,
        }
    }

    /// A description of the metric instrument being exported.
    pub fn descriptor(&self) -> &Descriptor {
        self.descriptor
    }

    /// The labels associated with the instrument and the aggregated data.
    pub fn labels(&self) -> &labels::Set {
        self.labels
    }

    /// Common attributes that apply to this metric event.
    pub fn resource(&self) -> &Resource {
        self.resource
    }
}

/// Allows accumulator implementations to construct new [`Accumulation`]s to
/// send to processors. The descriptor, labels, resource, and aggregator
/// represent aggregate metric events received over a single collection
/// period.
pub fn accumulation<'a>(
    descriptor: &'a Descriptor,
    labels: &'a labels::Set,
    resource: &'a Resource,
    aggregator: &'a Arc<dyn Aggregator + Send + Sync>,
) -> Accumulation<'a> {
    Accumulation {
        metadata: Metadata::new(descriptor, labels, resource),
        aggregator,
    }
}

/// A container for the exported data for a single metric instrument and
/// label set, as prepared by an accumulator for the processor.
pub struct Accumulation<'a> {
    metadata: Metadata<'a>,
    aggregator: &'a Arc<dyn Aggregator + Send + Sync>,
}

impl<'a> Accumulation<'a> {
    /// A description of the metric instrument being exported.
    pub fn descriptor(&self) -> &Descriptor {
        self.metadata.descriptor
    }

    /// The labels associated with the instrument and the aggregated data.
    pub fn labels(&self) -> &labels::Set {
        self.metadata.labels
    }

    /// Common attributes that apply to this metric event.
    pub fn resource(&self) -> &Resource {
        self.metadata.resource
    }

    /// The checkpointed aggregator for this metric.
    pub fn aggregator(&self) -> &Arc<dyn Aggregator + Send + Sync> {
        self.aggregator
    }
}

impl fmt::Debug for Accumulation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accumulation")
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// Allows processor implementations to construct export records. The
/// descriptor, labels, and aggregator represent aggregate metric events
/// received over a single collection period.
pub fn record<'a>(
    descriptor: &'a Descriptor,
    labels: &'a labels::Set,
    resource: &'a Resource,
    aggregator: Option<&'a Arc<dyn Aggregator + Send + Sync>>,
    start: SystemTime,
    end: SystemTime,
) -> Record<'a> {
    Record {
        metadata: Metadata::new(descriptor, labels, resource),
        aggregator,
        start,
        end,
    }
}

/// A container for the exported data for a single metric instrument and
/// label set, as prepared by the processor for the exporter. This includes
/// the effective start and end time for the aggregation.
pub struct Record<'a> {
    metadata: Metadata<'a>,
    aggregator: Option<&'a Arc<dyn Aggregator + Send + Sync>>,
    start: SystemTime,
    end: SystemTime,
}

impl Record<'_> {
    /// A description of the metric instrument being exported.
    pub fn descriptor(&self) -> &Descriptor {
        self.metadata.descriptor
    }

    /// The labels associated with the instrument and the aggregated data.
    pub fn labels(&self) -> &labels::Set {
        self.metadata.labels
    }

    /// Common attributes that apply to this metric event.
    pub fn resource(&self) -> &Resource {
        self.metadata.resource
    }

    /// The aggregation view for this metric, dependent on the kind of both
    /// the instrument and the exporter.
    pub fn aggregator(&self) -> Option<&Arc<dyn Aggregator + Send + Sync>> {
        self.aggregator
    }

    /// The start time of the interval covered by this aggregation.
    ///
    /// For cumulative aggregations this is the processor construction time;
    /// for delta aggregations it equals the previous collection's end time.
    pub fn start_time(&self) -> &SystemTime {
        &self.start
    }

    /// The end time of the interval covered by this aggregation.
    pub fn end_time(&self) -> &SystemTime {
        &self.end
    }
}

impl fmt::Debug for Record<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("metadata", &self.metadata)
            .field("start", &self.start)
            .field("end", &self.end)
            .finish()
    }
}
