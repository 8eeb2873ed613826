//! Metrics SDK API
use crate::api::metrics::{Descriptor, Number};
use crate::api::KeyValue;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A common interface for synchronous and asynchronous instruments.
pub trait InstrumentCore: fmt::Debug {
    /// Description of the instrument's descriptor
    fn descriptor(&self) -> &Descriptor;
}

/// The implementation-level interface to a generic synchronous instrument
/// (e.g., ValueRecorder and Counter instruments).
pub trait SyncInstrumentCore: InstrumentCore + Send + Sync {
    /// Creates an implementation-level bound instrument, binding a label set
    /// with this instrument implementation.
    ///
    /// Bound instruments hold a reference to their record so that tight
    /// inner loops amortize the map lookup.
    fn bind(&self, labels: &'_ [KeyValue]) -> Arc<dyn SyncBoundInstrumentCore + Send + Sync>;

    /// Capture a single synchronous metric event.
    fn record_one(&self, number: Number, labels: &'_ [KeyValue]);

    /// Returns self as any
    fn as_any(&self) -> &dyn Any;
}

/// The implementation-level interface to a generic synchronous bound
/// instrument.
pub trait SyncBoundInstrumentCore: fmt::Debug + Send + Sync {
    /// Capture a single synchronous metric event.
    fn record_one(&self, number: Number);
}

/// An implementation-level interface to an asynchronous instrument (e.g.,
/// Observer instruments).
pub trait AsyncInstrumentCore: InstrumentCore + Send + Sync {
    /// Captures a single asynchronous metric event.
    fn observe_one(&self, number: Number, labels: &'_ [KeyValue]);

    /// The underlying type as `Any` to support downcasting.
    fn as_any(&self) -> &dyn Any;
}

/// The result handed to asynchronous observer callbacks at collection time.
///
/// Each `observe` call routes one observation into the instrument's record
/// for the current collection.
pub struct ObserverResult {
    instrument: Arc<dyn AsyncInstrumentCore + Send + Sync>,
}

impl ObserverResult {
    /// New observer result for the given asynchronous instrument.
    pub(crate) fn new(instrument: Arc<dyn AsyncInstrumentCore + Send + Sync>) -> Self {
        ObserverResult { instrument }
    }

    /// Observe a value for the instrument's current collection interval.
    pub fn observe(&self, value: Number, labels: &[KeyValue]) {
        self.instrument.observe_one(value, labels)
    }
}

impl fmt::Debug for ObserverResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverResult")
            .field("instrument", &self.instrument.descriptor().name())
            .finish()
    }
}

/// The callback registered for an asynchronous instrument, invoked once per
/// collection in a single-threaded context.
pub struct AsyncRunner(Box<dyn Fn(&ObserverResult) + Send + Sync>);

impl AsyncRunner {
    /// New runner from an observer callback.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&ObserverResult) + Send + Sync + 'static,
    {
        AsyncRunner(Box::new(f))
    }

    /// Run the callback, routing observations into `instrument`.
    pub(crate) fn run(&self, instrument: Arc<dyn AsyncInstrumentCore + Send + Sync>) {
        (self.0)(&ObserverResult::new(instrument))
    }
}

impl fmt::Debug for AsyncRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AsyncRunner")
    }
}
