//! Metrics API
//!
//! The metrics API distinguishes instruments by semantic meaning: synchronous
//! instruments (`Counter`, `UpDownCounter`, `ValueRecorder`) are updated
//! inline from application code, while asynchronous instruments
//! (`SumObserver`, `UpDownSumObserver`, `ValueObserver`) are read by invoking
//! a registered observer callback at collection time. The SDK decides how
//! events from each instrument are aggregated and exported.
use std::result;
use std::sync::PoisonError;
use thiserror::Error;

mod descriptor;
mod kind;
mod number;
pub mod sdk_api;

pub use descriptor::Descriptor;
pub use kind::InstrumentKind;
pub use number::{Number, NumberKind};
pub use sdk_api::{
    AsyncInstrumentCore, AsyncRunner, InstrumentCore, ObserverResult, SyncBoundInstrumentCore,
    SyncInstrumentCore,
};

/// A specialized `Result` type for metric operations.
pub type Result<T> = result::Result<T, MetricsError>;

/// Errors returned by the metrics pipeline.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum MetricsError {
    /// Other errors not covered by specific cases.
    #[error("Metrics error: {0}")]
    Other(String),
    /// Invalid quantile, should be between 0 and 1
    #[error("The requested quantile is out of range")]
    InvalidQuantile,
    /// NaN input is invalid for this instrument
    #[error("NaN value is an invalid input")]
    NaNInput,
    /// Negative input is out of range for this instrument
    #[error("Negative value is out of range for this instrument")]
    NegativeInput,
    /// Aggregator types are inconsistent
    #[error("Inconsistent aggregator types: {0}")]
    InconsistentAggregator(String),
    /// The aggregator has no data to report
    #[error("No data collected by this aggregator")]
    NoDataCollected,
    /// A metric was already registered by this name with another kind or
    /// number type
    #[error("A metric was already registered by this name with another kind or number type: {0}")]
    MetricKindMismatch(String),
    /// Collection calls were made out of order
    #[error("Inconsistent processor state")]
    InconsistentState,
    /// The exporter's kind selector returned an unrecognized export kind
    #[error("The requested export kind is not supported")]
    InvalidExporterKind,
    /// Subtraction was requested from an aggregator that does not subtract
    #[error("Aggregator does not subtract")]
    NoSubtraction,
}

impl<T> From<PoisonError<T>> for MetricsError {
    fn from(err: PoisonError<T>) -> Self {
        MetricsError::Other(err.to_string())
    }
}
