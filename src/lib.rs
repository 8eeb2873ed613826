//! A metrics telemetry pipeline: instruments produce measurement events,
//! aggregators fold them into typed summaries, and controllers emit
//! consistent snapshots to exporters.
//!
//! The pipeline is split into an API layer and an SDK layer:
//!
//! * [`api`] holds the value types shared by every stage: attribute
//!   [`Key`]/[`Value`] pairs, canonical [label sets], atomic [`Number`]s,
//!   instrument [`Descriptor`]s, and the instrument core traits an SDK
//!   implements.
//! * [`sdk`] holds the pipeline itself: the [`Accumulator`] hot path, the
//!   [aggregator] family, the basic [processor] with its delta/cumulative
//!   conversion, and the pull/push [controllers].
//!
//! Data flows from an instrument update into a per-label accumulator record,
//! is checkpointed during collection into an [`Accumulation`], folded by the
//! processor into a stateful record table, and finally exposed to exporters
//! as a [`CheckpointSet`] of [`Record`]s with interval timestamps.
//!
//! ```
//! use telemeter::api::metrics::sdk_api::SyncInstrumentCore;
//! use telemeter::api::metrics::{Descriptor, InstrumentKind, NumberKind};
//! use telemeter::api::KeyValue;
//! use telemeter::sdk::export::metrics::ExportKind;
//! use telemeter::sdk::metrics::{controllers, selectors::simple::Selector};
//!
//! let mut controller = controllers::pull(
//!     Box::new(Selector::Inexpensive),
//!     Box::new(ExportKind::CUMULATIVE),
//! )
//! .build();
//!
//! let counter = controller
//!     .accumulator()
//!     .new_sync_instrument(Descriptor::new(
//!         "requests".into(),
//!         "example",
//!         None,
//!         InstrumentKind::Counter,
//!         NumberKind::U64,
//!     ))
//!     .unwrap();
//! counter.record_one(1u64.into(), &[KeyValue::new("route", "/")]);
//! controller.collect().unwrap();
//! ```
//!
//! [label sets]: crate::api::labels::Set
//! [`Key`]: crate::api::Key
//! [`Value`]: crate::api::Value
//! [`Number`]: crate::api::metrics::Number
//! [`Descriptor`]: crate::api::metrics::Descriptor
//! [`Accumulator`]: crate::sdk::metrics::Accumulator
//! [aggregator]: crate::sdk::metrics::aggregators
//! [processor]: crate::sdk::metrics::processors
//! [controllers]: crate::sdk::metrics::controllers
//! [`Accumulation`]: crate::sdk::export::metrics::Accumulation
//! [`CheckpointSet`]: crate::sdk::export::metrics::CheckpointSet
//! [`Record`]: crate::sdk::export::metrics::Record
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod api;
pub mod global;
pub mod runtime;
pub mod sdk;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
