//! Processor implementations.
mod basic;

pub use basic::{basic, BasicLockedProcessor, BasicProcessor, BasicProcessorState};
