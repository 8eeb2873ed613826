use crate::api::metrics::Result;
use crate::sdk::{
    export::metrics::{
        AggregatorSelector, CheckpointSet, ExportKindSelector, LockedProcessor, Record,
    },
    metrics::{
        accumulator,
        controllers::{Clock, RealClock},
        processors::{self, BasicProcessor},
        Accumulator,
    },
    Resource,
};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

const DEFAULT_CACHE_PERIOD: Duration = Duration::from_secs(10);

/// Returns a builder for creating a [`PullController`] with the configured
/// options.
pub fn pull(
    aggregator_selector: Box<dyn AggregatorSelector + Send + Sync>,
    export_selector: Box<dyn ExportKindSelector + Send + Sync>,
) -> PullControllerBuilder {
    PullControllerBuilder::with_selectors(aggregator_selector, export_selector)
}

/// Controller manages access to an [`Accumulator`] and a
/// [`BasicProcessor`] for scrape-based exporters: collection happens on
/// demand, gated by a cache period.
#[derive(Debug)]
pub struct PullController {
    accumulator: Accumulator,
    processor: Arc<BasicProcessor>,
    period: Duration,
    last_collect: Option<SystemTime>,
    clock: Box<dyn Clock>,
}

impl PullController {
    /// The accumulator serving this controller's instruments.
    pub fn accumulator(&self) -> &Accumulator {
        &self.accumulator
    }

    /// Requests a collection.
    ///
    /// The collection is skipped if the last collection is aged less than
    /// the cache period. Otherwise the processor write lock is held for the
    /// start/collect/finish sequence; `finish_collection` runs even when
    /// the sweep reports an error, so the state machine stays consistent.
    pub fn collect(&mut self) -> Result<()> {
        if !self.should_collect() {
            return Ok(());
        }

        self.processor.lock().and_then(|mut locked_processor| {
            locked_processor.start_collection();
            let collected = self.accumulator.collect(&mut locked_processor);
            let finished = locked_processor.finish_collection();
            collected.map(|_| ()).and(finished)
        })
    }

    /// `true` if the controller should collect now, based on the current
    /// time, the last collection time, and the configured period.
    fn should_collect(&mut self) -> bool {
        if self.period.is_zero() {
            return true;
        }

        let now = self.clock.now();
        match self.last_collect {
            Some(last_collect)
                if now.duration_since(last_collect).unwrap_or_default() < self.period =>
            {
                false
            }
            _ => {
                self.last_collect = Some(now);
                true
            }
        }
    }
}

impl CheckpointSet for PullController {
    fn try_for_each(
        &self,
        export_selector: &dyn ExportKindSelector,
        f: &mut dyn FnMut(&Record<'_>) -> Result<()>,
    ) -> Result<()> {
        self.processor
            .checkpoint_set()
            .and_then(|checkpoint_set| checkpoint_set.try_for_each(export_selector, f))
    }
}

/// Configuration for a [`PullController`].
#[derive(Debug)]
pub struct PullControllerBuilder {
    /// The aggregator selector used by the controller.
    aggregator_selector: Box<dyn AggregatorSelector + Send + Sync>,

    /// The export kind selector used by this controller.
    export_selector: Box<dyn ExportKindSelector + Send + Sync>,

    /// The resource associated with all records produced by the controller.
    resource: Option<Resource>,

    /// The period for which a recently-computed result is returned without
    /// gathering metric data again.
    ///
    /// If the period is zero, caching of the result is disabled. The
    /// default value is 10 seconds.
    cache_period: Option<Duration>,

    /// The clock gating collection, injectable for testing.
    clock: Box<dyn Clock>,
}

impl PullControllerBuilder {
    /// Configure the selectors for this controller.
    pub fn with_selectors(
        aggregator_selector: Box<dyn AggregatorSelector + Send + Sync>,
        export_selector: Box<dyn ExportKindSelector + Send + Sync>,
    ) -> Self {
        PullControllerBuilder {
            aggregator_selector,
            export_selector,
            resource: None,
            cache_period: None,
            clock: Box::new(RealClock),
        }
    }

    /// Configure the resource for this controller.
    pub fn with_resource(self, resource: Resource) -> Self {
        PullControllerBuilder {
            resource: Some(resource),
            ..self
        }
    }

    /// Configure the cache period for this controller.
    pub fn with_cache_period(self, period: Duration) -> Self {
        PullControllerBuilder {
            cache_period: Some(period),
            ..self
        }
    }

    /// Configure the clock used for cache gating.
    pub fn with_clock(self, clock: Box<dyn Clock>) -> Self {
        PullControllerBuilder { clock, ..self }
    }

    /// Build a new [`PullController`] from the current configuration.
    pub fn build(self) -> PullController {
        // Memory is required to support scrapes that race a collection:
        // readers observe the previous interval's state.
        let processor = Arc::new(processors::basic(
            self.aggregator_selector,
            self.export_selector,
            true,
        ));

        let accumulator = accumulator(processor.clone())
            .with_resource(self.resource.unwrap_or_default())
            .build();

        PullController {
            accumulator,
            processor,
            period: self.cache_period.unwrap_or(DEFAULT_CACHE_PERIOD),
            last_collect: None,
            clock: self.clock,
        }
    }
}
