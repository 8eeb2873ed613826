use crate::api::metrics::{Descriptor, MetricsError, Result};
use crate::global;
use crate::runtime::Runtime;
use crate::sdk::{
    export::metrics::{
        AggregationKind, AggregatorSelector, ExportKind, ExportKindSelector, Exporter,
        LockedProcessor,
    },
    metrics::{
        accumulator,
        processors::{self, BasicProcessor},
        Accumulator,
    },
    Resource,
};
use futures_channel::{mpsc, oneshot};
use futures_util::{stream, StreamExt};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_PUSH_PERIOD: Duration = Duration::from_secs(10);

/// Returns a builder for creating a [`PushController`] that collects on the
/// given period and forwards every checkpoint to the exporter.
pub fn push<E, R>(
    aggregator_selector: Box<dyn AggregatorSelector + Send + Sync>,
    exporter: E,
    rt: R,
) -> PushControllerBuilder<R>
where
    E: Exporter + Send + Sync + 'static,
    R: Runtime,
{
    PushControllerBuilder {
        aggregator_selector,
        exporter: Arc::new(exporter),
        rt,
        resource: None,
        period: None,
    }
}

/// Organizes a periodic push of metric data: a background worker drives the
/// collect sequence on a timer and invokes the exporter with the resulting
/// checkpoint set.
///
/// The exporter runs outside the processor write lock; the checkpoint it
/// consumes is guarded by the read lock only.
pub struct PushController {
    message_sender: mpsc::Sender<PushMessage>,
    accumulator: Accumulator,
}

#[derive(Debug)]
enum PushMessage {
    Tick,
    Shutdown(oneshot::Sender<()>),
}

impl PushController {
    /// The accumulator serving this controller's instruments.
    pub fn accumulator(&self) -> &Accumulator {
        &self.accumulator
    }

    /// Stop the worker after one final collection and export.
    ///
    /// Blocks until the worker acknowledges the shutdown.
    pub fn stop(&mut self) -> Result<()> {
        let (sender, receiver) = oneshot::channel();
        if self
            .message_sender
            .try_send(PushMessage::Shutdown(sender))
            .is_ok()
        {
            futures_executor::block_on(receiver)
                .map_err(|err| MetricsError::Other(err.to_string()))
        } else {
            Ok(())
        }
    }
}

impl fmt::Debug for PushController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushController")
            .field("accumulator", &self.accumulator)
            .finish()
    }
}

struct PushWorker {
    accumulator: Accumulator,
    processor: Arc<BasicProcessor>,
    exporter: Arc<dyn Exporter + Send + Sync>,
}

impl PushWorker {
    /// Collect under the write lock, then export under the read lock.
    ///
    /// Errors never stop the ticker; they are routed to the global handler.
    fn on_tick(&self) {
        let collected = self.processor.lock().and_then(|mut locked_processor| {
            locked_processor.start_collection();
            let collected = self.accumulator.collect(&mut locked_processor);
            let finished = locked_processor.finish_collection();
            collected.map(|_| ()).and(finished)
        });

        if let Err(err) = collected {
            global::handle_error(err);
            return;
        }

        if let Err(err) = self
            .processor
            .checkpoint_set()
            .and_then(|checkpoint_set| self.exporter.export(&*checkpoint_set))
        {
            global::handle_error(err);
        }
    }
}

/// The exporter decides temporality; the processor only sees this
/// delegating selector.
#[derive(Debug)]
struct ExporterKindSelector(Arc<dyn Exporter + Send + Sync>);

impl ExportKindSelector for ExporterKindSelector {
    fn export_kind_for(&self, descriptor: &Descriptor, kind: &AggregationKind) -> ExportKind {
        self.0.export_kind_for(descriptor, kind)
    }
}

/// Configuration for a [`PushController`].
pub struct PushControllerBuilder<R: Runtime> {
    aggregator_selector: Box<dyn AggregatorSelector + Send + Sync>,
    exporter: Arc<dyn Exporter + Send + Sync>,
    rt: R,
    resource: Option<Resource>,
    period: Option<Duration>,
}

impl<R: Runtime> PushControllerBuilder<R> {
    /// Configure the resource for this controller.
    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resource = Some(resource);
        self
    }

    /// Configure the interval between pushes. Defaults to 10 seconds.
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = Some(period);
        self
    }

    /// Build a new [`PushController`] and start its worker.
    pub fn build(self) -> PushController {
        let processor = Arc::new(processors::basic(
            self.aggregator_selector,
            Box::new(ExporterKindSelector(self.exporter.clone())),
            false,
        ));

        let accumulator = accumulator(processor.clone())
            .with_resource(self.resource.unwrap_or_default())
            .build();

        let worker = PushWorker {
            accumulator: accumulator.clone(),
            processor,
            exporter: self.exporter,
        };

        let (message_sender, message_receiver) = mpsc::channel(8);
        let ticker = self
            .rt
            .interval(self.period.unwrap_or(DEFAULT_PUSH_PERIOD))
            .map(|_| PushMessage::Tick);

        self.rt.spawn(Box::pin(async move {
            let mut messages = Box::pin(stream::select(message_receiver, ticker));
            while let Some(message) = messages.next().await {
                match message {
                    PushMessage::Tick => worker.on_tick(),
                    PushMessage::Shutdown(channel) => {
                        worker.on_tick();
                        let _ = channel.send(());
                        break;
                    }
                }
            }
        }));

        PushController {
            message_sender,
            accumulator,
        }
    }
}

impl<R: Runtime> fmt::Debug for PushControllerBuilder<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushControllerBuilder")
            .field("resource", &self.resource)
            .field("period", &self.period)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::metrics::sdk_api::SyncInstrumentCore;
    use crate::api::metrics::{InstrumentKind, NumberKind};
    use crate::api::KeyValue;
    use crate::sdk::metrics::selectors::simple::Selector;
    use crate::testing::metrics::InMemoryExporter;
    use futures_util::future::BoxFuture;

    #[derive(Debug, Clone)]
    struct TestRuntime;

    impl Runtime for TestRuntime {
        type Interval = tokio_stream::wrappers::IntervalStream;
        type Delay = std::pin::Pin<Box<tokio::time::Sleep>>;

        fn interval(&self, duration: Duration) -> Self::Interval {
            tokio_stream::wrappers::IntervalStream::new(tokio::time::interval(duration))
        }

        fn spawn(&self, future: BoxFuture<'static, ()>) {
            #[allow(clippy::let_underscore_future)]
            let _ = tokio::spawn(future);
        }

        fn delay(&self, duration: Duration) -> Self::Delay {
            Box::pin(tokio::time::sleep(duration))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn push_exports_on_interval() {
        let exporter = InMemoryExporter::new(ExportKind::CUMULATIVE);
        let mut controller = push(
            Box::new(Selector::Inexpensive),
            exporter.clone(),
            TestRuntime,
        )
        .with_period(Duration::from_millis(50))
        .with_resource(Resource::new(vec![KeyValue::new("R", "V")]))
        .build();

        let counter = controller
            .accumulator()
            .new_sync_instrument(Descriptor::new(
                "counter".into(),
                "test",
                None,
                InstrumentKind::Counter,
                NumberKind::U64,
            ))
            .unwrap();
        counter.record_one(10u64.into(), &[KeyValue::new("A", "B")]);

        tokio::time::sleep(Duration::from_millis(200)).await;
        controller.stop().unwrap();

        // The processor runs without memory, so the counter appears in the
        // export for the interval that collected its update.
        let exports = exporter.exports();
        assert!(!exports.is_empty());
        assert!(exports
            .iter()
            .any(|map| map.get("counter/A=B/R=V") == Some(&10.0)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stop_performs_final_export() {
        let exporter = InMemoryExporter::new(ExportKind::CUMULATIVE);
        let mut controller = push(
            Box::new(Selector::Inexpensive),
            exporter.clone(),
            TestRuntime,
        )
        // Long period: only the shutdown flush exports.
        .with_period(Duration::from_secs(3600))
        .build();

        let counter = controller
            .accumulator()
            .new_sync_instrument(Descriptor::new(
                "counter".into(),
                "test",
                None,
                InstrumentKind::Counter,
                NumberKind::U64,
            ))
            .unwrap();
        counter.record_one(7u64.into(), &[]);

        controller.stop().unwrap();

        let exports = exporter.exports();
        assert!(!exports.is_empty());
        assert!(exports.iter().any(|map| map.get("counter//") == Some(&7.0)));
    }
}
