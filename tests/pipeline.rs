//! End-to-end pipeline tests through the pull controller.
use std::time::Duration;
use telemeter::api::metrics::sdk_api::SyncInstrumentCore;
use telemeter::api::metrics::{Descriptor, InstrumentKind, NumberKind};
use telemeter::api::KeyValue;
use telemeter::sdk::export::metrics::{Aggregator, CheckpointSet, ExportKind, Quantile, Sum};
use telemeter::sdk::metrics::aggregators::{ArrayAggregator, SumAggregator};
use telemeter::sdk::metrics::{controllers, selectors::simple::Selector};

fn descriptor(name: &str, kind: InstrumentKind, number_kind: NumberKind) -> Descriptor {
    Descriptor::new(name.into(), "pipeline-test", None, kind, number_kind)
}

#[test]
fn counter_sums_across_label_permutations() {
    let mut controller = controllers::pull(
        Box::new(Selector::Inexpensive),
        Box::new(ExportKind::CUMULATIVE),
    )
    .with_cache_period(Duration::ZERO)
    .build();

    let counter = controller
        .accumulator()
        .new_sync_instrument(descriptor(
            "requests",
            InstrumentKind::Counter,
            NumberKind::U64,
        ))
        .unwrap();

    // Permuted label orders address the same record.
    counter.record_one(
        3u64.into(),
        &[KeyValue::new("a", "1"), KeyValue::new("b", "2")],
    );
    counter.record_one(
        4u64.into(),
        &[KeyValue::new("b", "2"), KeyValue::new("a", "1")],
    );
    controller.collect().unwrap();

    let mut sums = Vec::new();
    controller
        .try_for_each(&ExportKind::CUMULATIVE, &mut |record| {
            let agg = record.aggregator().expect("aggregation present");
            let sum = agg
                .as_any()
                .downcast_ref::<SumAggregator>()
                .expect("sum aggregator");
            sums.push(sum.sum()?.to_u64(record.descriptor().number_kind()));
            Ok(())
        })
        .unwrap();

    assert_eq!(sums, vec![7]);
}

#[test]
fn value_recorder_quantiles() {
    let mut controller = controllers::pull(
        Box::new(Selector::Exact),
        Box::new(ExportKind::CUMULATIVE),
    )
    .with_cache_period(Duration::ZERO)
    .build();

    let recorder = controller
        .accumulator()
        .new_sync_instrument(descriptor(
            "latency",
            InstrumentKind::ValueRecorder,
            NumberKind::F64,
        ))
        .unwrap();

    for value in [1.0f64, 9.0, 5.0, 3.0, 7.0] {
        recorder.record_one(value.into(), &[KeyValue::new("route", "/")]);
    }
    controller.collect().unwrap();

    let mut seen = false;
    controller
        .try_for_each(&ExportKind::CUMULATIVE, &mut |record| {
            let agg = record.aggregator().expect("aggregation present");
            let array = agg
                .as_any()
                .downcast_ref::<ArrayAggregator>()
                .expect("exact aggregator");

            let kind = record.descriptor().number_kind();
            assert_eq!(array.quantile(0.0)?.to_f64(kind), 1.0);
            assert_eq!(array.quantile(0.5)?.to_f64(kind), 5.0);
            assert_eq!(array.quantile(1.0)?.to_f64(kind), 9.0);
            seen = true;
            Ok(())
        })
        .unwrap();
    assert!(seen);
}

#[test]
fn interval_timestamps_chain() {
    let mut controller = controllers::pull(
        Box::new(Selector::Inexpensive),
        Box::new(ExportKind::CUMULATIVE),
    )
    .with_cache_period(Duration::ZERO)
    .build();

    let counter = controller
        .accumulator()
        .new_sync_instrument(descriptor(
            "requests",
            InstrumentKind::Counter,
            NumberKind::U64,
        ))
        .unwrap();

    let mut first_start = None;
    let mut previous_end = None;
    for _ in 0..3 {
        counter.record_one(1u64.into(), &[]);
        controller.collect().unwrap();

        let mut times = None;
        controller
            .try_for_each(&ExportKind::CUMULATIVE, &mut |record| {
                times = Some((*record.start_time(), *record.end_time()));
                Ok(())
            })
            .unwrap();
        let (start, end) = times.expect("one record");

        // A cumulative record always starts at the processor start time and
        // ends never earlier than the previous interval.
        assert!(start <= end);
        assert_eq!(start, *first_start.get_or_insert(start));
        if let Some(previous_end) = previous_end {
            assert!(end >= previous_end);
        }
        previous_end = Some(end);
    }
}
