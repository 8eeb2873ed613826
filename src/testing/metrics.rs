//! Test helpers that render checkpoint sets into comparable maps.
use crate::api::labels::{default_encoder, Encoder};
use crate::api::metrics::{MetricsError, Result};
use crate::sdk::export::metrics::{
    Aggregation, AggregationKind, Aggregator, CheckpointSet, Count, ExportKind,
    ExportKindSelector, Exporter, LastValue, Record, Sum,
};
use crate::sdk::metrics::aggregators::{
    ArrayAggregator, DDSketchAggregator, HistogramAggregator, LastValueAggregator,
    MinMaxSumCountAggregator, SumAggregator,
};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Collects records into a map keyed by `name/labels/resource`, with each
/// aggregation reduced to a single comparable number.
pub struct Output {
    map: BTreeMap<String, f64>,
    encoder: Box<dyn Encoder + Send + Sync>,
}

impl Output {
    /// A new empty output using the default label encoder.
    pub fn new() -> Self {
        Output {
            map: BTreeMap::new(),
            encoder: default_encoder(),
        }
    }

    /// Add a single export record to the map.
    ///
    /// Sum-capable aggregations contribute their sum; last-value
    /// aggregations contribute the latest value. An empty last-value
    /// aggregation propagates `NoDataCollected`, which `try_for_each`
    /// tolerates.
    pub fn add_record(&mut self, record: &Record<'_>) -> Result<()> {
        let agg = match record.aggregator() {
            Some(agg) => agg,
            None => return Err(MetricsError::NoDataCollected),
        };
        let desc = record.descriptor();
        let kind = desc.number_kind();

        let value = if let Some(sum) = agg.as_any().downcast_ref::<SumAggregator>() {
            sum.sum()?.to_f64(kind)
        } else if let Some(last) = agg.as_any().downcast_ref::<LastValueAggregator>() {
            last.last_value()?.0.to_f64(kind)
        } else if let Some(mmsc) = agg.as_any().downcast_ref::<MinMaxSumCountAggregator>() {
            if mmsc.count()? == 0 {
                return Err(MetricsError::NoDataCollected);
            }
            mmsc.sum()?.to_f64(kind)
        } else if let Some(histogram) = agg.as_any().downcast_ref::<HistogramAggregator>() {
            if histogram.count()? == 0 {
                return Err(MetricsError::NoDataCollected);
            }
            histogram.sum()?.to_f64(kind)
        } else if let Some(array) = agg.as_any().downcast_ref::<ArrayAggregator>() {
            if array.count()? == 0 {
                return Err(MetricsError::NoDataCollected);
            }
            array.sum()?.to_f64(kind)
        } else if let Some(sketch) = agg.as_any().downcast_ref::<DDSketchAggregator>() {
            if sketch.count()? == 0 {
                return Err(MetricsError::NoDataCollected);
            }
            sketch.sum()?.to_f64(kind)
        } else {
            return Err(MetricsError::Other(format!(
                "unhandled aggregation kind: {:?}",
                agg.aggregation().kind()
            )));
        };

        let key = format!(
            "{}/{}/{}",
            desc.name(),
            record.labels().encoded(Some(self.encoder.as_ref())),
            record.resource().encoded(Some(self.encoder.as_ref())),
        );
        self.map.insert(key, value);

        Ok(())
    }

    /// The rendered map.
    pub fn into_map(self) -> BTreeMap<String, f64> {
        self.map
    }

    /// View of the rendered map.
    pub fn map(&self) -> &BTreeMap<String, f64> {
        &self.map
    }
}

impl Default for Output {
    fn default() -> Self {
        Output::new()
    }
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Output").field("map", &self.map).finish()
    }
}

/// An exporter that renders every export into an [`Output`] map and retains
/// them for inspection.
#[derive(Debug, Clone)]
pub struct InMemoryExporter {
    export_kind: ExportKind,
    exports: Arc<Mutex<Vec<BTreeMap<String, f64>>>>,
}

impl InMemoryExporter {
    /// A new exporter requesting the given export kind.
    pub fn new(export_kind: ExportKind) -> Self {
        InMemoryExporter {
            export_kind,
            exports: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The maps rendered by each completed export, oldest first.
    pub fn exports(&self) -> Vec<BTreeMap<String, f64>> {
        self.exports.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl ExportKindSelector for InMemoryExporter {
    fn export_kind_for(
        &self,
        _descriptor: &crate::api::metrics::Descriptor,
        _kind: &AggregationKind,
    ) -> ExportKind {
        self.export_kind
    }
}

impl Exporter for InMemoryExporter {
    fn export(&self, checkpoint_set: &dyn CheckpointSet) -> Result<()> {
        let mut output = Output::new();
        checkpoint_set.try_for_each(self, &mut |record| output.add_record(record))?;
        self.exports
            .lock()
            .map_err(From::from)
            .map(|mut exports| exports.push(output.into_map()))
    }
}
