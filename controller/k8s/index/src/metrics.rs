use crate::SharedIndex;
use prometheus_client::{
    collector::Collector,
    encoding::{DescriptorEncoder, EncodeLabelSet, EncodeMetric},
    metrics::{counter::Counter, family::Family, gauge::ConstGauge, MetricType},
    registry::Registry,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PassResult {
    Published,
    Unchanged,
    Failed,
}

#[derive(Clone, Debug)]
pub struct SynthesisMetrics {
    passes: Family<PassLabels, Counter>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct PassLabels {
    result: &'static str,
}

#[derive(Debug)]
struct Instrumented(SharedIndex);

pub fn register(reg: &mut Registry, index: SharedIndex) {
    reg.register_collector(Box::new(Instrumented(index)));
}

// === impl SynthesisMetrics ===

impl SynthesisMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let passes = Family::<PassLabels, Counter>::default();
        reg.register(
            "passes",
            "Total number of synthesis passes by result",
            passes.clone(),
        );
        Self { passes }
    }

    pub(crate) fn record(&self, result: PassResult) {
        let result = match result {
            PassResult::Published => "published",
            PassResult::Unchanged => "unchanged",
            PassResult::Failed => "failed",
        };
        self.passes.get_or_create(&PassLabels { result }).inc();
    }
}

impl Default for SynthesisMetrics {
    fn default() -> Self {
        Self::register(&mut Registry::default())
    }
}

// === impl Instrumented ===

impl Collector for Instrumented {
    fn encode(&self, mut encoder: DescriptorEncoder<'_>) -> Result<(), std::fmt::Error> {
        let sizes = self.0.read().sizes();

        let mut size_encoder = encoder.encode_descriptor(
            "size",
            "The number of indexed resources by kind",
            None,
            MetricType::Gauge,
        )?;
        for (kind, size) in sizes {
            let labels = vec![("kind", kind)];
            let gauge = ConstGauge::new(size as i64);
            gauge.encode(size_encoder.encode_family(&labels)?)?;
        }

        Ok(())
    }
}
