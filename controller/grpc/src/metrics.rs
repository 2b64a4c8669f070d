use argon_controller_core::hub::SharedHub;
use prometheus_client::{
    collector::Collector,
    encoding::{DescriptorEncoder, EncodeLabelSet, EncodeMetric},
    metrics::{
        counter::{ConstCounter, Counter},
        family::Family,
        gauge::ConstGauge,
        histogram::Histogram,
        MetricType,
    },
    registry::Registry,
};
use tokio::time;

const CODE_OK: &str = "OK";
const CODE_CANCELLED: &str = "CANCELLED";

#[derive(Clone, Debug)]
pub struct GrpcServerMetricsFamily {
    started: Family<Labels, Counter>,
    handling: Family<Labels, Histogram>,
    handled: Family<CodeLabels, Counter>,
    msg_received: Family<Labels, Counter>,
    msg_sent: Family<Labels, Counter>,
}

#[derive(Clone, Debug)]
pub(crate) struct GrpcServerRPCMetrics {
    started: Counter,
    msg_received: Counter,
    msg_sent: Counter,
    handling: Histogram,
    handled: Family<CodeLabels, Counter>,
    labels: Labels,
}

/// Records the messages sent on a single RPC and its completion.
pub(crate) struct ResponseObserver {
    msg_sent: Counter,
    handled: Option<ResponseHandle>,
}

struct ResponseHandle {
    start: time::Instant,
    durations: Histogram,
    codes: Family<CodeLabels, Counter>,
    labels: Labels,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct Labels {
    grpc_service: &'static str,
    grpc_method: &'static str,
    grpc_type: &'static str,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct CodeLabels {
    grpc_service: &'static str,
    grpc_method: &'static str,
    grpc_type: &'static str,
    grpc_code: &'static str,
}

/// Exposes the hub's subscriber count and publish total.
#[derive(Debug)]
struct HubCollector(SharedHub);

pub fn register_hub(reg: &mut Registry, hub: SharedHub) {
    reg.register_collector(Box::new(HubCollector(hub)));
}

// === GrpcServerMetricsFamily ===

impl GrpcServerMetricsFamily {
    pub fn register(reg: &mut Registry) -> Self {
        let started = Family::<Labels, Counter>::default();
        reg.register(
            "started",
            "Total number of RPCs started on the server",
            started.clone(),
        );

        let msg_received = Family::<Labels, Counter>::default();
        reg.register(
            "msg_received",
            "Total number of RPC stream messages received on the server",
            msg_received.clone(),
        );

        let msg_sent = Family::<Labels, Counter>::default();
        reg.register(
            "msg_sent",
            "Total number of gRPC stream messages sent by the server",
            msg_sent.clone(),
        );

        let handled = Family::<CodeLabels, Counter>::default();
        reg.register(
            "handled",
            "Total number of RPCs completed on the server, regardless of success or failure",
            handled.clone(),
        );

        let handling = Family::<Labels, Histogram>::new_with_constructor(|| {
            // Watch sessions typically last as long as the data plane process.
            Histogram::new([1.0, 60.0, 3600.0, 86400.0])
        });
        reg.register_with_unit(
            "handling",
            "Histogram of the duration (seconds) of gRPC streams handled by the server",
            prometheus_client::registry::Unit::Seconds,
            handling.clone(),
        );

        Self {
            started,
            msg_received,
            msg_sent,
            handled,
            handling,
        }
    }

    pub(crate) fn server_stream_rpc(
        &self,
        svc: &'static str,
        method: &'static str,
    ) -> GrpcServerRPCMetrics {
        let labels = Labels {
            grpc_service: svc,
            grpc_method: method,
            grpc_type: "server_stream",
        };
        GrpcServerRPCMetrics {
            started: self.started.get_or_create(&labels).clone(),
            msg_received: self.msg_received.get_or_create(&labels).clone(),
            msg_sent: self.msg_sent.get_or_create(&labels).clone(),
            handled: self.handled.clone(),
            handling: self.handling.get_or_create(&labels).clone(),
            labels,
        }
    }
}

impl Default for GrpcServerMetricsFamily {
    fn default() -> Self {
        Self::register(&mut Registry::default())
    }
}

// === GrpcServerRPCMetrics ===

impl GrpcServerRPCMetrics {
    pub(crate) fn start(&self) -> ResponseObserver {
        self.started.inc();

        // A watch carries exactly one request message.
        self.msg_received.inc();

        // Pre-register OK
        let _ = self.handled.get_or_create(&CodeLabels {
            grpc_service: self.labels.grpc_service,
            grpc_method: self.labels.grpc_method,
            grpc_type: self.labels.grpc_type,
            grpc_code: CODE_OK,
        });

        ResponseObserver {
            msg_sent: self.msg_sent.clone(),
            handled: Some(ResponseHandle {
                start: time::Instant::now(),
                durations: self.handling.clone(),
                codes: self.handled.clone(),
                labels: self.labels.clone(),
            }),
        }
    }
}

// === ResponseObserver ===

impl ResponseObserver {
    pub(crate) fn msg_sent(&self) {
        self.msg_sent.inc();
    }

    /// Records that the server closed the stream.
    pub(crate) fn end(&mut self) {
        if let Some(inner) = self.handled.take() {
            inner.inc_end(CODE_OK);
        }
    }
}

/// A stream that is dropped before the server closes it was canceled by the
/// client.
impl Drop for ResponseObserver {
    fn drop(&mut self) {
        if let Some(inner) = self.handled.take() {
            inner.inc_end(CODE_CANCELLED);
        }
    }
}

// === ResponseHandle ===

impl ResponseHandle {
    #[inline]
    fn inc_end(self, code: &'static str) {
        let Self {
            start,
            durations,
            codes,
            labels,
        } = self;
        durations.observe(start.elapsed().as_secs_f64());
        codes
            .get_or_create(&CodeLabels {
                grpc_service: labels.grpc_service,
                grpc_method: labels.grpc_method,
                grpc_type: labels.grpc_type,
                grpc_code: code,
            })
            .inc();
    }
}

// === HubCollector ===

impl Collector for HubCollector {
    fn encode(&self, mut encoder: DescriptorEncoder<'_>) -> Result<(), std::fmt::Error> {
        let subscribers = ConstGauge::new(self.0.subscriber_count() as i64);
        let subscribers_encoder = encoder.encode_descriptor(
            "hub_subscribers",
            "The number of active watch subscribers",
            None,
            MetricType::Gauge,
        )?;
        subscribers.encode(subscribers_encoder)?;

        let publishes = ConstCounter::new(self.0.publish_count());
        let publishes_encoder = encoder.encode_descriptor(
            "hub_publishes",
            "Total number of snapshots published to subscribers",
            None,
            MetricType::Counter,
        )?;
        publishes.encode(publishes_encoder)?;

        Ok(())
    }
}
