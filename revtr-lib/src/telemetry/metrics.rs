use opentelemetry::global;
use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter, UpDownCounter};
use opentelemetry::KeyValue;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::Registry;
use std::sync::Arc;

pub mod labels {
    pub const VP: &str = "vp";
    pub const KIND: &str = "kind";
    pub const METHOD: &str = "method";
    pub const ERROR_TYPE: &str = "error_type";
    pub const RESULT: &str = "result";
    pub const CONTROLLER: &str = "controller";
    pub const VERSION: &str = "version";
    pub const RUST_VERSION: &str = "rust_version";
}

pub mod values {
    pub const KIND_PING: &str = "ping";
    pub const KIND_TRACE: &str = "trace";
    pub const ERROR_TIMEOUT: &str = "timeout";
    pub const ERROR_CANCELLED: &str = "cancelled";
    pub const ERROR_NO_SOCKET: &str = "no_socket";
    pub const ERROR_DECODE: &str = "decode";
    pub const ERROR_OTHER: &str = "other";
    pub const RESULT_HIT: &str = "hit";
    pub const RESULT_MISS: &str = "miss";
}

#[derive(Clone)]
pub struct Metrics {
    // Probe daemon control sockets
    pub scamper_commands_written_total: Counter<u64>,
    pub scamper_results_read_total: Counter<u64>,
    pub scamper_bytes_written_total: Counter<u64>,
    pub scamper_bytes_read_total: Counter<u64>,
    pub sessions_active: UpDownCounter<i64>,

    // Measurements
    pub measurements_total: Counter<u64>,
    pub measurement_errors_total: Counter<u64>,
    pub measurement_duration_seconds: Histogram<f64>,

    pub rpc_calls_total: Counter<u64>,

    // Spoofed probes
    pub spoofs_registered_total: Counter<u64>,
    pub spoofed_probes_total: Counter<u64>,
    pub spoof_batches_sent_total: Counter<u64>,
    pub spoof_batch_errors_total: Counter<u64>,

    pub vp_health_checks_total: Counter<u64>,

    // Vantage point monitor
    pub probes_captured_total: Counter<u64>,
    pub probe_batches_sent_total: Counter<u64>,

    pub build_info: Gauge<u64>,
}

impl Metrics {
    fn new(meter: Meter) -> Self {
        Self {
            scamper_commands_written_total: meter
                .u64_counter("revtr_scamper_commands_written_total")
                .with_description("Commands written to probe-daemon sockets")
                .build(),
            scamper_results_read_total: meter
                .u64_counter("revtr_scamper_results_read_total")
                .with_description("Responses read from probe-daemon sockets")
                .build(),
            scamper_bytes_written_total: meter
                .u64_counter("revtr_scamper_bytes_written_total")
                .with_description("Bytes written to probe-daemon sockets")
                .build(),
            scamper_bytes_read_total: meter
                .u64_counter("revtr_scamper_bytes_read_total")
                .with_description("Data bytes read from probe-daemon sockets")
                .build(),
            sessions_active: meter
                .i64_up_down_counter("revtr_sessions_active")
                .with_description("Registered probe-daemon sessions")
                .build(),
            measurements_total: meter
                .u64_counter("revtr_measurements_total")
                .with_description("Measurements issued")
                .build(),
            measurement_errors_total: meter
                .u64_counter("revtr_measurement_errors_total")
                .with_description("Measurements that failed, by error type")
                .build(),
            measurement_duration_seconds: meter
                .f64_histogram("revtr_measurement_duration_seconds")
                .with_description("Time from issue to result in seconds")
                .build(),
            rpc_calls_total: meter
                .u64_counter("revtr_rpc_calls_total")
                .with_description("RPC calls served")
                .build(),
            spoofs_registered_total: meter
                .u64_counter("revtr_spoofs_registered_total")
                .with_description("Spoofed probe registrations")
                .build(),
            spoofed_probes_total: meter
                .u64_counter("revtr_spoofed_probes_total")
                .with_description("Spoofed probes received. result=hit|miss")
                .build(),
            spoof_batches_sent_total: meter
                .u64_counter("revtr_spoof_batches_sent_total")
                .with_description("Batches of spoofed probes forwarded to controllers")
                .build(),
            spoof_batch_errors_total: meter
                .u64_counter("revtr_spoof_batch_errors_total")
                .with_description("Batches of spoofed probes that could not be forwarded")
                .build(),
            vp_health_checks_total: meter
                .u64_counter("revtr_vp_health_checks_total")
                .with_description("Vantage point health checks by result")
                .build(),
            probes_captured_total: meter
                .u64_counter("revtr_probes_captured_total")
                .with_description("Spoofed echo replies captured on the vantage point")
                .build(),
            probe_batches_sent_total: meter
                .u64_counter("revtr_probe_batches_sent_total")
                .with_description("Probe batches sent to the PL-Controller")
                .build(),
            build_info: meter
                .u64_gauge("revtr_build_info")
                .with_description("Build information (version, rust version)")
                .build(),
        }
    }

    /// Set build info metric with version labels
    pub fn set_build_info(&self) {
        let version = env!("CARGO_PKG_VERSION");
        let rust_version = env!("CARGO_PKG_RUST_VERSION");

        self.build_info.record(
            1,
            &[
                KeyValue::new(labels::VERSION, version),
                KeyValue::new(labels::RUST_VERSION, rust_version),
            ],
        );
    }

    pub fn record_command_written(&self, vp: &str, bytes: usize) {
        let attrs = &[KeyValue::new(labels::VP, vp.to_string())];
        self.scamper_commands_written_total.add(1, attrs);
        self.scamper_bytes_written_total.add(bytes as u64, attrs);
    }

    pub fn record_result_read(&self, vp: &str, bytes: usize) {
        let attrs = &[KeyValue::new(labels::VP, vp.to_string())];
        self.scamper_results_read_total.add(1, attrs);
        self.scamper_bytes_read_total.add(bytes as u64, attrs);
    }

    pub fn record_session_opened(&self) {
        self.sessions_active.add(1, &[]);
    }

    pub fn record_session_closed(&self) {
        self.sessions_active.add(-1, &[]);
    }

    pub fn record_measurement(&self, kind: &str, duration_secs: f64) {
        let attrs = &[KeyValue::new(labels::KIND, kind.to_string())];
        self.measurements_total.add(1, attrs);
        self.measurement_duration_seconds.record(duration_secs, attrs);
    }

    pub fn record_measurement_error(&self, kind: &str, error_type: &str) {
        self.measurement_errors_total.add(
            1,
            &[
                KeyValue::new(labels::KIND, kind.to_string()),
                KeyValue::new(labels::ERROR_TYPE, error_type.to_string()),
            ],
        );
    }

    pub fn record_rpc_call(&self, method: &str) {
        self.rpc_calls_total
            .add(1, &[KeyValue::new(labels::METHOD, method.to_string())]);
    }

    pub fn record_spoof_registered(&self) {
        self.spoofs_registered_total.add(1, &[]);
    }

    pub fn record_spoofed_probe(&self, result: &str) {
        self.spoofed_probes_total
            .add(1, &[KeyValue::new(labels::RESULT, result.to_string())]);
    }

    pub fn record_spoof_batch(&self, controller: &str, ok: bool) {
        let attrs = &[KeyValue::new(labels::CONTROLLER, controller.to_string())];
        if ok {
            self.spoof_batches_sent_total.add(1, attrs);
        } else {
            self.spoof_batch_errors_total.add(1, attrs);
        }
    }

    pub fn record_health_check(&self, result: &str) {
        self.vp_health_checks_total
            .add(1, &[KeyValue::new(labels::RESULT, result.to_string())]);
    }

    pub fn record_probe_captured(&self) {
        self.probes_captured_total.add(1, &[]);
    }

    pub fn record_probe_batch(&self) {
        self.probe_batches_sent_total.add(1, &[]);
    }
}

pub fn init_metrics(
    service: &'static str,
) -> Result<(Arc<Metrics>, Registry), Box<dyn std::error::Error + Send + Sync>> {
    let registry = Registry::default();

    let exporter = opentelemetry_prometheus::exporter()
        .with_registry(registry.clone())
        .build()?;

    let meter_provider = SdkMeterProvider::builder().with_reader(exporter).build();

    global::set_meter_provider(meter_provider);

    let meter = global::meter(service);
    let metrics = Arc::new(Metrics::new(meter));

    metrics.set_build_info();

    Ok((metrics, registry))
}
