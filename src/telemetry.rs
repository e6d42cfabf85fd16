//! Prometheus recorder behind the `metrics` macros used by the pipeline

use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::warn;

pub const FRAMES_CAPTURED: &str = "camstream_frames_captured_total";
pub const READ_FAILURES: &str = "camstream_read_failures_total";
pub const STREAM_SESSIONS: &str = "camstream_stream_sessions";

const UPKEEP_INTERVAL: Duration = Duration::from_secs(5);

static PROM_HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

/// Install the global Prometheus recorder once and return its handle.
///
/// `None` if another recorder was installed first; the pipeline keeps
/// running, only `/metrics` is unavailable.
pub fn init_metrics_recorder() -> Option<&'static PrometheusHandle> {
    PROM_HANDLE
        .get_or_init(|| {
            let recorder = PrometheusBuilder::new().build_recorder();
            let handle = recorder.handle();
            if let Err(err) = metrics::set_global_recorder(recorder) {
                warn!("Metrics recorder not installed: {}", err);
                return None;
            }

            // Register up front so every series renders before its first event
            metrics::counter!(FRAMES_CAPTURED).increment(0);
            metrics::counter!(READ_FAILURES).increment(0);
            metrics::gauge!(STREAM_SESSIONS).increment(0.0);

            let upkeep = handle.clone();
            let spawned = thread::Builder::new()
                .name("prometheus-upkeep".into())
                .spawn(move || loop {
                    thread::sleep(UPKEEP_INTERVAL);
                    upkeep.run_upkeep();
                });
            if let Err(err) = spawned {
                warn!("Failed to spawn metrics upkeep thread: {}", err);
            }

            Some(handle)
        })
        .as_ref()
}
