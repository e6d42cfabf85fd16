//! # HTTP boundary
//!
//! Axum router exposing the live stream and the camera control API.
//!
//! | Path | Description |
//! |------|-------------|
//! | `GET /video_feed` | `multipart/x-mixed-replace` JPEG stream, 503 when stopped |
//! | `POST /api/camera/start` | Start capture with the configured device |
//! | `POST /api/camera/stop` | Stop capture and release the device |
//! | `GET /api/camera/status` | State plus granted width/height/fps |
//! | `GET /api/stream_url` | Absolute URLs for the stream and status endpoints |
//! | `GET /metrics` | Prometheus text exposition, 404 without a recorder |
//!
//! Every response carries permissive CORS headers so players on other
//! origins can embed the stream.

use std::convert::Infallible;
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_stream::StreamExt;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::controller::{DeviceController, DeviceStatus};
use crate::encode::multipart_content_type;
use crate::pipeline::StreamSession;
use crate::{Result, ServerConfig, StreamConfig};

/// Shared state passed to all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<DeviceController>,
    pub stream: StreamConfig,
    pub server: ServerConfig,
    pub metrics: Option<PrometheusHandle>,
}

/// `{status, message}` body of the control endpoints
#[derive(Debug, Serialize)]
struct ApiMessage {
    status: &'static str,
    message: String,
}

impl ApiMessage {
    fn success(message: impl Into<String>) -> Self {
        Self {
            status: "success",
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error",
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct StreamUrls {
    stream_url: String,
    status_url: String,
}

/// Build the router with all endpoints.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/video_feed", get(video_feed))
        .route("/api/camera/start", post(start_camera))
        .route("/api/camera/stop", post(stop_camera))
        .route("/api/camera/status", get(camera_status))
        .route("/api/stream_url", get(stream_url))
        .route("/metrics", get(render_metrics))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve on `listener` until `shutdown` resolves and open responses finish.
///
/// Stream responses only finish once the camera stops, so `shutdown` should
/// stop the controller before resolving.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Handles `GET /video_feed`: one stream session per request.
async fn video_feed(State(state): State<AppState>) -> Response {
    let controller = &state.controller;
    if !controller.is_running() {
        return (StatusCode::SERVICE_UNAVAILABLE, "Camera not available").into_response();
    }

    let session = StreamSession::new(
        controller.slot(),
        controller.subscribe(),
        controller.config().fps,
        &state.stream,
    );
    let parts = session.spawn().map(Ok::<_, Infallible>);

    (
        [
            (header::CONTENT_TYPE, multipart_content_type(&state.stream.boundary)),
            (header::CACHE_CONTROL, "no-cache".to_owned()),
        ],
        Body::from_stream(parts),
    )
        .into_response()
}

async fn start_camera(State(state): State<AppState>) -> (StatusCode, Json<ApiMessage>) {
    let controller = Arc::clone(&state.controller);
    match tokio::task::spawn_blocking(move || controller.start()).await {
        Ok(Ok(_)) => (StatusCode::OK, Json(ApiMessage::success("Camera started"))),
        Ok(Err(err)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiMessage::error(format!("Failed to start camera: {err}"))),
        ),
        Err(err) => {
            error!("Start task failed: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiMessage::error("Failed to start camera")),
            )
        }
    }
}

async fn stop_camera(State(state): State<AppState>) -> (StatusCode, Json<ApiMessage>) {
    let controller = Arc::clone(&state.controller);
    match tokio::task::spawn_blocking(move || controller.stop()).await {
        Ok(_) => (StatusCode::OK, Json(ApiMessage::success("Camera stopped"))),
        Err(err) => {
            error!("Stop task failed: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiMessage::error("Failed to stop camera")),
            )
        }
    }
}

async fn camera_status(State(state): State<AppState>) -> Json<DeviceStatus> {
    Json(state.controller.status())
}

async fn stream_url(State(state): State<AppState>) -> Json<StreamUrls> {
    let host = advertised_ip(state.server.host);
    let base = format!("http://{}:{}", UrlHost(host), state.server.port);
    Json(StreamUrls {
        stream_url: format!("{base}/video_feed"),
        status_url: format!("{base}/api/camera/status"),
    })
}

async fn render_metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "Metrics recorder not installed").into_response(),
    }
}

/// Address other machines on the LAN should use to reach us.
///
/// A wildcard bind is resolved to the interface holding the default route;
/// connecting a UDP socket only picks a route and sends nothing.
fn advertised_ip(bind: IpAddr) -> IpAddr {
    if !bind.is_unspecified() {
        return bind;
    }
    UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .and_then(|socket| {
            socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80))?;
            socket.local_addr()
        })
        .map(|addr| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// Brackets IPv6 literals for use in a URL
struct UrlHost(IpAddr);

impl std::fmt::Display for UrlHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            IpAddr::V4(ip) => write!(f, "{ip}"),
            IpAddr::V6(ip) => write!(f, "[{ip}]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::opener_for;
    use crate::{DeviceConfig, SourceKind};
    use axum::body::to_bytes;
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    fn state(index: u32) -> AppState {
        let device = DeviceConfig {
            source: SourceKind::TestPattern,
            index,
            width: 64,
            height: 48,
            ..DeviceConfig::default()
        };
        AppState {
            controller: Arc::new(DeviceController::new(
                device,
                opener_for(SourceKind::TestPattern),
            )),
            stream: StreamConfig::default(),
            server: ServerConfig {
                host: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)),
                port: 5000,
            },
            metrics: None,
        }
    }

    async fn call(state: &AppState, method: &str, uri: &str) -> (StatusCode, Vec<u8>) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    fn json(body: &[u8]) -> Value {
        serde_json::from_slice(body).unwrap()
    }

    #[tokio::test]
    async fn video_feed_is_unavailable_when_stopped() {
        let state = state(0);
        let (status, body) = call(&state, "GET", "/video_feed").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, b"Camera not available");
    }

    #[tokio::test]
    async fn start_status_stop_round() {
        let state = state(0);

        let (status, body) = call(&state, "POST", "/api/camera/start").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["status"], "success");
        assert_eq!(json(&body)["message"], "Camera started");

        let (_, body) = call(&state, "GET", "/api/camera/status").await;
        let status_json = json(&body);
        assert_eq!(status_json["is_streaming"], true);
        assert_eq!(status_json["width"], 64);
        assert_eq!(status_json["height"], 48);
        assert_eq!(status_json["fps"], 30);
        assert_eq!(status_json["state"], "running");

        // Second start is a no-op success
        let (status, _) = call(&state, "POST", "/api/camera/start").await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(&state, "POST", "/api/camera/stop").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["message"], "Camera stopped");

        let (_, body) = call(&state, "GET", "/api/camera/status").await;
        assert_eq!(json(&body)["is_streaming"], false);
        assert_eq!(json(&body)["state"], "stopped");
    }

    #[tokio::test]
    async fn start_failure_is_500() {
        let state = state(5);
        let (status, body) = call(&state, "POST", "/api/camera/start").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let body = json(&body);
        assert_eq!(body["status"], "error");
        assert!(body["message"]
            .as_str()
            .unwrap()
            .starts_with("Failed to start camera"));
        assert_eq!(state.controller.state(), crate::CaptureState::Stopped);
    }

    #[tokio::test]
    async fn stop_when_stopped_succeeds() {
        let state = state(0);
        let (status, body) = call(&state, "POST", "/api/camera/stop").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["status"], "success");
    }

    #[tokio::test]
    async fn stream_url_uses_bound_host_and_port() {
        let state = state(0);
        let (status, body) = call(&state, "GET", "/api/stream_url").await;
        assert_eq!(status, StatusCode::OK);
        let body = json(&body);
        assert_eq!(body["stream_url"], "http://192.168.1.20:5000/video_feed");
        assert_eq!(body["status_url"], "http://192.168.1.20:5000/api/camera/status");
    }

    #[tokio::test]
    async fn cors_headers_are_present() {
        let state = state(0);
        let request = Request::builder()
            .uri("/api/camera/status")
            .header(header::ORIGIN, "http://example.com")
            .body(Body::empty())
            .unwrap();
        let response = router(state).oneshot(request).await.unwrap();
        assert!(response
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn metrics_endpoint_reports_capture_and_session_series() {
        use crate::telemetry::{
            init_metrics_recorder, FRAMES_CAPTURED, READ_FAILURES, STREAM_SESSIONS,
        };
        use std::time::{Duration, Instant};

        let mut state = state(0);
        state.metrics = init_metrics_recorder().cloned();
        assert!(state.metrics.is_some());

        let (status, _) = call(&state, "POST", "/api/camera/start").await;
        assert_eq!(status, StatusCode::OK);
        let deadline = Instant::now() + Duration::from_secs(5);
        while state.controller.slot().sequence() < 2 {
            assert!(Instant::now() < deadline, "no frames captured");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let (status, body) = call(&state, "GET", "/metrics").await;
        call(&state, "POST", "/api/camera/stop").await;

        assert_eq!(status, StatusCode::OK);
        let text = String::from_utf8(body).unwrap();
        for name in [FRAMES_CAPTURED, READ_FAILURES, STREAM_SESSIONS] {
            assert!(text.contains(name), "{name} missing from:\n{text}");
        }
        let captured = text
            .lines()
            .find(|line| line.starts_with(FRAMES_CAPTURED))
            .and_then(|line| line.split_whitespace().last())
            .and_then(|value| value.parse::<f64>().ok())
            .unwrap();
        assert!(captured >= 2.0, "counter stayed at {captured}");
    }

    #[tokio::test]
    async fn metrics_without_recorder_is_404() {
        let (status, _) = call(&state(0), "GET", "/metrics").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn ipv6_hosts_are_bracketed() {
        let host = UrlHost("::1".parse().unwrap());
        assert_eq!(host.to_string(), "[::1]");
    }

    #[test]
    fn wildcard_bind_resolves_to_a_concrete_address() {
        assert!(!advertised_ip(IpAddr::V4(Ipv4Addr::UNSPECIFIED)).is_unspecified());
    }
}
