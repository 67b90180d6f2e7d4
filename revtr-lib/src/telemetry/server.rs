use crate::telemetry::{
    handle_metrics, health_check_response, live_check_response, ready_check_response,
};
use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use prometheus::Registry;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

type RespBody = BoxBody<Bytes, hyper::Error>;

/// Readiness probe: returns `Err(reason)` while the service cannot take work.
pub type Readiness = Arc<dyn Fn() -> Result<(), &'static str> + Send + Sync>;

fn plain(status: StatusCode, text: &'static str) -> Response<RespBody> {
    let body = Full::new(Bytes::from(text))
        .map_err(|never| match never {})
        .boxed();
    let mut resp = Response::new(body);
    *resp.status_mut() = status;
    resp
}

fn route(path: &str, registry: &Registry, readiness: &Readiness) -> Response<RespBody> {
    let result = match path {
        "/health" => health_check_response(),
        "/ready" => match readiness() {
            Ok(()) => ready_check_response(true, ""),
            Err(reason) => ready_check_response(false, reason),
        },
        "/live" => live_check_response(),
        "/metrics" => handle_metrics(registry),
        _ => return plain(StatusCode::NOT_FOUND, "Not Found"),
    };
    result.unwrap_or_else(|e| {
        warn!(error = %e, path, "Observability server: response error");
        plain(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
    })
}

/// Start the observability server that handles metrics and health checks
/// This server runs on a dedicated port and serves:
/// - `/metrics` - Prometheus metrics
/// - `/health` - Health check endpoint
/// - `/ready` - Readiness check endpoint
/// - `/live` - Liveness check endpoint
pub async fn start_observability_server(
    port: u16,
    registry: Registry,
    readiness: Readiness,
    shutdown: CancellationToken,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let registry = Arc::new(registry);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    info!(?addr, "Observability server started (metrics + health checks)");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Observability server: shutting down");
                break;
            }
            result = listener.accept() => {
                let (stream, peer) = match result {
                    Ok((stream, peer)) => (stream, peer),
                    Err(e) => {
                        warn!(error = %e, "Observability server: accept error");
                        continue;
                    }
                };

                let registry = registry.clone();
                let readiness = readiness.clone();
                tokio::spawn(async move {
                    let svc = hyper::service::service_fn(move |req: Request<Incoming>| {
                        let resp = route(req.uri().path(), &registry, &readiness);
                        async move { Ok::<_, hyper::Error>(resp) }
                    });

                    let builder = ConnBuilder::new(TokioExecutor::new());
                    if let Err(e) = builder.serve_connection(TokioIo::new(stream), svc).await {
                        warn!(?peer, error = %e, "Observability server: serve_connection error");
                    }
                });
            }
        }
    }

    info!("Observability server stopped");
    Ok(())
}
