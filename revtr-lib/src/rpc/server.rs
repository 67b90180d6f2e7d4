use futures_util::{SinkExt, StreamExt};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::frame::{split_framed, Message, Method};
use crate::error::{Result, RevtrError};
use crate::telemetry::Metrics;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const RESPONSE_BUFFER: usize = 64;

/// Per-call state handed to the handler.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub peer: SocketAddr,
    /// Fires when the client goes away or the server shuts down.
    pub cancel: CancellationToken,
}

/// Serves the methods of one RPC service.
///
/// Response messages go to `out`; the call's final status is the returned
/// result.
pub trait RpcHandler: Send + Sync + 'static {
    fn call(
        &self,
        method: Method,
        requests: Vec<Message>,
        ctx: CallContext,
        out: mpsc::Sender<Message>,
    ) -> impl Future<Output = Result<()>> + Send;
}

pub struct RpcServer<H> {
    handler: Arc<H>,
    acceptor: TlsAcceptor,
    metrics: Option<Arc<Metrics>>,
}

impl<H: RpcHandler> RpcServer<H> {
    pub fn new(handler: Arc<H>, acceptor: TlsAcceptor, metrics: Option<Arc<Metrics>>) -> Self {
        Self { handler, acceptor, metrics }
    }

    /// Accepts connections until `shutdown` fires.
    pub async fn serve(&self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        let addr = listener.local_addr()?;
        info!(%addr, "RPC server listening");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("RPC server: shutting down");
                    break;
                }
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!(error = %e, "RPC server: accept error");
                            continue;
                        }
                    };
                    let handler = self.handler.clone();
                    let acceptor = self.acceptor.clone();
                    let metrics = self.metrics.clone();
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        if let Err(e) = serve_conn(handler, acceptor, stream, peer, shutdown, metrics).await {
                            debug!(%peer, error = %e, "RPC connection ended with error");
                        }
                    });
                }
            }
        }
        Ok(())
    }
}

async fn serve_conn<H: RpcHandler>(
    handler: Arc<H>,
    acceptor: TlsAcceptor,
    stream: TcpStream,
    peer: SocketAddr,
    shutdown: CancellationToken,
    metrics: Option<Arc<Metrics>>,
) -> Result<()> {
    let tls = tokio::time::timeout(HANDSHAKE_TIMEOUT, acceptor.accept(stream))
        .await
        .map_err(|_| RevtrError::Tls("handshake timed out".to_string()))?
        .map_err(|e| RevtrError::Tls(format!("handshake failed: {e}")))?;
    let (mut rd, mut wr) = split_framed(tls);

    let method = match rd.next().await.transpose()? {
        Some(Message::Call(method)) => method,
        Some(other) => {
            return Err(RevtrError::Protocol(format!("expected call, got {other:?}")));
        }
        None => return Ok(()),
    };
    if let Some(m) = &metrics {
        m.record_rpc_call(method.as_str());
    }

    let mut requests = Vec::new();
    loop {
        match rd.next().await.transpose()? {
            Some(Message::End) => break,
            Some(msg) => requests.push(msg),
            None => {
                return Err(RevtrError::Protocol(format!(
                    "{method}: client left before the end of its requests"
                )));
            }
        }
    }
    debug!(%peer, %method, requests = requests.len(), "RPC call");

    // anything read from here on means the client is gone or misbehaving
    let cancel = shutdown.child_token();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let _ = rd.next().await;
            cancel.cancel();
        })
    };

    let (tx, mut rx) = mpsc::channel(RESPONSE_BUFFER);
    let ctx = CallContext { peer, cancel: cancel.clone() };
    let call = handler.call(method, requests, ctx, tx);
    // drains `rx` to the end so the handler never blocks on a dead client
    let forward = async {
        let mut failed = None;
        while let Some(msg) = rx.recv().await {
            if failed.is_some() {
                continue;
            }
            if let Err(e) = wr.send(msg).await {
                cancel.cancel();
                failed = Some(e);
            }
        }
        failed.map_or(Ok(()), Err)
    };
    let (result, forwarded) = tokio::join!(call, forward);
    watcher.abort();

    forwarded?;
    let status = match &result {
        Ok(()) => Message::ok(),
        Err(e) => {
            debug!(%peer, %method, error = %e, "RPC call failed");
            Message::error(e)
        }
    };
    wr.send(status).await?;
    wr.close().await?;
    Ok(())
}
