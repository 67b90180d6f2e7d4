use futures_util::{SinkExt, StreamExt};
use rustls_pki_types::ServerName;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use super::frame::{split_framed, Message, MessageReader, MessageWriter, Method};
use crate::error::{Result, RevtrError};
use crate::tls::server_name;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for one RPC server.
#[derive(Clone)]
pub struct RpcClient {
    connector: TlsConnector,
    addr: String,
    server_name: ServerName<'static>,
}

impl RpcClient {
    /// `addr` is `host:port`; the server certificate must be valid for
    /// `name`.
    pub fn new(connector: TlsConnector, addr: impl Into<String>, name: &str) -> Result<Self> {
        Ok(Self { connector, addr: addr.into(), server_name: server_name(name)? })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Sends `requests` and returns a handle yielding the responses.
    pub async fn call(&self, method: Method, requests: &[Message]) -> Result<Call> {
        let tcp = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| RevtrError::Rpc(format!("connect to {} timed out", self.addr)))??;
        let tls = self
            .connector
            .connect(self.server_name.clone(), tcp)
            .await
            .map_err(|e| RevtrError::Tls(format!("handshake with {} failed: {e}", self.addr)))?;
        let (rd, mut wr) = split_framed(tls);

        wr.feed(Message::Call(method)).await?;
        for msg in requests {
            wr.feed(msg.clone()).await?;
        }
        wr.send(Message::End).await?;
        Ok(Call { rd, _wr: wr, finished: false })
    }

    /// Sends `requests` and collects every response.
    pub async fn call_collect(&self, method: Method, requests: &[Message]) -> Result<Vec<Message>> {
        let mut call = self.call(method, requests).await?;
        let mut out = Vec::new();
        while let Some(msg) = call.next().await? {
            out.push(msg);
        }
        Ok(out)
    }
}

/// Responses of an in-flight call. Dropping it disconnects, which cancels
/// the call on the server.
pub struct Call {
    rd: MessageReader<TlsStream<TcpStream>>,
    // kept open so the server does not see a disconnect
    _wr: MessageWriter<TlsStream<TcpStream>>,
    finished: bool,
}

impl Call {
    /// Next response; `None` after a successful final status.
    pub async fn next(&mut self) -> Result<Option<Message>> {
        if self.finished {
            return Ok(None);
        }
        match self.rd.next().await.transpose()? {
            Some(Message::Status { ok, message }) => {
                self.finished = true;
                if ok {
                    Ok(None)
                } else {
                    Err(RevtrError::Rpc(message))
                }
            }
            Some(msg) => Ok(Some(msg)),
            None => {
                self.finished = true;
                Err(RevtrError::Rpc("connection closed before status".to_string()))
            }
        }
    }
}
