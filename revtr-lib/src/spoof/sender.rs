use std::future::Future;
use std::net::Ipv4Addr;
use tokio_rustls::TlsConnector;

use crate::config::{RpcTlsConfig, SpoofConfig};
use crate::error::Result;
use crate::model::Probe;
use crate::rpc::{Message, Method, RpcClient};
use crate::tls::build_connector;

/// Delivers correlated probes to the controller that asked for them.
pub trait ProbeSender: Send + Sync + 'static {
    fn send(
        &self,
        controller: Ipv4Addr,
        probes: Vec<Probe>,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Streams probes to `<controller>:<port>` over mutual TLS.
#[derive(Clone)]
pub struct ControllerSender {
    connector: TlsConnector,
    port: u16,
    server_name: String,
}

impl ControllerSender {
    pub fn new(connector: TlsConnector, port: u16, server_name: impl Into<String>) -> Self {
        Self { connector, port, server_name: server_name.into() }
    }

    pub fn from_config(tls: &RpcTlsConfig, spoof: &SpoofConfig) -> Result<Self> {
        Ok(Self::new(
            build_connector(tls)?,
            spoof.controller_port,
            spoof.controller_server_name.clone(),
        ))
    }
}

impl ProbeSender for ControllerSender {
    async fn send(&self, controller: Ipv4Addr, probes: Vec<Probe>) -> Result<()> {
        let client = RpcClient::new(
            self.connector.clone(),
            format!("{controller}:{}", self.port),
            &self.server_name,
        )?;
        client
            .call_collect(Method::ReceiveSpoofedProbes, &[Message::Probes(probes)])
            .await?;
        Ok(())
    }
}
