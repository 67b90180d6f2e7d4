//! The PL-Controller: dispatches measurements to vantage point sessions and
//! relays spoofed probes.

mod runtime;

pub use runtime::run;

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Result, RevtrError};
use crate::model::{
    NotifyRecSpoofResponse, Ping, PingMeasurement, Probe, Spoof, Time, Traceroute,
    TracerouteMeasurement, VantagePoint, VpRequest,
};
use crate::rpc::{CallContext, Message, Method, RpcHandler};
use crate::scamper::{Registry, Request};
use crate::spoof::Correlator;
use crate::store::VpStore;
use crate::telemetry::metrics::values;
use crate::telemetry::Metrics;
use crate::warts::Record;

struct Inner {
    registry: Arc<Registry>,
    store: Arc<dyn VpStore>,
    correlator: Correlator,
    default_timeout: Duration,
    metrics: Option<Arc<Metrics>>,
}

/// Measurement dispatcher. Cheap to clone.
#[derive(Clone)]
pub struct PlController {
    inner: Arc<Inner>,
}

impl PlController {
    pub fn new(
        registry: Arc<Registry>,
        store: Arc<dyn VpStore>,
        correlator: Correlator,
        default_timeout: Duration,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        Self { inner: Arc::new(Inner { registry, store, correlator, default_timeout, metrics }) }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.inner.registry
    }

    /// Issues `req` on the session for its source and waits for the result,
    /// the deadline or `cancel`, whichever comes first.
    async fn measure(&self, req: &Request, timeout_secs: u64, cancel: &CancellationToken) -> Result<Record> {
        let timeout = match timeout_secs {
            0 => self.inner.default_timeout,
            secs => Duration::from_secs(secs),
        };
        let session = self.inner.registry.get(req.src())?;
        let (rx, id) = session.do_measurement(req).await?;
        let started = Instant::now();

        let res = tokio::select! {
            res = rx => res.unwrap_or(Err(RevtrError::SessionClosed)),
            _ = tokio::time::sleep(timeout) => {
                session.remove_measurement(id);
                Err(RevtrError::Timeout)
            }
            _ = cancel.cancelled() => {
                session.remove_measurement(id);
                Err(RevtrError::Cancelled)
            }
        };

        if let Some(m) = &self.inner.metrics {
            match &res {
                Ok(_) => m.record_measurement(req.kind(), started.elapsed().as_secs_f64()),
                Err(e) => m.record_measurement_error(req.kind(), error_type(e)),
            }
        }
        res
    }

    /// Runs one ping. Failures come back as a result with `error` set.
    pub async fn ping(&self, req: PingMeasurement, peer: Option<Ipv4Addr>, cancel: &CancellationToken) -> Ping {
        let start = Time::now();
        let (src, dst, saddr) = (req.src, req.dst, req.saddr);
        match self.try_ping(req, peer, cancel).await {
            Ok(mut ping) => {
                if ping.spoofed_from.is_none() {
                    ping.spoofed_from = saddr;
                }
                ping
            }
            Err(e) => {
                debug!(%src, %dst, error = %e, "ping failed");
                Ping::failed(src, dst, start, e.to_string())
            }
        }
    }

    async fn try_ping(&self, req: PingMeasurement, peer: Option<Ipv4Addr>, cancel: &CancellationToken) -> Result<Ping> {
        if req.spoof && req.spoof_id != 0 {
            let controller = req.controller.or(peer).ok_or_else(|| {
                RevtrError::Rpc("no controller address for spoofed ping".to_string())
            })?;
            self.inner
                .correlator
                .register(Spoof { id: req.spoof_id, ip: controller, sip: req.src, dst: req.dst })
                .await?;
        } else if req.spoof {
            debug!(dst = %req.dst, "spoofed ping without an id; not correlating replies");
        }
        let timeout = req.timeout;
        match self.measure(&Request::Ping(req), timeout, cancel).await? {
            Record::Ping(p) => Ok(Ping::from(&p)),
            other => Err(RevtrError::BadDataResponse(format!(
                "expected ping, got {:?}",
                other.record_type()
            ))),
        }
    }

    /// Runs one traceroute. Failures come back as a result with `error` set.
    pub async fn traceroute(&self, req: TracerouteMeasurement, cancel: &CancellationToken) -> Traceroute {
        let start = Time::now();
        let (src, dst, timeout) = (req.src, req.dst, req.timeout);
        let res = match self.measure(&Request::Traceroute(req), timeout, cancel).await {
            Ok(Record::Traceroute(t)) => Ok(Traceroute::from(&t)),
            Ok(other) => Err(RevtrError::BadDataResponse(format!(
                "expected traceroute, got {:?}",
                other.record_type()
            ))),
            Err(e) => Err(e),
        };
        res.unwrap_or_else(|e| {
            debug!(%src, %dst, error = %e, "traceroute failed");
            Traceroute::failed(src, dst, start, e.to_string())
        })
    }

    /// Fans a batch of pings out and streams results in completion order.
    pub async fn ping_batch(
        &self,
        reqs: Vec<PingMeasurement>,
        peer: Option<Ipv4Addr>,
        cancel: CancellationToken,
        out: mpsc::Sender<Message>,
    ) -> Result<()> {
        if reqs.is_empty() {
            return Err(RevtrError::EmptyArgList);
        }
        let mut tasks = JoinSet::new();
        for req in reqs {
            let this = self.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move { this.ping(req, peer, &cancel).await });
        }
        stream_results(tasks, out, Message::PingResult).await
    }

    pub async fn traceroute_batch(
        &self,
        reqs: Vec<TracerouteMeasurement>,
        cancel: CancellationToken,
        out: mpsc::Sender<Message>,
    ) -> Result<()> {
        if reqs.is_empty() {
            return Err(RevtrError::EmptyArgList);
        }
        let mut tasks = JoinSet::new();
        for req in reqs {
            let this = self.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move { this.traceroute(req, &cancel).await });
        }
        stream_results(tasks, out, Message::TraceResult).await
    }

    /// Hands captured spoofed replies to the correlator. Unmatched probes
    /// are logged and dropped.
    pub async fn accept_probes(&self, probes: Vec<Probe>) -> Result<()> {
        if probes.is_empty() {
            return Err(RevtrError::EmptyArgList);
        }
        for probe in probes {
            let id = probe.id;
            match self.inner.correlator.receive(probe).await {
                Ok(()) => {}
                Err(RevtrError::SpoofNotFound(_)) => debug!(id, "no registration for spoofed probe"),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Registers expected spoofed replies, reporting each outcome.
    pub async fn receive_spoof(&self, spoofs: Vec<Spoof>) -> Result<Vec<NotifyRecSpoofResponse>> {
        if spoofs.is_empty() {
            return Err(RevtrError::EmptyArgList);
        }
        let mut acks = Vec::with_capacity(spoofs.len());
        for spoof in spoofs {
            let error = match self.inner.correlator.register(spoof).await {
                Ok(()) => String::new(),
                Err(e) => e.to_string(),
            };
            acks.push(NotifyRecSpoofResponse { id: spoof.id, error });
        }
        Ok(acks)
    }

    pub fn get_vps(&self, req: &VpRequest) -> Result<Vec<VantagePoint>> {
        if req.active_only {
            self.inner.store.get_active_vps()
        } else {
            self.inner.store.get_vps()
        }
    }
}

async fn stream_results<T: Send + 'static>(
    mut tasks: JoinSet<T>,
    out: mpsc::Sender<Message>,
    wrap: fn(T) -> Message,
) -> Result<()> {
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(result) => {
                if out.send(wrap(result)).await.is_err() {
                    tasks.abort_all();
                    return Err(RevtrError::Cancelled);
                }
            }
            Err(e) => warn!(error = %e, "measurement task failed"),
        }
    }
    Ok(())
}

fn error_type(e: &RevtrError) -> &'static str {
    match e {
        RevtrError::Timeout => values::ERROR_TIMEOUT,
        RevtrError::Cancelled => values::ERROR_CANCELLED,
        RevtrError::SocketNotFound(_) => values::ERROR_NO_SOCKET,
        RevtrError::Warts(_) | RevtrError::UuDecode(_) => values::ERROR_DECODE,
        _ => values::ERROR_OTHER,
    }
}

fn peer_v4(ctx: &CallContext) -> Option<Ipv4Addr> {
    match ctx.peer.ip() {
        IpAddr::V4(ip) => Some(ip),
        IpAddr::V6(ip) => ip.to_ipv4_mapped(),
    }
}

fn unexpected(method: Method, msg: &Message) -> RevtrError {
    RevtrError::Protocol(format!("unexpected message in {method} call: {msg:?}"))
}

impl RpcHandler for PlController {
    async fn call(
        &self,
        method: Method,
        requests: Vec<Message>,
        ctx: CallContext,
        out: mpsc::Sender<Message>,
    ) -> Result<()> {
        match method {
            Method::Ping => {
                let reqs = requests
                    .into_iter()
                    .map(|m| match m {
                        Message::Ping(p) => Ok(p),
                        other => Err(unexpected(method, &other)),
                    })
                    .collect::<Result<Vec<_>>>()?;
                self.ping_batch(reqs, peer_v4(&ctx), ctx.cancel, out).await
            }
            Method::Traceroute => {
                let reqs = requests
                    .into_iter()
                    .map(|m| match m {
                        Message::Traceroute(t) => Ok(t),
                        other => Err(unexpected(method, &other)),
                    })
                    .collect::<Result<Vec<_>>>()?;
                self.traceroute_batch(reqs, ctx.cancel, out).await
            }
            Method::AcceptProbes => {
                let mut probes = Vec::new();
                for m in requests {
                    match m {
                        Message::Probes(batch) => probes.extend(batch),
                        other => return Err(unexpected(method, &other)),
                    }
                }
                self.accept_probes(probes).await?;
                out.send(Message::Ack).await.map_err(|_| RevtrError::Cancelled)
            }
            Method::GetVps => {
                let req = match requests.into_iter().next() {
                    Some(Message::VpRequest(req)) => req,
                    Some(other) => return Err(unexpected(method, &other)),
                    None => VpRequest::default(),
                };
                for vp in self.get_vps(&req)? {
                    out.send(Message::Vp(vp)).await.map_err(|_| RevtrError::Cancelled)?;
                }
                Ok(())
            }
            Method::ReceiveSpoof => {
                let mut spoofs = Vec::new();
                for m in requests {
                    match m {
                        Message::Spoofs(batch) => spoofs.extend(batch),
                        other => return Err(unexpected(method, &other)),
                    }
                }
                for ack in self.receive_spoof(spoofs).await? {
                    out.send(Message::SpoofAck(ack)).await.map_err(|_| RevtrError::Cancelled)?;
                }
                Ok(())
            }
            Method::ReceiveSpoofedProbes => Err(RevtrError::Protocol(format!(
                "{method} is not served by the PL-Controller"
            ))),
        }
    }
}
