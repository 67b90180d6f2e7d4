//! RPC over mutual TLS, end to end.

mod helpers;

use helpers::{create_tls_fixture, TestResult, TlsFixture};
use revtr_lib::model::{PingMeasurement, Probe, Spoof, VantagePoint, VpRequest};
use revtr_lib::rpc::{CallContext, Message, Method, RpcClient, RpcHandler, RpcServer};
use revtr_lib::spoof::{ControllerSender, Correlator, CorrelatorConfig, ProbeSender};
use revtr_lib::store::MemoryVpStore;
use revtr_lib::tls::{build_acceptor, build_connector};
use revtr_lib::vp::{PlcSink, ProbeSink};
use revtr_lib::{PlController, Registry, RevtrError};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

const VP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
const DST: Ipv4Addr = Ipv4Addr::new(8, 8, 8, 8);

async fn serve<H: RpcHandler>(tls: &TlsFixture, handler: H, shutdown: &CancellationToken) -> TestResult<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let server = RpcServer::new(Arc::new(handler), build_acceptor(&tls.server_config())?, None);
    let shutdown = shutdown.clone();
    tokio::spawn(async move { server.serve(listener, shutdown).await });
    Ok(addr)
}

fn client(tls: &TlsFixture, addr: SocketAddr) -> TestResult<RpcClient> {
    Ok(RpcClient::new(build_connector(&tls.client_config())?, addr.to_string(), "plcontroller")?)
}

struct NullSender;

impl ProbeSender for NullSender {
    async fn send(&self, _controller: Ipv4Addr, _probes: Vec<Probe>) -> revtr_lib::Result<()> {
        Ok(())
    }
}

fn plcontroller() -> PlController {
    let store = MemoryVpStore::with_vps([
        VantagePoint { controller: Some(Ipv4Addr::new(192, 168, 1, 1)), ..VantagePoint::new(VP) },
        VantagePoint::new(Ipv4Addr::new(10, 0, 0, 2)),
    ]);
    let (correlator, _task) = Correlator::spawn(NullSender, CorrelatorConfig::default(), None);
    PlController::new(Arc::new(Registry::new()), Arc::new(store), correlator, Duration::from_secs(1), None)
}

fn probe(id: u32) -> Probe {
    Probe {
        id,
        spoofer_ip: VP,
        src: DST,
        dst: Ipv4Addr::new(10, 0, 0, 2),
        seq: 0xF2F3,
        record_route: None,
        timestamp: None,
        sender_ip: None,
    }
}

#[tokio::test]
async fn test_get_vps_streams_store_rows() -> TestResult {
    let tls = create_tls_fixture()?;
    let shutdown = CancellationToken::new();
    let addr = serve(&tls, plcontroller(), &shutdown).await?;
    let client = client(&tls, addr)?;

    let all = client.call_collect(Method::GetVps, &[]).await?;
    assert_eq!(all.len(), 2);

    let active = client
        .call_collect(Method::GetVps, &[Message::VpRequest(VpRequest { active_only: true })])
        .await?;
    assert!(matches!(active.as_slice(), [Message::Vp(vp)] if vp.ip == VP));

    shutdown.cancel();
    Ok(())
}

#[tokio::test]
async fn test_ping_failure_comes_back_as_result() -> TestResult {
    let tls = create_tls_fixture()?;
    let shutdown = CancellationToken::new();
    let addr = serve(&tls, plcontroller(), &shutdown).await?;
    let client = client(&tls, addr)?;

    let req = PingMeasurement { src: VP, dst: DST, ..PingMeasurement::default() };
    let results = client.call_collect(Method::Ping, &[Message::Ping(req)]).await?;
    let [Message::PingResult(ping)] = results.as_slice() else {
        return Err(format!("unexpected responses {results:?}").into());
    };
    assert!(ping.error.contains("no socket"));
    assert_eq!(ping.dst, DST);

    let empty = client.call_collect(Method::Traceroute, &[]).await;
    assert!(matches!(empty, Err(RevtrError::Rpc(msg)) if msg.contains("empty argument list")));

    shutdown.cancel();
    Ok(())
}

#[tokio::test]
async fn test_spoof_registration_and_probe_delivery() -> TestResult {
    let tls = create_tls_fixture()?;
    let shutdown = CancellationToken::new();
    let addr = serve(&tls, plcontroller(), &shutdown).await?;
    let client = client(&tls, addr)?;

    let spoof = Spoof { id: 3, ip: Ipv4Addr::new(192, 168, 1, 9), sip: VP, dst: DST };
    let acks = client
        .call_collect(Method::ReceiveSpoof, &[Message::Spoofs(vec![spoof, spoof])])
        .await?;
    let [Message::SpoofAck(first), Message::SpoofAck(second)] = acks.as_slice() else {
        return Err(format!("unexpected responses {acks:?}").into());
    };
    assert!(first.error.is_empty());
    assert!(second.error.contains("already in use"));

    // the agent's batch path
    PlcSink::new(client.clone()).send(vec![probe(3)]).await?;

    let refused = client.call_collect(Method::ReceiveSpoofedProbes, &[Message::Probes(vec![])]).await;
    assert!(matches!(refused, Err(RevtrError::Rpc(_))));

    shutdown.cancel();
    Ok(())
}

/// Collects relayed probes, as the receiving controller would.
struct ProbeCollector {
    tx: mpsc::UnboundedSender<Vec<Probe>>,
}

impl RpcHandler for ProbeCollector {
    async fn call(
        &self,
        method: Method,
        requests: Vec<Message>,
        _ctx: CallContext,
        _out: mpsc::Sender<Message>,
    ) -> revtr_lib::Result<()> {
        if method != Method::ReceiveSpoofedProbes {
            return Err(RevtrError::Protocol(format!("unexpected {method}")));
        }
        for msg in requests {
            if let Message::Probes(probes) = msg {
                let _ = self.tx.send(probes);
            }
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_controller_sender_relays_probes() -> TestResult {
    let tls = create_tls_fixture()?;
    let shutdown = CancellationToken::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let addr = serve(&tls, ProbeCollector { tx }, &shutdown).await?;

    let sender = ControllerSender::new(build_connector(&tls.client_config())?, addr.port(), "controller");
    sender.send(Ipv4Addr::LOCALHOST, vec![probe(1), probe(2)]).await?;

    let got = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await?.ok_or("no probes")?;
    assert_eq!(got.iter().map(|p| p.id).collect::<Vec<_>>(), vec![1, 2]);

    shutdown.cancel();
    Ok(())
}

/// Blocks until the call is cancelled, then reports it.
struct WaitForCancel {
    cancelled: std::sync::Mutex<Option<oneshot::Sender<()>>>,
}

impl RpcHandler for WaitForCancel {
    async fn call(
        &self,
        _method: Method,
        _requests: Vec<Message>,
        ctx: CallContext,
        _out: mpsc::Sender<Message>,
    ) -> revtr_lib::Result<()> {
        ctx.cancel.cancelled().await;
        let tx = self.cancelled.lock().ok().and_then(|mut g| g.take());
        if let Some(tx) = tx {
            let _ = tx.send(());
        }
        Err(RevtrError::Cancelled)
    }
}

#[tokio::test]
async fn test_client_disconnect_cancels_call() -> TestResult {
    let tls = create_tls_fixture()?;
    let shutdown = CancellationToken::new();
    let (tx, rx) = oneshot::channel();
    let handler = WaitForCancel { cancelled: std::sync::Mutex::new(Some(tx)) };
    let addr = serve(&tls, handler, &shutdown).await?;
    let client = client(&tls, addr)?;

    let call = client.call(Method::Ping, &[]).await?;
    tokio::time::sleep(Duration::from_millis(100)).await;
    drop(call);

    tokio::time::timeout(Duration::from_secs(5), rx).await??;
    shutdown.cancel();
    Ok(())
}

#[tokio::test]
async fn test_untrusted_client_is_rejected() -> TestResult {
    let server_tls = create_tls_fixture()?;
    let other_tls = create_tls_fixture()?;
    let shutdown = CancellationToken::new();
    let addr = serve(&server_tls, plcontroller(), &shutdown).await?;

    // signed by a different CA, and trusting a different CA
    let stranger = client(&other_tls, addr)?;
    assert!(stranger.call_collect(Method::GetVps, &[]).await.is_err());

    shutdown.cancel();
    Ok(())
}
