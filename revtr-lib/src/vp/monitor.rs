use socket2::{Domain, Protocol, Socket, Type};
use std::io::Read;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::unix::AsyncFd;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::icmp::parse_probe;
use crate::model::Probe;
use crate::telemetry::Metrics;

const RECV_BUFFER: usize = 65_535;
const BACKOFF_START: Duration = Duration::from_millis(100);

/// Exponential reconnect delay; the first retry is immediate.
#[derive(Debug)]
pub struct Backoff {
    next: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(max: Duration) -> Self {
        Self { next: Duration::ZERO, max }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = if delay.is_zero() { BACKOFF_START } else { (delay * 2).min(self.max) };
        delay
    }

    pub fn reset(&mut self) {
        self.next = Duration::ZERO;
    }
}

fn open_socket(local: Ipv4Addr) -> std::io::Result<AsyncFd<Socket>> {
    let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4))?;
    socket.set_nonblocking(true)?;
    socket.bind(&SocketAddr::from((local, 0)).into())?;
    AsyncFd::new(socket)
}

async fn recv(fd: &AsyncFd<Socket>, buf: &mut [u8]) -> std::io::Result<usize> {
    loop {
        let mut guard = fd.readable().await?;
        match guard.try_io(|inner| {
            let mut socket: &Socket = inner.get_ref();
            socket.read(buf)
        }) {
            Ok(res) => return res,
            Err(_would_block) => continue,
        }
    }
}

/// Captures echo replies to spoofed probes on a raw ICMP socket.
pub struct ProbeMonitor {
    local: Ipv4Addr,
    backoff_max: Duration,
    captured: Arc<AtomicU64>,
    metrics: Option<Arc<Metrics>>,
}

impl ProbeMonitor {
    pub fn new(local: Ipv4Addr, backoff_max: Duration, metrics: Option<Arc<Metrics>>) -> Self {
        Self { local, backoff_max, captured: Arc::new(AtomicU64::new(0)), metrics }
    }

    /// Number of spoofed replies captured so far.
    pub fn captured(&self) -> u64 {
        self.captured.load(Ordering::Relaxed)
    }

    /// Reads until `shutdown` fires or `out` is closed, reopening the socket
    /// after errors.
    pub async fn run(&self, out: mpsc::Sender<Probe>, shutdown: CancellationToken) {
        let mut backoff = Backoff::new(self.backoff_max);
        let mut buf = vec![0u8; RECV_BUFFER];

        'reconnect: loop {
            let delay = backoff.next_delay();
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }

            let fd = match open_socket(self.local) {
                Ok(fd) => fd,
                Err(e) => {
                    warn!(local = %self.local, error = %e, "failed to open raw ICMP socket");
                    continue;
                }
            };
            info!(local = %self.local, "listening for spoofed replies");

            loop {
                let read = tokio::select! {
                    _ = shutdown.cancelled() => break 'reconnect,
                    read = recv(&fd, &mut buf) => read,
                };
                let n = match read {
                    Ok(n) => n,
                    Err(e) => {
                        warn!(error = %e, "raw socket read failed, reopening");
                        continue 'reconnect;
                    }
                };
                backoff.reset();

                let probe = match parse_probe(&buf[..n]) {
                    Ok(Some(probe)) => probe,
                    Ok(None) => continue,
                    Err(e) => {
                        trace!(error = %e, "ignoring malformed datagram");
                        continue;
                    }
                };
                self.captured.fetch_add(1, Ordering::Relaxed);
                if let Some(m) = &self.metrics {
                    m.record_probe_captured();
                }
                debug!(id = probe.id, spoofer = %probe.spoofer_ip, src = %probe.src, "captured spoofed reply");
                if out.send(probe).await.is_err() {
                    break 'reconnect;
                }
            }
        }
        info!(captured = self.captured(), "probe monitor stopped");
    }
}
