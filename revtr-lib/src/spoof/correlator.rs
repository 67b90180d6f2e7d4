use ahash::AHashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::sender::ProbeSender;
use crate::config::SpoofConfig;
use crate::error::{Result, RevtrError};
use crate::model::{Probe, Spoof};
use crate::telemetry::metrics::values;
use crate::telemetry::Metrics;

const COMMAND_BUFFER: usize = 1024;

#[derive(Debug, Clone, Copy)]
pub struct CorrelatorConfig {
    /// How often batches are forwarded.
    pub flush_interval: Duration,
    /// How long a registration waits for its probe.
    pub ttl: Duration,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self { flush_interval: Duration::from_secs(2), ttl: Duration::from_secs(60) }
    }
}

impl From<&SpoofConfig> for CorrelatorConfig {
    fn from(cfg: &SpoofConfig) -> Self {
        Self {
            flush_interval: Duration::from_millis(cfg.flush_interval_ms),
            ttl: Duration::from_secs(cfg.registration_ttl_secs),
        }
    }
}

enum Command {
    Register(Spoof, oneshot::Sender<Result<()>>),
    Receive(Probe, oneshot::Sender<Result<()>>),
    Quit(oneshot::Sender<()>),
}

/// Handle to the task that matches spoofed replies to registrations and
/// forwards them in per-controller batches.
#[derive(Clone)]
pub struct Correlator {
    tx: mpsc::Sender<Command>,
}

impl Correlator {
    pub fn spawn<S: ProbeSender>(
        sender: S,
        cfg: CorrelatorConfig,
        metrics: Option<Arc<Metrics>>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let state = State {
            sender: Arc::new(sender),
            ttl: cfg.ttl,
            registrations: AHashMap::new(),
            batches: AHashMap::new(),
            metrics,
        };
        let handle = tokio::spawn(run(state, rx, cfg.flush_interval));
        (Self { tx }, handle)
    }

    async fn request(&self, make: impl FnOnce(oneshot::Sender<Result<()>>) -> Command) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(make(reply)).await.map_err(|_| RevtrError::CorrelatorStopped)?;
        rx.await.map_err(|_| RevtrError::CorrelatorStopped)?
    }

    /// Expects a spoofed reply with `spoof.id`. Fails with `IdInUse` while
    /// an earlier registration of the id is live.
    pub async fn register(&self, spoof: Spoof) -> Result<()> {
        self.request(|reply| Command::Register(spoof, reply)).await
    }

    /// Matches a captured reply. Fails with `SpoofNotFound` when nothing
    /// was registered for its id.
    pub async fn receive(&self, probe: Probe) -> Result<()> {
        self.request(|reply| Command::Receive(probe, reply)).await
    }

    /// Stops the task after one last flush.
    pub async fn quit(&self) {
        let (done, rx) = oneshot::channel();
        if self.tx.send(Command::Quit(done)).await.is_ok() {
            let _ = rx.await;
        }
    }
}

struct State<S> {
    sender: Arc<S>,
    ttl: Duration,
    registrations: AHashMap<u32, (Spoof, Instant)>,
    batches: AHashMap<Ipv4Addr, Vec<Probe>>,
    metrics: Option<Arc<Metrics>>,
}

impl<S: ProbeSender> State<S> {
    fn register(&mut self, spoof: Spoof) -> Result<()> {
        let now = Instant::now();
        if let Some((_, deadline)) = self.registrations.get(&spoof.id) {
            if *deadline > now {
                return Err(RevtrError::IdInUse(spoof.id));
            }
        }
        self.registrations.insert(spoof.id, (spoof, now + self.ttl));
        if let Some(m) = &self.metrics {
            m.record_spoof_registered();
        }
        Ok(())
    }

    fn receive(&mut self, mut probe: Probe) -> Result<()> {
        let hit = self
            .registrations
            .remove(&probe.id)
            .filter(|(_, deadline)| *deadline > Instant::now());
        let Some((spoof, _)) = hit else {
            if let Some(m) = &self.metrics {
                m.record_spoofed_probe(values::RESULT_MISS);
            }
            return Err(RevtrError::SpoofNotFound(probe.id));
        };
        if let Some(m) = &self.metrics {
            m.record_spoofed_probe(values::RESULT_HIT);
        }
        probe.sender_ip = Some(spoof.ip);
        self.batches.entry(spoof.ip).or_default().push(probe);
        Ok(())
    }

    fn expire(&mut self) {
        let now = Instant::now();
        let before = self.registrations.len();
        self.registrations.retain(|_, (_, deadline)| *deadline > now);
        let expired = before - self.registrations.len();
        if expired > 0 {
            debug!(expired, "dropped expired spoof registrations");
        }
    }

    /// Sends every non-empty batch, one task per controller.
    fn flush(&mut self) -> JoinSet<()> {
        let mut sends = JoinSet::new();
        for (controller, probes) in self.batches.drain() {
            if probes.is_empty() {
                continue;
            }
            let sender = self.sender.clone();
            let metrics = self.metrics.clone();
            sends.spawn(async move {
                let count = probes.len();
                let res = sender.send(controller, probes).await;
                if let Some(m) = &metrics {
                    m.record_spoof_batch(&controller.to_string(), res.is_ok());
                }
                match res {
                    Ok(()) => debug!(%controller, count, "forwarded spoofed probes"),
                    Err(e) => warn!(%controller, count, error = %e, "dropping spoofed probe batch"),
                }
            });
        }
        sends
    }
}

async fn run<S: ProbeSender>(mut state: State<S>, mut rx: mpsc::Receiver<Command>, every: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            cmd = rx.recv() => match cmd {
                Some(Command::Register(spoof, reply)) => {
                    let _ = reply.send(state.register(spoof));
                }
                Some(Command::Receive(probe, reply)) => {
                    let _ = reply.send(state.receive(probe));
                }
                Some(Command::Quit(done)) => {
                    state.flush().join_all().await;
                    let _ = done.send(());
                    break;
                }
                None => {
                    state.flush().join_all().await;
                    break;
                }
            },
            _ = ticker.tick() => {
                state.expire();
                // sends finish on their own
                state.flush().detach_all();
            }
        }
    }
    info!("spoof correlator stopped");
}
