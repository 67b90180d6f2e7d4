use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, RevtrError};
use crate::model::Probe;
use crate::rpc::{Message, Method, RpcClient};
use crate::telemetry::Metrics;

/// Destination of captured probe batches.
pub trait ProbeSink: Send + Sync + 'static {
    fn send(&self, probes: Vec<Probe>) -> impl Future<Output = Result<()>> + Send;
}

/// Sends batches to the PL-Controller's `accept_probes` method.
#[derive(Clone)]
pub struct PlcSink {
    client: RpcClient,
}

impl PlcSink {
    pub fn new(client: RpcClient) -> Self {
        Self { client }
    }
}

impl ProbeSink for PlcSink {
    async fn send(&self, probes: Vec<Probe>) -> Result<()> {
        let replies = self
            .client
            .call_collect(Method::AcceptProbes, &[Message::Probes(probes)])
            .await?;
        match replies.first() {
            Some(Message::Ack) => Ok(()),
            other => Err(RevtrError::Protocol(format!("expected ack, got {other:?}"))),
        }
    }
}

/// Collects probes and flushes them on a fixed interval.
pub struct Batcher<S> {
    sink: S,
    interval: Duration,
    metrics: Option<Arc<Metrics>>,
}

impl<S: ProbeSink> Batcher<S> {
    pub fn new(sink: S, interval: Duration, metrics: Option<Arc<Metrics>>) -> Self {
        Self { sink, interval, metrics }
    }

    /// Runs until `shutdown` fires or every sender is gone, then drains the
    /// current batch once.
    pub async fn run(&self, mut rx: mpsc::Receiver<Probe>, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut batch = Vec::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    while let Ok(probe) = rx.try_recv() {
                        batch.push(probe);
                    }
                    break;
                }
                probe = rx.recv() => match probe {
                    Some(probe) => batch.push(probe),
                    None => break,
                },
                _ = ticker.tick() => self.flush(&mut batch).await,
            }
        }
        self.flush(&mut batch).await;
        info!("probe batcher stopped");
    }

    async fn flush(&self, batch: &mut Vec<Probe>) {
        if batch.is_empty() {
            return;
        }
        let probes = std::mem::take(batch);
        let count = probes.len();
        match self.sink.send(probes).await {
            Ok(()) => {
                if let Some(m) = &self.metrics {
                    m.record_probe_batch();
                }
                debug!(count, "sent probe batch");
            }
            Err(e) => warn!(count, error = %e, "dropping probe batch"),
        }
    }
}
