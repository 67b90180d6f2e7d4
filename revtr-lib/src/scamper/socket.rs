//! Client for one probe-daemon control socket.

use ahash::AHashMap;
use bytes::{Bytes, BytesMut};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::command::Request;
use super::response::Response;
use crate::error::{Result, RevtrError};
use crate::telemetry::Metrics;
use crate::uuencode;
use crate::warts::{self, Record, RecordType};

/// Outcome delivered to the caller of a measurement.
pub type MeasurementResult = Result<Record>;
pub type ResultReceiver = oneshot::Receiver<MeasurementResult>;

const RESULT_FILTER: &[RecordType] = &[RecordType::Ping, RecordType::Traceroute];
/// Number of leading data frames that form the result-stream header.
const HEADER_FRAMES: u8 = 2;
/// Largest data frame the daemon may announce.
const MAX_DATA_LEN: usize = 16 * 1024 * 1024;

/// Parses a socket file name of the form `<ipv4>:<port>`.
pub fn parse_socket_name(path: &Path) -> Result<(Ipv4Addr, u16)> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| RevtrError::InvalidSocketName(path.display().to_string()))?;
    let (ip, port) = name
        .split_once(':')
        .ok_or_else(|| RevtrError::InvalidSocketName(name.to_string()))?;
    let ip = ip
        .parse::<Ipv4Addr>()
        .map_err(|_| RevtrError::InvalidSocketName(name.to_string()))?;
    let port = port
        .parse::<u16>()
        .map_err(|_| RevtrError::InvalidSocketName(name.to_string()))?;
    Ok((ip, port))
}

struct WriterState {
    half: Option<OwnedWriteHalf>,
    /// Next user id to hand out; `None` once the id space is used up.
    next_id: Option<u32>,
}

struct Inner {
    path: PathBuf,
    ip: Ipv4Addr,
    port: u16,
    writer: tokio::sync::Mutex<WriterState>,
    pending: Mutex<AHashMap<u32, oneshot::Sender<MeasurementResult>>>,
    done: CancellationToken,
    stopped: AtomicBool,
    metrics: Option<Arc<Metrics>>,
}

impl Inner {
    fn lock_pending(&self) -> MutexGuard<'_, AHashMap<u32, oneshot::Sender<MeasurementResult>>> {
        match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!(vp = %self.ip, "pending command map lock poisoned");
                poisoned.into_inner()
            }
        }
    }

    fn deliver(&self, user_id: u32, result: MeasurementResult) {
        let waiter = self.lock_pending().remove(&user_id);
        match waiter {
            Some(tx) => {
                // the caller may have given up already
                let _ = tx.send(result);
            }
            None => debug!(vp = %self.ip, user_id, "no pending command for result"),
        }
    }

    fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.done.cancel();
        let drained = std::mem::take(&mut *self.lock_pending());
        if let Ok(mut w) = self.writer.try_lock() {
            w.half = None;
        }
        if let Some(m) = &self.metrics {
            m.record_session_closed();
        }
        debug!(vp = %self.ip, pending = drained.len(), "session stopped");
    }
}

/// Handle to an open control socket. Cheap to clone; all clones share the
/// connection and its pending commands.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("path", &self.inner.path)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Session {
    /// Dials the socket at `path`, whose file name must be `<ip>:<port>`.
    pub async fn connect(path: &Path, metrics: Option<Arc<Metrics>>) -> Result<Self> {
        // validate before dialing
        parse_socket_name(path)?;
        let stream = UnixStream::connect(path).await?;
        Self::from_stream(path, stream, metrics)
    }

    /// Wraps an already connected stream and starts its reader task.
    pub fn from_stream(
        path: &Path,
        stream: UnixStream,
        metrics: Option<Arc<Metrics>>,
    ) -> Result<Self> {
        let (ip, port) = parse_socket_name(path)?;
        let (read, write) = stream.into_split();

        let inner = Arc::new(Inner {
            path: path.to_path_buf(),
            ip,
            port,
            writer: tokio::sync::Mutex::new(WriterState { half: Some(write), next_id: Some(1) }),
            pending: Mutex::new(AHashMap::new()),
            done: CancellationToken::new(),
            stopped: AtomicBool::new(false),
            metrics,
        });
        if let Some(m) = &inner.metrics {
            m.record_session_opened();
        }

        tokio::spawn(read_loop(inner.clone(), read));
        Ok(Self { inner })
    }

    pub fn ip(&self) -> Ipv4Addr {
        self.inner.ip
    }

    pub fn port(&self) -> u16 {
        self.inner.port
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn is_closed(&self) -> bool {
        self.inner.done.is_cancelled()
    }

    /// Resolves once the session has stopped.
    pub async fn done(&self) {
        self.inner.done.cancelled().await
    }

    /// Number of commands waiting for a result.
    pub fn pending(&self) -> usize {
        self.inner.lock_pending().len()
    }

    /// Issues `req` and returns the channel its result arrives on together
    /// with the user id assigned to it.
    ///
    /// Ids are minted, registered and written under one lock so they reach
    /// the daemon in mint order.
    pub async fn do_measurement(&self, req: &Request) -> Result<(ResultReceiver, u32)> {
        let mut w = self.inner.writer.lock().await;
        if self.is_closed() {
            w.half = None;
            return Err(RevtrError::SessionClosed);
        }
        let id = w.next_id.ok_or(RevtrError::UserIdExhausted)?;

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.inner.lock_pending();
            // checked under the map lock so stop() cannot miss this entry
            if self.is_closed() {
                return Err(RevtrError::SessionClosed);
            }
            if pending.contains_key(&id) {
                return Err(RevtrError::DuplicateCommand(id));
            }
            pending.insert(id, tx);
        }
        w.next_id = id.checked_add(1);

        let cmd = req.command(id);
        // stop() cannot take the half while a write holds the lock
        let written = match w.half.as_mut() {
            Some(half) => tokio::select! {
                r = half.write_all(cmd.as_bytes()) => r.map_err(RevtrError::from),
                _ = self.inner.done.cancelled() => Err(RevtrError::SessionClosed),
            },
            None => Err(RevtrError::SessionClosed),
        };
        if let Err(e) = written {
            w.half = None;
            drop(w);
            self.remove_measurement(id);
            if !matches!(e, RevtrError::SessionClosed) {
                warn!(vp = %self.inner.ip, error = %e, "failed to write command");
            }
            self.stop();
            return Err(e);
        }
        drop(w);

        if let Some(m) = &self.inner.metrics {
            m.record_command_written(&self.inner.ip.to_string(), cmd.len());
        }
        trace!(vp = %self.inner.ip, user_id = id, command = cmd.trim_end(), "command issued");
        Ok((rx, id))
    }

    /// Forgets a pending command; its receiver observes a closed channel.
    pub fn remove_measurement(&self, id: u32) {
        self.inner.lock_pending().remove(&id);
    }

    /// Closes the connection and every pending result channel. Idempotent.
    pub fn stop(&self) {
        self.inner.stop();
    }
}

async fn read_loop(inner: Arc<Inner>, read: OwnedReadHalf) {
    let mut reader = BufReader::new(read);
    let mut header_frames = 0u8;
    let mut header_buf = BytesMut::new();
    let mut header = Bytes::new();
    let mut line = String::new();
    let vp = inner.ip.to_string();

    let reason = loop {
        line.clear();
        let read = tokio::select! {
            _ = inner.done.cancelled() => break None,
            r = reader.read_line(&mut line) => r,
        };
        match read {
            Ok(0) => break Some("probe daemon closed the socket".to_string()),
            Err(e) => break Some(format!("read error: {e}")),
            Ok(_) => {}
        }

        let resp = match Response::parse(&line) {
            Ok(resp) => resp,
            Err(e) => break Some(e.to_string()),
        };

        match resp {
            Response::Data(len) if len > MAX_DATA_LEN => {
                break Some(format!("data frame of {len} bytes exceeds {MAX_DATA_LEN}"));
            }
            Response::Data(len) => {
                let mut frame = vec![0u8; len];
                let read = tokio::select! {
                    _ = inner.done.cancelled() => break None,
                    r = reader.read_exact(&mut frame) => r,
                };
                if let Err(e) = read {
                    break Some(format!("short data frame: {e}"));
                }
                if let Some(m) = &inner.metrics {
                    m.record_result_read(&vp, len);
                }

                if header_frames < HEADER_FRAMES {
                    match uuencode::decode(&frame) {
                        Ok(bytes) => header_buf.extend_from_slice(&bytes),
                        Err(e) => break Some(format!("undecodable header frame: {e}")),
                    }
                    header_frames += 1;
                    if header_frames == HEADER_FRAMES {
                        header = header_buf.split().freeze();
                    }
                    continue;
                }

                let inner = inner.clone();
                let header = header.clone();
                tokio::spawn(async move { decode_frame(&inner, &header, &frame) });
            }
            Response::Ok(id) => trace!(vp = %inner.ip, daemon_id = id, "command accepted"),
            Response::Err(msg) => warn!(vp = %inner.ip, response = %msg, "command rejected"),
            Response::More => trace!(vp = %inner.ip, "probe daemon ready"),
        }
    };

    if let Some(reason) = reason {
        warn!(vp = %inner.ip, %reason, "closing session");
    }
    inner.stop();
}

fn decode_frame(inner: &Inner, header: &[u8], frame: &[u8]) {
    let body = match uuencode::decode(frame) {
        Ok(body) => body,
        Err(e) => {
            warn!(vp = %inner.ip, error = %e, "dropping undecodable data frame");
            return;
        }
    };
    let mut data = Vec::with_capacity(header.len() + body.len());
    data.extend_from_slice(header);
    data.extend_from_slice(&body);

    match warts::parse(&data, RESULT_FILTER) {
        Ok(records) => {
            let Some(record) = records.into_iter().next() else {
                warn!(vp = %inner.ip, "data frame carried no measurement");
                return;
            };
            match record.user_id() {
                Some(id) => inner.deliver(id, Ok(record)),
                None => warn!(vp = %inner.ip, "measurement without user id"),
            }
        }
        Err(e) => match e.user_id() {
            Some(id) => inner.deliver(id, Err(e.into())),
            None => warn!(vp = %inner.ip, error = %e, "dropping unparseable result"),
        },
    }
}
