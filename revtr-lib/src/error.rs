use std::net::Ipv4Addr;

use thiserror::Error;

use crate::warts::WartsError;

/// Errors that can occur in the control plane
#[derive(Error, Debug)]
pub enum RevtrError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No private key found in key file")]
    NoPrivateKey,

    #[error("session closed")]
    SessionClosed,

    #[error("no socket registered for {0}")]
    SocketNotFound(Ipv4Addr),

    #[error("bad response from probe daemon: {0}")]
    BadResponse(String),

    #[error("bad data response from probe daemon: {0}")]
    BadDataResponse(String),

    #[error("command with user id {0} already pending")]
    DuplicateCommand(u32),

    #[error("user id space exhausted for session")]
    UserIdExhausted,

    #[error("measurement timed out")]
    Timeout,

    #[error("measurement cancelled")]
    Cancelled,

    #[error("watcher closed")]
    WatcherClosed,

    #[error("watch error: {0}")]
    Watch(String),

    #[error("remote command failed: {0}")]
    RemoteCommandFailed(String),

    #[error("unknown service status: {0}")]
    UnknownService(String),

    #[error("spoof id {0} already in use")]
    IdInUse(u32),

    #[error("no spoof registered for id {0}")]
    SpoofNotFound(u32),

    #[error("spoof correlator stopped")]
    CorrelatorStopped,

    #[error("empty argument list")]
    EmptyArgList,

    #[error("warts error: {0}")]
    Warts(#[from] WartsError),

    #[error("uudecode error: {0}")]
    UuDecode(String),

    #[error("invalid socket name: {0}")]
    InvalidSocketName(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("HTTP error: {0}")]
    Http(#[from] http::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("icmp error: {0}")]
    Icmp(String),
}

pub type Result<T> = std::result::Result<T, RevtrError>;
