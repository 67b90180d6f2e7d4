//! Length-prefixed JSON messages.
//!
//! A frame is a big-endian `u32` body length followed by the JSON body;
//! [`MessageCodec`] handles both layers.
//! A call starts with [`Message::Call`], continues with the request
//! messages and [`Message::End`]; the server answers with response messages
//! and a final [`Message::Status`].

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio_util::codec::{Decoder, Encoder, FramedRead, FramedWrite, LengthDelimitedCodec};

use crate::error::{Result, RevtrError};
use crate::model::{
    NotifyRecSpoofResponse, Ping, PingMeasurement, Probe, Spoof, Traceroute,
    TracerouteMeasurement, VantagePoint, VpRequest,
};

/// Largest accepted frame body.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    Ping,
    Traceroute,
    AcceptProbes,
    GetVps,
    ReceiveSpoof,
    ReceiveSpoofedProbes,
}

impl Method {
    pub const ALL: [Method; 6] = [
        Method::Ping,
        Method::Traceroute,
        Method::AcceptProbes,
        Method::GetVps,
        Method::ReceiveSpoof,
        Method::ReceiveSpoofedProbes,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Method::Ping => "ping",
            Method::Traceroute => "traceroute",
            Method::AcceptProbes => "accept_probes",
            Method::GetVps => "get_vps",
            Method::ReceiveSpoof => "receive_spoof",
            Method::ReceiveSpoofedProbes => "receive_spoofed_probes",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = RevtrError;

    fn from_str(s: &str) -> Result<Self> {
        Method::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| RevtrError::Protocol(format!("unknown method {s}")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum Message {
    Call(Method),
    Ping(PingMeasurement),
    Traceroute(TracerouteMeasurement),
    Probes(Vec<Probe>),
    Spoofs(Vec<Spoof>),
    VpRequest(VpRequest),
    PingResult(Ping),
    TraceResult(Traceroute),
    Vp(VantagePoint),
    SpoofAck(NotifyRecSpoofResponse),
    Ack,
    End,
    Status { ok: bool, message: String },
}

impl Message {
    pub fn ok() -> Self {
        Message::Status { ok: true, message: String::new() }
    }

    pub fn error(e: &RevtrError) -> Self {
        Message::Status { ok: false, message: e.to_string() }
    }
}

/// Encodes and decodes [`Message`]s in length-delimited frames.
#[derive(Debug)]
pub struct MessageCodec {
    frames: LengthDelimitedCodec,
}

impl MessageCodec {
    pub fn new() -> Self {
        Self { frames: LengthDelimitedCodec::builder().max_frame_length(MAX_FRAME_LEN).new_codec() }
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = RevtrError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        let frame = self
            .frames
            .decode(src)
            .map_err(|e| RevtrError::Protocol(format!("bad frame: {e}")))?;
        match frame {
            Some(body) => Ok(Some(serde_json::from_slice(&body)?)),
            None => Ok(None),
        }
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = RevtrError;

    fn encode(&mut self, msg: Message, dst: &mut BytesMut) -> Result<()> {
        let body = serde_json::to_vec(&msg)?;
        self.frames
            .encode(Bytes::from(body), dst)
            .map_err(|e| RevtrError::Protocol(format!("cannot frame message: {e}")))
    }
}

pub type MessageReader<S> = FramedRead<ReadHalf<S>, MessageCodec>;
pub type MessageWriter<S> = FramedWrite<WriteHalf<S>, MessageCodec>;

/// Splits `stream` into a message stream and a message sink.
pub fn split_framed<S>(stream: S) -> (MessageReader<S>, MessageWriter<S>)
where
    S: AsyncRead + AsyncWrite,
{
    let (rd, wr) = tokio::io::split(stream);
    (FramedRead::new(rd, MessageCodec::new()), FramedWrite::new(wr, MessageCodec::new()))
}
