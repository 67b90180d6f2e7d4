//! Framed request/response-stream RPC over mutually authenticated TLS.

mod client;
mod frame;
mod server;

pub use client::{Call, RpcClient};
pub use frame::{split_framed, Message, MessageCodec, MessageReader, MessageWriter, Method, MAX_FRAME_LEN};
pub use server::{CallContext, RpcHandler, RpcServer};
