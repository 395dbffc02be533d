//! msgpack-RPC session layer.
//!
//! Multiplexes synchronous request/response calls over one duplex byte stream
//! to the editor process.
//!
//! # Architecture
//!
//! - **Transport**: Byte stream to the peer (TCP, unix socket, child stdio, in-memory)
//! - **Codec**: Frame types and streaming msgpack decode
//! - **AsyncSession**: Request ids, pending calls, one frame at a time
//! - **Session**: Blocking calls with reentrant dispatch of peer requests

pub mod async_session;
pub mod codec;
pub mod session;
pub mod transport;

pub use async_session::{AsyncSession, Inbound};
pub use codec::{Frame, MessageCodec};
pub use session::{Host, Session};
pub use transport::Transport;
