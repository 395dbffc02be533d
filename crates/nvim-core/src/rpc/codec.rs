//! msgpack-RPC frame types and streaming codec.
//!
//! Frames are msgpack arrays:
//!
//! ```text
//! Request:      [0, id, method, params]
//! Response:     [1, id, error | nil, result]
//! Notification: [2, method, params]
//! ```
//!
//! The codec buffers bytes as they arrive and yields whole frames; a partial
//! frame is "need more data", not an error. Item headers are walked as bytes
//! arrive, so a large frame is scanned once and materialized once.

use crate::config::RpcConfig;
use crate::{NvimError, Result};
use bytes::BytesMut;
use rmp::Marker;
use rmpv::Value;

/// One msgpack-RPC message.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Request {
        id: u64,
        method: String,
        params: Vec<Value>,
    },
    /// `Err` carries the peer's error payload, `Ok` the result.
    Response {
        id: u64,
        result: std::result::Result<Value, Value>,
    },
    Notification {
        method: String,
        params: Vec<Value>,
    },
}

impl Frame {
    /// Convert into the wire array form.
    pub fn into_value(self) -> Value {
        match self {
            Frame::Request { id, method, params } => Value::Array(vec![
                Value::from(RpcConfig::REQUEST),
                Value::from(id),
                Value::from(method),
                Value::Array(params),
            ]),
            Frame::Response { id, result } => {
                let (error, result) = match result {
                    Ok(value) => (Value::Nil, value),
                    Err(error) => (error, Value::Nil),
                };
                Value::Array(vec![
                    Value::from(RpcConfig::RESPONSE),
                    Value::from(id),
                    error,
                    result,
                ])
            }
            Frame::Notification { method, params } => Value::Array(vec![
                Value::from(RpcConfig::NOTIFICATION),
                Value::from(method),
                Value::Array(params),
            ]),
        }
    }

    /// Parse the wire array form.
    pub fn from_value(value: Value) -> Result<Self> {
        let items = match value {
            Value::Array(items) => items,
            other => return Err(codec_error(format!("frame is not an array: {}", other))),
        };

        let tag = items
            .first()
            .and_then(Value::as_u64)
            .ok_or_else(|| codec_error("frame is missing its type tag"))?;

        match tag {
            RpcConfig::REQUEST => {
                let [_, id, method, params] = fixed::<4>(items, "request")?;
                Ok(Frame::Request {
                    id: message_id(&id)?,
                    method: method_name(method)?,
                    params: param_list(params)?,
                })
            }
            RpcConfig::RESPONSE => {
                let [_, id, error, result] = fixed::<4>(items, "response")?;
                let result = if error.is_nil() { Ok(result) } else { Err(error) };
                Ok(Frame::Response {
                    id: message_id(&id)?,
                    result,
                })
            }
            RpcConfig::NOTIFICATION => {
                let [_, method, params] = fixed::<3>(items, "notification")?;
                Ok(Frame::Notification {
                    method: method_name(method)?,
                    params: param_list(params)?,
                })
            }
            other => Err(codec_error(format!("unknown frame type tag {}", other))),
        }
    }

    /// Short label for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Request { .. } => "request",
            Frame::Response { .. } => "response",
            Frame::Notification { .. } => "notification",
        }
    }
}

fn codec_error(message: impl Into<String>) -> NvimError {
    NvimError::Codec {
        message: message.into(),
    }
}

fn fixed<const N: usize>(items: Vec<Value>, kind: &str) -> Result<[Value; N]> {
    let len = items.len();
    items
        .try_into()
        .map_err(|_| codec_error(format!("{} frame has {} elements, expected {}", kind, len, N)))
}

fn message_id(value: &Value) -> Result<u64> {
    value
        .as_u64()
        .ok_or_else(|| codec_error(format!("message id is not an unsigned integer: {}", value)))
}

fn method_name(value: Value) -> Result<String> {
    match value {
        Value::String(s) => s
            .into_str()
            .ok_or_else(|| codec_error("method name is not valid UTF-8")),
        // Some peers send method names as raw binary.
        Value::Binary(bytes) => {
            String::from_utf8(bytes).map_err(|_| codec_error("method name is not valid UTF-8"))
        }
        other => Err(codec_error(format!("method name is not a string: {}", other))),
    }
}

fn param_list(value: Value) -> Result<Vec<Value>> {
    match value {
        Value::Array(params) => Ok(params),
        other => Err(codec_error(format!("params is not an array: {}", other))),
    }
}

/// Progress through the frame at the head of the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FrameScan {
    /// Bytes of complete items already walked.
    scanned: usize,
    /// Items still to walk before the frame is complete.
    remaining: u64,
}

impl FrameScan {
    fn new() -> Self {
        Self {
            scanned: 0,
            remaining: 1,
        }
    }
}

/// Streaming msgpack-RPC codec.
#[derive(Debug)]
pub struct MessageCodec {
    buffer: BytesMut,
    scan: FrameScan,
    max_frame_size: usize,
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new(RpcConfig::MAX_FRAME_SIZE)
    }
}

impl MessageCodec {
    /// Create a codec that refuses to buffer frames larger than `max_frame_size`.
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(RpcConfig::READ_CHUNK_SIZE),
            scan: FrameScan::new(),
            max_frame_size,
        }
    }

    /// Encode a frame to bytes.
    pub fn encode(frame: &Frame) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        rmpv::encode::write_value(&mut bytes, &frame.clone().into_value())?;
        Ok(bytes)
    }

    /// Append raw bytes received from the transport.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Mutable access to the receive buffer, for reading straight into it.
    pub fn read_buffer(&mut self) -> &mut BytesMut {
        &mut self.buffer
    }

    /// Number of bytes buffered but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Decode the next complete frame, or `Ok(None)` if more bytes are needed.
    ///
    /// Walking resumes where the previous call stopped.
    pub fn decode(&mut self) -> Result<Option<Frame>> {
        while self.scan.remaining > 0 {
            let Some((size, children)) = item_extent(&self.buffer[self.scan.scanned..])? else {
                return Ok(None);
            };
            let end = self.scan.scanned.saturating_add(size);
            if end > self.max_frame_size {
                return Err(codec_error(format!(
                    "frame exceeds maximum size of {} bytes",
                    self.max_frame_size
                )));
            }
            if end > self.buffer.len() {
                return Ok(None);
            }
            self.scan.scanned = end;
            self.scan.remaining = (self.scan.remaining - 1).saturating_add(children);
        }

        let bytes = self.buffer.split_to(self.scan.scanned);
        self.scan = FrameScan::new();
        let value = rmpv::decode::read_value(&mut &bytes[..])?;
        Frame::from_value(value).map(Some)
    }
}

/// Size of the item starting at `bytes[0]` (header plus payload) and the
/// number of nested items that follow it. `None` until the header is buffered.
fn item_extent(bytes: &[u8]) -> Result<Option<(usize, u64)>> {
    let Some(&first) = bytes.first() else {
        return Ok(None);
    };
    let length = |width: usize| -> Option<usize> {
        let field = bytes.get(1..1 + width)?;
        let value = field.iter().fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte));
        Some(usize::try_from(value).unwrap_or(usize::MAX))
    };
    let sized = |width: usize, extra: usize| -> Option<(usize, u64)> {
        let len = length(width)?;
        Some(((1 + width + extra).saturating_add(len), 0))
    };
    let container = |width: usize, per_entry: u64| -> Option<(usize, u64)> {
        let len = length(width)? as u64;
        Some((1 + width, len.saturating_mul(per_entry)))
    };

    let extent = match Marker::from_u8(first) {
        Marker::FixPos(_) | Marker::FixNeg(_) | Marker::Null | Marker::True | Marker::False => {
            Some((1, 0))
        }
        Marker::U8 | Marker::I8 => Some((2, 0)),
        Marker::U16 | Marker::I16 => Some((3, 0)),
        Marker::U32 | Marker::I32 | Marker::F32 => Some((5, 0)),
        Marker::U64 | Marker::I64 | Marker::F64 => Some((9, 0)),
        Marker::FixStr(len) => Some((1 + usize::from(len), 0)),
        Marker::Str8 | Marker::Bin8 => sized(1, 0),
        Marker::Str16 | Marker::Bin16 => sized(2, 0),
        Marker::Str32 | Marker::Bin32 => sized(4, 0),
        Marker::FixArray(len) => Some((1, u64::from(len))),
        Marker::Array16 => container(2, 1),
        Marker::Array32 => container(4, 1),
        Marker::FixMap(len) => Some((1, 2 * u64::from(len))),
        Marker::Map16 => container(2, 2),
        Marker::Map32 => container(4, 2),
        // Fixed ext: marker, type byte, data.
        Marker::FixExt1 => Some((3, 0)),
        Marker::FixExt2 => Some((4, 0)),
        Marker::FixExt4 => Some((6, 0)),
        Marker::FixExt8 => Some((10, 0)),
        Marker::FixExt16 => Some((18, 0)),
        Marker::Ext8 => sized(1, 1),
        Marker::Ext16 => sized(2, 1),
        Marker::Ext32 => sized(4, 1),
        Marker::Reserved => {
            return Err(codec_error(format!("reserved msgpack marker 0x{:02x}", first)))
        }
    };
    Ok(extent)
}
