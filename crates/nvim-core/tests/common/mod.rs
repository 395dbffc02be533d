//! Scripted fake editor for integration tests.
//!
//! Request ids are predictable (1, 2, ... per connection), so tests write the
//! peer's responses up front and then check what the client sent.

#![allow(dead_code)]

use nvim_core::{ApiInfo, Client, Frame, Handler, MessageCodec, Session, SessionConfig, Transport, Value};
use std::rc::Rc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;

pub const CHANNEL_ID: u64 = 5;
pub const BUFFER: i8 = 0;
pub const WINDOW: i8 = 1;
pub const TABPAGE: i8 = 2;

/// The editor side of an in-memory connection.
pub struct FakePeer {
    stream: DuplexStream,
    codec: MessageCodec,
}

impl FakePeer {
    /// A connected `(client transport, peer)` pair.
    pub fn pair() -> (Transport, FakePeer) {
        let (local, remote) = tokio::io::duplex(256 * 1024);
        (
            Transport::from_stream(local, "fake-peer"),
            FakePeer {
                stream: remote,
                codec: MessageCodec::default(),
            },
        )
    }

    pub async fn send(&mut self, frame: Frame) {
        let bytes = MessageCodec::encode(&frame).unwrap();
        self.stream.write_all(&bytes).await.unwrap();
    }

    pub async fn respond(&mut self, id: u64, value: Value) {
        self.send(Frame::Response {
            id,
            result: Ok(value),
        })
        .await;
    }

    pub async fn respond_error(&mut self, id: u64, code: i64, message: &str) {
        self.send(Frame::Response {
            id,
            result: Err(Value::Array(vec![Value::from(code), Value::from(message)])),
        })
        .await;
    }

    pub async fn request(&mut self, id: u64, method: &str, params: Vec<Value>) {
        self.send(Frame::Request {
            id,
            method: method.to_string(),
            params,
        })
        .await;
    }

    pub async fn notify(&mut self, method: &str, params: Vec<Value>) {
        self.send(Frame::Notification {
            method: method.to_string(),
            params,
        })
        .await;
    }

    /// Wait for the next frame the client writes.
    pub async fn next_frame(&mut self) -> Frame {
        let mut chunk = vec![0u8; 4096];
        loop {
            if let Some(frame) = self.codec.decode().unwrap() {
                return frame;
            }
            let n = self.stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client closed the connection");
            self.codec.feed(&chunk[..n]);
        }
    }

    /// The next frame the client writes, or `None` once it hangs up.
    pub async fn try_next_frame(&mut self) -> Option<Frame> {
        let mut chunk = vec![0u8; 4096];
        loop {
            if let Some(frame) = self.codec.decode().unwrap() {
                return Some(frame);
            }
            match self.stream.read(&mut chunk).await {
                Ok(n) if n > 0 => self.codec.feed(&chunk[..n]),
                _ => return None,
            }
        }
    }

    /// Every frame the client has written so far.
    pub async fn received(&mut self) -> Vec<Frame> {
        let mut chunk = vec![0u8; 64 * 1024];
        loop {
            match tokio::time::timeout(Duration::from_millis(20), self.stream.read(&mut chunk)).await {
                Ok(Ok(n)) if n > 0 => self.codec.feed(&chunk[..n]),
                _ => break,
            }
        }
        let mut frames = Vec::new();
        while let Some(frame) = self.codec.decode().unwrap() {
            frames.push(frame);
        }
        frames
    }

    /// `(method, params)` of every request the client has written so far.
    pub async fn requests(&mut self) -> Vec<(u64, String, Vec<Value>)> {
        self.received()
            .await
            .into_iter()
            .filter_map(|frame| match frame {
                Frame::Request { id, method, params } => Some((id, method, params)),
                _ => None,
            })
            .collect()
    }
}

/// Serve one buffer's lines from memory until the client hangs up.
///
/// Answers `nvim_buf_line_count`, `nvim_buf_get_lines` and `nvim_buf_set_lines`
/// against a live `Vec`, so edits change what later calls see. The task
/// resolves to the final contents.
pub fn serve_buffer(mut peer: FakePeer, initial: &[&str]) -> JoinHandle<Vec<String>> {
    let mut lines: Vec<String> = initial.iter().map(|line| line.to_string()).collect();
    tokio::spawn(async move {
        while let Some(frame) = peer.try_next_frame().await {
            let Frame::Request { id, method, params } = frame else {
                continue;
            };
            let result = match method.as_str() {
                "nvim_buf_line_count" => Value::from(lines.len() as i64),
                "nvim_buf_get_lines" => {
                    let (start, end) = line_bounds(&params, lines.len());
                    Value::Array(lines[start..end].iter().map(|line| Value::from(line.as_str())).collect())
                }
                "nvim_buf_set_lines" => {
                    let (start, end) = line_bounds(&params, lines.len());
                    let replacement: Vec<String> = params[4]
                        .as_array()
                        .unwrap()
                        .iter()
                        .map(|line| line.as_str().unwrap().to_string())
                        .collect();
                    lines.splice(start..end, replacement);
                    Value::Nil
                }
                other => {
                    peer.respond_error(id, 0, &format!("not served: {}", other)).await;
                    continue;
                }
            };
            peer.respond(id, result).await;
        }
        lines
    })
}

/// `[start, end)` from `(buffer, start, end, ..)` params; negative counts from the end.
fn line_bounds(params: &[Value], len: usize) -> (usize, usize) {
    let index = |value: &Value| {
        let i = value.as_i64().unwrap();
        let i = if i < 0 { len as i64 + 1 + i } else { i };
        (i.max(0) as usize).min(len)
    };
    let start = index(&params[1]);
    (start, index(&params[2]).max(start))
}

pub fn ext(code: i8, handle: i64) -> Value {
    let mut data = Vec::new();
    rmpv::encode::write_value(&mut data, &Value::from(handle)).unwrap();
    Value::Ext(code, data)
}

pub fn strings(lines: &[&str]) -> Value {
    Value::Array(lines.iter().map(|line| Value::from(*line)).collect())
}

fn map(entries: Vec<(&str, Value)>) -> Value {
    Value::Map(
        entries
            .into_iter()
            .map(|(k, v)| (Value::from(k), v))
            .collect(),
    )
}

fn function(name: &str, params: &[(&str, &str)], method: bool) -> Value {
    map(vec![
        ("name", Value::from(name)),
        (
            "parameters",
            Value::Array(
                params
                    .iter()
                    .map(|(ty, name)| Value::Array(vec![Value::from(*ty), Value::from(*name)]))
                    .collect(),
            ),
        ),
        ("return_type", Value::from("Object")),
        ("method", Value::from(method)),
        ("since", Value::from(1)),
    ])
}

fn method_of(receiver: (&str, &str), name: &str, params: &[(&str, &str)]) -> Value {
    let mut all = vec![receiver];
    all.extend_from_slice(params);
    function(name, &all, true)
}

/// Metadata map of a current editor, trimmed to what the tests use.
pub fn metadata() -> Value {
    let global = |name: &str, params: &[(&str, &str)]| function(name, params, false);
    let buf = |name: &str, params: &[(&str, &str)]| method_of(("Buffer", "buffer"), name, params);
    let win = |name: &str, params: &[(&str, &str)]| method_of(("Window", "window"), name, params);
    let tab = |name: &str| method_of(("Tabpage", "tabpage"), name, &[]);

    map(vec![
        (
            "version",
            map(vec![
                ("major", Value::from(0)),
                ("minor", Value::from(9)),
                ("patch", Value::from(5)),
                ("api_level", Value::from(11)),
            ]),
        ),
        (
            "types",
            map(vec![
                ("Buffer", map(vec![("id", Value::from(BUFFER)), ("prefix", Value::from("nvim_buf_"))])),
                ("Window", map(vec![("id", Value::from(WINDOW)), ("prefix", Value::from("nvim_win_"))])),
                ("Tabpage", map(vec![("id", Value::from(TABPAGE)), ("prefix", Value::from("nvim_tabpage_"))])),
            ]),
        ),
        (
            "error_types",
            map(vec![
                ("Exception", map(vec![("id", Value::from(0))])),
                ("Validation", map(vec![("id", Value::from(1))])),
            ]),
        ),
        (
            "functions",
            Value::Array(vec![
                global("nvim_get_api_info", &[]),
                global("nvim_eval", &[("String", "expr")]),
                global("nvim_command", &[("String", "command")]),
                global("nvim_get_current_buf", &[]),
                global("nvim_list_bufs", &[]),
                global("nvim_get_current_win", &[]),
                global("nvim_list_wins", &[]),
                global("nvim_get_current_tabpage", &[]),
                global("nvim_get_current_line", &[]),
                global("nvim_set_current_line", &[("String", "line")]),
                global("nvim_get_option", &[("String", "name")]),
                global("nvim_set_option", &[("String", "name"), ("Object", "value")]),
                global("nvim_subscribe", &[("String", "event")]),
                global("nvim_unsubscribe", &[("String", "event")]),
                buf("nvim_buf_line_count", &[]),
                buf(
                    "nvim_buf_get_lines",
                    &[("Integer", "start"), ("Integer", "end"), ("Boolean", "strict_indexing")],
                ),
                buf(
                    "nvim_buf_set_lines",
                    &[
                        ("Integer", "start"),
                        ("Integer", "end"),
                        ("Boolean", "strict_indexing"),
                        ("ArrayOf(String)", "replacement"),
                    ],
                ),
                buf("nvim_buf_get_name", &[]),
                win("nvim_win_get_cursor", &[]),
                win("nvim_win_set_cursor", &[("ArrayOf(Integer, 2)", "pos")]),
                win("nvim_win_get_buf", &[]),
                tab("nvim_tabpage_get_win"),
                tab("nvim_tabpage_get_number"),
                tab("nvim_tabpage_is_valid"),
            ]),
        ),
    ])
}

/// Metadata of an old editor: no prefixes, slice-based line access.
pub fn legacy_metadata() -> Value {
    let legacy = |name: &str, params: &[(&str, &str)]| {
        map(vec![
            ("name", Value::from(name)),
            (
                "parameters",
                Value::Array(
                    params
                        .iter()
                        .map(|(ty, name)| Value::Array(vec![Value::from(*ty), Value::from(*name)]))
                        .collect(),
                ),
            ),
            ("return_type", Value::from("Object")),
        ])
    };

    map(vec![
        (
            "types",
            map(vec![
                ("Buffer", map(vec![("id", Value::from(BUFFER))])),
                ("Window", map(vec![("id", Value::from(WINDOW))])),
            ]),
        ),
        (
            "functions",
            Value::Array(vec![
                legacy("vim_get_api_info", &[]),
                legacy("vim_get_current_buffer", &[]),
                legacy("buffer_line_count", &[("Buffer", "buffer")]),
                legacy(
                    "buffer_get_line_slice",
                    &[
                        ("Buffer", "buffer"),
                        ("Integer", "start"),
                        ("Integer", "end"),
                        ("Boolean", "include_start"),
                        ("Boolean", "include_end"),
                    ],
                ),
                legacy(
                    "buffer_set_line_slice",
                    &[
                        ("Buffer", "buffer"),
                        ("Integer", "start"),
                        ("Integer", "end"),
                        ("Boolean", "include_start"),
                        ("Boolean", "include_end"),
                        ("ArrayOf(String)", "replacement"),
                    ],
                ),
                legacy("window_get_buffer", &[("Window", "window")]),
            ]),
        ),
    ])
}

/// The `nvim_get_api_info` result for [`metadata`].
pub fn api_info_response() -> Value {
    Value::Array(vec![Value::from(CHANNEL_ID), metadata()])
}

/// A client with metadata preloaded, so the first call gets id 1.
pub fn client_with(metadata: Value, handler: Rc<dyn Handler>) -> (Client, FakePeer) {
    client_with_config(metadata, handler, SessionConfig::default())
}

pub fn client_with_config(
    metadata: Value,
    handler: Rc<dyn Handler>,
    config: SessionConfig,
) -> (Client, FakePeer) {
    let (transport, peer) = FakePeer::pair();
    let api = ApiInfo::from_metadata(Some(CHANNEL_ID), metadata).unwrap();
    let client = Client::with_api_info(Session::new(transport, config), api, handler);
    (client, peer)
}

pub fn client() -> (Client, FakePeer) {
    client_with(metadata(), Rc::new(nvim_core::DefaultHandler))
}
