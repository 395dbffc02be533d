//! nvim-core - msgpack-RPC client runtime for driving a Neovim process.
//!
//! The crate multiplexes blocking-style calls over one duplex byte stream,
//! answers the editor's own requests while a call is pending, and exposes
//! remote buffers, windows, and tab pages as identity-only proxies whose
//! methods are resolved through the API metadata the editor reports.
//!
//! # Example
//!
//! ```rust,ignore
//! use nvim_core::{Client, DefaultHandler, SessionConfig, Transport};
//! use std::rc::Rc;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> nvim_core::Result<()> {
//!     let transport = Transport::unix("/tmp/nvim.sock").await?;
//!     let mut client =
//!         Client::attach(transport, SessionConfig::default(), Rc::new(DefaultHandler)).await?;
//!
//!     let buffer = client.current_buffer().await?;
//!     let lines = buffer.lines().to_vec(&mut client).await?;
//!     println!("{} has {} lines", buffer.name(&mut client).await?, lines.len());
//!
//!     // Last line, counting from the end
//!     let last = buffer.lines().get(&mut client, -1).await?;
//!     println!("last: {}", last);
//!
//!     Ok(())
//! }
//! ```

pub mod api_info;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod remote;
pub mod rpc;

// Re-export commonly used types
pub use api_info::{ApiInfo, ApiVersion, FunctionSpec, ObjectType};
pub use client::{Client, DefaultHandler, Handler};
pub use config::{LogConfig, RpcConfig, SessionConfig};
pub use error::{NvimError, Result};
pub use logging::LogContext;
pub use remote::{Buffer, EditorOption, LineRange, RemoteObject, Tabpage, Window};
pub use rpc::{AsyncSession, Frame, Host, Inbound, MessageCodec, Session, Transport};

/// msgpack value type used for all call arguments and results.
pub use rmpv::Value;
