//! Window proxy.

use super::{Buffer, RemoteObject};
use crate::client::{decode_value, Client};
use crate::Result;
use rmpv::Value;
use std::ops::Deref;

/// A remote window.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Window(RemoteObject);

impl Deref for Window {
    type Target = RemoteObject;

    fn deref(&self) -> &RemoteObject {
        &self.0
    }
}

impl From<Window> for RemoteObject {
    fn from(window: Window) -> Self {
        window.0
    }
}

impl Window {
    pub const TYPE_NAME: &'static str = "Window";

    pub fn new(object: RemoteObject) -> Self {
        Self(object)
    }

    /// Cursor position as `(row, col)`; row is 1-based, col 0-based.
    pub async fn cursor(&self, client: &mut Client) -> Result<(i64, i64)> {
        let value = self.call(client, "get_cursor", vec![]).await?;
        decode_value("window cursor", value)
    }

    pub async fn set_cursor(&self, client: &mut Client, (row, col): (i64, i64)) -> Result<()> {
        let position = Value::Array(vec![Value::from(row), Value::from(col)]);
        self.call(client, "set_cursor", vec![position]).await?;
        Ok(())
    }

    /// Buffer shown in this window.
    pub async fn buffer(&self, client: &mut Client) -> Result<Buffer> {
        let value = client
            .call_method_first(self, &["get_buf", "get_buffer"], vec![])
            .await?;
        client.buffer_from(&value)
    }

    pub async fn is_valid(&self, client: &mut Client) -> Result<bool> {
        let value = self.call(client, "is_valid", vec![]).await?;
        decode_value("window validity", value)
    }
}
