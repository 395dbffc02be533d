//! Tab page proxy.

use super::{RemoteObject, Window};
use crate::client::{decode_value, Client};
use crate::Result;
use std::ops::Deref;

/// A remote tab page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tabpage(RemoteObject);

impl Deref for Tabpage {
    type Target = RemoteObject;

    fn deref(&self) -> &RemoteObject {
        &self.0
    }
}

impl From<Tabpage> for RemoteObject {
    fn from(tabpage: Tabpage) -> Self {
        tabpage.0
    }
}

impl Tabpage {
    pub const TYPE_NAME: &'static str = "Tabpage";

    pub fn new(object: RemoteObject) -> Self {
        Self(object)
    }

    pub async fn number(&self, client: &mut Client) -> Result<i64> {
        let value = self.call(client, "get_number", vec![]).await?;
        decode_value("tabpage number", value)
    }

    /// Focused window of this tab page.
    pub async fn window(&self, client: &mut Client) -> Result<Window> {
        let value = client
            .call_method_first(self, &["get_win", "get_window"], vec![])
            .await?;
        client.window_from(&value)
    }

    pub async fn is_valid(&self, client: &mut Client) -> Result<bool> {
        let value = self.call(client, "is_valid", vec![]).await?;
        decode_value("tabpage validity", value)
    }
}
