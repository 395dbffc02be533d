//! Global editor option proxy.

use crate::client::Client;
use crate::{NvimError, Result};
use rmpv::Value;
use tracing::debug;

/// A global option and the value it had when last read or written.
#[derive(Debug, Clone, PartialEq)]
pub struct EditorOption {
    name: String,
    value: Option<Value>,
}

impl EditorOption {
    /// Read option `name`. A peer-side error (unknown option) gives no value.
    pub async fn fetch(client: &mut Client, name: &str) -> Result<Self> {
        let value = match client
            .call_first(&["nvim_get_option", "vim_get_option"], vec![Value::from(name)])
            .await
        {
            Ok(value) => Some(value),
            Err(err @ NvimError::Rpc { .. }) => {
                debug!("Option {} unavailable: {}", name, err);
                None
            }
            Err(err) => return Err(err),
        };
        Ok(Self {
            name: name.to_string(),
            value,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Write the option and remember the new value.
    pub async fn set(&mut self, client: &mut Client, value: Value) -> Result<()> {
        client
            .call_first(
                &["nvim_set_option", "vim_set_option"],
                vec![Value::from(self.name.as_str()), value.clone()],
            )
            .await?;
        self.value = Some(value);
        Ok(())
    }
}
