//! Generic proxy for an entity living in the peer.

use crate::api_info::{ApiInfo, ObjectType};
use crate::client::Client;
use crate::{NvimError, Result};
use rmpv::Value;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Opaque `(type, handle)` reference to a remote buffer, window, tab page, or
/// any other type the peer declares.
///
/// Identity is the ext type code plus the handle. Two proxies decoded from the
/// same wire value at different times compare equal and hash the same; the
/// type name is carried for display and type checks only.
#[derive(Clone)]
pub struct RemoteObject {
    type_name: Arc<str>,
    code: i8,
    handle: i64,
}

impl RemoteObject {
    pub fn new(type_name: impl Into<Arc<str>>, code: i8, handle: i64) -> Self {
        Self {
            type_name: type_name.into(),
            code,
            handle,
        }
    }

    /// Decode the payload of an ext value of type `ty`.
    pub fn from_ext(ty: &ObjectType, data: &[u8]) -> Result<Self> {
        let mut cursor = data;
        let handle = rmpv::decode::read_value(&mut cursor)
            .map_err(|err| NvimError::decode(format!("{} handle", ty.name), err.to_string()))?;
        let handle = handle.as_i64().ok_or_else(|| {
            NvimError::decode(
                format!("{} handle", ty.name),
                format!("expected an integer, got {}", handle),
            )
        })?;
        Ok(Self::new(ty.name.as_str(), ty.code, handle))
    }

    /// Decode a wire value, which must be an ext value of a declared type.
    pub fn from_value(api: &ApiInfo, value: &Value) -> Result<Self> {
        match value {
            Value::Ext(code, data) => {
                let ty = api.object_type(*code).ok_or_else(|| {
                    NvimError::decode(
                        "remote object",
                        format!("ext type {} is not declared in API metadata", code),
                    )
                })?;
                Self::from_ext(ty, data)
            }
            other => Err(NvimError::decode(
                "remote object",
                format!("expected an ext value, got {}", other),
            )),
        }
    }

    /// Re-encode into the ext form the peer sent.
    pub fn to_value(&self) -> Value {
        let mut data = Vec::with_capacity(9);
        // Writing into a Vec cannot fail.
        let _ = rmpv::encode::write_value(&mut data, &Value::from(self.handle));
        Value::Ext(self.code, data)
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn code(&self) -> i8 {
        self.code
    }

    pub fn handle(&self) -> i64 {
        self.handle
    }

    /// Invoke a method of this object's type on the peer.
    ///
    /// `method` is either the short name (`get_lines`) or the full name
    /// (`nvim_buf_get_lines`); the object itself is sent as the first
    /// parameter.
    pub async fn call(&self, client: &mut Client, method: &str, args: Vec<Value>) -> Result<Value> {
        client.call_method(self, method, args).await
    }
}

impl PartialEq for RemoteObject {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code && self.handle == other.handle
    }
}

impl Eq for RemoteObject {}

impl Hash for RemoteObject {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.code.hash(state);
        self.handle.hash(state);
    }
}

impl fmt::Debug for RemoteObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.type_name, self.handle)
    }
}

impl fmt::Display for RemoteObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.type_name, self.handle)
    }
}

impl From<&RemoteObject> for Value {
    fn from(object: &RemoteObject) -> Self {
        object.to_value()
    }
}

impl From<RemoteObject> for Value {
    fn from(object: RemoteObject) -> Self {
        object.to_value()
    }
}
