//! Top-level entry point: a session plus the API metadata of its peer.
//!
//! The client fetches metadata once when it attaches and validates every call
//! against it before anything is written, so a misspelled method fails with
//! `UnknownMethod` without a round trip. Inbound peer requests and
//! notifications are forwarded to a user [`Handler`], which receives the client
//! itself and may call back into the peer while the outer call is pending.

use crate::api_info::ApiInfo;
use crate::config::{RpcConfig, SessionConfig};
use crate::remote::{Buffer, EditorOption, RemoteObject, Tabpage, Window};
use crate::rpc::session::{self, Host, Session};
use crate::rpc::Transport;
use crate::{NvimError, Result};
use async_trait::async_trait;
use rmpv::Value;
use serde::de::DeserializeOwned;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Application code answering the peer.
///
/// Both methods run inside the wait loop of whatever call is pending; the loop
/// resumes once they return. Params arrive as raw values; remote objects in
/// them are extension values that [`Client::decode_objects`] turns into
/// [`RemoteObject`]s.
#[async_trait(?Send)]
pub trait Handler {
    /// Answer a request from the peer. The default rejects every method.
    async fn handle_request(
        &self,
        _client: &mut Client,
        method: &str,
        _params: Vec<Value>,
    ) -> Result<Value> {
        Err(NvimError::UnknownMethod {
            method: method.to_string(),
        })
    }

    /// React to a notification. The default ignores it.
    async fn handle_notification(&self, _client: &mut Client, method: &str, params: Vec<Value>) {
        debug!("Unhandled notification {} ({} params)", method, params.len());
    }
}

/// Handler that rejects requests and ignores notifications.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHandler;

#[async_trait(?Send)]
impl Handler for DefaultHandler {}

/// Connection to one editor process.
pub struct Client {
    session: Session,
    handler: Rc<dyn Handler>,
    api: Arc<ApiInfo>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("session", &self.session)
            .field("channel_id", &self.api.channel_id())
            .finish_non_exhaustive()
    }
}

/// Decode an RPC result into a typed value.
pub(crate) fn decode_value<T: DeserializeOwned>(context: &str, value: Value) -> Result<T> {
    rmpv::ext::from_value(value).map_err(|err| NvimError::decode(context, err.to_string()))
}

impl Client {
    /// Open a session over `transport` and fetch the peer's API metadata.
    pub async fn attach(
        transport: Transport,
        config: SessionConfig,
        handler: Rc<dyn Handler>,
    ) -> Result<Self> {
        let mut session = Session::new(transport, config);
        let api = fetch_api_info(&mut session).await?;
        info!(
            "Attached to peer (channel {:?}, {} functions, {} types)",
            api.channel_id(),
            api.functions().len(),
            api.types().len()
        );
        Ok(Self::with_api_info(session, api, handler))
    }

    /// Build a client from metadata obtained elsewhere.
    pub fn with_api_info(session: Session, api: ApiInfo, handler: Rc<dyn Handler>) -> Self {
        Self {
            session,
            handler,
            api: Arc::new(api),
        }
    }

    /// Cached API metadata. Never re-fetched.
    pub fn api_info(&self) -> Arc<ApiInfo> {
        Arc::clone(&self.api)
    }

    pub fn channel_id(&self) -> Option<u64> {
        self.api.channel_id()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Call a function by full or short name.
    pub async fn call(&mut self, method: &str, args: Vec<Value>) -> Result<Value> {
        let name = self.resolve(method)?;
        let timeout = self.session.config().request_timeout;
        self.request(&name, args, timeout).await
    }

    /// Like `call`, with a deadline for this call only.
    pub async fn call_with_timeout(
        &mut self,
        method: &str,
        args: Vec<Value>,
        timeout: Duration,
    ) -> Result<Value> {
        let name = self.resolve(method)?;
        self.request(&name, args, Some(timeout)).await
    }

    /// Call the first of `candidates` the peer knows about.
    ///
    /// Used where newer and older peers name the same function differently.
    pub async fn call_first(&mut self, candidates: &[&str], args: Vec<Value>) -> Result<Value> {
        let name = candidates
            .iter()
            .find_map(|candidate| self.api.resolve(candidate))
            .map(|function| function.name.clone())
            .ok_or_else(|| NvimError::UnknownMethod {
                method: candidates.join(" | "),
            })?;
        let timeout = self.session.config().request_timeout;
        self.request(&name, args, timeout).await
    }

    /// Call a method of `object`'s type with the object as first parameter.
    pub async fn call_method(
        &mut self,
        object: &RemoteObject,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value> {
        self.call_method_first(object, &[method], args).await
    }

    /// Call the first of `candidates` that is a method of `object`'s type.
    pub async fn call_method_first(
        &mut self,
        object: &RemoteObject,
        candidates: &[&str],
        args: Vec<Value>,
    ) -> Result<Value> {
        let name = self.resolve_method(object, candidates)?;
        let mut params = Vec::with_capacity(args.len() + 1);
        params.push(object.to_value());
        params.extend(args);
        let timeout = self.session.config().request_timeout;
        self.request(&name, params, timeout).await
    }

    /// Whether `object`'s type has a method named `method`.
    pub fn has_method(&self, object: &RemoteObject, method: &str) -> bool {
        self.api.resolve_scoped(object.code(), method).is_some()
    }

    /// Send a notification by full or short name.
    pub async fn notify(&mut self, method: &str, args: Vec<Value>) -> Result<()> {
        let name = self.resolve(method)?;
        self.session.notify(&name, args).await
    }

    /// Service peer traffic until `stop` is called or the peer goes away.
    pub async fn run(&mut self) -> Result<()> {
        session::serve(self).await
    }

    /// Make a running `run` loop return; usually called from a handler.
    pub fn stop(&mut self) {
        self.session.stop();
    }

    fn resolve(&self, method: &str) -> Result<String> {
        self.api
            .resolve(method)
            .map(|function| function.name.clone())
            .ok_or_else(|| NvimError::UnknownMethod {
                method: method.to_string(),
            })
    }

    fn resolve_method(&self, object: &RemoteObject, candidates: &[&str]) -> Result<String> {
        candidates
            .iter()
            .find_map(|candidate| self.api.resolve_scoped(object.code(), candidate))
            .map(|function| function.name.clone())
            .ok_or_else(|| NvimError::UnknownMethod {
                method: format!("{}.{}", object.type_name(), candidates.join(" | ")),
            })
    }

    async fn request(
        &mut self,
        name: &str,
        args: Vec<Value>,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        match session::call(self, name, args, timeout).await {
            Ok(value) => Ok(value),
            Err(NvimError::Rpc {
                code: Some(code),
                kind: None,
                message,
            }) => Err(NvimError::Rpc {
                code: Some(code),
                kind: self.api.error_type_name(code).map(str::to_string),
                message,
            }),
            Err(err) => Err(err),
        }
    }

    // Remote object factories

    /// Decode any remote object the peer sent.
    pub fn remote_object(&self, value: &Value) -> Result<RemoteObject> {
        RemoteObject::from_value(&self.api, value)
    }

    /// Decode each param that is a remote object of a known type.
    ///
    /// One slot per param; anything else is `None`.
    pub fn decode_objects(&self, params: &[Value]) -> Vec<Option<RemoteObject>> {
        params
            .iter()
            .map(|param| match param {
                Value::Ext(..) => self.remote_object(param).ok(),
                _ => None,
            })
            .collect()
    }

    fn typed_object(&self, value: &Value, type_name: &str) -> Result<RemoteObject> {
        let object = self.remote_object(value)?;
        if object.type_name() != type_name {
            return Err(NvimError::decode(
                type_name,
                format!("got a {}", object.type_name()),
            ));
        }
        Ok(object)
    }

    pub fn buffer_from(&self, value: &Value) -> Result<Buffer> {
        self.typed_object(value, Buffer::TYPE_NAME).map(Buffer::new)
    }

    pub fn window_from(&self, value: &Value) -> Result<Window> {
        self.typed_object(value, Window::TYPE_NAME).map(Window::new)
    }

    pub fn tabpage_from(&self, value: &Value) -> Result<Tabpage> {
        self.typed_object(value, Tabpage::TYPE_NAME).map(Tabpage::new)
    }

    fn list<T>(&self, value: Value, decode: impl Fn(&Self, &Value) -> Result<T>) -> Result<Vec<T>> {
        match value {
            Value::Array(items) => items.iter().map(|item| decode(self, item)).collect(),
            other => Err(NvimError::decode("object list", format!("expected an array, got {}", other))),
        }
    }

    // Editor conveniences

    pub async fn current_buffer(&mut self) -> Result<Buffer> {
        let value = self
            .call_first(&["nvim_get_current_buf", "vim_get_current_buffer"], vec![])
            .await?;
        self.buffer_from(&value)
    }

    pub async fn buffers(&mut self) -> Result<Vec<Buffer>> {
        let value = self.call_first(&["nvim_list_bufs", "vim_get_buffers"], vec![]).await?;
        self.list(value, Self::buffer_from)
    }

    pub async fn current_window(&mut self) -> Result<Window> {
        let value = self
            .call_first(&["nvim_get_current_win", "vim_get_current_window"], vec![])
            .await?;
        self.window_from(&value)
    }

    pub async fn windows(&mut self) -> Result<Vec<Window>> {
        let value = self.call_first(&["nvim_list_wins", "vim_get_windows"], vec![]).await?;
        self.list(value, Self::window_from)
    }

    pub async fn current_tabpage(&mut self) -> Result<Tabpage> {
        let value = self
            .call_first(&["nvim_get_current_tabpage", "vim_get_current_tabpage"], vec![])
            .await?;
        self.tabpage_from(&value)
    }

    pub async fn tabpages(&mut self) -> Result<Vec<Tabpage>> {
        let value = self
            .call_first(&["nvim_list_tabpages", "vim_get_tabpages"], vec![])
            .await?;
        self.list(value, Self::tabpage_from)
    }

    /// Run an Ex command.
    pub async fn command(&mut self, command: &str) -> Result<()> {
        self.call_first(&["nvim_command", "vim_command"], vec![Value::from(command)])
            .await?;
        Ok(())
    }

    /// Evaluate a Vimscript expression.
    pub async fn eval(&mut self, expr: &str) -> Result<Value> {
        self.call_first(&["nvim_eval", "vim_eval"], vec![Value::from(expr)])
            .await
    }

    pub async fn current_line(&mut self) -> Result<String> {
        let value = self
            .call_first(&["nvim_get_current_line", "vim_get_current_line"], vec![])
            .await?;
        decode_value("current line", value)
    }

    pub async fn set_current_line(&mut self, line: &str) -> Result<()> {
        self.call_first(
            &["nvim_set_current_line", "vim_set_current_line"],
            vec![Value::from(line)],
        )
        .await?;
        Ok(())
    }

    /// Subscribe to broadcast notifications named `event`.
    pub async fn subscribe(&mut self, event: &str) -> Result<()> {
        self.call_first(&["nvim_subscribe", "vim_subscribe"], vec![Value::from(event)])
            .await?;
        Ok(())
    }

    pub async fn unsubscribe(&mut self, event: &str) -> Result<()> {
        self.call_first(&["nvim_unsubscribe", "vim_unsubscribe"], vec![Value::from(event)])
            .await?;
        Ok(())
    }

    /// Fetch a global option.
    pub async fn option(&mut self, name: &str) -> Result<EditorOption> {
        EditorOption::fetch(self, name).await
    }
}

#[async_trait(?Send)]
impl Host for Client {
    fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    async fn on_request(&mut self, method: String, params: Vec<Value>) -> Result<Value> {
        let handler = Rc::clone(&self.handler);
        handler.handle_request(self, &method, params).await
    }

    async fn on_notification(&mut self, method: String, params: Vec<Value>) {
        let handler = Rc::clone(&self.handler);
        handler.handle_notification(self, &method, params).await
    }
}

/// Ask the peer for its metadata, trying each known method name in turn.
async fn fetch_api_info(session: &mut Session) -> Result<ApiInfo> {
    let mut last_error = None;
    for method in RpcConfig::API_INFO_METHODS {
        match session.request(method, vec![]).await {
            Ok(value) => return ApiInfo::from_value(value),
            Err(err @ NvimError::Rpc { .. }) => {
                debug!("{} rejected by peer: {}", method, err);
                last_error = Some(err);
            }
            Err(err) => return Err(err),
        }
    }
    Err(last_error.unwrap_or_else(|| NvimError::Metadata {
        message: "peer did not provide API metadata".to_string(),
    }))
}
