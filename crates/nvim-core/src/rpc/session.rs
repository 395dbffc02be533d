//! Blocking request/response facade over `AsyncSession`.
//!
//! A call sends its request and then services the connection until the
//! matching response arrives. Requests the peer sends in the meantime are
//! handed to the [`Host`] and answered before the wait resumes, so a handler
//! may itself issue calls to the peer; those nest on the wait stack.
//!
//! ```text
//! idle
//!   -> awaiting(1)                  request 1 sent
//!        -> awaiting(2) in (1)      peer asked something, handler called back
//!        <- awaiting(1)             response 2 consumed
//!   <- idle                         response 1 consumed
//! ```

use super::async_session::{AsyncSession, Inbound};
use super::transport::Transport;
use crate::config::SessionConfig;
use crate::{NvimError, Result};
use async_trait::async_trait;
use rmpv::Value;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Owner of a session that answers inbound peer traffic.
///
/// Dispatch is synchronous with respect to the wait loop: the loop does not
/// read another frame until `on_request` has returned and its response has
/// been written.
#[async_trait(?Send)]
pub trait Host {
    fn session_mut(&mut self) -> &mut Session;

    /// Answer a request from the peer. Errors are sent back as error payloads.
    async fn on_request(&mut self, method: String, params: Vec<Value>) -> Result<Value>;

    async fn on_notification(&mut self, method: String, params: Vec<Value>);
}

/// Synchronous-style msgpack-RPC session.
#[derive(Debug)]
pub struct Session {
    inner: AsyncSession,
    config: SessionConfig,
    /// Ids being waited on, outermost first.
    waits: Vec<u64>,
    stop_requested: bool,
}

impl Session {
    pub fn new(transport: Transport, config: SessionConfig) -> Self {
        Self {
            inner: AsyncSession::new(transport, &config),
            config,
            waits: Vec::new(),
            stop_requested: false,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Ids currently being waited on, outermost first. Empty when idle.
    pub fn wait_stack(&self) -> &[u64] {
        &self.waits
    }

    pub fn is_running(&self) -> bool {
        self.inner.is_running()
    }

    /// Ids of requests sent but not yet answered.
    pub fn outstanding(&self) -> Vec<u64> {
        self.inner.outstanding()
    }

    /// Send a request and wait for its response, rejecting inbound requests.
    pub async fn request(&mut self, method: &str, params: Vec<Value>) -> Result<Value> {
        let timeout = self.config.request_timeout;
        call(self, method, params, timeout).await
    }

    /// Like `request`, with an explicit deadline for this call only.
    pub async fn request_with_timeout(
        &mut self,
        method: &str,
        params: Vec<Value>,
        timeout: Duration,
    ) -> Result<Value> {
        call(self, method, params, Some(timeout)).await
    }

    /// Send a notification; nothing is awaited.
    pub async fn notify(&mut self, method: &str, params: Vec<Value>) -> Result<()> {
        self.inner.send_notification(method, params).await
    }

    /// Service inbound traffic until `stop` is called or the peer goes away.
    pub async fn run(&mut self) -> Result<()> {
        serve(self).await
    }

    /// Ask a running `run` loop to return once the current frame is handled.
    pub fn stop(&mut self) {
        debug!("Stop requested");
        self.stop_requested = true;
    }
}

#[async_trait(?Send)]
impl Host for Session {
    fn session_mut(&mut self) -> &mut Session {
        self
    }

    async fn on_request(&mut self, method: String, _params: Vec<Value>) -> Result<Value> {
        Err(NvimError::UnknownMethod { method })
    }

    async fn on_notification(&mut self, method: String, params: Vec<Value>) {
        debug!("Ignoring notification {} ({} params)", method, params.len());
    }
}

/// Send `method` through `host`'s session and wait for the response.
pub async fn call<H: Host + ?Sized>(
    host: &mut H,
    method: &str,
    params: Vec<Value>,
    timeout: Option<Duration>,
) -> Result<Value> {
    let id = host.session_mut().inner.send_request(method, params).await?;
    wait_for(host, id, timeout).await
}

/// Service the connection until request `id` has an outcome.
pub async fn wait_for<H: Host + ?Sized>(
    host: &mut H,
    id: u64,
    timeout: Option<Duration>,
) -> Result<Value> {
    host.session_mut().waits.push(id);
    let outcome = drive(host, id, timeout).await;

    let waits = &mut host.session_mut().waits;
    if waits.last() == Some(&id) {
        waits.pop();
    } else {
        warn!("Wait stack out of order: expected {} on top of {:?}", id, waits);
        waits.retain(|waiting| *waiting != id);
    }
    outcome
}

async fn drive<H: Host + ?Sized>(
    host: &mut H,
    id: u64,
    timeout: Option<Duration>,
) -> Result<Value> {
    let deadline = timeout.map(|timeout| Instant::now() + timeout);

    loop {
        if let Some(outcome) = host.session_mut().inner.take_outcome(id) {
            return outcome;
        }

        let inbound = match host.session_mut().inner.run_once(deadline).await {
            Ok(Some(inbound)) => inbound,
            Ok(None) => {
                let session = host.session_mut();
                let method = session
                    .inner
                    .pending_method(id)
                    .unwrap_or_default()
                    .to_string();
                session.inner.abandon(id);
                // `timeout` is always set when a deadline elapses
                let timeout = timeout.unwrap_or_default();
                warn!("Request {} ({}) timed out after {:?}", id, method, timeout);
                return Err(NvimError::Timeout {
                    id,
                    method,
                    timeout,
                });
            }
            Err(err) => return host.session_mut().inner.take_outcome(id).unwrap_or(Err(err)),
        };

        if let Err(err) = dispatch(host, inbound).await {
            return host.session_mut().inner.take_outcome(id).unwrap_or(Err(err));
        }
    }
}

/// Hand one inbound message to the host, answering requests.
async fn dispatch<H: Host + ?Sized>(host: &mut H, inbound: Inbound) -> Result<()> {
    match inbound {
        Inbound::Response { .. } => Ok(()),
        Inbound::Request { id, method, params } => {
            let reply = match host.on_request(method.clone(), params).await {
                Ok(value) => Ok(value),
                Err(err) => {
                    debug!("Request {} ({}) failed in handler: {}", id, method, err);
                    Err(err.to_error_payload())
                }
            };
            host.session_mut().inner.send_response(id, reply).await
        }
        Inbound::Notification { method, params } => {
            host.on_notification(method, params).await;
            Ok(())
        }
    }
}

/// Service inbound traffic on `host` until a stop is requested.
///
/// Returns `Ok` after `stop`, or the closing error when the peer goes away.
pub async fn serve<H: Host + ?Sized>(host: &mut H) -> Result<()> {
    debug!("Entering run loop");
    loop {
        if host.session_mut().stop_requested {
            host.session_mut().stop_requested = false;
            debug!("Leaving run loop");
            return Ok(());
        }

        if let Some(inbound) = host.session_mut().inner.run_once(None).await? {
            dispatch(host, inbound).await?;
        }
    }
}
