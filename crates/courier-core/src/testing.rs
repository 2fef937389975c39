//! Scripted in-memory [`ApiCaller`] for tests.
//!
//! Responses are queued per method and served in order. Every request is
//! recorded so tests can assert on what went over the wire. A method with
//! no queued response fails with [`TransportError::Io`].

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};

use crate::client::ApiCaller;
use crate::codec::Body;
use crate::error::{TransportError, TransportResult};

type Hook = Arc<dyn Fn() + Send + Sync>;

/// A request seen by [`ScriptedCaller`].
#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    /// Remote method name.
    pub method: String,
    /// Encoded body.
    pub body: Body,
    /// Per-request timeout, if the call set one.
    pub timeout: Option<Duration>,
}

/// An [`ApiCaller`] that replays queued responses.
#[derive(Default)]
pub struct ScriptedCaller {
    responses: Mutex<HashMap<String, VecDeque<TransportResult<Vec<u8>>>>>,
    hooks: Mutex<HashMap<String, Hook>>,
    requests: Mutex<Vec<Recorded>>,
}

impl ScriptedCaller {
    /// Creates a caller with nothing queued.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a successful envelope carrying `result`.
    pub fn respond(&self, method: &str, result: Value) -> &Self {
        let body = json!({"ok": true, "result": result}).to_string();
        self.push(method, Ok(body.into_bytes()))
    }

    /// Queues a raw response body.
    pub fn respond_raw(&self, method: &str, body: impl Into<Vec<u8>>) -> &Self {
        self.push(method, Ok(body.into()))
    }

    /// Queues a transport failure.
    pub fn fail(&self, method: &str, err: TransportError) -> &Self {
        self.push(method, Err(err))
    }

    /// Runs `hook` every time `method` is called, before the response is served.
    pub fn on_call(&self, method: &str, hook: impl Fn() + Send + Sync + 'static) -> &Self {
        self.hooks.lock().insert(method.to_string(), Arc::new(hook));
        self
    }

    /// Returns every request seen so far.
    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().clone()
    }

    /// Returns the requests seen for `method`.
    pub fn requests_for(&self, method: &str) -> Vec<Recorded> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.method == method)
            .cloned()
            .collect()
    }

    /// Returns how many times `method` was called.
    pub fn calls(&self, method: &str) -> usize {
        self.requests.lock().iter().filter(|r| r.method == method).count()
    }

    fn push(&self, method: &str, response: TransportResult<Vec<u8>>) -> &Self {
        self.responses
            .lock()
            .entry(method.to_string())
            .or_default()
            .push_back(response);
        self
    }
}

#[async_trait]
impl ApiCaller for ScriptedCaller {
    async fn post(
        &self,
        method: &str,
        body: &Body,
        timeout: Option<Duration>,
    ) -> TransportResult<Vec<u8>> {
        self.requests.lock().push(Recorded {
            method: method.to_string(),
            body: body.clone(),
            timeout,
        });

        let hook = self.hooks.lock().get(method).cloned();
        if let Some(hook) = hook {
            hook();
        }

        self.responses
            .lock()
            .get_mut(method)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Err(TransportError::Io(format!("no scripted response for `{method}`"))))
    }
}
