//! Session: identity, update loop and lifecycle.
//!
//! A [`Session`] owns the dispatcher and the delivery cursor and drives the
//! long-poll loop on the task that awaits [`Session::start`]:
//!
//! ```text
//!            start()                       stop() observed
//! NotStarted ───────▶ Running ───────────────────────────▶ Stopped
//!     ▲                  │
//!     └──────────────────┘  getMe, poll or dispatch failure
//! ```
//!
//! Each iteration checks the stop flag, long-polls `getUpdates` with the
//! current offset, then for each envelope in order moves the cursor past it
//! and dispatches it. The cursor is never rolled back: an update whose
//! handler failed is still acknowledged.
//!
//! ```rust,ignore
//! let mut session = Session::from_config(&config.bot)?;
//! session.on(UpdateKind::Message, |msg: Message| async move {
//!     println!("{:?}", msg.text);
//! })?;
//!
//! let stop = session.stop_handle();
//! tokio::spawn(async move {
//!     tokio::signal::ctrl_c().await.ok();
//!     stop.stop();
//! });
//! session.start().await?;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, error, info, trace};

use courier_core::{
    Client, Cursor, Dispatcher, Error, GetMe, GetUpdates, Handler, Method, Result, SessionState,
    ToFields, Update, UpdateKind, User,
};
use courier_transport::HttpApiCaller;

use crate::config::{BotConfig, validate_bot_config};

/// Default long-poll timeout.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(10);

/// Default allowance for a request on top of the time the server may hold it.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// StopHandle
// =============================================================================

/// Requests a running session to stop at the next poll boundary.
///
/// Cheap to clone and safe to use from any task or thread.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Requests the stop. Idempotent.
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Returns `true` once a stop was requested.
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

// =============================================================================
// Identity
// =============================================================================

/// Shared view of the bot's own account.
///
/// Empty until the owning session's first successful `start`. Clones can
/// be moved into handlers.
#[derive(Debug, Clone, Default)]
pub struct Identity(Arc<OnceLock<User>>);

impl Identity {
    /// Returns the account, once fetched.
    pub fn get(&self) -> Option<&User> {
        self.0.get()
    }

    /// Returns the username, falling back to the first name.
    pub fn display_name(&self) -> Option<&str> {
        self.get()
            .map(|me| me.username.as_deref().unwrap_or(&me.first_name))
    }
}

// =============================================================================
// Session
// =============================================================================

/// A bot session.
pub struct Session {
    client: Client,
    dispatcher: Dispatcher,
    poll_timeout: Duration,
    request_timeout: Duration,
    cursor: Cursor,
    identity: Identity,
    stop: StopHandle,
    state: Mutex<SessionState>,
}

impl Session {
    /// Creates a session over an existing client.
    pub fn new(client: Client) -> Self {
        let mut dispatcher = Dispatcher::new();
        dispatcher.set_debug(client.debug());
        Self {
            client,
            dispatcher,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            cursor: Cursor::new(),
            identity: Identity::default(),
            stop: StopHandle::default(),
            state: Mutex::new(SessionState::NotStarted),
        }
    }

    /// Builds a session talking HTTP to the configured API.
    ///
    /// Invalid settings fail with [`Error::Configuration`].
    pub fn from_config(config: &BotConfig) -> Result<Self> {
        validate_bot_config(config)?;

        let caller = HttpApiCaller::new(&config.api_url, &config.token, config.http_timeout())
            .map_err(|e| Error::configuration(format!("cannot build HTTP client: {e}")))?;
        let client = Client::new(Arc::new(caller))
            .with_encoding(config.encoding)
            .with_debug(config.debug);

        Ok(Self::new(client)
            .with_poll_timeout(config.poll_timeout())
            .with_request_timeout(config.request_timeout()))
    }

    /// Sets the long-poll timeout.
    ///
    /// The server takes whole seconds, so a fractional timeout is rounded up.
    /// Each poll's HTTP timeout is this plus the request timeout.
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Sets the allowance for a poll beyond the time the server holds it.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Enables logging of responses and inbound updates.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.client = self.client.with_debug(debug);
        self.dispatcher.set_debug(debug);
        self
    }

    /// Registers a handler for `kind`.
    ///
    /// Fails with [`Error::Configuration`] if `kind` already has one.
    pub fn on<T, H>(&mut self, kind: UpdateKind, handler: H) -> Result<()>
    where
        H: Handler<T>,
        T: DeserializeOwned + Send + 'static,
    {
        self.dispatcher.on(kind, handler)
    }

    /// Registers a handler by kind name, e.g. `"callback_query"`.
    ///
    /// Fails with [`Error::Configuration`] for unknown or already registered kinds.
    pub fn handle<T, H>(&mut self, kind: &str, handler: H) -> Result<()>
    where
        H: Handler<T>,
        T: DeserializeOwned + Send + 'static,
    {
        self.dispatcher.handle(kind, handler)
    }

    /// Returns a client sharing this session's transport.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Calls a typed method.
    pub async fn send<M: Method>(&self, method: &M) -> Result<M::Response> {
        self.client.send(method).await
    }

    /// Calls `method` by name.
    pub async fn call<T, R>(&self, method: &str, request: &R) -> Result<T>
    where
        T: DeserializeOwned,
        R: ToFields + ?Sized,
    {
        self.client.call(method, request).await
    }

    /// Requests the loop to stop at the next poll boundary.
    ///
    /// Idempotent. An in-flight poll is not interrupted.
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Returns a handle that can stop the session from elsewhere.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Returns the bot's own account, once `start` has fetched it.
    pub fn user(&self) -> Option<&User> {
        self.identity.get()
    }

    /// Returns a handle that sees the identity once `start` has fetched it.
    pub fn identity(&self) -> Identity {
        self.identity.clone()
    }

    /// Returns the lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Returns the offset the next poll will send.
    pub fn offset(&self) -> i64 {
        self.cursor.offset()
    }

    /// Returns the kinds sent as `allowed_updates`, in registration order.
    pub fn allowed_updates(&self) -> Vec<UpdateKind> {
        self.dispatcher.kinds()
    }

    /// Runs the update loop until stopped or until the first failure.
    ///
    /// Returns `Ok(())` once a stop request is observed; the session is then
    /// `Stopped` for good. Any failure returns the session to `NotStarted`,
    /// keeping the identity and the cursor, so `start` may be called again.
    pub async fn start(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if *state != SessionState::NotStarted {
                return Err(Error::InvalidState(*state));
            }
            *state = SessionState::Running;
        }

        let result = self.run().await;

        let mut state = self.state.lock();
        match &result {
            Ok(()) => {
                *state = SessionState::Stopped;
                info!(offset = self.cursor.offset(), "Session stopped");
            }
            Err(e) => {
                *state = SessionState::NotStarted;
                error!(offset = self.cursor.offset(), error = %e, "Update loop failed");
            }
        }
        result
    }

    async fn run(&self) -> Result<()> {
        let me = self.authenticate().await?;
        info!(
            user_id = me.id,
            username = me.username.as_deref().unwrap_or_default(),
            "Session started"
        );

        let allowed_updates = Some(self.allowed_updates()).filter(|kinds| !kinds.is_empty());
        let timeout = poll_secs(self.poll_timeout);
        let http_timeout = Duration::from_secs(timeout).saturating_add(self.request_timeout);

        while !self.stop.is_stopped() {
            let request = GetUpdates {
                offset: self.cursor.offset(),
                timeout,
                limit: None,
                allowed_updates: allowed_updates.clone(),
            };
            trace!(offset = request.offset, timeout, "Polling for updates");

            let batch = self
                .client
                .call_raw_with_timeout(GetUpdates::NAME, &request, http_timeout)
                .await?;
            let envelopes = Update::raw_batch(batch)?;
            if !envelopes.is_empty() {
                debug!(count = envelopes.len(), offset = request.offset, "Received updates");
            }
            self.process(envelopes).await?;
        }

        Ok(())
    }

    /// Fetches the identity on the first successful start only.
    async fn authenticate(&self) -> Result<&User> {
        if let Some(me) = self.identity.get() {
            return Ok(me);
        }
        let me = self.client.send(&GetMe).await?;
        Ok(self.identity.0.get_or_init(|| me))
    }

    /// Acknowledges and dispatches one batch in order.
    ///
    /// A malformed envelope stops the batch where it stands: earlier ones
    /// are already acknowledged and dispatched, later ones are not. On a
    /// dispatch failure the whole batch is still acknowledged before the
    /// error is returned, so the cursor ends at the highest id + 1.
    async fn process(&self, envelopes: Vec<Map<String, Value>>) -> Result<()> {
        let max = envelopes.iter().filter_map(Update::raw_id).max();
        for raw in envelopes {
            let update = Update::from_raw(raw)?;
            self.cursor.advance(update.id());
            if let Err(e) = self.dispatcher.dispatch(&update).await {
                if let Some(max) = max {
                    self.cursor.advance(max);
                }
                return Err(e);
            }
        }
        Ok(())
    }
}

/// Whole seconds to ask the server to hold a poll, rounded up.
fn poll_secs(timeout: Duration) -> u64 {
    timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0)
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state())
            .field("offset", &self.offset())
            .field("poll_timeout", &self.poll_timeout)
            .field("request_timeout", &self.request_timeout)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::testing::ScriptedCaller;
    use courier_core::{ApiCaller, Body, Message, ProtocolError, TransportError};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn me() -> Value {
        json!({"id": 7, "first_name": "Bot", "is_bot": true, "username": "courier_bot"})
    }

    fn message(update_id: i64, message_id: i64) -> Value {
        json!({
            "update_id": update_id,
            "message": {
                "message_id": message_id,
                "date": 0,
                "chat": {"id": 1, "type": "private"},
                "text": "hi"
            }
        })
    }

    fn session(caller: &Arc<ScriptedCaller>) -> Session {
        Session::new(Client::new(Arc::clone(caller) as Arc<dyn ApiCaller>))
    }

    /// Stops the session while the `n`th poll is in flight.
    fn stop_on_poll(caller: &ScriptedCaller, session: &Session, n: usize) {
        let stop = session.stop_handle();
        let polls = AtomicUsize::new(0);
        caller.on_call("getUpdates", move || {
            if polls.fetch_add(1, Ordering::SeqCst) + 1 == n {
                stop.stop();
            }
        });
    }

    fn poll_offset(body: &Body) -> i64 {
        match body {
            Body::Json(value) => value["offset"].as_i64().unwrap(),
            other => panic!("expected JSON body, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_identity_fetched_before_polling() {
        let caller = Arc::new(ScriptedCaller::new());
        caller.respond("getMe", me()).respond("getUpdates", json!([]));
        let session = session(&caller);
        stop_on_poll(&caller, &session, 1);

        assert!(session.user().is_none());
        session.start().await.unwrap();

        assert_eq!(session.user().unwrap().id, 7);
        let requests = caller.requests();
        assert_eq!(requests[0].method, "getMe");
        assert_eq!(requests[1].method, "getUpdates");
    }

    #[tokio::test]
    async fn test_stop_between_polls_returns_ok() {
        let caller = Arc::new(ScriptedCaller::new());
        caller
            .respond("getMe", me())
            .respond("getUpdates", json!([message(1, 10)]));
        let session = session(&caller);
        stop_on_poll(&caller, &session, 1);

        session.start().await.unwrap();

        assert_eq!(session.state(), SessionState::Stopped);
        assert_eq!(caller.calls("getUpdates"), 1);
        assert_eq!(session.offset(), 2);
    }

    #[tokio::test]
    async fn test_stop_before_start() {
        let caller = Arc::new(ScriptedCaller::new());
        caller.respond("getMe", me());
        let session = session(&caller);

        session.stop();
        session.stop();
        session.start().await.unwrap();

        assert_eq!(caller.calls("getUpdates"), 0);
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[tokio::test]
    async fn test_cursor_advances_past_unhandled_updates() {
        let caller = Arc::new(ScriptedCaller::new());
        caller
            .respond("getMe", me())
            .respond(
                "getUpdates",
                json!([
                    message(5, 1),
                    {"update_id": 9, "poll": {"id": "p"}},
                    message(6, 2)
                ]),
            )
            .respond("getUpdates", json!([]));

        let handled = Arc::new(AtomicUsize::new(0));
        let mut session = session(&caller);
        let counter = Arc::clone(&handled);
        session
            .on(UpdateKind::Message, move |_: Message| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            })
            .unwrap();
        stop_on_poll(&caller, &session, 2);

        session.start().await.unwrap();

        assert_eq!(handled.load(Ordering::SeqCst), 2);
        assert_eq!(session.offset(), 10);
        let polls = caller.requests_for("getUpdates");
        assert_eq!(poll_offset(&polls[0].body), 0);
        assert_eq!(poll_offset(&polls[1].body), 10);
    }

    #[tokio::test]
    async fn test_handler_failure_still_acknowledges_batch() {
        let caller = Arc::new(ScriptedCaller::new());
        caller
            .respond("getMe", me())
            .respond("getUpdates", json!([message(3, 1), message(8, 2), message(4, 3)]));

        let mut session = session(&caller);
        session
            .on(UpdateKind::Message, |_: Message| async {
                Err::<(), _>("handler exploded")
            })
            .unwrap();

        let err = session.start().await.unwrap_err();

        assert!(matches!(err, Error::Handler { kind: UpdateKind::Message, .. }));
        assert_eq!(session.offset(), 9);
        assert_eq!(session.state(), SessionState::NotStarted);
    }

    #[tokio::test]
    async fn test_get_me_failure_leaves_not_started() {
        let caller = Arc::new(ScriptedCaller::new());
        caller
            .fail("getMe", TransportError::Io("connection reset".into()))
            .respond("getMe", me())
            .respond("getUpdates", json!([]));
        let session = session(&caller);

        let err = session.start().await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(session.state(), SessionState::NotStarted);
        assert!(session.user().is_none());

        stop_on_poll(&caller, &session, 1);
        session.start().await.unwrap();
        assert_eq!(session.user().unwrap().id, 7);
    }

    #[tokio::test]
    async fn test_restart_after_poll_failure_keeps_identity_and_cursor() {
        let caller = Arc::new(ScriptedCaller::new());
        caller
            .respond("getMe", me())
            .respond("getUpdates", json!([message(41, 1)]))
            .respond_raw(
                "getUpdates",
                r#"{"ok":false,"error_code":409,"description":"Conflict"}"#,
            )
            .respond("getUpdates", json!([]));
        let session = session(&caller);

        let err = session.start().await.unwrap_err();
        assert_eq!(err.as_api().unwrap().code, 409);
        assert_eq!(session.offset(), 42);

        stop_on_poll(&caller, &session, 1);
        session.start().await.unwrap();

        assert_eq!(caller.calls("getMe"), 1);
        let polls = caller.requests_for("getUpdates");
        assert_eq!(poll_offset(&polls[2].body), 42);
    }

    #[tokio::test]
    async fn test_start_after_stop_is_invalid() {
        let caller = Arc::new(ScriptedCaller::new());
        caller.respond("getMe", me());
        let session = session(&caller);
        session.stop();
        session.start().await.unwrap();

        let err = session.start().await.unwrap_err();
        assert!(matches!(err, Error::InvalidState(SessionState::Stopped)));
    }

    #[tokio::test]
    async fn test_malformed_update_id_stops_after_earlier_envelopes() {
        let caller = Arc::new(ScriptedCaller::new());
        caller.respond("getMe", me()).respond(
            "getUpdates",
            json!([
                message(5, 1),
                {"update_id": "bad", "message": {}},
                message(7, 2)
            ]),
        );

        let handled = Arc::new(AtomicUsize::new(0));
        let mut session = session(&caller);
        let counter = Arc::clone(&handled);
        session
            .on(UpdateKind::Message, move |_: Message| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            })
            .unwrap();

        let err = session.start().await.unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::MissingUpdateId(_))
        ));
        assert_eq!(handled.load(Ordering::SeqCst), 1);
        assert_eq!(session.offset(), 6);
        assert_eq!(session.state(), SessionState::NotStarted);
    }

    #[tokio::test]
    async fn test_poll_timeout_bounds_each_poll_request() {
        let caller = Arc::new(ScriptedCaller::new());
        caller.respond("getMe", me()).respond("getUpdates", json!([]));
        let session = session(&caller)
            .with_poll_timeout(Duration::from_secs(50))
            .with_request_timeout(Duration::from_secs(5));
        stop_on_poll(&caller, &session, 1);

        session.start().await.unwrap();

        assert_eq!(caller.requests_for("getMe")[0].timeout, None);
        let polls = caller.requests_for("getUpdates");
        assert_eq!(polls[0].timeout, Some(Duration::from_secs(55)));
    }

    #[tokio::test]
    async fn test_fractional_poll_timeout_rounds_up() {
        let caller = Arc::new(ScriptedCaller::new());
        caller.respond("getMe", me()).respond("getUpdates", json!([]));
        let session = session(&caller)
            .with_poll_timeout(Duration::from_millis(500))
            .with_request_timeout(Duration::from_secs(2));
        stop_on_poll(&caller, &session, 1);

        session.start().await.unwrap();

        let polls = caller.requests_for("getUpdates");
        let Body::Json(body) = &polls[0].body else {
            panic!("expected JSON body");
        };
        assert_eq!(body["timeout"], 1);
        assert_eq!(polls[0].timeout, Some(Duration::from_secs(3)));
        assert_eq!(poll_secs(Duration::ZERO), 0);
        assert_eq!(poll_secs(Duration::from_secs(10)), 10);
    }

    #[tokio::test]
    async fn test_identity_handle_sees_user_after_start() {
        let caller = Arc::new(ScriptedCaller::new());
        caller.respond("getMe", me());
        let session = session(&caller);
        let identity = session.identity();
        assert!(identity.display_name().is_none());

        session.stop();
        session.start().await.unwrap();

        assert_eq!(identity.get().unwrap().id, 7);
        assert_eq!(identity.display_name(), Some("courier_bot"));
    }

    #[tokio::test]
    async fn test_allowed_updates_follow_registrations() {
        let caller = Arc::new(ScriptedCaller::new());
        caller.respond("getMe", me()).respond("getUpdates", json!([]));
        let mut session = session(&caller).with_poll_timeout(Duration::from_secs(25));
        session.handle("callback_query", |_: Value| async {}).unwrap();
        session.on(UpdateKind::Message, |_: Message| async {}).unwrap();
        stop_on_poll(&caller, &session, 1);

        session.start().await.unwrap();

        let polls = caller.requests_for("getUpdates");
        let Body::Json(body) = &polls[0].body else {
            panic!("expected JSON body");
        };
        assert_eq!(body["timeout"], 25);
        assert_eq!(body["allowed_updates"], json!(["callback_query", "message"]));
    }

    #[test]
    fn test_from_config_rejects_bad_token() {
        let err = Session::from_config(&BotConfig::new("not-a-token")).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_from_config() {
        let session = Session::from_config(&BotConfig::new("123:abc")).unwrap();
        assert_eq!(session.poll_timeout, DEFAULT_POLL_TIMEOUT);
        assert_eq!(session.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(session.state(), SessionState::NotStarted);
    }
}
