//! Kind-based update dispatcher.
//!
//! The [`Dispatcher`] maps update kinds to typed handlers. For every inbound
//! [`Update`] it picks **one** handler:
//!
//! 1. Routes are scanned in registration order.
//! 2. The first route whose kind has a payload in the envelope wins.
//! 3. Its fragment is decoded into the handler's payload type and the handler
//!    runs to completion.
//!
//! Envelopes with no matching route are dropped without error.
//!
//! ```rust,ignore
//! let mut dispatcher = Dispatcher::new();
//! dispatcher.on(UpdateKind::Message, |msg: Message| async move {
//!     println!("{:?}", msg.text);
//! })?;
//! dispatcher.handle("callback_query", |q: serde_json::Value| async move {})?;
//! ```

use serde::de::DeserializeOwned;
use tracing::{Instrument, Level, debug, info, span};

use crate::codec::pretty;
use crate::error::{Error, Result};
use crate::handler::{BoxedHandler, Handler, into_handler};
use crate::update::{Update, UpdateKind};

struct Route {
    kind: UpdateKind,
    handler: BoxedHandler,
}

/// Registry of update handlers, at most one per kind.
#[derive(Default)]
pub struct Dispatcher {
    routes: Vec<Route>,
    debug: bool,
}

impl Dispatcher {
    /// Creates an empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables logging of every inbound envelope, handled or not.
    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    /// Registers a handler for `kind`.
    ///
    /// Fails with [`Error::Configuration`] if `kind` already has a handler;
    /// the existing registration is kept.
    pub fn on<T, H>(&mut self, kind: UpdateKind, handler: H) -> Result<()>
    where
        H: Handler<T>,
        T: DeserializeOwned + Send + 'static,
    {
        if self.contains(kind) {
            return Err(Error::configuration(format!(
                "handler for update kind `{kind}` has already been registered"
            )));
        }
        self.routes.push(Route {
            kind,
            handler: into_handler(kind, handler),
        });
        debug!(kind = %kind, "Registered update handler");
        Ok(())
    }

    /// Registers a handler by kind name, e.g. `"message"`.
    ///
    /// Unknown names fail with [`Error::Configuration`].
    pub fn handle<T, H>(&mut self, kind: &str, handler: H) -> Result<()>
    where
        H: Handler<T>,
        T: DeserializeOwned + Send + 'static,
    {
        self.on(kind.parse()?, handler)
    }

    /// Returns `true` if `kind` has a handler.
    pub fn contains(&self, kind: UpdateKind) -> bool {
        self.routes.iter().any(|r| r.kind == kind)
    }

    /// Returns the registered kinds in registration order.
    pub fn kinds(&self) -> Vec<UpdateKind> {
        self.routes.iter().map(|r| r.kind).collect()
    }

    /// Returns the number of registered handlers.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns `true` if no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Dispatches one update to the first matching handler.
    ///
    /// Returns `Ok(true)` if a handler ran, `Ok(false)` if none matched.
    /// Decoding failures and handler failures are returned as errors.
    pub async fn dispatch(&self, update: &Update) -> Result<bool> {
        let Some((route, payload)) = self
            .routes
            .iter()
            .find_map(|r| update.payload(r.kind).map(|p| (r, p)))
        else {
            if self.debug {
                info!(
                    update_id = update.id(),
                    "unhandled\n{}",
                    pretty(&update.to_value())
                );
            }
            return Ok(false);
        };

        if self.debug {
            info!(
                update_id = update.id(),
                kind = %route.kind,
                "{}\n{}",
                route.kind,
                pretty(&update.to_value())
            );
        }

        let span = span!(Level::DEBUG, "dispatch", update_id = update.id(), kind = %route.kind);
        route
            .handler
            .call(update.id(), payload.clone())
            .instrument(span)
            .await?;
        Ok(true)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("kinds", &self.kinds())
            .field("debug", &self.debug)
            .finish()
    }
}
