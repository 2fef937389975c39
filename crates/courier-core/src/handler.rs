//! Typed update handlers.
//!
//! Any async function or closure taking one deserializable payload is a
//! handler, as long as it returns `()` or `Result<(), E>`:
//!
//! ```rust,ignore
//! async fn on_message(msg: Message) -> anyhow::Result<()> {
//!     println!("{}", msg.text.unwrap_or_default());
//!     Ok(())
//! }
//!
//! async fn on_callback(query: serde_json::Value) {
//!     println!("{query}");
//! }
//! ```

use std::future::Future;
use std::marker::PhantomData;

use futures::FutureExt;
use futures::future::{BoxFuture, ready};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{BoxError, Error, ProtocolError, Result};
use crate::update::UpdateKind;

/// What a handler reports back to the loop.
pub type HandlerResult = std::result::Result<(), BoxError>;

// ============================================================================
// IntoOutcome - handler return values
// ============================================================================

/// Return types accepted from handlers.
pub trait IntoOutcome: Send {
    /// Converts the return value into a success/failure outcome.
    fn into_outcome(self) -> HandlerResult;
}

impl IntoOutcome for () {
    fn into_outcome(self) -> HandlerResult {
        Ok(())
    }
}

impl<E> IntoOutcome for std::result::Result<(), E>
where
    E: Into<BoxError> + Send,
{
    fn into_outcome(self) -> HandlerResult {
        self.map_err(Into::into)
    }
}

// ============================================================================
// Handler Trait
// ============================================================================

/// A function consuming one typed payload.
///
/// Implemented for every `Fn(T) -> impl Future<Output: IntoOutcome>` that is
/// `Clone + Send + Sync`. The single-input/single-output shape is enforced
/// here, at compile time.
pub trait Handler<T>: Clone + Send + Sync + 'static {
    /// Runs the handler.
    fn call(self, payload: T) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut, T> Handler<T> for F
where
    F: FnOnce(T) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: IntoOutcome,
    T: Send + 'static,
{
    fn call(self, payload: T) -> BoxFuture<'static, HandlerResult> {
        (self)(payload).map(IntoOutcome::into_outcome).boxed()
    }
}

// ============================================================================
// ErasedHandler - stored in the dispatcher
// ============================================================================

/// A handler with its payload type erased.
///
/// One implementation exists per registration: it owns the decoding of the
/// raw fragment into the payload type the handler was declared with.
pub trait ErasedHandler: Send + Sync {
    /// Decodes `payload` and runs the handler.
    fn call(&self, update_id: i64, payload: Value) -> BoxFuture<'static, Result<()>>;
}

/// Binds a handler to the kind it was registered for.
pub struct TypedHandler<H, T> {
    kind: UpdateKind,
    handler: H,
    _payload: PhantomData<fn() -> T>,
}

impl<H, T> TypedHandler<H, T>
where
    H: Handler<T>,
    T: DeserializeOwned + Send + 'static,
{
    /// Wraps `handler` for `kind`.
    pub fn new(kind: UpdateKind, handler: H) -> Self {
        Self {
            kind,
            handler,
            _payload: PhantomData,
        }
    }
}

impl<H, T> ErasedHandler for TypedHandler<H, T>
where
    H: Handler<T>,
    T: DeserializeOwned + Send + 'static,
{
    fn call(&self, update_id: i64, payload: Value) -> BoxFuture<'static, Result<()>> {
        let kind = self.kind;
        let payload: T = match serde_json::from_value(payload) {
            Ok(p) => p,
            Err(source) => {
                let err = ProtocolError::Payload {
                    kind,
                    update_id,
                    source,
                };
                return ready(Err(err.into())).boxed();
            }
        };
        self.handler
            .clone()
            .call(payload)
            .map(move |outcome| outcome.map_err(|source| Error::Handler { kind, source }))
            .boxed()
    }
}

/// A boxed, type-erased handler.
pub type BoxedHandler = Box<dyn ErasedHandler>;

/// Erases a handler for storage.
pub fn into_handler<H, T>(kind: UpdateKind, handler: H) -> BoxedHandler
where
    H: Handler<T>,
    T: DeserializeOwned + Send + 'static,
{
    Box::new(TypedHandler::new(kind, handler))
}
