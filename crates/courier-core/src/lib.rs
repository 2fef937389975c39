//! # Courier Core
//!
//! Protocol building blocks for the Courier bot client.
//!
//! This crate knows how requests are encoded, how responses and inbound
//! updates are decoded, and how updates are routed to handlers. It does not
//! open sockets: the wire is reached through the [`ApiCaller`] seam, which
//! `courier-transport` implements over HTTP.
//!
//! ## Layout
//!
//! - **Codec**: request fields and bodies, response envelopes ([`Fields`], [`Body`], [`ResponseEnvelope`])
//! - **Invoker**: one remote call per [`Client::call`] through an [`ApiCaller`]
//! - **Updates**: inbound envelopes and the acknowledgment watermark ([`Update`], [`Cursor`])
//! - **Dispatch**: kind-based handler registry ([`Dispatcher`], [`Handler`])
//! - **Records**: the few remote shapes the runtime needs ([`User`], [`Message`], [`Chat`])
//!
//! ## Flow
//!
//! ```text
//! ┌──────────┐  getUpdates  ┌────────┐  Update  ┌────────────┐  payload  ┌─────────┐
//! │  Client  │─────────────▶│ Cursor │─────────▶│ Dispatcher │──────────▶│ Handler │
//! └──────────┘              └────────┘          └────────────┘           └─────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use courier_core::{Dispatcher, Message, UpdateKind};
//!
//! let mut dispatcher = Dispatcher::new();
//! dispatcher.on(UpdateKind::Message, |msg: Message| async move {
//!     println!("{}", msg.text_or_caption().unwrap_or_default());
//! })?;
//! ```

pub mod client;
pub mod codec;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod method;
pub mod model;
pub mod update;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::{ApiCaller, Client};
pub use codec::{
    APPLICATION_JSON, Body, Encoding, FieldValue, Fields, InputFile, MULTIPART_FORM_DATA, Part,
    ResponseEnvelope, ResponseParameters, ToFields,
};
pub use dispatcher::Dispatcher;
pub use error::{
    ApiError, BoxError, Error, ProtocolError, Result, SessionState, TransportError,
    TransportResult,
};
pub use handler::{BoxedHandler, ErasedHandler, Handler, HandlerResult, IntoOutcome, into_handler};
pub use method::{ChatId, GetMe, GetUpdates, Method, SendDocument, SendMessage, SendPhoto};
pub use model::{Chat, ChatType, Message, User};
pub use update::{Cursor, Update, UpdateKind};

/// Re-export of `futures::future::BoxFuture` for handler signatures.
pub use futures::future::BoxFuture;
