//! # Courier Transport
//!
//! Network transport for the Courier bot client.
//!
//! [`HttpApiCaller`] implements [`courier_core::ApiCaller`] over one shared
//! `reqwest` connection pool: each remote method is a `POST` to
//! `<api_url>/bot<token>/<method>` with a JSON or multipart body.

pub mod http;

pub use http::{DEFAULT_API_URL, HttpApiCaller};
