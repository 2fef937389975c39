//! Typed remote methods.
//!
//! A [`Method`] couples a request value with its remote name and result
//! type, so [`Client::send`](crate::Client::send) can call it without
//! spelling either out.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::{Fields, InputFile, ToFields};
use crate::error::Result;
use crate::model::{Message, User};
use crate::update::UpdateKind;

/// A remote operation with a typed result.
pub trait Method: ToFields {
    /// Remote method name, e.g. `sendMessage`.
    const NAME: &'static str;

    /// Shape of the `result` fragment.
    type Response: DeserializeOwned;
}

/// Target chat: numeric identifier or `@username` of a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatId {
    /// Numeric chat identifier.
    Id(i64),
    /// Public username, including the leading `@`.
    Username(String),
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Username(name) => f.write_str(name),
        }
    }
}

impl From<i64> for ChatId {
    fn from(id: i64) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for ChatId {
    fn from(name: &str) -> Self {
        Self::Username(name.to_string())
    }
}

impl From<String> for ChatId {
    fn from(name: String) -> Self {
        Self::Username(name)
    }
}

// =============================================================================
// getMe
// =============================================================================

/// Returns the account the token belongs to.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetMe;

impl ToFields for GetMe {
    fn to_fields(&self) -> Result<Fields> {
        Ok(Fields::new())
    }
}

impl Method for GetMe {
    const NAME: &'static str = "getMe";
    type Response = User;
}

// =============================================================================
// getUpdates
// =============================================================================

/// Long-polls for pending updates.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GetUpdates {
    /// First update identifier to return; earlier ones are acknowledged.
    pub offset: i64,
    /// Seconds the server may hold the request open.
    pub timeout: u64,
    /// Maximum number of updates to return (1–100).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    /// Kinds to receive; `None` keeps the server's current selection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_updates: Option<Vec<UpdateKind>>,
}

impl ToFields for GetUpdates {
    fn to_fields(&self) -> Result<Fields> {
        Fields::from_serialize(self)
    }
}

impl Method for GetUpdates {
    const NAME: &'static str = "getUpdates";
    // Envelopes are validated one by one, see `Update::raw_batch`.
    type Response = Value;
}

// =============================================================================
// sendMessage
// =============================================================================

/// Sends a text message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SendMessage {
    /// Target chat.
    pub chat_id: ChatId,
    /// Message text.
    pub text: String,
    /// `MarkdownV2`, `HTML` or `Markdown`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_mode: Option<String>,
    /// Message to reply to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_message_id: Option<i64>,
    /// Deliver silently.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_notification: Option<bool>,
}

impl SendMessage {
    /// Creates a plain text message.
    pub fn new(chat_id: impl Into<ChatId>, text: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            text: text.into(),
            parse_mode: None,
            reply_to_message_id: None,
            disable_notification: None,
        }
    }

    /// Replies to the given message.
    pub fn reply_to(mut self, message_id: i64) -> Self {
        self.reply_to_message_id = Some(message_id);
        self
    }

    /// Sets the parse mode.
    pub fn parse_mode(mut self, mode: impl Into<String>) -> Self {
        self.parse_mode = Some(mode.into());
        self
    }
}

impl ToFields for SendMessage {
    fn to_fields(&self) -> Result<Fields> {
        Fields::from_serialize(self)
    }
}

impl Method for SendMessage {
    const NAME: &'static str = "sendMessage";
    type Response = Message;
}

// =============================================================================
// sendPhoto / sendDocument
// =============================================================================

/// Uploads a photo.
#[derive(Debug, Clone)]
pub struct SendPhoto {
    /// Target chat.
    pub chat_id: ChatId,
    /// Image to upload.
    pub photo: InputFile,
    /// Caption.
    pub caption: Option<String>,
}

impl SendPhoto {
    /// Creates a photo upload.
    pub fn new(chat_id: impl Into<ChatId>, photo: InputFile) -> Self {
        Self {
            chat_id: chat_id.into(),
            photo,
            caption: None,
        }
    }

    /// Sets the caption.
    pub fn caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }
}

impl ToFields for SendPhoto {
    fn to_fields(&self) -> Result<Fields> {
        Ok(Fields::new()
            .text("chat_id", &self.chat_id)
            .file("photo", self.photo.clone())
            .text_opt("caption", self.caption.as_ref()))
    }
}

impl Method for SendPhoto {
    const NAME: &'static str = "sendPhoto";
    type Response = Message;
}

/// Uploads a general file.
#[derive(Debug, Clone)]
pub struct SendDocument {
    /// Target chat.
    pub chat_id: ChatId,
    /// File to upload.
    pub document: InputFile,
    /// Caption.
    pub caption: Option<String>,
}

impl SendDocument {
    /// Creates a document upload.
    pub fn new(chat_id: impl Into<ChatId>, document: InputFile) -> Self {
        Self {
            chat_id: chat_id.into(),
            document,
            caption: None,
        }
    }

    /// Sets the caption.
    pub fn caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }
}

impl ToFields for SendDocument {
    fn to_fields(&self) -> Result<Fields> {
        Ok(Fields::new()
            .text("chat_id", &self.chat_id)
            .file("document", self.document.clone())
            .text_opt("caption", self.caption.as_ref()))
    }
}

impl Method for SendDocument {
    const NAME: &'static str = "sendDocument";
    type Response = Message;
}
