//! Inbound update envelopes and the delivery cursor.
//!
//! An update is a JSON object with an integer `update_id` and exactly one
//! payload field naming its kind:
//!
//! ```json
//! { "update_id": 815, "message": { "message_id": 3, "text": "hi", ... } }
//! ```
//!
//! The [`Cursor`] is the acknowledgment watermark sent as `offset` on every
//! poll; the remote source never redelivers an update whose identifier is
//! below it.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{Error, ProtocolError, Result};

// =============================================================================
// UpdateKind
// =============================================================================

macro_rules! update_kinds {
    ($( $(#[$doc:meta])* $variant:ident => $name:literal, )*) => {
        /// The known update kinds, keyed by their payload field name.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum UpdateKind {
            $( $(#[$doc])* $variant, )*
        }

        impl UpdateKind {
            /// Every known kind.
            pub const ALL: &'static [UpdateKind] = &[$(UpdateKind::$variant,)*];

            /// Returns the payload field name of this kind.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( Self::$variant => $name, )*
                }
            }
        }

        impl FromStr for UpdateKind {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $( $name => Ok(Self::$variant), )*
                    other => Err(Error::configuration(format!("unknown update kind `{other}`"))),
                }
            }
        }
    };
}

update_kinds! {
    /// New incoming message.
    Message => "message",
    /// A known message was edited.
    EditedMessage => "edited_message",
    /// New channel post.
    ChannelPost => "channel_post",
    /// A known channel post was edited.
    EditedChannelPost => "edited_channel_post",
    /// Incoming inline query.
    InlineQuery => "inline_query",
    /// An inline result was chosen by a user.
    ChosenInlineResult => "chosen_inline_result",
    /// Callback query from an inline keyboard button.
    CallbackQuery => "callback_query",
    /// Shipping query for a flexible-price invoice.
    ShippingQuery => "shipping_query",
    /// Pre-checkout query.
    PreCheckoutQuery => "pre_checkout_query",
    /// Poll state changed.
    Poll => "poll",
    /// A user changed their poll answer.
    PollAnswer => "poll_answer",
    /// The bot's own chat membership changed.
    MyChatMember => "my_chat_member",
    /// A chat member's status changed.
    ChatMember => "chat_member",
    /// A request to join a chat was sent.
    ChatJoinRequest => "chat_join_request",
}

impl fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for UpdateKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for UpdateKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Update
// =============================================================================

/// One inbound event envelope.
///
/// Payload fragments stay undecoded until a handler asks for them; fields
/// that are not known kinds are kept as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    id: i64,
    fields: Map<String, Value>,
}

impl Update {
    /// Builds an update from a raw envelope object.
    ///
    /// A missing or non-integer `update_id` is a [`ProtocolError`].
    pub fn from_raw(mut fields: Map<String, Value>) -> Result<Self> {
        let Some(id) = Self::raw_id(&fields) else {
            return Err(ProtocolError::MissingUpdateId(Value::Object(fields).to_string()).into());
        };
        fields.remove("update_id");
        Ok(Self { id, fields })
    }

    /// Reads the `update_id` of a raw envelope without consuming it.
    pub fn raw_id(fields: &Map<String, Value>) -> Option<i64> {
        match fields.get("update_id") {
            Some(Value::Number(n)) if n.is_i64() => n.as_i64(),
            Some(Value::Number(n)) if n.is_u64() => n.as_u64().and_then(|v| i64::try_from(v).ok()),
            _ => None,
        }
    }

    /// Splits a `getUpdates` result into raw envelope objects.
    ///
    /// Identifiers are not checked here; see [`Update::from_raw`].
    pub fn raw_batch(value: Value) -> Result<Vec<Map<String, Value>>> {
        serde_json::from_value(value).map_err(|source| {
            ProtocolError::Result {
                method: "getUpdates".to_string(),
                source,
            }
            .into()
        })
    }

    /// Decodes a batch of envelopes, failing on the first malformed one.
    pub fn batch_from_value(value: Value) -> Result<Vec<Self>> {
        Self::raw_batch(value)?
            .into_iter()
            .map(Self::from_raw)
            .collect()
    }

    /// Returns the delivery identifier.
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Returns the raw fragment for a field name, if present and not `null`.
    pub fn fragment(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).filter(|v| !v.is_null())
    }

    /// Returns the raw fragment for a kind, if present.
    pub fn payload(&self, kind: UpdateKind) -> Option<&Value> {
        self.fragment(kind.as_str())
    }

    /// Returns `true` if the envelope carries the given kind.
    pub fn has(&self, kind: UpdateKind) -> bool {
        self.payload(kind).is_some()
    }

    /// Returns the first known kind present in the envelope.
    pub fn kind(&self) -> Option<UpdateKind> {
        UpdateKind::ALL.iter().copied().find(|k| self.has(*k))
    }

    /// Returns the envelope as a JSON object, including `update_id`.
    pub fn to_value(&self) -> Value {
        let mut map = Map::with_capacity(self.fields.len() + 1);
        map.insert("update_id".into(), Value::from(self.id));
        map.extend(self.fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        Value::Object(map)
    }
}

// =============================================================================
// Cursor
// =============================================================================

/// The delivery-acknowledgment watermark.
///
/// Written only by the update loop; readable from anywhere.
#[derive(Debug, Default)]
pub struct Cursor(AtomicI64);

impl Cursor {
    /// Creates a cursor at offset zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the offset to send with the next poll.
    pub fn offset(&self) -> i64 {
        self.0.load(Ordering::Acquire)
    }

    /// Acknowledges an update, moving the offset past it.
    ///
    /// The offset never moves backwards.
    pub fn advance(&self, update_id: i64) -> i64 {
        let next = update_id.saturating_add(1);
        self.0.fetch_max(next, Ordering::AcqRel).max(next)
    }
}
