//! Transport codec: outbound request bodies and inbound response envelopes.
//!
//! Outbound values are flattened into an ordered list of [`Fields`] through
//! the [`ToFields`] contract, then turned into a [`Body`]:
//!
//! | Fields | [`Encoding::Auto`] | [`Encoding::Multipart`] |
//! |--------|--------------------|-------------------------|
//! | none | [`Body::Empty`] | [`Body::Empty`] |
//! | no files | [`Body::Json`] | [`Body::Multipart`] |
//! | at least one file | [`Body::Multipart`] | [`Body::Multipart`] |
//!
//! Inbound bodies are parsed into a [`ResponseEnvelope`] and classified as
//! success-with-result or an [`ApiError`].

use std::fmt;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ApiError, ProtocolError, Result};

/// Content type for JSON and empty bodies.
pub const APPLICATION_JSON: &str = "application/json";

/// Content type for multipart bodies (the boundary is added by the transport).
pub const MULTIPART_FORM_DATA: &str = "multipart/form-data";

// =============================================================================
// InputFile
// =============================================================================

/// A byte stream uploaded as a file part.
///
/// The payload is reference counted so request values can be re-encoded
/// without copying the file.
#[derive(Clone, PartialEq, Eq)]
pub struct InputFile {
    name: Option<String>,
    data: Arc<Vec<u8>>,
}

impl InputFile {
    /// Creates a file from an in-memory buffer.
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: None,
            data: Arc::new(data.into()),
        }
    }

    /// Drains a reader into a file.
    pub fn from_reader<R: Read>(mut reader: R) -> std::io::Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Ok(Self::from_bytes(data))
    }

    /// Reads a file from disk, using its file name as the upload name.
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await?;
        let file = Self::from_bytes(data);
        Ok(match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => file.with_name(name),
            None => file,
        })
    }

    /// Sets the filename reported in the multipart part.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Returns the explicit filename, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the file contents.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Returns the size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the file is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Consumes the file, returning the contents.
    pub fn into_bytes(self) -> Vec<u8> {
        Arc::unwrap_or_clone(self.data)
    }
}

impl fmt::Debug for InputFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputFile")
            .field("name", &self.name)
            .field("len", &self.data.len())
            .finish()
    }
}

// =============================================================================
// Fields
// =============================================================================

/// The value of one outbound request field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Sent verbatim as a text part or JSON string.
    Text(String),
    /// Structured value; JSON-encoded when sent as a text part.
    Json(Value),
    /// Uploaded as a file part.
    File(InputFile),
}

impl FieldValue {
    /// Returns `true` for file values.
    pub fn is_file(&self) -> bool {
        matches!(self, Self::File(_))
    }

    fn echo(&self) -> Value {
        match self {
            Self::Text(s) => Value::String(s.clone()),
            Self::Json(v) => v.clone(),
            Self::File(f) => Value::String(file_placeholder(f.name(), f.len())),
        }
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<InputFile> for FieldValue {
    fn from(value: InputFile) -> Self {
        Self::File(value)
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => Self::Text(s),
            other => Self::Json(other),
        }
    }
}

/// Ordered list of named request fields.
///
/// ```rust,ignore
/// let fields = Fields::new()
///     .text("chat_id", "42")
///     .json("reply_markup", &markup)?
///     .file("photo", InputFile::from_bytes(png));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields(Vec<(String, FieldValue)>);

impl Fields {
    /// Creates an empty field list.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Builds fields from any serializable record.
    ///
    /// The value must serialize to a JSON object (or `null`, giving no
    /// fields). String members become text fields, `null` members are
    /// skipped and everything else is kept as structured JSON.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        match serde_json::to_value(value)? {
            Value::Null => Ok(Self::new()),
            Value::Object(map) => Ok(Self::from_map(map)),
            other => Err(ProtocolError::Encode(format!(
                "expected an object, got {}",
                json_type_name(&other)
            ))
            .into()),
        }
    }

    fn from_map(map: Map<String, Value>) -> Self {
        map.into_iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k, FieldValue::from(v)))
            .collect()
    }

    /// Appends a field.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.0.push((name.into(), value.into()));
    }

    /// Appends a text field.
    pub fn text(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.push(name, FieldValue::Text(value.to_string()));
        self
    }

    /// Appends a text field when `value` is `Some`.
    pub fn text_opt<V: ToString>(self, name: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(v) => self.text(name, v),
            None => self,
        }
    }

    /// Appends a structured field.
    pub fn json<T: Serialize + ?Sized>(mut self, name: impl Into<String>, value: &T) -> Result<Self> {
        self.push(name, FieldValue::Json(serde_json::to_value(value)?));
        Ok(self)
    }

    /// Appends a file field.
    pub fn file(mut self, name: impl Into<String>, file: InputFile) -> Self {
        self.push(name, FieldValue::File(file));
        self
    }

    /// Returns the number of fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` if at least one field is a file.
    pub fn has_files(&self) -> bool {
        self.0.iter().any(|(_, v)| v.is_file())
    }

    /// Looks up a field by name.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.0.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Iterates over the fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Converts the fields into a request body.
    pub fn into_body(self, encoding: Encoding) -> Body {
        if self.is_empty() {
            return Body::Empty;
        }
        if encoding == Encoding::Auto && !self.has_files() {
            let map = self.0.into_iter().map(|(k, v)| (k, v.echo())).collect();
            return Body::Json(Value::Object(map));
        }
        let parts = self
            .0
            .into_iter()
            .map(|(name, value)| match value {
                FieldValue::Text(value) => Part::Text { name, value },
                FieldValue::Json(v) => Part::Text {
                    name,
                    value: v.to_string(),
                },
                FieldValue::File(file) => Part::File {
                    filename: file.name().map_or_else(|| name.clone(), str::to_string),
                    name,
                    file,
                },
            })
            .collect();
        Body::Multipart(parts)
    }
}

impl FromIterator<(String, FieldValue)> for Fields {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Fields {
    type Item = (String, FieldValue);
    type IntoIter = std::vec::IntoIter<(String, FieldValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

// =============================================================================
// ToFields
// =============================================================================

/// Conversion of an outbound request value into request fields.
///
/// Record types that never carry files can delegate to
/// [`Fields::from_serialize`]; types with file members build their
/// [`Fields`] by hand.
pub trait ToFields {
    /// Returns the fields of this request.
    fn to_fields(&self) -> Result<Fields>;
}

impl ToFields for () {
    fn to_fields(&self) -> Result<Fields> {
        Ok(Fields::new())
    }
}

impl ToFields for Fields {
    fn to_fields(&self) -> Result<Fields> {
        Ok(self.clone())
    }
}

impl ToFields for Value {
    fn to_fields(&self) -> Result<Fields> {
        Fields::from_serialize(self)
    }
}

impl ToFields for Map<String, Value> {
    fn to_fields(&self) -> Result<Fields> {
        Ok(Fields::from_map(self.clone()))
    }
}

impl<T: ToFields + ?Sized> ToFields for &T {
    fn to_fields(&self) -> Result<Fields> {
        (**self).to_fields()
    }
}

impl<T: ToFields> ToFields for Option<T> {
    fn to_fields(&self) -> Result<Fields> {
        match self {
            Some(v) => v.to_fields(),
            None => Ok(Fields::new()),
        }
    }
}

// =============================================================================
// Body
// =============================================================================

/// How non-empty requests without files are encoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// JSON unless a file is present.
    #[default]
    Auto,
    /// Always multipart for non-empty requests.
    Multipart,
}

/// One part of a multipart body.
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    /// A plain text part.
    Text {
        /// Form field name.
        name: String,
        /// Part contents.
        value: String,
    },
    /// A file part.
    File {
        /// Form field name.
        name: String,
        /// Filename reported in `Content-Disposition`.
        filename: String,
        /// File contents.
        file: InputFile,
    },
}

impl Part {
    /// Returns the form field name.
    pub fn name(&self) -> &str {
        match self {
            Self::Text { name, .. } | Self::File { name, .. } => name,
        }
    }
}

/// An encoded request body, ready for a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// No body at all.
    Empty,
    /// A single JSON document.
    Json(Value),
    /// A multipart form.
    Multipart(Vec<Part>),
}

impl Body {
    /// Returns the content type tag for this body.
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Empty | Self::Json(_) => APPLICATION_JSON,
            Self::Multipart(_) => MULTIPART_FORM_DATA,
        }
    }

    /// Returns `true` for multipart bodies.
    pub fn is_multipart(&self) -> bool {
        matches!(self, Self::Multipart(_))
    }

    /// Pretty-printed rendering for logs and error messages.
    pub fn echo(&self) -> String {
        let value = match self {
            Self::Empty => Value::Null,
            Self::Json(v) => v.clone(),
            Self::Multipart(parts) => Value::Object(
                parts
                    .iter()
                    .map(|part| match part {
                        Part::Text { name, value } => (name.clone(), Value::String(value.clone())),
                        Part::File { name, filename, file } => (
                            name.clone(),
                            Value::String(file_placeholder(Some(filename), file.len())),
                        ),
                    })
                    .collect(),
            ),
        };
        pretty(&value)
    }
}

fn file_placeholder(name: Option<&str>, len: usize) -> String {
    match name {
        Some(name) => format!("<file {name}, {len} bytes>"),
        None => format!("<file, {len} bytes>"),
    }
}

// =============================================================================
// ResponseEnvelope
// =============================================================================

/// Extra hints attached to failed responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ResponseParameters {
    /// The group moved to a supergroup with this identifier.
    #[serde(default)]
    pub migrate_to_chat_id: Option<i64>,
    /// Seconds to wait before repeating the request.
    #[serde(default)]
    pub retry_after: Option<u64>,
}

/// The remote API's response envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseEnvelope {
    /// Whether the call succeeded.
    pub ok: bool,
    /// Result fragment, present on success.
    #[serde(default)]
    pub result: Option<Value>,
    /// Error code, present on failure.
    #[serde(default)]
    pub error_code: i64,
    /// Error description, present on failure.
    #[serde(default)]
    pub description: String,
    /// Optional throttling/migration hints.
    #[serde(default)]
    pub parameters: Option<ResponseParameters>,
}

impl ResponseEnvelope {
    /// Parses a raw response body.
    pub fn decode(method: &str, bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|source| {
            ProtocolError::Envelope {
                method: method.to_string(),
                source,
            }
            .into()
        })
    }

    /// Classifies the envelope, returning the result fragment on success.
    ///
    /// `request` is only rendered when the remote reported a failure.
    pub fn into_result(self, method: &str, request: impl FnOnce() -> String) -> Result<Value> {
        if self.ok {
            return Ok(self.result.unwrap_or(Value::Null));
        }
        let parameters = self.parameters.unwrap_or_default();
        Err(ApiError {
            method: method.to_string(),
            code: self.error_code,
            description: self.description,
            request: request(),
            retry_after: parameters.retry_after,
            migrate_to_chat_id: parameters.migrate_to_chat_id,
        }
        .into())
    }
}

// =============================================================================
// Pretty printing
// =============================================================================

/// Pretty-prints a JSON value with two-space indentation.
pub fn pretty(value: &Value) -> String {
    let mut out = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    out.push('\n');
    out
}

/// Pretty-prints a raw body, falling back to lossy UTF-8 if it is not JSON.
pub fn pretty_json(bytes: &[u8]) -> String {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(value) => pretty(&value),
        Err(_) => String::from_utf8_lossy(bytes).into_owned(),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Outbound {
        chat_id: i64,
        text: String,
        disable_notification: bool,
        entities: Vec<String>,
    }

    fn outbound() -> Outbound {
        Outbound {
            chat_id: 42,
            text: "hello".into(),
            disable_notification: true,
            entities: vec!["bold".into()],
        }
    }

    #[test]
    fn test_empty_fields_give_empty_json_body() {
        let body = ().to_fields().unwrap().into_body(Encoding::Auto);
        assert_eq!(body, Body::Empty);
        assert_eq!(body.content_type(), "application/json");

        let forced = Fields::new().into_body(Encoding::Multipart);
        assert_eq!(forced, Body::Empty);
    }

    #[test]
    fn test_file_and_text_give_multipart() {
        let body = Fields::new()
            .text("chat_id", 42)
            .file("photo", InputFile::from_bytes(vec![1, 2, 3]))
            .into_body(Encoding::Auto);

        assert_eq!(body.content_type(), "multipart/form-data");
        let Body::Multipart(parts) = body else {
            panic!("expected multipart body");
        };
        assert_eq!(parts.len(), 2);
        let files: Vec<_> = parts
            .iter()
            .filter(|p| matches!(p, Part::File { .. }))
            .collect();
        assert_eq!(files.len(), 1);
        match files[0] {
            Part::File { name, filename, file } => {
                assert_eq!(name, "photo");
                assert_eq!(filename, "photo");
                assert_eq!(file.bytes(), &[1, 2, 3]);
            }
            Part::Text { .. } => unreachable!(),
        }
        assert!(parts.contains(&Part::Text {
            name: "chat_id".into(),
            value: "42".into()
        }));
    }

    #[test]
    fn test_explicit_filename_wins() {
        let body = Fields::new()
            .file("document", InputFile::from_bytes("abc").with_name("report.txt"))
            .into_body(Encoding::Auto);
        let Body::Multipart(parts) = body else {
            panic!("expected multipart body");
        };
        assert!(matches!(&parts[0], Part::File { filename, .. } if filename == "report.txt"));
    }

    #[test]
    fn test_json_roundtrip_keeps_fields() {
        let fields = Fields::from_serialize(&outbound()).unwrap();
        let Body::Json(value) = fields.into_body(Encoding::Auto) else {
            panic!("expected JSON body");
        };
        let echoed: Outbound = serde_json::from_value(value).unwrap();
        assert_eq!(echoed, outbound());
    }

    #[test]
    fn test_multipart_roundtrip_keeps_fields() {
        let fields = Fields::from_serialize(&outbound()).unwrap();
        let Body::Multipart(parts) = fields.into_body(Encoding::Multipart) else {
            panic!("expected multipart body");
        };

        // A multipart receiver sees strings; structured values are JSON text.
        let mut map = Map::new();
        for part in parts {
            if let Part::Text { name, value } = part {
                let decoded = if name == "text" {
                    Value::String(value)
                } else {
                    serde_json::from_str(&value).unwrap()
                };
                map.insert(name, decoded);
            }
        }
        let echoed: Outbound = serde_json::from_value(Value::Object(map)).unwrap();
        assert_eq!(echoed, outbound());
    }

    #[test]
    fn test_from_serialize_rejects_non_objects() {
        let err = Fields::from_serialize(&[1, 2, 3]).unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolError::Encode(_))));
        assert!(Fields::from_serialize(&Value::Null).unwrap().is_empty());
    }

    #[test]
    fn test_from_serialize_skips_nulls() {
        let fields = json!({"chat_id": 1, "caption": null}).to_fields().unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields.get("chat_id"), Some(&FieldValue::Json(json!(1))));
    }

    #[test]
    fn test_echo_hides_file_contents() {
        let body = Fields::new()
            .text("chat_id", 1)
            .file("photo", InputFile::from_bytes(vec![0; 16]).with_name("a.png"))
            .into_body(Encoding::Auto);
        let echo = body.echo();
        assert!(echo.contains("<file a.png, 16 bytes>"));
        assert!(echo.contains("\"chat_id\": \"1\""));
    }

    #[test]
    fn test_envelope_failure_becomes_api_error() {
        let raw = br#"{"ok":false,"error_code":429,"description":"Too Many Requests","parameters":{"retry_after":3}}"#;
        let envelope = ResponseEnvelope::decode("sendMessage", raw).unwrap();
        let err = envelope
            .into_result("sendMessage", || "{}".into())
            .unwrap_err();
        let api = err.as_api().unwrap();
        assert_eq!(api.code, 429);
        assert_eq!(api.description, "Too Many Requests");
        assert_eq!(api.method, "sendMessage");
        assert_eq!(api.retry_after, Some(3));
    }

    #[test]
    fn test_envelope_success_without_result_is_null() {
        let envelope = ResponseEnvelope::decode("close", br#"{"ok":true}"#).unwrap();
        let value = envelope
            .into_result("close", || unreachable!("no echo on success"))
            .unwrap();
        assert_eq!(value, Value::Null);
    }

    #[test]
    fn test_malformed_envelope_is_protocol_error() {
        let err = ResponseEnvelope::decode("getMe", b"<html>").unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::Envelope { ref method, .. }) if method == "getMe"
        ));
    }

    #[test]
    fn test_pretty_json_falls_back_to_text() {
        assert_eq!(pretty_json(b"not json"), "not json");
        assert_eq!(pretty_json(br#"{"a":1}"#), "{\n  \"a\": 1\n}\n");
    }
}
