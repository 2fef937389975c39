//! HTTP [`ApiCaller`] backed by `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part as FormPart};
use tracing::{debug, warn};

use courier_core::{
    APPLICATION_JSON, ApiCaller, Body, Part, ResponseEnvelope, TransportError, TransportResult,
};

/// Default remote API base URL.
pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Longest slice of an error page kept in [`TransportError::Status`].
const MAX_ERROR_BODY: usize = 512;

/// [`ApiCaller`] for the bot HTTP API.
///
/// Every call is a synchronous `POST`: the HTTP response body is the
/// response envelope. Clones are not needed; wrap it in an `Arc` and share it.
pub struct HttpApiCaller {
    client: reqwest::Client,
    api_url: String,
    token: String,
}

impl HttpApiCaller {
    /// Creates a caller for `token` against `api_url`.
    ///
    /// `timeout` bounds a whole request unless the call passes its own; a
    /// long poll must pass one that exceeds the time the server holds it.
    pub fn new(
        api_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> TransportResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Io(e.without_url().to_string()))?;

        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    /// Returns the API base URL.
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.token, method)
    }

    /// Endpoint safe for logs and error messages.
    fn redacted(&self, method: &str) -> String {
        format!("{}/bot<token>/{}", self.api_url, method)
    }

    fn map_error(&self, method: &str, err: reqwest::Error) -> TransportError {
        let url = self.redacted(method);
        if err.is_timeout() {
            TransportError::Timeout { url }
        } else if err.is_connect() {
            TransportError::ConnectionFailed {
                url,
                reason: err.without_url().to_string(),
            }
        } else {
            TransportError::Io(err.without_url().to_string())
        }
    }
}

fn into_form(parts: &[Part]) -> Form {
    parts.iter().fold(Form::new(), |form, part| match part {
        Part::Text { name, value } => form.text(name.clone(), value.clone()),
        Part::File {
            name,
            filename,
            file,
        } => form.part(
            name.clone(),
            FormPart::bytes(file.bytes().to_vec()).file_name(filename.clone()),
        ),
    })
}

fn truncate(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    match text.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.into_owned(),
    }
}

#[async_trait]
impl ApiCaller for HttpApiCaller {
    async fn post(
        &self,
        method: &str,
        body: &Body,
        timeout: Option<Duration>,
    ) -> TransportResult<Vec<u8>> {
        debug!(method = %method, url = %self.redacted(method), ?timeout, "POST");

        let mut request = self.client.post(self.endpoint(method));
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let request = match body {
            Body::Empty => request.header(CONTENT_TYPE, APPLICATION_JSON),
            Body::Json(value) => request.json(value),
            Body::Multipart(parts) => request.multipart(into_form(parts)),
        };

        let response = request
            .send()
            .await
            .map_err(|e| self.map_error(method, e))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.map_error(method, e))?;

        // Rejected calls come back with 4xx statuses and a regular envelope.
        if !status.is_success() && ResponseEnvelope::decode(method, &bytes).is_err() {
            warn!(method = %method, status = status.as_u16(), "Non-envelope error response");
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: truncate(&bytes),
            });
        }

        Ok(bytes.to_vec())
    }
}

impl std::fmt::Debug for HttpApiCaller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpApiCaller")
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::{
        Client, Encoding, Error, Fields, GetMe, InputFile, SendMessage, SendPhoto,
    };
    use serde_json::json;
    use std::sync::Arc;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TOKEN: &str = "123:abc";

    fn caller(server: &MockServer) -> HttpApiCaller {
        HttpApiCaller::new(server.uri(), TOKEN, Duration::from_secs(5)).unwrap()
    }

    fn client(server: &MockServer) -> Client {
        Client::new(Arc::new(caller(server)))
    }

    fn ok(result: serde_json::Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": result}))
    }

    #[tokio::test]
    async fn test_empty_body_is_json_typed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/getMe"))
            .and(header("content-type", "application/json"))
            .respond_with(ok(json!({"id": 7, "first_name": "Bot", "is_bot": true})))
            .expect(1)
            .mount(&server)
            .await;

        let me = client(&server).send(&GetMe).await.unwrap();
        assert_eq!(me.id, 7);

        let requests = server.received_requests().await.unwrap();
        assert!(requests[0].body.is_empty());
    }

    #[tokio::test]
    async fn test_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .and(body_json(json!({"chat_id": 5, "text": "hi"})))
            .respond_with(ok(json!({
                "message_id": 1,
                "date": 0,
                "chat": {"id": 5, "type": "private"},
                "text": "hi"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let msg = client(&server)
            .send(&SendMessage::new(5_i64, "hi"))
            .await
            .unwrap();
        assert_eq!(msg.text.as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn test_multipart_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendPhoto"))
            .respond_with(ok(json!({
                "message_id": 2,
                "date": 0,
                "chat": {"id": 5, "type": "private"}
            })))
            .mount(&server)
            .await;

        let photo = InputFile::from_bytes(b"\x89PNG".to_vec()).with_name("cat.png");
        client(&server)
            .send(&SendPhoto::new(5_i64, photo))
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let content_type = requests[0]
            .headers
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap()
            .to_string();
        assert!(content_type.starts_with("multipart/form-data"));

        let body = String::from_utf8_lossy(&requests[0].body);
        assert!(body.contains("name=\"chat_id\""));
        assert!(body.contains("name=\"photo\"; filename=\"cat.png\""));
        assert!(!body.contains("name=\"caption\""));
    }

    #[tokio::test]
    async fn test_forced_multipart_sends_json_values_as_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/setMyCommands"))
            .respond_with(ok(json!(true)))
            .mount(&server)
            .await;

        let fields = Fields::new()
            .json("commands", &json!([{"command": "start"}]))
            .unwrap();
        let _: bool = client(&server)
            .with_encoding(Encoding::Multipart)
            .call("setMyCommands", &fields)
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&requests[0].body);
        assert!(body.contains("name=\"commands\""));
        assert!(body.contains(r#"[{"command":"start"}]"#));
    }

    #[tokio::test]
    async fn test_rejected_call_maps_to_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "ok": false,
                "error_code": 400,
                "description": "bad request"
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .send(&SendMessage::new(5_i64, "hi"))
            .await
            .unwrap_err();
        let api = err.as_api().unwrap();
        assert_eq!(api.code, 400);
        assert_eq!(api.description, "bad request");
        assert_eq!(api.method, "sendMessage");
    }

    #[tokio::test]
    async fn test_throttled_call_carries_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "ok": false,
                "error_code": 429,
                "description": "Too Many Requests: retry after 3",
                "parameters": {"retry_after": 3}
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .send(&SendMessage::new(5_i64, "hi"))
            .await
            .unwrap_err();
        assert_eq!(err.as_api().unwrap().retry_after, Some(3));
    }

    #[tokio::test]
    async fn test_error_page_maps_to_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>Bad Gateway</html>"))
            .mount(&server)
            .await;

        let err = caller(&server)
            .post("getMe", &Body::Empty, None)
            .await
            .unwrap_err();
        let TransportError::Status { status, body } = err else {
            panic!("expected status error, got {err:?}");
        };
        assert_eq!(status, 502);
        assert!(body.contains("Bad Gateway"));
    }

    #[tokio::test]
    async fn test_connection_failure_redacts_token() {
        let caller = HttpApiCaller::new("http://127.0.0.1:1", TOKEN, Duration::from_secs(5)).unwrap();
        let err = Client::new(Arc::new(caller)).send(&GetMe).await.unwrap_err();

        let Error::Transport(err) = err else {
            panic!("expected transport error, got {err:?}");
        };
        assert!(!err.to_string().contains(TOKEN));
    }

    #[tokio::test]
    async fn test_call_timeout_outlasts_client_default() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/getUpdates"))
            .respond_with(ok(json!([])).set_delay(Duration::from_millis(1500)))
            .mount(&server)
            .await;

        let caller = HttpApiCaller::new(server.uri(), TOKEN, Duration::from_millis(500)).unwrap();

        let err = caller
            .post("getUpdates", &Body::Empty, None)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Timeout { .. }), "{err:?}");

        let bytes = caller
            .post("getUpdates", &Body::Empty, Some(Duration::from_secs(5)))
            .await
            .unwrap();
        let envelope: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(envelope["result"], json!([]));
    }

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let caller = HttpApiCaller::new("https://example.org/", TOKEN, Duration::from_secs(1)).unwrap();
        assert_eq!(caller.endpoint("getMe"), "https://example.org/bot123:abc/getMe");
        assert_eq!(caller.redacted("getMe"), "https://example.org/bot<token>/getMe");
    }
}
