//! HTTP transport over `reqwest`.
//!
//! Thin wrapper that turns a `Request` into one HTTP call against the
//! configured base URL. Pure parsing in `parse_response` / `parse_error_body`
//! for testability.

#[cfg(test)]
#[path = "http_test.rs"]
mod http_test;

use std::time::Duration;

use super::request::{ERROR_FIELDS, ERROR_MESSAGE, Method, Request};
use super::transport::Transport;
use super::types::{ApiError, FieldErrors};

const UNPROCESSABLE: u16 = 422;

// =============================================================================
// CLIENT
// =============================================================================

pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Build a client with the given timeouts.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::ClientBuild` if the TLS backend fails to initialize.
    pub fn new(base_url: impl Into<String>, request_timeout: Duration, connect_timeout: Duration) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| ApiError::ClientBuild(e.to_string()))?;
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Ok(Self { http, base_url })
    }

    /// Base URL plus path; the query is attached by `builder`.
    #[must_use]
    pub fn url_for(&self, request: &Request) -> String {
        format!("{}{}", self.base_url, request.path)
    }

    /// The reqwest call for `request`, ready to send.
    fn builder(&self, request: &Request) -> reqwest::RequestBuilder {
        let url = self.url_for(request);
        let builder = match request.method {
            Method::Get => self.http.get(&url),
            Method::Post => self.http.post(&url),
            Method::Patch => self.http.patch(&url),
            Method::Delete => self.http.delete(&url),
        };
        let builder = builder
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&request.query);
        match &request.body {
            Some(body) => builder.json(body),
            None => builder,
        }
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &Request) -> Result<serde_json::Value, ApiError> {
        let builder = self.builder(request);

        tracing::debug!(method = %request.method, path = %request.path, request_id = %request.id, "sending request");

        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        if !(200..300).contains(&status) {
            return Err(parse_error_body(status, &text));
        }

        parse_response(&text)
    }
}

// =============================================================================
// PARSING
// =============================================================================

/// Parse a success body. An empty body decodes to `{}`.
pub(crate) fn parse_response(text: &str) -> Result<serde_json::Value, ApiError> {
    if text.trim().is_empty() {
        return Ok(serde_json::Value::Object(serde_json::Map::new()));
    }
    serde_json::from_str(text).map_err(|e| ApiError::Parse(e.to_string()))
}

/// Map a non-2xx response to a typed error.
///
/// `{ "errors": { field: msg } }` becomes `Validation`; `{ "error": msg }`
/// becomes `Status` with that message; anything else keeps the raw body.
pub(crate) fn parse_error_body(status: u16, text: &str) -> ApiError {
    let Ok(body) = serde_json::from_str::<serde_json::Value>(text) else {
        return ApiError::Status { status, message: text.trim().to_owned() };
    };

    if let Some(fields) = body.get(ERROR_FIELDS).and_then(serde_json::Value::as_object) {
        let errors: FieldErrors = fields
            .iter()
            .map(|(field, message)| (field.clone(), field_message(message)))
            .collect();
        if !errors.is_empty() {
            return ApiError::Validation(errors);
        }
    }

    if let Some(message) = body.get(ERROR_MESSAGE).and_then(serde_json::Value::as_str) {
        return ApiError::Status { status, message: message.to_owned() };
    }

    if status == UNPROCESSABLE {
        return ApiError::Validation(FieldErrors::new());
    }

    ApiError::Status { status, message: text.trim().to_owned() }
}

/// Field messages arrive as a string or a list of strings.
fn field_message(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(items) => items
            .iter()
            .filter_map(serde_json::Value::as_str)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}
