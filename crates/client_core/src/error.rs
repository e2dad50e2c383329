//! Client error type and the conversion of failures into display text.

use std::{error::Error as StdError, iter, path::PathBuf};

use reqwest::{Method, Response, StatusCode};
use serde_json::Value;
use shared::error::ErrorBody;
use thiserror::Error;
use url::Url;

/// Fields probed for a message in a structured error body, most specific first.
const MESSAGE_FIELDS: [&str; 3] = ["message", "error", "detail"];

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{method} {url} returned {status}")]
    Status {
        method: Method,
        url: Url,
        status: StatusCode,
        body: ResponseBody,
    },
    #[error("failed to decode response body: {0}")]
    Decode(#[source] reqwest::Error),
    #[error("failed to read upload file {}: {source}", path.display())]
    ReadUpload {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid upload content type {mime_type:?}: {source}")]
    InvalidContentType {
        mime_type: String,
        #[source]
        source: reqwest::Error,
    },
}

impl ApiError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(err) | Self::Decode(err) => err.status(),
            _ => None,
        }
    }

    pub fn body(&self) -> Option<&ResponseBody> {
        match self {
            Self::Status { body, .. } => Some(body),
            _ => None,
        }
    }

    /// The backend's structured error payload, when the body carries one.
    pub fn server_error(&self) -> Option<ErrorBody> {
        match self.body()? {
            ResponseBody::Json(value) => serde_json::from_value(value.clone()).ok(),
            _ => None,
        }
    }
}

/// Body captured from a rejected response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Empty,
    Text(String),
    Json(Value),
}

impl ResponseBody {
    /// Reads the rejected response. The body is decoded as JSON whenever it
    /// holds an object, array or string, whatever the declared content type.
    pub(crate) async fn read(response: Response) -> Self {
        match response.bytes().await {
            Ok(bytes) if !bytes.is_empty() => Self::from_bytes(&bytes),
            _ => Self::Empty,
        }
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(bytes) {
            Ok(value @ (Value::Object(_) | Value::Array(_) | Value::String(_))) => {
                Self::Json(value)
            }
            _ => Self::Text(String::from_utf8_lossy(bytes).into_owned()),
        }
    }

    /// Message carried by the body, if it has a recognised shape.
    ///
    /// A plain string body is the message itself. A JSON object is probed for
    /// `message`, then `error`, then `detail`; the first non-empty string wins.
    pub fn display_message(&self) -> Option<&str> {
        match self {
            Self::Text(text) | Self::Json(Value::String(text)) => non_empty(text),
            Self::Json(Value::Object(fields)) => MESSAGE_FIELDS
                .iter()
                .find_map(|field| fields.get(*field).and_then(Value::as_str).and_then(non_empty)),
            _ => None,
        }
    }
}

fn non_empty(text: &str) -> Option<&str> {
    (!text.is_empty()).then_some(text)
}

/// Converts any caught failure into text for display.
///
/// The source chain is searched for an [`ApiError`] carrying a response body;
/// its message is returned when recognised, otherwise `fallback`.
pub fn resolve_error(err: &(dyn StdError + 'static), fallback: &str) -> String {
    iter::successors(Some(err), |&err| err.source())
        .find_map(|err| err.downcast_ref::<ApiError>())
        .and_then(ApiError::body)
        .and_then(ResponseBody::display_message)
        .map_or_else(|| fallback.to_string(), str::to_string)
}

#[cfg(test)]
#[path = "tests/error_tests.rs"]
mod tests;
