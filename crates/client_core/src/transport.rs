//! Request plumbing shared by the API client and the course store backend.

use std::{path::Path, sync::Arc, time::Duration};

use reqwest::{
    cookie::Jar,
    multipart::Part,
    redirect::Policy,
    Client, RequestBuilder, Response, StatusCode,
};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::{ApiError, ResponseBody};

const DEFAULT_USER_AGENT: &str = concat!("portal-client/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Origin the portal is served from; `/api` is appended for API calls.
    pub base_url: Url,
    pub user_agent: Option<String>,
    /// Absent means the transport default.
    pub timeout: Option<Duration>,
}

impl ClientSettings {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            user_agent: None,
            timeout: None,
        }
    }

    pub(crate) fn origin(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }
}

pub(crate) fn build_http_client(
    settings: &ClientSettings,
    cookies: Arc<Jar>,
    follow_redirects: bool,
) -> Result<Client, ApiError> {
    let mut builder = Client::builder()
        .cookie_provider(cookies)
        .user_agent(
            settings
                .user_agent
                .clone()
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
        );
    if !follow_redirects {
        builder = builder.redirect(Policy::none());
    }
    if let Some(timeout) = settings.timeout {
        builder = builder.timeout(timeout);
    }
    Ok(builder.build()?)
}

pub(crate) fn is_success(status: StatusCode) -> bool {
    status.is_success()
}

/// Sends one request. Statuses rejected by `accept` become [`ApiError::Status`]
/// with the response body captured for later display.
pub(crate) async fn execute(
    client: &Client,
    builder: RequestBuilder,
    accept: fn(StatusCode) -> bool,
) -> Result<Response, ApiError> {
    let request = builder.build()?;
    let method = request.method().clone();
    let url = request.url().clone();
    debug!(%method, path = url.path(), "api request");

    let response = client.execute(request).await?;
    let status = response.status();
    if accept(status) {
        return Ok(response);
    }

    let body = ResponseBody::read(response).await;
    Err(ApiError::Status {
        method,
        url,
        status,
        body,
    })
}

pub(crate) async fn execute_json<T: DeserializeOwned>(
    client: &Client,
    builder: RequestBuilder,
) -> Result<T, ApiError> {
    execute(client, builder, is_success)
        .await?
        .json()
        .await
        .map_err(ApiError::Decode)
}

/// A file attached to a multipart request.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: None,
            bytes,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Reads a file from disk, guessing its content type from the extension.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, ApiError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| ApiError::ReadUpload {
                path: path.to_path_buf(),
                source,
            })?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        Ok(Self {
            file_name,
            mime_type: mime_guess::from_path(path).first_raw().map(str::to_string),
            bytes,
        })
    }

    pub(crate) fn into_part(self) -> Result<Part, ApiError> {
        let part = Part::bytes(self.bytes).file_name(self.file_name);
        match self.mime_type {
            Some(mime_type) => match part.mime_str(&mime_type) {
                Ok(part) => Ok(part),
                Err(source) => Err(ApiError::InvalidContentType { mime_type, source }),
            },
            None => Ok(part),
        }
    }
}
