//! Typed client for the educational platform REST API.
//!
//! [`ApiClient`] maps each backend operation to exactly one HTTP request and
//! hands failures back untouched as [`ApiError`]. [`CourseStore`] keeps the
//! course listing in memory. [`resolve_error`] turns any failure into text for
//! display.

use std::sync::Arc;

use reqwest::{cookie::Jar, header::LOCATION, multipart::Form, Client, StatusCode};
use serde::Serialize;
use shared::{
    domain::{Block, BlockId, User, UserId, Video, VideoId, VideoInfo},
    protocol::{
        AddBlockRequest, AuthStatus, AuthUrl, Page, PageQuery, UpdateBlockRequest,
        VideoChunk, VkCallbackParams,
    },
};

pub mod error;
pub mod store;
pub mod transport;

pub use error::{resolve_error, ApiError, ResponseBody};
pub use store::{CourseBackend, CourseStore, HttpCourseBackend};
pub use transport::{ClientSettings, UploadFile};

use transport::{build_http_client, execute, execute_json, is_success};

/// Result of the identity provider callback. Redirects are reported, not followed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthCallbackOutcome {
    pub status: StatusCode,
    pub location: Option<String>,
}

#[derive(Serialize)]
struct DeviceQuery<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    device_id: Option<&'a str>,
}

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    callback_http: Client,
    cookies: Arc<Jar>,
    api_root: String,
}

impl ApiClient {
    pub fn new(settings: &ClientSettings) -> Result<Self, ApiError> {
        Self::with_cookie_jar(settings, Arc::new(Jar::default()))
    }

    /// Builds a client sharing `cookies` with other consumers, so the session
    /// cookie travels with every request.
    pub fn with_cookie_jar(settings: &ClientSettings, cookies: Arc<Jar>) -> Result<Self, ApiError> {
        Ok(Self {
            http: build_http_client(settings, Arc::clone(&cookies), true)?,
            callback_http: build_http_client(settings, Arc::clone(&cookies), false)?,
            cookies,
            api_root: format!("{}/api", settings.origin()),
        })
    }

    pub fn cookie_jar(&self) -> Arc<Jar> {
        Arc::clone(&self.cookies)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.api_root)
    }

    pub fn block_image_url(&self, block_id: BlockId) -> String {
        self.endpoint(&format!("/blocks/{block_id}/image"))
    }

    pub fn stream_video_url(&self, video_id: VideoId) -> String {
        self.endpoint(&format!("/v1/videos/{video_id}/stream"))
    }

    pub async fn get_blocks(&self) -> Result<Vec<Block>, ApiError> {
        execute_json(&self.http, self.http.get(self.endpoint("/blocks"))).await
    }

    pub async fn add_block(&self, title: &str) -> Result<Block, ApiError> {
        let request = AddBlockRequest {
            title: title.to_string(),
        };
        execute_json(
            &self.http,
            self.http.post(self.endpoint("/admin/blocks")).json(&request),
        )
        .await
    }

    pub async fn toggle_block_status(&self, block_id: BlockId) -> Result<(), ApiError> {
        let url = self.endpoint(&format!("/admin/blocks/{block_id}/status"));
        execute(&self.http, self.http.patch(url), is_success).await?;
        Ok(())
    }

    pub async fn swap_blocks(&self, first: BlockId, second: BlockId) -> Result<(), ApiError> {
        let url = self.endpoint(&format!("/admin/blocks/{first}/swap/{second}"));
        execute(&self.http, self.http.put(url), is_success).await?;
        Ok(())
    }

    pub async fn update_block_image(
        &self,
        block_id: BlockId,
        image: UploadFile,
    ) -> Result<(), ApiError> {
        let url = self.endpoint(&format!("/admin/blocks/{block_id}/image"));
        let form = Form::new().part("image", image.into_part()?);
        execute(&self.http, self.http.put(url).multipart(form), is_success).await?;
        Ok(())
    }

    pub async fn update_block_video(
        &self,
        block_id: BlockId,
        video: UploadFile,
    ) -> Result<(), ApiError> {
        let url = self.endpoint(&format!("/admin/blocks/{block_id}/video"));
        let form = Form::new().part("video", video.into_part()?);
        execute(&self.http, self.http.put(url).multipart(form), is_success).await?;
        Ok(())
    }

    pub async fn update_block_text(&self, block_id: BlockId, title: &str) -> Result<Block, ApiError> {
        let request = UpdateBlockRequest {
            block_id,
            title: title.to_string(),
        };
        execute_json(
            &self.http,
            self.http.put(self.endpoint("/admin/blocks")).json(&request),
        )
        .await
    }

    pub async fn get_admin_blocks(&self) -> Result<Vec<Block>, ApiError> {
        execute_json(&self.http, self.http.get(self.endpoint("/admin/blocks"))).await
    }

    pub async fn delete_block(&self, block_id: BlockId) -> Result<(), ApiError> {
        let url = self.endpoint(&format!("/admin/blocks/{block_id}"));
        execute(&self.http, self.http.delete(url), is_success).await?;
        Ok(())
    }

    pub async fn get_users(&self, page: u32, size: u32) -> Result<Page<User>, ApiError> {
        execute_json(
            &self.http,
            self.http
                .get(self.endpoint("/admin/users"))
                .query(&PageQuery { page, size }),
        )
        .await
    }

    /// Sends `payload` as-is; any JSON shape is accepted, see
    /// [`shared::protocol::UserUpdate`] for the typed form.
    pub async fn update_user<P>(&self, user_id: UserId, payload: &P) -> Result<User, ApiError>
    where
        P: Serialize + ?Sized,
    {
        let url = self.endpoint(&format!("/admin/users/{user_id}"));
        execute_json(&self.http, self.http.patch(url).json(payload)).await
    }

    pub async fn get_auth_url(&self, device_id: Option<&str>) -> Result<AuthUrl, ApiError> {
        execute_json(
            &self.http,
            self.http
                .get(self.endpoint("/auth/vkUrl"))
                .query(&DeviceQuery { device_id }),
        )
        .await
    }

    pub async fn get_auth_status(&self) -> Result<AuthStatus, ApiError> {
        execute_json(&self.http, self.http.get(self.endpoint("/auth/status"))).await
    }

    /// Completes the identity provider login. The backend answers with a
    /// redirect carrying the session cookie, so redirects are not followed and
    /// every status below 400 counts as success.
    pub async fn send_vk_callback(
        &self,
        params: &VkCallbackParams,
    ) -> Result<AuthCallbackOutcome, ApiError> {
        let builder = self
            .callback_http
            .get(self.endpoint("/auth/vkCallback"))
            .query(params);
        let response = execute(&self.callback_http, builder, |status| status.as_u16() < 400).await?;
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        Ok(AuthCallbackOutcome {
            status: response.status(),
            location,
        })
    }

    pub async fn get_videos(&self) -> Result<Vec<Video>, ApiError> {
        execute_json(&self.http, self.http.get(self.endpoint("/v1/videos"))).await
    }

    pub async fn get_video_info(&self, video_id: VideoId) -> Result<VideoInfo, ApiError> {
        let url = self.endpoint(&format!("/v1/videos/{video_id}"));
        execute_json(&self.http, self.http.get(url)).await
    }

    pub async fn get_video_chunk(
        &self,
        video_id: VideoId,
        chunk_index: u32,
    ) -> Result<VideoChunk, ApiError> {
        let url = self.endpoint(&format!("/v1/videos/{video_id}/stream/{chunk_index}"));
        execute_json(&self.http, self.http.get(url)).await
    }

    pub async fn get_video_content_type(&self, video_id: VideoId) -> Result<String, ApiError> {
        let url = self.endpoint(&format!("/v1/videos/{video_id}/content-type"));
        execute(&self.http, self.http.get(url), is_success)
            .await?
            .text()
            .await
            .map_err(ApiError::Decode)
    }

    /// Uploads a video. An absent or empty description is left out of the form.
    pub async fn upload_video(
        &self,
        file: UploadFile,
        title: &str,
        description: Option<&str>,
    ) -> Result<Video, ApiError> {
        let mut form = Form::new()
            .part("file", file.into_part()?)
            .text("title", title.to_string());
        if let Some(description) = description.filter(|text| !text.is_empty()) {
            form = form.text("description", description.to_string());
        }
        execute_json(
            &self.http,
            self.http.post(self.endpoint("/v1/videos")).multipart(form),
        )
        .await
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
