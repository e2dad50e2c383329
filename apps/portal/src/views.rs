use std::sync::Arc;

use client_core::{
    resolve_error, ApiClient, ApiError, ClientSettings, CourseStore, HttpCourseBackend,
};
use shared::domain::{Block, Course, User, Video, VideoFormat};

use crate::router::{Route, View};

const USERS_PAGE_SIZE: u32 = 20;

/// Everything a view needs: the API client and the shared course store.
pub struct PortalContext {
    pub api: ApiClient,
    pub courses: CourseStore,
}

impl PortalContext {
    pub fn new(settings: &ClientSettings) -> Result<Self, ApiError> {
        let api = ApiClient::new(settings)?;
        let backend = HttpCourseBackend::new(settings, api.cookie_jar())?;
        Ok(Self {
            api,
            courses: CourseStore::new(Arc::new(backend)),
        })
    }
}

/// Renders the view selected for `requested_path`. Backend failures are shown
/// in place of the section that failed.
pub async fn render(ctx: &PortalContext, route: &Route, requested_path: &str) -> Vec<String> {
    tracing::debug!(view = ?route.view, path = requested_path, "rendering view");
    match route.view {
        View::Home => home(ctx).await,
        View::About => about(),
        View::ComingSoon => coming_soon(route),
        View::Admin => admin(ctx).await,
        View::NotFound => vec![format!("Page not found: {requested_path}")],
    }
}

async fn home(ctx: &PortalContext) -> Vec<String> {
    let mut lines = vec!["Course blocks".to_string()];
    match ctx.api.get_blocks().await {
        Ok(blocks) if blocks.is_empty() => lines.push("  no blocks published yet".into()),
        Ok(blocks) => {
            for block in &blocks {
                lines.push(format!(
                    "  {}  image: {}",
                    block_line(block),
                    ctx.api.block_image_url(block.id)
                ));
            }
        }
        Err(err) => lines.push(failure_line(&err, "Failed to load course blocks")),
    }
    lines
}

fn about() -> Vec<String> {
    vec![
        "About".to_string(),
        "  An online school: video lessons grouped into blocks, opened as you progress.".into(),
        "  Sign in with VK to keep track of your courses.".into(),
    ]
}

fn coming_soon(route: &Route) -> Vec<String> {
    let title = route.props.map(|props| props.title).unwrap_or(route.name);
    vec![title.to_string(), "  Coming soon".into()]
}

async fn admin(ctx: &PortalContext) -> Vec<String> {
    let mut lines = vec!["Admin: blocks".to_string()];
    match ctx.api.get_admin_blocks().await {
        Ok(blocks) => lines.extend(blocks.iter().map(|b| format!("  {}", block_line(b)))),
        Err(err) => lines.push(failure_line(&err, "Failed to load blocks")),
    }

    lines.push("Admin: users".into());
    match ctx.api.get_users(0, USERS_PAGE_SIZE).await {
        Ok(page) => {
            lines.extend(page.content.iter().map(|u| format!("  {}", user_line(u))));
            lines.push(format!(
                "  page {} of {} ({} users)",
                page.number + 1,
                page.total_pages.max(1),
                page.total_elements
            ));
        }
        Err(err) => lines.push(failure_line(&err, "Failed to load users")),
    }

    lines.push("Admin: videos".into());
    match ctx.api.get_videos().await {
        Ok(videos) => lines.extend(
            videos
                .iter()
                .map(|v| format!("  {}", video_line(&ctx.api, v))),
        ),
        Err(err) => lines.push(failure_line(&err, "Failed to load videos")),
    }
    lines
}

pub fn failure_line(err: &ApiError, fallback: &str) -> String {
    format!("  error: {}", resolve_error(err, fallback))
}

pub fn block_line(block: &Block) -> String {
    let state = if block.is_available { "open" } else { "locked" };
    format!("#{} {} [{state}] order={}", block.id, block.title, block.sort_order)
}

pub fn user_line(user: &User) -> String {
    format!(
        "{} {} {} <{}> {:?}/{:?} registered {}",
        user.id,
        user.first_name,
        user.last_name,
        user.email,
        user.role,
        user.status,
        user.registration_date.format("%Y-%m-%d")
    )
}

pub fn video_line(api: &ApiClient, video: &Video) -> String {
    let mime = video
        .mime_type
        .as_deref()
        .or(video.format.map(VideoFormat::mime_type))
        .unwrap_or("unknown");
    let mut line = format!("#{} {} [{:?}] {mime}", video.id, video.title, video.status);
    if let Some(size) = &video.formatted_file_size {
        line.push_str(&format!(" {size}"));
    }
    if let Some(duration) = &video.formatted_duration {
        line.push_str(&format!(" {duration}"));
    }
    if video.status.is_available_for_streaming() {
        line.push_str(&format!(" stream: {}", api.stream_video_url(video.id)));
    }
    line
}

pub fn course_line(course: &Course) -> String {
    format!(
        "#{} {} ({}, {}) {:.2}, {} students",
        course.id, course.title, course.level, course.duration, course.price, course.students_count
    )
}

#[cfg(test)]
#[path = "tests/views_tests.rs"]
mod tests;
