use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;
use client_core::UploadFile;
use shared::{
    domain::{BlockId, CourseCreateData, UserId, VideoId},
    protocol::VkCallbackParams,
};

use crate::{
    router,
    views::{self, PortalContext},
};

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render the view for a path such as `/courses`, or for a route name.
    Route { path: String },
    #[command(subcommand)]
    Courses(CoursesCommand),
    #[command(subcommand)]
    Blocks(BlocksCommand),
    #[command(subcommand)]
    Users(UsersCommand),
    #[command(subcommand)]
    Auth(AuthCommand),
    #[command(subcommand)]
    Videos(VideosCommand),
}

#[derive(Subcommand, Debug)]
pub enum CoursesCommand {
    List,
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: String,
        #[arg(long)]
        price: f64,
        #[arg(long)]
        duration: String,
        #[arg(long)]
        level: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum BlocksCommand {
    List {
        #[arg(long)]
        admin: bool,
    },
    Add { title: String },
    Toggle { id: i64 },
    Swap { first: i64, second: i64 },
    Rename { id: i64, title: String },
    Delete { id: i64 },
    Image { id: i64, file: PathBuf },
    Video { id: i64, file: PathBuf },
}

#[derive(Subcommand, Debug)]
pub enum UsersCommand {
    List {
        #[arg(long, default_value_t = 0)]
        page: u32,
        #[arg(long, default_value_t = 20)]
        size: u32,
    },
    /// Apply a JSON patch, e.g. '{"status":"BLOCKED"}'.
    Update { id: UserId, patch: String },
}

#[derive(Subcommand, Debug)]
pub enum AuthCommand {
    Url {
        #[arg(long)]
        device_id: Option<String>,
    },
    Status,
    Callback {
        #[arg(long)]
        code: String,
        #[arg(long)]
        state: String,
        #[arg(long)]
        device_id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum VideosCommand {
    List,
    Info { id: i64 },
    Chunk { id: i64, index: u32 },
    ContentType { id: i64 },
    Upload {
        file: PathBuf,
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: Option<String>,
    },
}

impl Command {
    /// Message shown when a failure carries nothing more specific.
    pub fn fallback(&self) -> &'static str {
        match self {
            Self::Route { .. } => "Failed to render page",
            Self::Courses(CoursesCommand::List) => "Failed to load courses",
            Self::Courses(CoursesCommand::Create { .. }) => "Failed to create course",
            Self::Blocks(BlocksCommand::List { .. }) => "Failed to load blocks",
            Self::Blocks(_) => "Failed to update block",
            Self::Users(UsersCommand::List { .. }) => "Failed to load users",
            Self::Users(UsersCommand::Update { .. }) => "Failed to update user",
            Self::Auth(AuthCommand::Callback { .. }) => "Sign-in failed",
            Self::Auth(_) => "Authorization service unavailable",
            Self::Videos(VideosCommand::Upload { .. }) => "Failed to upload video",
            Self::Videos(_) => "Failed to load video",
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Route { .. } => "route",
            Self::Courses(_) => "courses",
            Self::Blocks(_) => "blocks",
            Self::Users(_) => "users",
            Self::Auth(_) => "auth",
            Self::Videos(_) => "videos",
        }
    }
}

/// Runs one command and returns the lines to print.
pub async fn run(ctx: &PortalContext, command: Command) -> Result<Vec<String>> {
    tracing::debug!(command = command.name(), "running command");
    match command {
        Command::Route { path } => {
            let route = if path.starts_with('/') {
                router::resolve(&path)
            } else {
                router::by_name(&path).unwrap_or(&router::NOT_FOUND)
            };
            Ok(views::render(ctx, route, &path).await)
        }
        Command::Courses(cmd) => run_courses(ctx, cmd).await,
        Command::Blocks(cmd) => run_blocks(ctx, cmd).await,
        Command::Users(cmd) => run_users(ctx, cmd).await,
        Command::Auth(cmd) => run_auth(ctx, cmd).await,
        Command::Videos(cmd) => run_videos(ctx, cmd).await,
    }
}

async fn run_courses(ctx: &PortalContext, cmd: CoursesCommand) -> Result<Vec<String>> {
    match cmd {
        CoursesCommand::List => {
            let courses = ctx.courses.fetch_courses().await?;
            if courses.is_empty() {
                return Ok(vec!["no courses".into()]);
            }
            Ok(courses.iter().map(views::course_line).collect())
        }
        CoursesCommand::Create {
            title,
            description,
            price,
            duration,
            level,
        } => {
            let data = CourseCreateData {
                title,
                description,
                price,
                duration,
                level,
            };
            let created = ctx.courses.create_course(&data).await?;
            Ok(vec![format!("created {}", views::course_line(&created))])
        }
    }
}

async fn run_blocks(ctx: &PortalContext, cmd: BlocksCommand) -> Result<Vec<String>> {
    let api = &ctx.api;
    let lines = match cmd {
        BlocksCommand::List { admin } => {
            let blocks = if admin {
                api.get_admin_blocks().await?
            } else {
                api.get_blocks().await?
            };
            blocks.iter().map(views::block_line).collect()
        }
        BlocksCommand::Add { title } => {
            let block = api.add_block(&title).await?;
            vec![format!("added {}", views::block_line(&block))]
        }
        BlocksCommand::Toggle { id } => {
            api.toggle_block_status(BlockId(id)).await?;
            vec![format!("toggled block {id}")]
        }
        BlocksCommand::Swap { first, second } => {
            api.swap_blocks(BlockId(first), BlockId(second)).await?;
            vec![format!("swapped blocks {first} and {second}")]
        }
        BlocksCommand::Rename { id, title } => {
            let block = api.update_block_text(BlockId(id), &title).await?;
            vec![format!("renamed {}", views::block_line(&block))]
        }
        BlocksCommand::Delete { id } => {
            api.delete_block(BlockId(id)).await?;
            vec![format!("deleted block {id}")]
        }
        BlocksCommand::Image { id, file } => {
            let image = UploadFile::from_path(&file).await?;
            api.update_block_image(BlockId(id), image).await?;
            vec![format!("uploaded image for block {id}")]
        }
        BlocksCommand::Video { id, file } => {
            let video = UploadFile::from_path(&file).await?;
            api.update_block_video(BlockId(id), video).await?;
            vec![format!("uploaded video for block {id}")]
        }
    };
    Ok(lines)
}

async fn run_users(ctx: &PortalContext, cmd: UsersCommand) -> Result<Vec<String>> {
    match cmd {
        UsersCommand::List { page, size } => {
            let users = ctx.api.get_users(page, size).await?;
            let mut lines: Vec<String> = users.content.iter().map(views::user_line).collect();
            lines.push(format!(
                "page {} of {} ({} users)",
                users.number + 1,
                users.total_pages.max(1),
                users.total_elements
            ));
            Ok(lines)
        }
        UsersCommand::Update { id, patch } => {
            let patch: serde_json::Value =
                serde_json::from_str(&patch).context("user patch must be valid JSON")?;
            let user = ctx.api.update_user(id, &patch).await?;
            Ok(vec![format!("updated {}", views::user_line(&user))])
        }
    }
}

async fn run_auth(ctx: &PortalContext, cmd: AuthCommand) -> Result<Vec<String>> {
    match cmd {
        AuthCommand::Url { device_id } => {
            let auth = ctx.api.get_auth_url(device_id.as_deref()).await?;
            Ok(vec![auth.url])
        }
        AuthCommand::Status => {
            let auth = ctx.api.get_auth_status().await?;
            let state = if auth.status { "signed in" } else { "signed out" };
            Ok(vec![state.to_string()])
        }
        AuthCommand::Callback {
            code,
            state,
            device_id,
        } => {
            let params = VkCallbackParams {
                code,
                state,
                device_id,
            };
            let outcome = ctx.api.send_vk_callback(&params).await?;
            let mut line = format!("signed in ({})", outcome.status);
            if let Some(location) = outcome.location {
                line.push_str(&format!(", redirect to {location}"));
            }
            Ok(vec![line])
        }
    }
}

async fn run_videos(ctx: &PortalContext, cmd: VideosCommand) -> Result<Vec<String>> {
    let api = &ctx.api;
    let lines = match cmd {
        VideosCommand::List => {
            let videos = api.get_videos().await?;
            videos
                .iter()
                .map(|video| views::video_line(api, video))
                .collect()
        }
        VideosCommand::Info { id } => {
            let info = api.get_video_info(VideoId(id)).await?;
            let mut lines = vec![format!("#{} {}", info.id, info.title)];
            if let Some(description) = &info.description {
                lines.push(format!("  {description}"));
            }
            lines.push(format!(
                "  {} {} {} chunks={} ready={}",
                info.mime_type.as_deref().unwrap_or("unknown"),
                info.formatted_file_size.as_deref().unwrap_or("-"),
                info.formatted_duration.as_deref().unwrap_or("-"),
                info.total_chunks.unwrap_or(0),
                info.is_ready
            ));
            lines
        }
        VideosCommand::Chunk { id, index } => {
            let chunk = api.get_video_chunk(VideoId(id), index).await?;
            vec![format!(
                "chunk {}: {} bytes, iv {} bytes, last={}",
                chunk.chunk_index,
                chunk.encrypted_data.len(),
                chunk.iv.len(),
                chunk.is_last_chunk
            )]
        }
        VideosCommand::ContentType { id } => vec![api.get_video_content_type(VideoId(id)).await?],
        VideosCommand::Upload {
            file,
            title,
            description,
        } => {
            let upload = UploadFile::from_path(&file).await?;
            let video = api
                .upload_video(upload, &title, description.as_deref())
                .await?;
            vec![format!("uploaded {}", views::video_line(api, &video))]
        }
    };
    Ok(lines)
}

#[cfg(test)]
#[path = "tests/commands_tests.rs"]
mod tests;
