use super::*;
use std::io::Write as _;

use axum::{
    extract::{Multipart, Path, Query, RawQuery, State},
    http::{header, HeaderMap},
    response::IntoResponse,
    routing::{delete, get, patch, put},
    Json, Router,
};
use serde_json::{json, Value};
use shared::error::ErrorBody;
use tokio::{net::TcpListener, sync::Mutex};
use url::Url;

const SESSION_COOKIE: &str = "session=abc123";

#[derive(Debug, Clone)]
struct FormField {
    name: String,
    file_name: Option<String>,
    content_type: Option<String>,
    data: Vec<u8>,
}

impl FormField {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

#[derive(Clone, Default)]
struct FakeBackend {
    hits: Arc<Mutex<Vec<String>>>,
    forms: Arc<Mutex<Vec<(String, Vec<FormField>)>>>,
    bodies: Arc<Mutex<Vec<Value>>>,
}

impl FakeBackend {
    async fn hit(&self, entry: impl Into<String>) {
        self.hits.lock().await.push(entry.into());
    }

    async fn form(&self, target: &str) -> Vec<FormField> {
        self.forms
            .lock()
            .await
            .iter()
            .find(|(recorded, _)| recorded == target)
            .map(|(_, fields)| fields.clone())
            .unwrap_or_default()
    }
}

fn block_json(id: i64, title: &str) -> Value {
    json!({ "id": id, "title": title, "sortOrder": id, "isAvailable": true, "testId": null })
}

fn user_json(id: &str) -> Value {
    json!({
        "id": id,
        "email": "student@example.com",
        "firstName": "Ivan",
        "lastName": "Petrov",
        "status": "ACTIVE",
        "registrationDate": "2024-02-01T09:30:00",
        "role": "USER",
    })
}

async fn collect_form(mut multipart: Multipart) -> Vec<FormField> {
    let mut fields = Vec::new();
    while let Some(field) = multipart.next_field().await.expect("multipart field") {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.expect("field bytes").to_vec();
        fields.push(FormField {
            name,
            file_name,
            content_type,
            data,
        });
    }
    fields
}

async fn list_blocks() -> Json<Value> {
    Json(json!([block_json(1, "Intro"), block_json(2, "Ownership")]))
}

async fn add_block(
    State(state): State<FakeBackend>,
    Json(request): Json<AddBlockRequest>,
) -> Json<Value> {
    state.hit(format!("POST /admin/blocks {}", request.title)).await;
    Json(block_json(3, &request.title))
}

async fn update_block_text(
    State(state): State<FakeBackend>,
    Json(payload): Json<Value>,
) -> Json<Value> {
    let title = payload["title"].as_str().unwrap_or_default().to_string();
    state.bodies.lock().await.push(payload);
    Json(block_json(4, &title))
}

async fn delete_block(State(state): State<FakeBackend>, Path(id): Path<i64>) -> impl IntoResponse {
    state.hit(format!("DELETE /admin/blocks/{id}")).await;
    if id == 404 {
        let body = ErrorBody::new(404, "Not Found", "Block 404 not found")
            .with_path("/api/admin/blocks/404");
        return (axum::http::StatusCode::NOT_FOUND, Json(body)).into_response();
    }
    axum::http::StatusCode::NO_CONTENT.into_response()
}

async fn toggle_status(
    State(state): State<FakeBackend>,
    Path(id): Path<i64>,
) -> axum::http::StatusCode {
    state.hit(format!("PATCH /admin/blocks/{id}/status")).await;
    axum::http::StatusCode::OK
}

async fn swap_blocks(
    State(state): State<FakeBackend>,
    Path((first, second)): Path<(i64, i64)>,
) -> axum::http::StatusCode {
    state.hit(format!("PUT /admin/blocks/{first}/swap/{second}")).await;
    axum::http::StatusCode::OK
}

async fn update_image(
    State(state): State<FakeBackend>,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> axum::http::StatusCode {
    let fields = collect_form(multipart).await;
    state.forms.lock().await.push((format!("image:{id}"), fields));
    axum::http::StatusCode::OK
}

async fn update_video(
    State(state): State<FakeBackend>,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> axum::http::StatusCode {
    let fields = collect_form(multipart).await;
    state.forms.lock().await.push((format!("video:{id}"), fields));
    axum::http::StatusCode::OK
}

async fn list_users(Query(query): Query<PageQuery>) -> Json<Value> {
    Json(json!({
        "content": [user_json("6f1c2a5e-8c1b-4d7e-9a43-0b2f4c5d6e7f")],
        "totalElements": 21,
        "totalPages": 3,
        "number": query.page,
        "size": query.size,
    }))
}

async fn update_user(
    State(state): State<FakeBackend>,
    Path(id): Path<String>,
    Json(payload): Json<Value>,
) -> Json<Value> {
    state.bodies.lock().await.push(payload);
    Json(user_json(&id))
}

async fn auth_url(State(state): State<FakeBackend>, RawQuery(query): RawQuery) -> Json<Value> {
    state
        .hit(format!("GET /auth/vkUrl?{}", query.unwrap_or_default()))
        .await;
    Json(json!({ "url": "https://id.vk.com/authorize?client_id=1" }))
}

async fn auth_status(headers: HeaderMap) -> Json<Value> {
    let logged_in = headers
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|cookies| cookies.contains(SESSION_COOKIE));
    Json(json!({ "status": logged_in }))
}

async fn vk_callback(State(state): State<FakeBackend>, RawQuery(query): RawQuery) -> impl IntoResponse {
    let query = query.unwrap_or_default();
    state.hit(format!("GET /auth/vkCallback?{query}")).await;
    if query.contains("code=bad") {
        let body = ErrorBody::new(401, "Unauthorized", "Invalid VK state");
        return (axum::http::StatusCode::UNAUTHORIZED, Json(body)).into_response();
    }
    (
        axum::http::StatusCode::FOUND,
        [
            (header::LOCATION, "/after-login"),
            (header::SET_COOKIE, "session=abc123; Path=/; HttpOnly"),
        ],
    )
        .into_response()
}

async fn after_login(State(state): State<FakeBackend>) -> &'static str {
    state.hit("GET /after-login").await;
    "welcome"
}

async fn list_videos() -> Json<Value> {
    Json(json!([{
        "id": 5,
        "title": "Intro",
        "description": null,
        "fileSize": 1048576,
        "formattedFileSize": "1.0 MB",
        "durationSeconds": 95,
        "formattedDuration": "01:35",
        "format": "MP4",
        "status": "READY",
        "mimeType": "video/mp4",
        "totalChunks": 4,
        "chunkSize": 262144,
        "createdAt": "2024-03-01T12:00:00",
        "updatedAt": "2024-03-01T12:05:00.123",
    }]))
}

async fn upload_video(State(state): State<FakeBackend>, multipart: Multipart) -> Json<Value> {
    let fields = collect_form(multipart).await;
    let title = fields
        .iter()
        .find(|field| field.name == "title")
        .map(FormField::text)
        .unwrap_or_default();
    state.forms.lock().await.push(("upload".to_string(), fields));
    Json(json!({ "id": 9, "title": title, "status": "PENDING" }))
}

async fn video_info(Path(id): Path<i64>) -> Json<Value> {
    Json(json!({
        "id": id,
        "title": "Intro",
        "description": "First steps",
        "formattedFileSize": "1.0 MB",
        "formattedDuration": "01:35",
        "mimeType": "video/mp4",
        "totalChunks": 4,
        "isReady": true,
    }))
}

async fn video_chunk(Path((_id, chunk)): Path<(i64, i32)>) -> Json<Value> {
    Json(json!({
        "chunkIndex": chunk,
        "encryptedData": "3q2+7w==",
        "iv": "AAECAwQFBgcICQoLDA0ODw==",
        "isLastChunk": chunk == 3,
    }))
}

async fn video_content_type() -> &'static str {
    "video/mp4"
}

async fn spawn_fake_backend() -> (String, FakeBackend) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let state = FakeBackend::default();
    let app = Router::new()
        .route("/api/blocks", get(list_blocks))
        .route(
            "/api/admin/blocks",
            get(list_blocks).post(add_block).put(update_block_text),
        )
        .route("/api/admin/blocks/:id", delete(delete_block))
        .route("/api/admin/blocks/:id/status", patch(toggle_status))
        .route("/api/admin/blocks/:first/swap/:second", put(swap_blocks))
        .route("/api/admin/blocks/:id/image", put(update_image))
        .route("/api/admin/blocks/:id/video", put(update_video))
        .route("/api/admin/users", get(list_users))
        .route("/api/admin/users/:id", patch(update_user))
        .route("/api/auth/vkUrl", get(auth_url))
        .route("/api/auth/status", get(auth_status))
        .route("/api/auth/vkCallback", get(vk_callback))
        .route("/after-login", get(after_login))
        .route("/api/v1/videos", get(list_videos).post(upload_video))
        .route("/api/v1/videos/:id", get(video_info))
        .route("/api/v1/videos/:id/stream/:chunk", get(video_chunk))
        .route("/api/v1/videos/:id/content-type", get(video_content_type))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), state)
}

fn client_for(server_url: &str) -> ApiClient {
    let settings = ClientSettings::new(Url::parse(server_url).expect("url"));
    ApiClient::new(&settings).expect("client")
}

#[test]
fn derived_urls_are_built_under_api_root() {
    let client = client_for("http://portal.example/");
    assert_eq!(
        client.block_image_url(BlockId(3)),
        "http://portal.example/api/blocks/3/image"
    );
    assert_eq!(
        client.stream_video_url(VideoId(9)),
        "http://portal.example/api/v1/videos/9/stream"
    );

    let prefixed = client_for("http://portal.example/school/");
    assert_eq!(
        prefixed.block_image_url(BlockId(3)),
        "http://portal.example/school/api/blocks/3/image"
    );
}

#[tokio::test]
async fn lists_public_and_admin_blocks() {
    let (server_url, _state) = spawn_fake_backend().await;
    let client = client_for(&server_url);

    let blocks = client.get_blocks().await.expect("public blocks");
    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[1].title, "Ownership");
    assert!(blocks[0].test_id.is_none());

    let admin = client.get_admin_blocks().await.expect("admin blocks");
    assert_eq!(admin, blocks);
}

#[tokio::test]
async fn block_admin_operations_hit_their_paths() {
    let (server_url, state) = spawn_fake_backend().await;
    let client = client_for(&server_url);

    let added = client.add_block("Traits").await.expect("add");
    assert_eq!(added.title, "Traits");
    client
        .toggle_block_status(BlockId(3))
        .await
        .expect("toggle");
    client
        .swap_blocks(BlockId(1), BlockId(2))
        .await
        .expect("swap");
    client.delete_block(BlockId(3)).await.expect("delete");

    let hits = state.hits.lock().await.clone();
    assert_eq!(
        hits,
        vec![
            "POST /admin/blocks Traits",
            "PATCH /admin/blocks/3/status",
            "PUT /admin/blocks/1/swap/2",
            "DELETE /admin/blocks/3",
        ]
    );
}

#[tokio::test]
async fn update_block_text_sends_block_id_and_title() {
    let (server_url, state) = spawn_fake_backend().await;
    let client = client_for(&server_url);

    let block = client
        .update_block_text(BlockId(4), "Lifetimes")
        .await
        .expect("update");

    assert_eq!(block.title, "Lifetimes");
    let bodies = state.bodies.lock().await.clone();
    assert_eq!(bodies, vec![json!({ "blockId": 4, "title": "Lifetimes" })]);
}

#[tokio::test]
async fn block_media_uploads_use_single_named_field() {
    let (server_url, state) = spawn_fake_backend().await;
    let client = client_for(&server_url);

    let image = UploadFile::new("cover.png", vec![0x89, 0x50, 0x4e, 0x47]).with_mime_type("image/png");
    client
        .update_block_image(BlockId(7), image)
        .await
        .expect("image");
    let video = UploadFile::new("lesson.webm", b"webm-bytes".to_vec());
    client
        .update_block_video(BlockId(7), video)
        .await
        .expect("video");

    let image_form = state.form("image:7").await;
    assert_eq!(image_form.len(), 1);
    assert_eq!(image_form[0].name, "image");
    assert_eq!(image_form[0].file_name.as_deref(), Some("cover.png"));
    assert_eq!(image_form[0].content_type.as_deref(), Some("image/png"));
    assert_eq!(image_form[0].data, vec![0x89, 0x50, 0x4e, 0x47]);

    let video_form = state.form("video:7").await;
    assert_eq!(video_form.len(), 1);
    assert_eq!(video_form[0].name, "video");
    assert_eq!(video_form[0].data, b"webm-bytes".to_vec());
}

#[tokio::test]
async fn upload_without_description_omits_the_field() {
    let (server_url, state) = spawn_fake_backend().await;
    let client = client_for(&server_url);

    let video = client
        .upload_video(UploadFile::new("intro.mp4", b"mp4".to_vec()), "Intro", None)
        .await
        .expect("upload");
    assert_eq!(video.title, "Intro");
    assert!(video.file_size.is_none());

    let names: Vec<String> = state
        .form("upload")
        .await
        .into_iter()
        .map(|field| field.name)
        .collect();
    assert_eq!(names, vec!["file", "title"]);
}

#[tokio::test]
async fn upload_with_description_sends_all_fields() {
    let (server_url, state) = spawn_fake_backend().await;
    let client = client_for(&server_url);

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("intro.mp4");
    std::fs::File::create(&path)
        .and_then(|mut file| file.write_all(b"not-really-mp4"))
        .expect("write upload");
    let file = UploadFile::from_path(&path).await.expect("read upload");
    assert_eq!(file.mime_type.as_deref(), Some("video/mp4"));

    client
        .upload_video(file, "Intro", Some("First steps"))
        .await
        .expect("upload");

    let fields = state.form("upload").await;
    let names: Vec<&str> = fields.iter().map(|field| field.name.as_str()).collect();
    assert_eq!(names, vec!["file", "title", "description"]);
    assert_eq!(fields[0].file_name.as_deref(), Some("intro.mp4"));
    assert_eq!(fields[0].content_type.as_deref(), Some("video/mp4"));
    assert_eq!(fields[2].text(), "First steps");
}

#[tokio::test]
async fn empty_description_is_treated_as_absent() {
    let (server_url, state) = spawn_fake_backend().await;
    let client = client_for(&server_url);

    client
        .upload_video(UploadFile::new("intro.mp4", b"mp4".to_vec()), "Intro", Some(""))
        .await
        .expect("upload");

    let fields = state.form("upload").await;
    assert!(fields.iter().all(|field| field.name != "description"));
}

#[tokio::test]
async fn invalid_upload_content_type_fails_before_sending() {
    let (server_url, state) = spawn_fake_backend().await;
    let client = client_for(&server_url);

    let file = UploadFile::new("notes.txt", b"x".to_vec()).with_mime_type("not a mime");
    let err = client
        .upload_video(file, "Notes", None)
        .await
        .expect_err("must fail");

    assert!(matches!(err, ApiError::InvalidContentType { .. }));
    assert!(state.forms.lock().await.is_empty());
}

#[tokio::test]
async fn missing_upload_file_reports_path() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("missing.mp4");

    let err = UploadFile::from_path(&path).await.expect_err("must fail");

    match err {
        ApiError::ReadUpload { path: reported, .. } => assert_eq!(reported, path),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn users_are_paged_through_query_parameters() {
    let (server_url, state) = spawn_fake_backend().await;
    let client = client_for(&server_url);

    let page = client.get_users(2, 10).await.expect("users");
    assert_eq!(page.number, 2);
    assert_eq!(page.size, 10);
    assert_eq!(page.total_elements, 21);
    assert_eq!(page.content[0].first_name, "Ivan");
    assert!(page.content[0].payment_date.is_none());

    let user_id: UserId = "6f1c2a5e-8c1b-4d7e-9a43-0b2f4c5d6e7f".parse().expect("uuid");
    let update = shared::protocol::UserUpdate {
        status: Some(shared::domain::UserStatus::Blocked),
        ..Default::default()
    };
    let updated = client.update_user(user_id, &update).await.expect("update");
    assert_eq!(updated.id, user_id);
    client
        .update_user(user_id, &json!({ "nickname": "free-form" }))
        .await
        .expect("free-form update");

    let bodies = state.bodies.lock().await.clone();
    assert_eq!(
        bodies,
        vec![json!({ "status": "BLOCKED" }), json!({ "nickname": "free-form" })]
    );
}

#[tokio::test]
async fn auth_url_omits_absent_device_id() {
    let (server_url, state) = spawn_fake_backend().await;
    let client = client_for(&server_url);

    let url = client.get_auth_url(None).await.expect("auth url");
    assert!(url.url.starts_with("https://id.vk.com/"));
    client.get_auth_url(Some("dev-1")).await.expect("auth url");

    let hits = state.hits.lock().await.clone();
    assert_eq!(
        hits,
        vec!["GET /auth/vkUrl?", "GET /auth/vkUrl?device_id=dev-1"]
    );
}

#[tokio::test]
async fn auth_callback_redirect_is_success_and_keeps_session_cookie() {
    let (server_url, state) = spawn_fake_backend().await;
    let client = client_for(&server_url);

    assert!(!client.get_auth_status().await.expect("status").status);

    let outcome = client
        .send_vk_callback(&VkCallbackParams {
            code: "c0de".to_string(),
            state: "st4te".to_string(),
            device_id: "dev-1".to_string(),
        })
        .await
        .expect("302 is not an error");

    assert_eq!(outcome.status, StatusCode::FOUND);
    assert_eq!(outcome.location.as_deref(), Some("/after-login"));
    let hits = state.hits.lock().await.clone();
    assert_eq!(
        hits,
        vec!["GET /auth/vkCallback?code=c0de&state=st4te&device_id=dev-1"]
    );

    assert!(client.get_auth_status().await.expect("status").status);
}

#[tokio::test]
async fn auth_callback_client_errors_still_fail() {
    let (server_url, _state) = spawn_fake_backend().await;
    let client = client_for(&server_url);

    let err = client
        .send_vk_callback(&VkCallbackParams {
            code: "bad".to_string(),
            state: "st4te".to_string(),
            device_id: "dev-1".to_string(),
        })
        .await
        .expect_err("401 must fail");

    assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
    assert_eq!(resolve_error(&err, "Login failed"), "Invalid VK state");
}

#[tokio::test]
async fn video_endpoints_decode_responses() {
    let (server_url, _state) = spawn_fake_backend().await;
    let client = client_for(&server_url);

    let videos = client.get_videos().await.expect("videos");
    assert_eq!(videos[0].format, Some(shared::domain::VideoFormat::Mp4));
    assert!(videos[0].status.is_available_for_streaming());
    assert!(videos[0].description.is_none());

    let info = client.get_video_info(VideoId(5)).await.expect("info");
    assert!(info.is_ready);
    assert_eq!(info.total_chunks, Some(4));

    let chunk = client.get_video_chunk(VideoId(5), 3).await.expect("chunk");
    assert_eq!(chunk.chunk_index, 3);
    assert_eq!(chunk.encrypted_data, vec![0xde, 0xad, 0xbe, 0xef]);
    assert_eq!(chunk.iv.len(), 16);
    assert!(chunk.is_last_chunk);

    let content_type = client
        .get_video_content_type(VideoId(5))
        .await
        .expect("content type");
    assert_eq!(content_type, "video/mp4");
}

#[tokio::test]
async fn rejected_requests_carry_status_and_body() {
    let (server_url, _state) = spawn_fake_backend().await;
    let client = client_for(&server_url);

    let err = client
        .delete_block(BlockId(404))
        .await
        .expect_err("404 must fail");

    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
    let payload = err.server_error().expect("error body");
    assert_eq!(payload.path.as_deref(), Some("/api/admin/blocks/404"));
    assert_eq!(resolve_error(&err, "Could not delete"), "Block 404 not found");
    match &err {
        ApiError::Status { method, url, .. } => {
            assert_eq!(*method, reqwest::Method::DELETE);
            assert_eq!(url.path(), "/api/admin/blocks/404");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn unknown_routes_fail_with_fallback_message() {
    let (server_url, _state) = spawn_fake_backend().await;
    let client = client_for(&format!("{server_url}/nowhere/"));

    let err = client.get_blocks().await.expect_err("404 must fail");

    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
    assert_eq!(resolve_error(&err, "Could not load blocks"), "Could not load blocks");
}

#[tokio::test]
async fn transport_failures_resolve_to_fallback() {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    let client = client_for(&format!("http://{addr}"));

    let err = client.get_blocks().await.expect_err("nothing is listening");

    assert!(matches!(err, ApiError::Transport(_)));
    assert!(err.body().is_none());
    assert_eq!(resolve_error(&err, "Server unreachable"), "Server unreachable");
}

#[tokio::test]
async fn plain_text_json_error_body_is_probed_for_message() {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = Router::new().route(
        "/api/admin/blocks",
        axum::routing::post(|| async {
            (
                axum::http::StatusCode::BAD_REQUEST,
                r#"{"message":"Title taken","error":"Bad Request"}"#,
            )
        }),
    );
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    let client = client_for(&format!("http://{addr}"));

    let err = client.add_block("Intro").await.expect_err("400 must fail");

    assert!(matches!(err.body(), Some(ResponseBody::Json(_))));
    assert_eq!(resolve_error(&err, "Could not add block"), "Title taken");
}
