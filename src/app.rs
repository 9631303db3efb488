use axum::{
    Json, Router,
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;

use crate::config::ServerConfig;
use crate::error::SweeperError;
use crate::format::TargetFormat;
use crate::graph::{self, GraphOptions};
use crate::session::{FileSummary, Notice, Session, UploadId, UploadedFile};

pub struct AppState {
    session: Mutex<Session>,
    preview_rows: usize,
}

impl AppState {
    /// Fresh, empty session; summaries preview `preview_rows` rows.
    pub fn new(preview_rows: usize) -> Self {
        AppState {
            session: Mutex::new(Session::new()),
            preview_rows,
        }
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        // a poisoned lock still holds a consistent session
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Deserialize)]
struct CleaningToggle {
    enabled: bool,
}

#[derive(Deserialize)]
struct ColumnChoice {
    columns: Vec<String>,
}

#[derive(Deserialize)]
struct ConvertRequest {
    target: TargetFormat,
}

#[derive(Serialize)]
struct UploadResponse {
    files: Vec<FileSummary>,
    notices: Vec<Notice>,
}

#[derive(Serialize)]
struct ActionResponse {
    notice: Notice,
    file: FileSummary,
}

#[derive(Serialize)]
struct ConvertResponse {
    file_name: String,
    mime_type: &'static str,
    size: usize,
}

#[derive(Serialize)]
struct ErrorResponse {
    status: &'static str,
    level: crate::session::Level,
    message: String,
}

/// Pipeline errors as HTTP responses.
pub struct ApiError(SweeperError);

impl From<SweeperError> for ApiError {
    fn from(err: SweeperError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SweeperError::UnsupportedFormat { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            SweeperError::Parse { .. } => StatusCode::BAD_REQUEST,
            SweeperError::NoNumericColumns
            | SweeperError::NoColumnsSelected
            | SweeperError::UnknownColumn(_)
            | SweeperError::NotNumeric(_) => StatusCode::UNPROCESSABLE_ENTITY,
            SweeperError::UnknownUpload(_) | SweeperError::InvalidUploadId(_) => {
                StatusCode::NOT_FOUND
            }
            SweeperError::FileRejected { .. }
            | SweeperError::CleaningDisabled(_)
            | SweeperError::NotConverted(_) => StatusCode::CONFLICT,
            SweeperError::Encode { .. } | SweeperError::Render(_) | SweeperError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let notice = Notice::from_error(&self.0);
        let body = ErrorResponse {
            status: "error",
            level: notice.level,
            message: notice.message,
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Build the application router
///
/// Serves the single-page UI at `/` and the JSON API under `/api`. Every
/// route shares one [`Session`] through `state`.
///
/// # Arguments
/// * `state` - Shared session and preview settings
/// * `max_upload_bytes` - Largest accepted request body; bigger uploads get
///   `413 Payload Too Large`
///
/// # Returns
/// * `Router` - Ready to be served or driven directly in tests
pub fn router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(serve_index))
        .route("/api/upload", post(upload_files))
        .route("/api/files", get(list_files))
        .route("/api/files/:id", get(get_file).delete(delete_file))
        .route("/api/files/:id/cleaning", post(set_cleaning))
        .route("/api/files/:id/dedupe", post(remove_duplicates))
        .route("/api/files/:id/fill", post(fill_missing))
        .route("/api/files/:id/columns", post(select_columns))
        .route("/api/files/:id/chart", post(show_chart))
        .route("/api/files/:id/convert", post(convert_file))
        .route("/api/files/:id/download", get(download_file))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .with_state(state)
}

/// Start the web server
///
/// Binds `config.addr` and serves [`router`] until the process stops.
///
/// # Arguments
/// * `config` - Listen address, upload limit and preview size
///
/// # Returns
/// * `Result<(), Box<dyn std::error::Error>>` - An error if the address
///   cannot be bound or the server fails
pub async fn run(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let app_state = Arc::new(AppState::new(config.preview_rows));
    let app = router(app_state, config.max_upload_bytes);

    let listener = TcpListener::bind(config.addr).await?;
    info!("Listening on http://{}", config.addr);
    axum::serve(listener, app).await?;

    Ok(())
}

fn parse_id(raw: &str) -> ApiResult<UploadId> {
    raw.parse::<UploadId>()
        .map_err(|_| ApiError(SweeperError::InvalidUploadId(raw.to_string())))
}

async fn serve_index() -> Html<&'static str> {
    Html(include_str!("./static/index.html"))
}

async fn upload_files(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Response {
    let mut files = Vec::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!("upload aborted: {}", e);
                return (
                    StatusCode::BAD_REQUEST,
                    Json(Notice::error(format!("Upload failed: {}", e))),
                )
                    .into_response();
            }
        };
        let Some(name) = field.file_name().map(str::to_string) else {
            continue;
        };
        match field.bytes().await {
            Ok(bytes) => files.push(UploadedFile::new(name, bytes.to_vec())),
            Err(e) => {
                warn!("failed to read {}: {}", name, e);
                return (
                    StatusCode::BAD_REQUEST,
                    Json(Notice::error(format!("Failed to read {}: {}", name, e))),
                )
                    .into_response();
            }
        }
    }

    if files.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(Notice::error("No file data received")),
        )
            .into_response();
    }

    let mut session = state.session();
    let (ids, notices) = session.upload_all(files);
    let files = ids
        .into_iter()
        .filter_map(|id| session.get(id).ok())
        .map(|entry| entry.summary(state.preview_rows))
        .collect();
    Json(UploadResponse { files, notices }).into_response()
}

async fn list_files(State(state): State<Arc<AppState>>) -> Json<Vec<FileSummary>> {
    Json(state.session().summaries(state.preview_rows))
}

async fn get_file(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<FileSummary>> {
    let id = parse_id(&id)?;
    let session = state.session();
    Ok(Json(session.get(id)?.summary(state.preview_rows)))
}

async fn delete_file(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<StatusCode> {
    let id = parse_id(&id)?;
    let entry = state.session().remove(id)?;
    info!("removed {}", entry.file().name);
    Ok(StatusCode::NO_CONTENT)
}

/// Run a session action and answer with its notice plus the fresh summary.
fn act<F>(state: &AppState, raw_id: &str, action: F) -> ApiResult<Json<ActionResponse>>
where
    F: FnOnce(&mut Session, UploadId) -> Result<Notice, SweeperError>,
{
    let id = parse_id(raw_id)?;
    let mut session = state.session();
    let notice = action(&mut session, id)?;
    let file = session.get(id)?.summary(state.preview_rows);
    Ok(Json(ActionResponse { notice, file }))
}

async fn set_cleaning(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CleaningToggle>,
) -> ApiResult<Json<ActionResponse>> {
    act(&state, &id, |session, id| {
        session.set_cleaning(id, payload.enabled)?;
        Ok(Notice::success(if payload.enabled {
            "Cleaning enabled"
        } else {
            "Cleaning disabled"
        }))
    })
}

async fn remove_duplicates(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<ActionResponse>> {
    act(&state, &id, |session, id| session.remove_duplicates(id))
}

async fn fill_missing(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<ActionResponse>> {
    act(&state, &id, |session, id| session.fill_missing(id))
}

async fn select_columns(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ColumnChoice>,
) -> ApiResult<Json<ActionResponse>> {
    act(&state, &id, |session, id| {
        session.select_columns(id, payload.columns.as_slice())
    })
}

async fn show_chart(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ColumnChoice>,
) -> ApiResult<Response> {
    let id = parse_id(&id)?;
    let data = {
        let mut session = state.session();
        session.chart(id, payload.columns.as_slice())?
    };
    let png = tokio::task::spawn_blocking(move || {
        graph::render_bar_chart(&data, &GraphOptions::default())
    })
    .await
    .map_err(|e| ApiError(SweeperError::Render(e.to_string())))??;
    Ok(([(header::CONTENT_TYPE, "image/png")], png).into_response())
}

async fn convert_file(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ConvertRequest>,
) -> ApiResult<Json<ConvertResponse>> {
    let id = parse_id(&id)?;
    let mut session = state.session();
    let artifact = session.convert(id, payload.target)?;
    Ok(Json(ConvertResponse {
        file_name: artifact.file_name.clone(),
        mime_type: artifact.mime_type,
        size: artifact.bytes.len(),
    }))
}

async fn download_file(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Response> {
    let id = parse_id(&id)?;
    let artifact = state.session().download(id)?.clone();
    let disposition = format!(
        "attachment; filename=\"{}\"",
        artifact.file_name.replace('"', "")
    );

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, artifact.mime_type)
        .header(header::CONTENT_DISPOSITION, disposition)
        .body(Body::from(artifact.bytes))
        .map_err(|e| ApiError(SweeperError::Io(std::io::Error::other(e))))
}
