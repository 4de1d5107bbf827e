//! HTTP surface: JSON APIs, uploads, downloads and static files.

use std::net::SocketAddr;
use std::path::Path as FsPath;
use std::sync::Arc;

use anyhow::Context as _;
use axum::Router;
use axum::body::Body;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{Json, Response};
use axum::routing::{get, post};
use serde_json::{Value, json};
use tokio_util::io::ReaderStream;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::app::blog::{self, PostDraft};
use crate::app::contact::{ContactMessage, ContactRequest};
use crate::app::converter::Converter;
use crate::app::error::AppError;
use crate::app::ingest::IngestionPipeline;
use crate::app::layout::SiteLayout;
use crate::app::model::{Book, CreatePostRequest, Post, UploadedFile};
use crate::app::store::{LocalFsRecordStore, RecordStore};
use crate::app::uploads::{StagedUpload, UploadKind, UploadSink, base_name, safe_file_name};

/// Cap on JSON request bodies.
pub const JSON_BODY_LIMIT: usize = 1024 * 1024;

/// Allowance for multipart boundaries and small text fields on top of a file's limit.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub layout: SiteLayout,
    pub books: Arc<dyn RecordStore<Book>>,
    pub posts: Arc<dyn RecordStore<Post>>,
    pub pipeline: Arc<IngestionPipeline>,
}

impl AppState {
    /// Initializes stores and directories under `layout`. Any failure is fatal.
    pub async fn open(layout: SiteLayout, converter: Arc<dyn Converter>) -> anyhow::Result<Self> {
        let books = Arc::new(LocalFsRecordStore::<Book>::new(layout.books_json()));
        let posts = Arc::new(LocalFsRecordStore::<Post>::new(layout.posts_json()));
        books.init().await.context("init books store")?;
        posts.init().await.context("init posts store")?;

        let mut dirs: Vec<_> = UploadKind::ALL
            .into_iter()
            .map(|kind| layout.upload_dir(kind))
            .collect();
        dirs.push(layout.public_dir().join("books"));
        for dir in dirs {
            tokio::fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("create dir: {}", dir.display()))?;
        }

        let pipeline = Arc::new(IngestionPipeline::new(
            converter,
            books.clone(),
            posts.clone(),
            layout.clone(),
        ));
        Ok(Self {
            layout,
            books,
            posts,
            pipeline,
        })
    }
}

pub fn router(state: AppState) -> Router {
    let uploads = ServeDir::new(state.layout.uploads_dir());
    let public = ServeDir::new(state.layout.public_dir());

    Router::new()
        .route("/healthz", get(|| async { "ok\n" }))
        .route("/api/books", get(list_books))
        .route(
            "/api/blog",
            get(list_posts)
                .post(create_post)
                .layer(DefaultBodyLimit::max(JSON_BODY_LIMIT)),
        )
        .route(
            "/api/contact",
            post(contact).layer(DefaultBodyLimit::max(JSON_BODY_LIMIT)),
        )
        .route(
            "/api/upload/book",
            post(upload_book).layer(upload_body_limit(UploadKind::Pdf)),
        )
        .route(
            "/api/upload/video",
            post(upload_video).layer(upload_body_limit(UploadKind::Video)),
        )
        .route(
            "/api/upload/file",
            post(upload_file).layer(upload_body_limit(UploadKind::File)),
        )
        .route("/download/:kind/:filename", get(download))
        .nest_service("/uploads", uploads)
        .fallback_service(public)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| anyhow::anyhow!("bind {addr}: {err}"))?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(%err, "cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

fn upload_body_limit(kind: UploadKind) -> DefaultBodyLimit {
    let file_limit = usize::try_from(kind.max_bytes()).unwrap_or(usize::MAX);
    DefaultBodyLimit::max(file_limit.saturating_add(MULTIPART_OVERHEAD))
}

async fn list_books(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let books = state.books.list().await?;
    Ok(Json(json!({ "books": books })))
}

async fn list_posts(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let posts = state.posts.list().await?;
    Ok(Json(json!({ "posts": posts })))
}

async fn create_post(
    State(state): State<AppState>,
    payload: Result<Json<CreatePostRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let Json(request) = payload.map_err(|err| rejection_error(err.status(), err.body_text()))?;
    let draft = PostDraft::from_request(&request)?;
    let post = blog::publish(state.posts.as_ref(), draft).await?;
    Ok((StatusCode::CREATED, Json(json!({ "post": post }))))
}

async fn contact(
    payload: Result<Json<ContactRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(request) = payload.map_err(|err| rejection_error(err.status(), err.body_text()))?;
    let message = ContactMessage::from_request(&request)?;
    tracing::info!(
        email = %message.email,
        chars = message.message.chars().count(),
        "contact message received"
    );
    Ok(Json(json!({ "ok": true })))
}

async fn upload_book(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let form = read_upload_form(state.layout.uploads_dir(), UploadKind::Pdf, multipart).await?;
    let Some(upload) = form.upload else {
        return Err(AppError::BadRequest("pdf is required".to_owned()));
    };
    let book = state.pipeline.ingest(&upload, form.title.as_deref()).await?;
    Ok((StatusCode::CREATED, Json(json!({ "book": book }))))
}

async fn upload_video(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    store_upload(&state, UploadKind::Video, multipart).await
}

async fn upload_file(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    store_upload(&state, UploadKind::File, multipart).await
}

async fn store_upload(
    state: &AppState,
    kind: UploadKind,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let form = read_upload_form(state.layout.uploads_dir(), kind, multipart).await?;
    let Some(upload) = form.upload else {
        return Err(AppError::BadRequest(format!(
            "{} is required",
            kind.field_name()
        )));
    };
    let file = UploadedFile {
        url: upload.url(),
        name: upload.original_name,
    };
    Ok((StatusCode::CREATED, Json(json!({ "file": file }))))
}

#[derive(Debug, Default)]
struct UploadForm {
    upload: Option<StagedUpload>,
    title: Option<String>,
}

async fn read_upload_form(
    uploads_dir: &FsPath,
    kind: UploadKind,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<UploadForm, AppError> {
    let mut multipart = multipart.map_err(|err| rejection_error(err.status(), err.body_text()))?;
    let mut form = UploadForm::default();

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some(name) if name == kind.field_name() && form.upload.is_none() => {
                let Some(original_name) = field.file_name().map(str::to_owned) else {
                    return Err(AppError::BadRequest(format!("{name} must be a file upload")));
                };
                let mut sink = UploadSink::create(uploads_dir, kind, &original_name).await?;
                loop {
                    match field.chunk().await {
                        Ok(Some(chunk)) => {
                            if let Err(err) = sink.write_chunk(&chunk).await {
                                sink.abort().await;
                                return Err(err.into());
                            }
                        }
                        Ok(None) => break,
                        Err(err) => {
                            sink.abort().await;
                            return Err(multipart_error(err));
                        }
                    }
                }
                form.upload = Some(sink.finish().await?);
            }
            Some("title") => {
                form.title = Some(field.text().await.map_err(multipart_error)?);
            }
            _ => {}
        }
    }

    Ok(form)
}

fn multipart_error(err: MultipartError) -> AppError {
    rejection_error(err.status(), err.body_text())
}

fn rejection_error(status: StatusCode, message: String) -> AppError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(message)
    } else {
        AppError::BadRequest(message)
    }
}

async fn download(
    State(state): State<AppState>,
    Path((kind, filename)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let kind = UploadKind::from_dir_name(&kind)
        .ok_or_else(|| AppError::BadRequest("invalid kind".to_owned()))?;
    let not_found = || AppError::NotFound("not found".to_owned());
    let filename = base_name(&filename)
        .filter(|name| !name.starts_with('.'))
        .ok_or_else(not_found)?;

    let path = state.layout.upload_dir(kind).join(filename);
    let file = tokio::fs::File::open(&path).await.map_err(|_| not_found())?;
    let is_file = file
        .metadata()
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false);
    if !is_file {
        return Err(not_found());
    }

    let mut resp = Response::new(Body::from_stream(ReaderStream::new(file)));
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    resp.headers_mut().insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&format!(
            "attachment; filename=\"{}\"",
            safe_file_name(filename)
        ))
        .map_err(|_| AppError::internal("invalid download file name"))?,
    );
    Ok(resp)
}
