use crate::assembly::{
    Assembler, BundleOutcome, BundleRequest, DocumentId, SessionStatus, SessionStore,
};
use crate::config::Config;
use crate::error::PipelineError;
use crate::language::TargetLanguage;
use crate::postprocess::{Fragment, FragmentFormat};
use crate::segmentation::{
    steps::composite::encode_png, CompositeAxis, OutputMode, ReadingDirection, SegmentOptions,
    Segmenter, StepTiming,
};
use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, Path, State},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub segmenter: Arc<Segmenter>,
    pub assembler: Arc<Assembler>,
    pub config: Arc<Config>,
}

/// One ordered block of a segmented page
#[derive(Serialize)]
pub struct BlockDescriptor {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
    pub stamp_ratio: f32,
    /// Base64 PNG of the block
    pub image: String,
}

/// Segmentation response in blocks mode
#[derive(Serialize)]
pub struct BlocksResponse {
    pub status: &'static str,
    pub page_width: u32,
    pub page_height: u32,
    pub direction: ReadingDirection,
    pub block_count: usize,
    pub blocks: Vec<BlockDescriptor>,
    pub processing_time_ms: u64,
    pub steps: Vec<StepTiming>,
}

/// Segmentation response in composite mode
#[derive(Serialize)]
pub struct CompositeResponse {
    pub page_width: u32,
    pub page_height: u32,
    pub direction: ReadingDirection,
    pub axis: CompositeAxis,
    pub width: u32,
    pub height: u32,
    pub block_count: usize,
    /// Base64 PNG of the composite
    pub image: String,
    pub processing_time_ms: u64,
    pub steps: Vec<StepTiming>,
}

/// JSON body of a bundle submission
#[derive(Deserialize)]
pub struct BundleBody {
    pub bundle_index: u32,
    #[serde(default)]
    pub is_last: bool,
    pub format: FragmentFormat,
    pub content: String,
}

#[derive(Serialize)]
pub struct EvictResponse {
    pub document_id: String,
    pub evicted: bool,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Server info response
#[derive(Serialize)]
pub struct InfoResponse {
    pub version: String,
    pub supported_formats: Vec<String>,
    pub max_file_size_bytes: usize,
    pub session_ttl_secs: u64,
    pub sessions: usize,
    pub segmentation: crate::config::SegmentationConfig,
}

const SUPPORTED_FORMATS: [&str; 6] = [
    "image/png",
    "image/jpeg",
    "image/gif",
    "image/bmp",
    "image/webp",
    "image/tiff",
];

/// Run the HTTP server
pub async fn run(config: Config) -> anyhow::Result<()> {
    config.segmentation.validate()?;

    let addr = format!("{}:{}", config.host, config.port);
    let max_file_size = config.max_file_size;

    let store = Arc::new(SessionStore::new());
    spawn_session_sweeper(store.clone(), &config);

    let state = AppState {
        segmenter: Arc::new(Segmenter::new(config.segmentation.clone())),
        assembler: Arc::new(Assembler::new(store)),
        config: Arc::new(config),
    };

    let app = router(state).layer(DefaultBodyLimit::max(max_file_size));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/segment", post(handle_segment))
        .route("/documents/:name/bundles", post(handle_bundle))
        .route("/documents/:name/finalize", post(handle_finalize))
        .route(
            "/documents/:name",
            post(handle_open).get(handle_status).delete(handle_evict),
        )
        .route("/health", get(handle_health))
        .route("/info", get(handle_info))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Periodically drop sessions that have been idle longer than the TTL
fn spawn_session_sweeper(store: Arc<SessionStore>, config: &Config) {
    let ttl = config.session_ttl;
    let period = config.sweep_interval;

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            if store.is_empty().await {
                continue;
            }
            let evicted = store.evict_expired(ttl).await;
            if evicted > 0 {
                tracing::info!("Evicted {} expired sessions", evicted);
            }
        }
    });
}

/// Handle page segmentation requests
async fn handle_segment(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, PipelineError> {
    let start = Instant::now();

    let mut file_data: Option<Bytes> = None;
    let mut content_type: Option<String> = None;
    let mut document_name: Option<String> = None;
    let mut options = SegmentOptions::default();

    // Parse multipart form
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| PipelineError::InvalidRequest(format!("Failed to parse multipart: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "file" => {
                content_type = field.content_type().map(|s| s.to_string());
                file_data = Some(field.bytes().await.map_err(|e| {
                    PipelineError::InvalidRequest(format!("Failed to read file data: {}", e))
                })?);
            }
            "document_name" => document_name = Some(text_field(field, "document_name").await?),
            "direction" => {
                let value = text_field(field, "direction").await?;
                options.direction = Some(ReadingDirection::parse(&value).ok_or_else(|| {
                    PipelineError::InvalidRequest(format!("Unknown direction: {}", value))
                })?);
            }
            "output" => {
                let value = text_field(field, "output").await?;
                options.output = OutputMode::parse(&value).ok_or_else(|| {
                    PipelineError::InvalidRequest(format!("Unknown output mode: {}", value))
                })?;
            }
            "axis" => {
                let value = text_field(field, "axis").await?;
                options.axis = Some(CompositeAxis::parse(&value).ok_or_else(|| {
                    PipelineError::InvalidRequest(format!("Unknown axis: {}", value))
                })?);
            }
            _ => {
                // Ignore unknown fields
            }
        }
    }

    let data = file_data.ok_or(PipelineError::MissingFile)?;

    if data.len() > state.config.max_file_size {
        return Err(PipelineError::ImageTooLarge {
            size: data.len(),
            max: state.config.max_file_size,
        });
    }

    if let Some(mime) = &content_type {
        if !SUPPORTED_FORMATS.contains(&mime.as_str()) {
            tracing::warn!("Received file with content type: {}", mime);
        }
    }

    // An explicit direction wins over the one implied by the document language
    if options.direction.is_none() {
        options.direction = document_name
            .as_deref()
            .map(|name| TargetLanguage::from_document_name(name).direction());
    }

    let segmenter = state.segmenter.clone();
    let response = tokio::task::spawn_blocking(move || segment_page(&segmenter, &data, options))
        .await
        .map_err(|e| PipelineError::Internal(format!("Segmentation task failed: {}", e)))??;

    tracing::info!(
        "Segmentation completed in {}ms",
        start.elapsed().as_millis()
    );

    Ok(response)
}

async fn text_field(
    field: axum::extract::multipart::Field<'_>,
    name: &str,
) -> Result<String, PipelineError> {
    field
        .text()
        .await
        .map_err(|e| PipelineError::InvalidRequest(format!("Invalid {}: {}", name, e)))
}

/// Segment one page and build the response for the requested output mode
fn segment_page(
    segmenter: &Segmenter,
    data: &[u8],
    options: SegmentOptions,
) -> Result<Response, PipelineError> {
    let segmentation = segmenter.segment(data, options.direction)?;

    match options.output {
        OutputMode::Blocks => {
            let blocks = segmentation
                .blocks
                .iter()
                .map(|block| {
                    Ok(BlockDescriptor {
                        x: block.bbox.x,
                        y: block.bbox.y,
                        w: block.bbox.w,
                        h: block.bbox.h,
                        stamp_ratio: block.stamp_ratio,
                        image: STANDARD.encode(encode_png(&block.image)?),
                    })
                })
                .collect::<Result<Vec<_>, PipelineError>>()?;

            let status = if segmentation.is_empty() {
                tracing::info!("No text blocks detected");
                "no_blocks_detected"
            } else {
                "ok"
            };

            Ok(Json(BlocksResponse {
                status,
                page_width: segmentation.page_width,
                page_height: segmentation.page_height,
                direction: segmentation.direction,
                block_count: blocks.len(),
                blocks,
                processing_time_ms: segmentation.total_time_ms,
                steps: segmentation.steps,
            })
            .into_response())
        }
        OutputMode::Composite => {
            let axis = options.axis.unwrap_or(segmenter.config().composite_axis);
            let composite = segmenter.composite(&segmentation, Some(axis))?;
            let png = composite.encode_png()?;

            Ok(Json(CompositeResponse {
                page_width: segmentation.page_width,
                page_height: segmentation.page_height,
                direction: segmentation.direction,
                axis,
                width: composite.width(),
                height: composite.height(),
                block_count: composite.block_count,
                image: STANDARD.encode(png),
                processing_time_ms: segmentation.total_time_ms,
                steps: segmentation.steps,
            })
            .into_response())
        }
    }
}

/// Handle one translated bundle of a document
async fn handle_bundle(
    State(state): State<AppState>,
    Path(name): Path<String>,
    payload: Result<Json<BundleBody>, JsonRejection>,
) -> Result<Json<BundleOutcome>, PipelineError> {
    let Json(body) = payload.map_err(|e| PipelineError::InvalidRequest(e.body_text()))?;

    let request = BundleRequest {
        document_name: name,
        bundle_index: body.bundle_index,
        is_last: body.is_last,
    };
    let fragment = Fragment::new(body.format, body.content);

    let outcome = state.assembler.submit(request, fragment).await?;
    Ok(Json(outcome))
}

/// Open a session explicitly; fails if one already exists
async fn handle_open(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<SessionStatus>, PipelineError> {
    let id = DocumentId::parse(&name)?;
    let language = id.language();
    let handle = state.assembler.store().create(id, language).await?;
    let status = handle.lock().await.status();
    Ok(Json(status))
}

async fn handle_status(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<SessionStatus>, PipelineError> {
    let id = DocumentId::parse(&name)?;
    Ok(Json(state.assembler.store().status(&id).await?))
}

/// Finalize a document without submitting another bundle
async fn handle_finalize(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<BundleOutcome>, PipelineError> {
    let id = DocumentId::parse(&name)?;
    let rendered = state.assembler.store().finalize(&id).await?;
    Ok(Json(BundleOutcome::Finalized(rendered)))
}

/// Drop a document session
async fn handle_evict(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<EvictResponse>, PipelineError> {
    let id = DocumentId::parse(&name)?;
    let evicted = state.assembler.store().evict(&id).await;
    Ok(Json(EvictResponse {
        document_id: id.to_string(),
        evicted,
    }))
}

/// Handle health check requests
async fn handle_health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Handle info requests
async fn handle_info(State(state): State<AppState>) -> impl IntoResponse {
    Json(InfoResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        supported_formats: SUPPORTED_FORMATS.iter().map(|s| s.to_string()).collect(),
        max_file_size_bytes: state.config.max_file_size,
        session_ttl_secs: state.config.session_ttl.as_secs(),
        sessions: state.assembler.store().len().await,
        segmentation: state.config.segmentation.clone(),
    })
}
