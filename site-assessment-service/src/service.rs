use axum::{
    Router,
    extract::{
        DefaultBodyLimit, Multipart, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::{HeaderValue, Method, Request, StatusCode},
    middleware::{Next, from_fn, from_fn_with_state},
    response::Json,
    routing::{get, post},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{self, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{Instrument, debug, info};
use uuid::Uuid;

use crate::{
    config::AllowedOrigins,
    errors::AssessError,
    models::{AssessResponse, AssessmentContext, UploadedAsset},
    prompt::build_analysis_request,
    rate_limit::{RateLimiter, rate_limit_middleware},
    relay::{AnalysisRelay, CompletionService},
    validation::{UploadPolicy, normalize_mime_type},
};

/// Multipart file field names. `models` is canonical; `model` is the older
/// single-file name.
const FILE_FIELDS: [&str; 2] = ["models", "model"];
const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

#[derive(Clone)]
pub struct AppState {
    pub relay: AnalysisRelay,
    pub upload_policy: UploadPolicy,
}

impl AppState {
    pub fn new(completion: Arc<dyn CompletionService>, upload_policy: UploadPolicy) -> Self {
        Self {
            relay: AnalysisRelay::new(completion),
            upload_policy,
        }
    }
}

/// Where a request currently is in the assessment pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Receiving,
    Validating,
    Building,
    Relaying,
    Responding,
}

impl Stage {
    fn enter(current: &mut Stage, next: Stage) {
        debug!(from = ?*current, to = ?next, "Assessment stage");
        *current = next;
    }
}

pub fn build_router(
    state: AppState,
    allowed_origins: &AllowedOrigins,
    rate_limiter: Option<RateLimiter>,
) -> Router {
    let mut api = Router::new().route("/assess", post(assess));
    if let Some(limiter) = rate_limiter {
        api = api.route_layer(from_fn_with_state(limiter, rate_limit_middleware));
    }

    let body_limit = state.upload_policy.body_limit_bytes();

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .nest("/api", api)
        .layer(
            ServiceBuilder::new()
                .layer(from_fn(correlation_id_middleware))
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(allowed_origins))
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state)
}

fn cors_layer(allowed_origins: &AllowedOrigins) -> CorsLayer {
    match allowed_origins {
        AllowedOrigins::Any => CorsLayer::permissive(),
        AllowedOrigins::List(origins) => {
            let origins: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|origin| HeaderValue::from_str(origin).ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(cors::Any)
        }
    }
}

/// Tags every request with a correlation id and runs it inside a span carrying it
async fn correlation_id_middleware(
    mut request: Request<axum::body::Body>,
    next: Next,
) -> axum::response::Response {
    // Generate a correlation ID for this request
    let correlation_id = Uuid::new_v4().to_string();
    let header_value = HeaderValue::from_str(&correlation_id).ok();

    // Add correlation ID to request headers for downstream use
    if let Some(value) = &header_value {
        request.headers_mut().insert("x-correlation-id", value.clone());
    }

    // Execute the request within a span carrying the correlation ID
    let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
    let mut response = next.run(request).instrument(span).await;

    // Echo it back so clients can quote it when reporting problems
    if let Some(value) = header_value {
        response.headers_mut().insert("x-correlation-id", value);
    }
    response
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "Site Security Assessment Service",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "AI-generated physical security assessments from site photos and 3D models",
        "endpoints": {
            "POST /api/assess": "Upload files (multipart field `models`) with optional site context",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn assess(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<AssessResponse>, AssessError> {
    let mut stage = Stage::Receiving;

    match run_assessment(&state, multipart, &mut stage).await {
        Ok(response) => {
            Stage::enter(&mut stage, Stage::Responding);
            info!(files = response.filenames.len(), "Assessment completed");
            Ok(Json(response))
        }
        Err(err) => {
            info!(failed_at = ?stage, status = %err.status_code(), "Assessment failed");
            Err(err)
        }
    }
}

async fn run_assessment(
    state: &AppState,
    multipart: Result<Multipart, MultipartRejection>,
    stage: &mut Stage,
) -> Result<AssessResponse, AssessError> {
    let multipart = multipart.map_err(|rejection| AssessError::BadRequest {
        message: rejection.body_text(),
    })?;
    let (context, assets) = receive_upload(multipart, &state.upload_policy).await?;

    // Validation runs before any upstream call is made
    Stage::enter(stage, Stage::Validating);
    state.upload_policy.validate(&assets)?;

    Stage::enter(stage, Stage::Building);
    let request = build_analysis_request(&context, &assets);

    // Raw bytes are no longer needed once encoded into the request
    let filenames: Vec<String> = assets
        .into_iter()
        .map(|asset| asset.original_name)
        .collect();

    Stage::enter(stage, Stage::Relaying);
    let result = state.relay.analyze(&request, filenames).await?;

    Ok(result.into())
}

fn multipart_error(err: MultipartError) -> AssessError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AssessError::PayloadTooLarge {
            message: err.body_text(),
        }
    } else {
        AssessError::BadRequest {
            message: err.body_text(),
        }
    }
}

/// Reads the form. Type and count are checked before a file's bytes are read and
/// size is checked as chunks arrive.
async fn receive_upload(
    mut multipart: Multipart,
    policy: &UploadPolicy,
) -> Result<(AssessmentContext, Vec<UploadedAsset>), AssessError> {
    let mut context = AssessmentContext::default();
    let mut assets = Vec::new();

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();

        if !FILE_FIELDS.contains(&name.as_str()) {
            let value = field.text().await.map_err(multipart_error)?;
            if !context.set_field(&name, value) {
                debug!(field = %name, "Ignoring unknown form field");
            }
            continue;
        }

        // parts without a filename are plain values or unfilled file inputs
        let original_name = match field.file_name() {
            Some(file_name) if !file_name.is_empty() => file_name.to_string(),
            _ => {
                debug!(field = %name, "Skipping file field without a filename");
                continue;
            }
        };
        // Keep only the bare essence so the data URI built later is well formed
        let mime_type = normalize_mime_type(field.content_type().unwrap_or(DEFAULT_MIME_TYPE));

        // Reject before reading any bytes of the file
        policy.check_count(assets.len() + 1)?;
        policy.check_type(&mime_type)?;

        // Stream the file in, stopping as soon as it passes the size ceiling
        let mut content = Vec::new();
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            policy.check_size(content.len() + chunk.len())?;
            content.extend_from_slice(&chunk);
        }

        debug!(
            file = %original_name,
            mime_type = %mime_type,
            bytes = content.len(),
            "Received upload"
        );
        assets.push(UploadedAsset::new(original_name, mime_type, content));
    }

    Ok((context, assets))
}
