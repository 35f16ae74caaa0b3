use axum::{
    extract::{rejection::BytesRejection, DefaultBodyLimit, Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use serde_json::{json, Value};
use std::{any::Any, sync::Arc};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};

use crate::{
    config::Config,
    error::AppError,
    models::{GenerationRequest, GenerationResponse, HealthResponse, OPTIONAL_FIELDS, REQUIRED_FIELDS},
    openrouter::{CompletionClient, OpenRouterClient},
    prompt::UpstreamPrompt,
    rate_limit::{rate_limit_middleware, FixedWindowLimiter, RateLimiter},
};

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub upstream: Arc<dyn CompletionClient>,
    pub limiter: Arc<dyn RateLimiter>,
}

impl AppState {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let upstream = OpenRouterClient::new(config)?;
        Ok(Self {
            upstream: Arc::new(upstream),
            limiter: Arc::new(FixedWindowLimiter::new(config.daily_limit, config.minute_limit)),
        })
    }
}

pub fn build_router(state: AppState, allowed_origins: &[String]) -> Router {
    let generate = post(generate_description)
        .route_layer(middleware::from_fn_with_state(state.limiter.clone(), rate_limit_middleware));

    let routes = Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/generate-description", generate)
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state);

    // The routed tree is nested as a whole so the 405 rewrite sees the
    // `Allow` header each method router adds on its way out.
    Router::new()
        .fallback_service(routes)
        .layer(middleware::from_fn(method_not_allowed))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(allowed_origins))
        // catch-all CORS headers, only where the allowlist did not answer
        .layer(SetResponseHeaderLayer::if_not_present(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type,Authorization"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET,PUT,POST,DELETE,OPTIONS"),
        ))
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT, header::ORIGIN])
}

pub async fn index() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "Welcome to the Product Description Generator API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "/generate-description": {
                "method": "POST",
                "description": "Generate a product description",
                "required_fields": REQUIRED_FIELDS,
                "optional_fields": OPTIONAL_FIELDS,
            },
            "/health": {
                "method": "GET",
                "description": "Service health check",
            }
        }
    }))
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok", message: "Server is running" })
}

#[axum::debug_handler]
pub async fn generate_description(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<GenerationResponse>, AppError> {
    let body = body?;
    let request = GenerationRequest::from_json(&body)?;

    tracing::info!("🚀 Generating description for product: {}", request.product_name);

    let prompt = UpstreamPrompt::build(&request);
    let description = state.upstream.complete(&prompt).await?;

    tracing::info!("✅ Description generated ({} chars)", description.chars().count());
    Ok(Json(GenerationResponse { description }))
}

async fn not_found() -> AppError {
    AppError::NotFound
}

/// Re-renders the router's bare 405 as a JSON error listing the `Allow` methods.
async fn method_not_allowed(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let response = next.run(request).await;
    if response.status() != StatusCode::METHOD_NOT_ALLOWED {
        return response;
    }

    let allowed: Vec<String> = response
        .headers()
        .get(header::ALLOW)
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            v.split(',')
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect()
        })
        .unwrap_or_default();

    AppError::MethodNotAllowed { method: method.to_string(), allowed }.into_response()
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let details = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "Unexpected error while handling the request".to_string()
    };
    AppError::Server(details).into_response()
}
