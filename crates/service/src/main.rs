use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{middleware, routing::get, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use dishmatch_core::{
    load_or_train, EngineConfig, EngineHandle, EngineState, Recommendation, RecommendError,
};

#[derive(Clone)]
struct AppState {
    engine: Arc<EngineHandle>,
    default_top_n: usize,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = EngineConfig::load().context("failed to load configuration")?;
    let default_top_n = config.top_n;
    let engine = Arc::new(EngineHandle::new());
    let loader = engine.clone();
    task::spawn_blocking(move || loader.initialize(|| load_or_train(&config)).map(|_| ()))
        .await
        .context("model initialization panicked")?
        .context("failed to initialize recommender")?;

    let state = AppState {
        engine,
        default_top_n,
    };
    let addr: SocketAddr = std::env::var("BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8000".to_string())
        .parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening" = %addr);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handle_root).options(handle_preflight))
        .route("/health", get(handle_health).options(handle_preflight))
        .route("/ingredients", get(handle_ingredients).options(handle_preflight))
        .route("/recommend", post(handle_recommend).options(handle_preflight))
        .layer(middleware::map_response(add_cors_headers))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct RecommendRequest {
    ingredients: Vec<String>,
    top_n: Option<usize>,
}

#[derive(Debug, Serialize)]
struct RecommendResponse {
    recommendations: Vec<RecommendationBody>,
}

#[derive(Debug, Serialize)]
struct RecommendationBody {
    name: String,
    similarity_score: f32,
    ingredients: Vec<String>,
    matching_ingredients: usize,
    total_ingredients: usize,
    missing_ingredients: Vec<String>,
}

impl From<Recommendation> for RecommendationBody {
    fn from(value: Recommendation) -> Self {
        Self {
            name: value.recipe.name,
            similarity_score: value.score,
            ingredients: value.recipe.ingredient_tokens,
            matching_ingredients: value.matching_count,
            total_ingredients: value.total_ingredients,
            missing_ingredients: value.missing_ingredients,
        }
    }
}

#[derive(Debug, Serialize)]
struct IngredientsResponse {
    ingredients: Vec<String>,
}

#[derive(Debug, Serialize)]
struct MessageResponse {
    message: &'static str,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    recipes: usize,
    ingredients: usize,
}

async fn handle_root() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "Welcome to the dish recommendation API",
    })
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = match state.engine.state() {
        EngineState::Ready => "ready",
        EngineState::Loading => "loading",
        EngineState::Uninitialized => "uninitialized",
    };
    let (recipes, ingredients) = state
        .engine
        .get()
        .map(|engine| (engine.recipes().len(), engine.vocabulary().len()))
        .unwrap_or((0, 0));
    Json(HealthResponse {
        status,
        recipes,
        ingredients,
    })
}

async fn handle_ingredients(
    State(state): State<AppState>,
) -> Result<Json<IngredientsResponse>, AppError> {
    let ingredients = state.engine.ingredient_names()?;
    Ok(Json(IngredientsResponse { ingredients }))
}

async fn handle_recommend(
    State(state): State<AppState>,
    payload: Result<Json<RecommendRequest>, JsonRejection>,
) -> Result<Json<RecommendResponse>, AppError> {
    let Json(body) = payload?;
    if body.ingredients.is_empty() {
        return Err(RecommendError::EmptyQuery.into());
    }
    let top_n = body.top_n.unwrap_or(state.default_top_n);
    let engine = state.engine.clone();
    let results = task::spawn_blocking(move || engine.recommend(&body.ingredients, top_n))
        .await
        .map_err(AppError::internal)??;
    Ok(Json(RecommendResponse {
        recommendations: results.into_iter().map(RecommendationBody::from).collect(),
    }))
}

async fn handle_preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn add_cors_headers(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("*"),
    );
    response
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    kind: &'static str,
    message: String,
}

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Engine(#[from] RecommendError),
    #[error("invalid request body: {0}")]
    InvalidRequest(#[from] JsonRejection),
    #[error(transparent)]
    Internal(anyhow::Error),
}

impl AppError {
    fn internal<E: Into<anyhow::Error>>(err: E) -> Self {
        Self::Internal(err.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Engine(err) => {
                let status = if err.is_client_error() {
                    StatusCode::BAD_REQUEST
                } else if matches!(err, RecommendError::ModelNotReady) {
                    StatusCode::SERVICE_UNAVAILABLE
                } else {
                    error!("engine_error" = %err);
                    StatusCode::INTERNAL_SERVER_ERROR
                };
                (
                    status,
                    ErrorBody {
                        kind: err.kind(),
                        message: err.to_string(),
                    },
                )
            }
            AppError::InvalidRequest(rejection) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    kind: "invalid_request",
                    message: rejection.body_text(),
                },
            ),
            AppError::Internal(err) => {
                error!("internal_error" = %err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        kind: "internal_error",
                        message: "internal error".to_string(),
                    },
                )
            }
        };
        (status, Json(body)).into_response()
    }
}
