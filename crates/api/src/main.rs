use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use lens_core::domain::recommendation::Recommendation;
use lens_core::domain::record::{SnapshotSummary, StockRecord};
use lens_core::domain::risk::ProfileScore;
use lens_core::error::RecommendError;
use lens_core::recommend::RecommendationService;
use lens_core::storage::{PgSnapshotStore, SnapshotStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const NOT_FOUND_DETAIL: &str = "No stocks found for your risk category.";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = lens_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let store: Option<Arc<dyn SnapshotStore>> = match settings.require_database_url() {
        Ok(db_url) => match sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
        {
            Ok(pool) => match lens_core::storage::migrate(&pool).await {
                Ok(()) => Some(Arc::new(PgSnapshotStore::new(pool))),
                Err(e) => {
                    sentry_anyhow::capture_anyhow(&e);
                    tracing::error!(error = %e, "db migrations failed; starting API in degraded mode");
                    None
                }
            },
            Err(e) => {
                let err = anyhow::Error::new(e);
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %err, "db connect failed; starting API in degraded mode");
                None
            }
        },
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "DATABASE_URL missing; starting API in degraded mode");
            None
        }
    };

    let explainer = match lens_core::llm::from_settings(&settings) {
        Ok(llm) => {
            tracing::info!(provider = %llm.provider(), "explanations enabled");
            Some(llm)
        }
        Err(e) => {
            tracing::warn!(error = %e, "text generation not configured; explanations disabled");
            None
        }
    };

    let state = AppState::new(store, explainer);
    let app = router(state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/recommend", post(recommend))
        .route("/recommend/", post(recommend))
        .route("/snapshots/latest", get(get_latest_snapshot))
        .route("/stocks/:symbol", get(get_stock))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    store: Option<Arc<dyn SnapshotStore>>,
    recommender: Option<RecommendationService>,
}

impl AppState {
    fn new(
        store: Option<Arc<dyn SnapshotStore>>,
        explainer: Option<Arc<dyn lens_core::llm::TextGenerator>>,
    ) -> Self {
        let recommender = store
            .clone()
            .map(|s| RecommendationService::new(s, explainer));
        Self { store, recommender }
    }
}

#[derive(Debug, Deserialize)]
struct RecommendRequest {
    total_score: i32,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn unavailable() -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            detail: "snapshot store unavailable".to_string(),
        }
    }

    fn not_found(detail: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            detail: detail.to_string(),
        }
    }

    fn internal(err: anyhow::Error) -> Self {
        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(error = %format!("{err:#}"), "request failed");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: "internal error".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { detail: self.detail })).into_response()
    }
}

async fn recommend(
    State(state): State<AppState>,
    Json(req): Json<RecommendRequest>,
) -> Result<Json<Recommendation>, ApiError> {
    let Some(svc) = &state.recommender else {
        return Err(ApiError::unavailable());
    };

    match svc.recommend(ProfileScore(req.total_score)).await {
        Ok(rec) => Ok(Json(rec)),
        Err(RecommendError::NotFound { category }) => {
            tracing::info!(%category, total_score = req.total_score, "no stocks for category");
            Err(ApiError::not_found(NOT_FOUND_DETAIL))
        }
        Err(RecommendError::Store(e)) => Err(ApiError::internal(e)),
    }
}

async fn get_latest_snapshot(
    State(state): State<AppState>,
) -> Result<Json<SnapshotSummary>, ApiError> {
    let Some(store) = &state.store else {
        return Err(ApiError::unavailable());
    };

    store
        .latest_summary()
        .await
        .map_err(ApiError::internal)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("No snapshot published yet."))
}

async fn get_stock(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<StockRecord>, ApiError> {
    let Some(store) = &state.store else {
        return Err(ApiError::unavailable());
    };

    let symbol = symbol.trim().to_ascii_uppercase();
    store
        .get_record(&symbol)
        .await
        .map_err(ApiError::internal)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Stock not found."))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &lens_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
