use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use newhigh_core::domain::constituent::UniverseSnapshot;
use newhigh_core::domain::screen::{ScreenResult, DEFAULT_MIN_ROE};
use newhigh_core::ingest::provider::MarketDataProvider;
use newhigh_core::ingest::yahoo::YahooChartProvider;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = newhigh_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let universe = match UniverseSnapshot::load(settings.universe_path()) {
        Ok(u) => {
            tracing::info!(path = settings.universe_path(), constituents = u.len(), "universe loaded");
            Some(Arc::new(u))
        }
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "universe load failed; starting API in degraded mode");
            None
        }
    };

    let provider: Arc<dyn MarketDataProvider> = Arc::new(YahooChartProvider::from_settings(&settings)?);

    let state = AppState { universe, provider };

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
        .route("/screen", get(get_screen))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    universe: Option<Arc<UniverseSnapshot>>,
    provider: Arc<dyn MarketDataProvider>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScreenParams {
    min_roe: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScreenerResponse {
    results: Vec<ScreenResult>,
    last_updated: DateTime<Utc>,
    total_screened: usize,
    total_passed: usize,
}

/// Whole-screen failure. Details go to logs and Sentry, never to the client.
struct ScreenFailure(anyhow::Error);

impl IntoResponse for ScreenFailure {
    fn into_response(self) -> Response {
        sentry_anyhow::capture_anyhow(&self.0);
        tracing::error!(error = %self.0, "screen failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": "screening failed"})),
        )
            .into_response()
    }
}

async fn get_screen(
    State(state): State<AppState>,
    Query(params): Query<ScreenParams>,
) -> Result<Json<ScreenerResponse>, ScreenFailure> {
    let Some(universe) = &state.universe else {
        return Err(ScreenFailure(anyhow::anyhow!("constituent universe is not loaded")));
    };

    let min_roe = params.min_roe.unwrap_or(DEFAULT_MIN_ROE);
    let report = newhigh_core::screener::run_screen(universe, state.provider.as_ref(), min_roe).await;

    Ok(Json(ScreenerResponse {
        results: report.results,
        last_updated: Utc::now(),
        total_screened: report.total_screened,
        total_passed: report.total_passed,
    }))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &newhigh_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
