// go-now API v0.1
use axum::{
    routing::{get, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod config;
mod db;
mod errors;
mod routes;
mod services;

use config::AppConfig;
use routes::forecasts::AppState;
use services::open_meteo::{OpenMeteoEndpoints, OpenMeteoProvider};
use services::storage::PgStorage;

/// Maximum number of connections in the database pool.
const DB_POOL_MAX_CONNECTIONS: u32 = 5;
/// Minimum number of connections kept alive in the database pool.
const DB_POOL_MIN_CONNECTIONS: u32 = 2;

/// go-now API — OpenAPI specification.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "go-now API",
        version = "0.1.0",
        description = "Hourly go/no-go activity scores for a fixed coastal spot. \
            An hourly-triggered pipeline ingests weather, marine, and air-quality \
            forecasts from Open-Meteo into a curated dataset and a serving document; \
            the API reads the serving document and scores each hour for four \
            activity modes (solo swim, swim with dog, solo run, run with dog).",
        license(name = "MIT"),
    ),
    tags(
        (name = "Health", description = "Service health derived from forecast freshness"),
        (name = "Forecasts", description = "Forecast retrieval and activity scoring"),
        (name = "Ingest", description = "Scheduler-triggered forecast ingestion"),
    ),
    paths(
        routes::health::health_check,
        routes::forecasts::get_forecast,
        routes::forecasts::get_scores,
        routes::ingest::trigger_ingest,
    ),
    components(
        schemas(
            routes::health::HealthResponse,
            routes::health::ForecastHealthDetail,
            routes::forecasts::ForecastResponse,
            routes::forecasts::ScoredForecastResponse,
            routes::forecasts::ScoredHour,
            routes::forecasts::HourScores,
            routes::ingest::TriggerPayload,
            db::models::ForecastHour,
            services::provider::DailySunRow,
            services::scoring::ModeScore,
            services::scoring::ReasonChip,
            services::ingest::IngestOutcome,
            services::ingest::RunStatus,
            errors::ErrorResponse,
        )
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "go_now_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env();
    tracing::info!(env = %config.env, area_id = %config.area_id, "starting go-now API");

    // Set up database connection pool
    let pool = PgPoolOptions::new()
        .max_connections(DB_POOL_MAX_CONNECTIONS)
        .min_connections(DB_POOL_MIN_CONNECTIONS)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run migrations
    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run database migrations");

    tracing::info!("Database migrations completed");

    let provider = OpenMeteoProvider::new(OpenMeteoEndpoints {
        weather_base: config.open_meteo_base_url.clone(),
        marine_base: config.open_meteo_marine_base_url.clone(),
        air_quality_base: config.open_meteo_air_quality_base_url.clone(),
    });
    let storage = PgStorage::new(pool.clone());

    // --local-trigger '<json-payload>' runs one ingest synchronously and
    // prints the outcome instead of serving HTTP.
    let args: Vec<String> = std::env::args().collect();
    if args.get(1).map(String::as_str) == Some("--local-trigger") {
        let payload: routes::ingest::TriggerPayload = match args.get(2) {
            Some(raw) => serde_json::from_str(raw).expect("invalid --local-trigger payload"),
            None => Default::default(),
        };
        let area_id = payload.area_id.unwrap_or_else(|| config.area_id.clone());
        let horizon_days = payload.horizon_days.unwrap_or(config.horizon_days);

        let outcome = services::ingest::run_ingest(
            &provider,
            &storage,
            &area_id,
            config.lat,
            config.lon,
            horizon_days,
        )
        .await;

        println!(
            "{}",
            serde_json::to_string_pretty(&outcome).expect("outcome serializes")
        );
        return;
    }

    // Build shared application state
    let port = config.port;
    let app_state = AppState {
        pool,
        provider,
        storage,
        config,
    };

    // Build router
    let app = Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .route("/api/v1/forecast", get(routes::forecasts::get_forecast))
        .route("/api/v1/scores", get(routes::forecasts::get_scores))
        .route(
            "/api/v1/ingest/trigger",
            post(routes::ingest::trigger_ingest),
        )
        .with_state(app_state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("API server listening on {}", addr);
    tracing::info!(
        "Swagger UI available at http://localhost:{}/swagger-ui/",
        port
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind TCP listener");
    axum::serve(listener, app)
        .await
        .expect("Server terminated unexpectedly");
}
