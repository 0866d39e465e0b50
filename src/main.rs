mod config;
mod db;
mod dtos;
mod error;
mod handler;
mod middleware;
mod models;
mod routes;
mod service;
mod utils;

use std::{str::FromStr, sync::Arc, time::Duration};

use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderName, HeaderValue, Method,
};
use config::Config;
use db::{userdb::UserExt, DBClient};
use dotenv::dotenv;
use models::usermodel::UserRole;
use routes::create_router;
use service::{
    background_jobs,
    bid_service::BidService,
    event_bus::EventBus,
    job_service::JobService,
    mpesa::{DarajaGateway, PushPaymentGateway},
    settlement_service::SettlementService,
};
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::filter::LevelFilter;
use utils::password;

#[derive(Debug, Clone)]
pub struct AppState {
    pub env: Config,
    pub db_client: Arc<DBClient>,
    pub event_bus: Arc<EventBus>,
    pub job_service: Arc<JobService>,
    pub bid_service: Arc<BidService>,
    pub settlement_service: Arc<SettlementService>,
}

impl AppState {
    pub fn new(db_client: DBClient, config: Config) -> Self {
        let db_client = Arc::new(db_client);
        let event_bus = Arc::new(EventBus::new());
        let gateway: Arc<dyn PushPaymentGateway> =
            Arc::new(DarajaGateway::new(config.mpesa.clone()));

        let job_service = Arc::new(JobService::new(
            db_client.clone(),
            event_bus.clone(),
            Duration::from_secs(config.auto_approve_delay_secs),
        ));
        let bid_service = Arc::new(BidService::new(
            db_client.clone(),
            job_service.clone(),
            event_bus.clone(),
        ));
        let settlement_service = Arc::new(SettlementService::new(
            db_client.clone(),
            job_service.clone(),
            gateway,
            event_bus.clone(),
            Duration::from_millis(config.payment_poll_interval_ms),
            config.payment_poll_max_attempts,
        ));

        AppState {
            env: config,
            db_client,
            event_bus,
            job_service,
            bid_service,
            settlement_service,
        }
    }
}

async fn seed_bootstrap_admin(db_client: &DBClient, config: &Config) {
    let (Some(email), Some(secret)) = (
        config.bootstrap_admin_email.as_deref(),
        config.bootstrap_admin_password.as_deref(),
    ) else {
        return;
    };

    let email = email.trim().to_lowercase();

    match db_client.get_user(None, Some(&email)).await {
        Ok(Some(_)) => return,
        Ok(None) => {}
        Err(e) => {
            tracing::error!("Could not look up bootstrap admin: {}", e);
            return;
        }
    }

    let hashed = match password::hash(secret) {
        Ok(hashed) => hashed,
        Err(e) => {
            tracing::error!("Could not hash bootstrap admin password: {}", e.to_string());
            return;
        }
    };

    match db_client
        .save_user("Administrator".to_string(), email.clone(), None, hashed, UserRole::Admin, true)
        .await
    {
        Ok(user) => tracing::info!("Seeded bootstrap admin {} ({})", email, user.display_id),
        Err(e) => tracing::error!("Failed to seed bootstrap admin: {}", e),
    }
}

#[tokio::main]
async fn main() {
    dotenv().ok();

    let config = Config::init();

    let level = LevelFilter::from_str(&config.log_level).unwrap_or(LevelFilter::DEBUG);
    tracing_subscriber::fmt().with_max_level(level).init();

    let pool = match PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
    {
        Ok(pool) => {
            tracing::info!("Connection to the database is successful");
            pool
        }
        Err(err) => {
            tracing::error!("Failed to connect to the database: {:?}", err);
            std::process::exit(1);
        }
    };

    let db_client = DBClient::new(pool);

    if let Err(err) = db_client.apply_migrations().await {
        tracing::error!("Failed to apply migrations: {:?}", err);
        std::process::exit(1);
    }

    seed_bootstrap_admin(&db_client, &config).await;

    let allowed_origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {}", origin);
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_headers([
            AUTHORIZATION,
            ACCEPT,
            CONTENT_TYPE,
            HeaderName::from_static("idempotency-key"),
        ])
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ]);

    let app_state = Arc::new(AppState::new(db_client, config.clone()));

    tokio::spawn(background_jobs::start_auto_approve_sweep(app_state.clone()));
    tokio::spawn(background_jobs::reconcile_pending_payments(app_state.clone()));

    let app = create_router(app_state).layer(cors);

    let listener = match tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!("Failed to bind port {}: {}", config.port, err);
            std::process::exit(1);
        }
    };

    tracing::info!("Server is running on http://localhost:{}", config.port);

    if let Err(err) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", err);
    }
}
