// config.rs
#[derive(Debug, Clone)]
pub struct MpesaConfig {
    pub base_url: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    pub shortcode: String,
    pub passkey: String,
    pub callback_url: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_maxage: i64,
    pub port: u16,
    pub log_level: String,
    pub cors_origins: Vec<String>,
    pub mpesa: MpesaConfig,
    // Background work
    pub auto_approve_delay_secs: u64,
    pub auto_approve_sweep_secs: u64,
    pub payment_poll_interval_ms: u64,
    pub payment_poll_max_attempts: u32,
    // Seeded on startup when both are set
    pub bootstrap_admin_email: Option<String>,
    pub bootstrap_admin_password: Option<String>,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn init() -> Config {
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let jwt_secret = std::env::var("JWT_SECRET_KEY").expect("JWT_SECRET_KEY must be set");
        let jwt_maxage = std::env::var("JWT_MAXAGE").expect("JWT_MAXAGE must be set");

        let cors_origins = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173,http://localhost:8000".to_string())
            .split(',')
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();

        // Daraja sandbox defaults
        let mpesa = MpesaConfig {
            base_url: std::env::var("MPESA_BASE_URL")
                .unwrap_or_else(|_| "https://sandbox.safaricom.co.ke".to_string()),
            consumer_key: std::env::var("MPESA_CONSUMER_KEY").unwrap_or_default(),
            consumer_secret: std::env::var("MPESA_CONSUMER_SECRET").unwrap_or_default(),
            shortcode: std::env::var("MPESA_SHORTCODE").unwrap_or_else(|_| "174379".to_string()),
            passkey: std::env::var("MPESA_PASSKEY").unwrap_or_default(),
            callback_url: std::env::var("MPESA_CALLBACK_URL")
                .unwrap_or_else(|_| "http://localhost:8000/api/mpesa/callback".to_string()),
        };

        Config {
            database_url,
            jwt_secret,
            jwt_maxage: jwt_maxage.parse::<i64>().expect("JWT_MAXAGE must be a number"),
            port: env_or("PORT", 8000),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "debug".to_string()),
            cors_origins,
            mpesa,
            auto_approve_delay_secs: env_or("AUTO_APPROVE_DELAY_SECS", 180),
            auto_approve_sweep_secs: env_or("AUTO_APPROVE_SWEEP_SECS", 60),
            payment_poll_interval_ms: env_or("PAYMENT_POLL_INTERVAL_MS", 2000),
            payment_poll_max_attempts: env_or("PAYMENT_POLL_MAX_ATTEMPTS", 90),
            bootstrap_admin_email: std::env::var("BOOTSTRAP_ADMIN_EMAIL").ok(),
            bootstrap_admin_password: std::env::var("BOOTSTRAP_ADMIN_PASSWORD").ok(),
        }
    }
}
