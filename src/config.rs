use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    /// Public base URL used to build cancellation links.
    pub base_url: String,
    pub google_client_id: String,
    pub google_client_secret: String,
    /// Timeout for all external calendar provider calls, in seconds.
    pub calendar_timeout_secs: u64,
    pub messaging_gateway_url: String,
    pub messaging_gateway_key: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "bookline.db".to_string()),
            base_url: env::var("BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            google_client_id: env::var("GOOGLE_CLIENT_ID").unwrap_or_default(),
            google_client_secret: env::var("GOOGLE_CLIENT_SECRET").unwrap_or_default(),
            calendar_timeout_secs: env::var("CALENDAR_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            messaging_gateway_url: env::var("MESSAGING_GATEWAY_URL").unwrap_or_default(),
            messaging_gateway_key: env::var("MESSAGING_GATEWAY_KEY").unwrap_or_default(),
        }
    }
}
