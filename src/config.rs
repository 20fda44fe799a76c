use std::env;

/// Rate limit settings for the public router, requests per minute per IP.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitSettings {
    /// Endpoints that call out to the payment gateway (checkout).
    pub strict_rpm: u32,
    /// Everything else on the public surface (payment landing).
    pub standard_rpm: u32,
}

#[derive(Debug, Clone)]
pub struct StripeSettings {
    pub secret_key: String,
    pub webhook_secret: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    /// Base URL of this service, used to build the post-checkout success URL.
    pub base_url: String,
    /// Marketing site home. Invalid direct access to the landing endpoint
    /// redirects here; it also serves as the checkout cancel destination.
    pub home_url: String,
    pub stripe: StripeSettings,
    /// Flat price of the audit in the smallest currency unit.
    pub audit_price_cents: i64,
    pub currency: String,
    /// Delay before the landing endpoint re-checks an unresolved record.
    pub confirm_recheck_ms: u64,
    pub rate_limit: RateLimitSettings,
    /// Bearer key for the internal dashboard API. Unset = routes not mounted.
    pub admin_api_key: Option<String>,
    /// Retention for the webhook replay-prevention table. 0 = never purge.
    pub webhook_event_retention_days: i64,
    pub dev_mode: bool,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("AUDITFLOW_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let base_url =
            env::var("BASE_URL").unwrap_or_else(|_| format!("http://{}:{}", host, port));
        let home_url = env::var("HOME_URL").unwrap_or_else(|_| base_url.clone());

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "auditflow.db".to_string()),
            base_url,
            home_url,
            stripe: StripeSettings {
                secret_key: env::var("STRIPE_SECRET_KEY").unwrap_or_default(),
                webhook_secret: env::var("STRIPE_WEBHOOK_SECRET").unwrap_or_default(),
            },
            audit_price_cents: env_i64("AUDIT_PRICE_CENTS", 19900),
            currency: env::var("AUDIT_CURRENCY").unwrap_or_else(|_| "usd".to_string()),
            confirm_recheck_ms: env_i64("CONFIRM_RECHECK_MS", 2000) as u64,
            rate_limit: RateLimitSettings {
                strict_rpm: env_i64("RATE_LIMIT_STRICT_RPM", 10) as u32,
                standard_rpm: env_i64("RATE_LIMIT_STANDARD_RPM", 30) as u32,
            },
            admin_api_key: env::var("ADMIN_API_KEY").ok().filter(|k| !k.is_empty()),
            webhook_event_retention_days: env_i64("WEBHOOK_EVENT_RETENTION_DAYS", 30),
            dev_mode,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_i64(key: &str, default: i64) -> i64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
