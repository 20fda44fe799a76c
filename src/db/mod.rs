mod schema;
pub mod queries;

mod from_row;

pub use schema::init_db;

use std::sync::Arc;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::payments::PaymentGateway;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state shared across handlers.
///
/// The gateway is an injected trait object so the checkout path can be
/// exercised in tests without live network calls.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub gateway: Arc<dyn PaymentGateway>,
    /// Base URL of this service (success URL construction).
    pub base_url: String,
    /// Marketing site home (invalid landing access, checkout cancel).
    pub home_url: String,
    /// Flat audit price in the smallest currency unit.
    pub audit_price_cents: i64,
    pub currency: String,
    /// How long the landing endpoint waits before its single re-check.
    pub confirm_recheck: Duration,
    /// Bearer key for internal dashboard routes.
    pub admin_api_key: Option<String>,
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path);
    Pool::builder().max_size(10).build(manager)
}
