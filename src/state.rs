use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::Config;
use crate::marketplace::repository::SqliteMarketRepository;
use crate::marketplace::MarketService;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Everything a request handler may touch. Passed explicitly through axum's
/// `State`, never reached through globals.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub market: Arc<MarketService>,
}

impl AppState {
    pub fn new(db: DbPool, config: Config) -> Self {
        let repo = Arc::new(SqliteMarketRepository::new(db.clone()));
        let market = Arc::new(MarketService::new(repo, config.market.clone()));
        Self { db, config, market }
    }
}
