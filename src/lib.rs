// Vehicle make/type sync service: pulls the NHTSA vPIC registry into a local
// store and serves it over REST and GraphQL

pub mod api;
pub mod cache;
pub mod config;
pub mod fetcher;
pub mod model;
pub mod pipeline;
pub mod query;
pub mod store;
pub mod xml;

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use api::{build_router, build_schema, ApiError, VehicleSchema};
pub use cache::{create_cache_key, CacheStatsReport, ExpiringCache, TtlCache};
pub use fetcher::{FetchError, HttpTransport, ReqwestTransport, RetryConfig, RetryingFetcher};
pub use model::{VehicleMake, VehicleType};
pub use pipeline::{SyncConfig, SyncError, SyncReport, VehicleSyncService};
pub use query::VehicleQueryService;
pub use store::{MemoryVehicleStore, SqliteVehicleStore, StoreError, VehicleFilter, VehicleStore};
pub use xml::{ParseError, XmlParser};

#[derive(Debug, Error)]
pub enum InitError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

// Shared handles for the HTTP handlers and background tasks
#[derive(Clone)]
pub struct AppState {
    pub sync: Arc<VehicleSyncService>,
    pub query: Arc<VehicleQueryService>,
    pub schema: VehicleSchema,
}

impl AppState {
    pub fn new(sync: Arc<VehicleSyncService>, query: Arc<VehicleQueryService>) -> Self {
        let schema = build_schema(query.clone());
        Self {
            sync,
            query,
            schema,
        }
    }

    // Wire the production components: SQLite store, reqwest transport, TTL cache
    pub async fn from_config(config: &config::AppConfig) -> Result<Self, InitError> {
        let store: Arc<dyn VehicleStore> = Arc::new(
            SqliteVehicleStore::connect(&config.database.url, config.database.max_pool_size)
                .await?,
        );
        tracing::info!(url = %config.database.url, "connected to vehicle store");

        let transport = ReqwestTransport::new(Duration::from_secs(config.fetch.timeout_seconds))?;
        let fetcher = RetryingFetcher::new(Arc::new(transport), config.retry_config());

        let sync = VehicleSyncService::new(
            fetcher,
            XmlParser::new(),
            store.clone(),
            config.sync_config(),
        );

        let cache: Arc<dyn ExpiringCache<Vec<VehicleMake>>> =
            Arc::new(TtlCache::new(config.cache_config()));
        let query = VehicleQueryService::new(store, cache);

        Ok(Self::new(Arc::new(sync), Arc::new(query)))
    }
}
