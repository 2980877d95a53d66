// Paginated read path over the store with a short-lived page cache in front.

use std::sync::Arc;

use crate::cache::{create_cache_key, ExpiringCache};
use crate::model::VehicleMake;
use crate::store::{StoreError, VehicleFilter, VehicleStore};

pub const DEFAULT_LIMIT: i64 = 10;
pub const DEFAULT_OFFSET: i64 = 0;

// Turn raw query inputs into a filter. Blank names mean "no filter", a
// non-positive limit or negative offset falls back to the default.
pub fn normalize(make_name: Option<&str>, limit: Option<i64>, offset: Option<i64>) -> VehicleFilter {
    VehicleFilter {
        make_name: make_name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string),
        limit: limit.filter(|l| *l > 0).unwrap_or(DEFAULT_LIMIT),
        offset: offset.filter(|o| *o >= 0).unwrap_or(DEFAULT_OFFSET),
    }
}

pub struct VehicleQueryService {
    store: Arc<dyn VehicleStore>,
    cache: Arc<dyn ExpiringCache<Vec<VehicleMake>>>,
}

impl VehicleQueryService {
    pub fn new(
        store: Arc<dyn VehicleStore>,
        cache: Arc<dyn ExpiringCache<Vec<VehicleMake>>>,
    ) -> Self {
        Self { store, cache }
    }

    pub fn cache(&self) -> &Arc<dyn ExpiringCache<Vec<VehicleMake>>> {
        &self.cache
    }

    pub async fn query(
        &self,
        make_name: Option<&str>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<VehicleMake>, StoreError> {
        let filter = normalize(make_name, limit, offset);
        let cache_key = create_cache_key(filter.make_name.as_deref(), filter.limit, filter.offset);

        if let Some(cached) = self.cache.get(&cache_key) {
            tracing::debug!(key = %cache_key, "Returning cached data");
            return Ok(cached);
        }

        let makes = self.store.find(&filter).await.map_err(|e| {
            tracing::error!(error = %e, "Error fetching vehicles from database");
            e
        })?;

        self.cache.set(&cache_key, makes.clone(), None);
        tracing::debug!(key = %cache_key, count = makes.len(), "cached vehicle page");
        Ok(makes)
    }
}
