use async_trait::async_trait;
use parking_lot::RwLock;

use super::{validate_all, StoreError, VehicleFilter, VehicleStore};
use crate::model::VehicleMake;

// Keeps the collection in a vector; insertion order is the natural order
#[derive(Default)]
pub struct MemoryVehicleStore {
    makes: RwLock<Vec<VehicleMake>>,
}

impl MemoryVehicleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_makes(makes: Vec<VehicleMake>) -> Self {
        Self {
            makes: RwLock::new(makes),
        }
    }

    pub fn snapshot(&self) -> Vec<VehicleMake> {
        self.makes.read().clone()
    }
}

#[async_trait]
impl VehicleStore for MemoryVehicleStore {
    async fn delete_all(&self) -> Result<u64, StoreError> {
        let mut makes = self.makes.write();
        let deleted = makes.len() as u64;
        makes.clear();
        Ok(deleted)
    }

    async fn insert_many(&self, makes: &[VehicleMake]) -> Result<usize, StoreError> {
        validate_all(makes)?;
        self.makes.write().extend_from_slice(makes);
        Ok(makes.len())
    }

    async fn replace_all(
        &self,
        makes: &[VehicleMake],
        batch_size: usize,
    ) -> Result<usize, StoreError> {
        let mut replacement = Vec::with_capacity(makes.len());
        let mut batches = 0;
        for batch in makes.chunks(batch_size.max(1)) {
            validate_all(batch)?;
            replacement.extend_from_slice(batch);
            batches += 1;
        }

        *self.makes.write() = replacement;
        Ok(batches)
    }

    async fn find(&self, filter: &VehicleFilter) -> Result<Vec<VehicleMake>, StoreError> {
        let makes = self.makes.read();
        Ok(makes
            .iter()
            .filter(|make| filter.matches(make))
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.makes.read().len() as u64)
    }
}
