// Persistence for vehicle make documents.

mod memory;
mod sqlite;

pub use memory::MemoryVehicleStore;
pub use sqlite::SqliteVehicleStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::VehicleMake;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// Name filter plus offset pagination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleFilter {
    pub make_name: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl VehicleFilter {
    // Name fragment in the form both backends compare against
    pub fn folded_name(&self) -> Option<String> {
        self.make_name.as_deref().map(fold_name)
    }

    pub fn matches(&self, make: &VehicleMake) -> bool {
        match self.folded_name() {
            Some(name) => fold_name(&make.make_name).contains(&name),
            None => true,
        }
    }
}

// Unicode lowercasing; SQLite's lower() only folds ASCII
pub fn fold_name(name: &str) -> String {
    name.to_lowercase()
}

#[async_trait]
pub trait VehicleStore: Send + Sync + 'static {
    // Remove every stored make, returning how many were deleted
    async fn delete_all(&self) -> Result<u64, StoreError>;

    // Append makes in order. The whole batch is rejected if any record is invalid.
    async fn insert_many(&self, makes: &[VehicleMake]) -> Result<usize, StoreError>;

    // Swap the whole collection for `makes`, inserted in chunks of `batch_size`.
    // Either every batch lands or the previous contents stay. Returns the batch count.
    async fn replace_all(
        &self,
        makes: &[VehicleMake],
        batch_size: usize,
    ) -> Result<usize, StoreError>;

    // Makes matching the filter, in insertion order
    async fn find(&self, filter: &VehicleFilter) -> Result<Vec<VehicleMake>, StoreError>;

    async fn count(&self) -> Result<u64, StoreError>;
}

pub fn validate(make: &VehicleMake) -> Result<(), StoreError> {
    match make.missing_field() {
        Some(field) => Err(StoreError::Validation(format!(
            "vehicle make {} is missing required field {}",
            make.make_id, field
        ))),
        None => Ok(()),
    }
}

pub fn validate_all(makes: &[VehicleMake]) -> Result<(), StoreError> {
    makes.iter().try_for_each(validate)
}
