// Vehicle sync pipeline: fetch every make, fetch the vehicle types of each make
// one after the other, then replace the stored collection.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

use crate::fetcher::{FetchError, RetryingFetcher};
use crate::model::{VehicleMake, VehicleType, XmlMake, XmlVehicleType};
use crate::store::{validate_all, StoreError, VehicleStore};
use crate::xml::{ParseError, XmlParser};

pub const DEFAULT_BASE_URL: &str = "https://vpic.nhtsa.dot.gov/api/vehicles";
pub const DEFAULT_BATCH_SIZE: usize = 100;

const MAKES_KEY: &str = "AllVehicleMakes";
const VEHICLE_TYPES_KEY: &str = "VehicleTypesForMakeIds";

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Error fetching vehicle types for makeId {make_id}")]
    TypeFetchFailed {
        make_id: i64,
        #[source]
        source: Box<SyncError>,
    },

    #[error("Error fetching or storing vehicle data")]
    SyncFailed,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub base_url: String,
    pub batch_size: usize,
    // Stop after this many makes; `None` keeps all of them
    pub make_limit: Option<usize>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            make_limit: None,
        }
    }
}

impl SyncConfig {
    pub fn makes_url(&self) -> String {
        format!("{}/getallmakes?format=XML", self.base_url.trim_end_matches('/'))
    }

    pub fn vehicle_types_url(&self, make_id: i64) -> String {
        format!(
            "{}/GetVehicleTypesForMakeId/{}?format=xml",
            self.base_url.trim_end_matches('/'),
            make_id
        )
    }
}

// Outcome of one completed sync run
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    pub makes: usize,
    pub vehicle_types: usize,
    pub batches: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

pub struct VehicleSyncService {
    fetcher: RetryingFetcher,
    parser: XmlParser,
    store: Arc<dyn VehicleStore>,
    config: SyncConfig,
}

impl VehicleSyncService {
    pub fn new(
        fetcher: RetryingFetcher,
        parser: XmlParser,
        store: Arc<dyn VehicleStore>,
        config: SyncConfig,
    ) -> Self {
        Self {
            fetcher,
            parser,
            store,
            config,
        }
    }

    // Run one full sync. The cause of a failure is logged; callers only get `SyncFailed`.
    pub async fn sync_all(&self) -> Result<SyncReport, SyncError> {
        let started_at = Utc::now();
        match self.run(started_at).await {
            Ok(report) => {
                tracing::info!(
                    makes = report.makes,
                    vehicle_types = report.vehicle_types,
                    batches = report.batches,
                    elapsed_ms = (report.finished_at - report.started_at).num_milliseconds(),
                    "vehicle sync finished"
                );
                Ok(report)
            }
            Err(e) => {
                tracing::error!(error = %e, cause = ?std::error::Error::source(&e), "Error fetching or storing vehicle data");
                Err(SyncError::SyncFailed)
            }
        }
    }

    async fn run(&self, started_at: DateTime<Utc>) -> Result<SyncReport, SyncError> {
        let xml = self.fetcher.fetch(&self.config.makes_url()).await?;
        let document = self.parser.parse(&xml)?;
        let xml_makes: Vec<XmlMake> = XmlParser::decode_records(&document, MAKES_KEY)?;

        let limit = self.config.make_limit.unwrap_or(usize::MAX);
        let mut vehicles_to_insert = Vec::new();

        for xml_make in xml_makes.iter().take(limit) {
            let make_id = parse_make_id(xml_make)?;
            let make_name = xml_make.make_name.first().unwrap_or_default();
            let vehicle_types = self.types_for_make(make_id).await?;

            vehicles_to_insert.push(VehicleMake::new(make_id, make_name, vehicle_types));
            tracing::debug!(
                make_id,
                prepared = vehicles_to_insert.len(),
                "vehicle make prepared for insertion"
            );
        }

        let vehicle_types = vehicles_to_insert
            .iter()
            .map(|make| make.vehicle_types.len())
            .sum();
        let batches = self.replace_all(&vehicles_to_insert).await?;

        Ok(SyncReport {
            makes: vehicles_to_insert.len(),
            vehicle_types,
            batches,
            started_at,
            finished_at: Utc::now(),
        })
    }

    // Swap the stored collection for `makes`, leaving the store alone when
    // there is nothing to write. Returns the number of insert batches.
    async fn replace_all(&self, makes: &[VehicleMake]) -> Result<usize, SyncError> {
        if makes.is_empty() {
            tracing::info!("No vehicles to insert.");
            return Ok(0);
        }

        // reject before touching the store
        validate_all(makes)?;

        let batches = self
            .store
            .replace_all(makes, self.config.batch_size)
            .await?;
        tracing::info!(
            inserted = makes.len(),
            batches,
            "stored vehicle makes replaced"
        );
        Ok(batches)
    }

    // Vehicle types of one make, in API order
    pub async fn types_for_make(&self, make_id: i64) -> Result<Vec<VehicleType>, SyncError> {
        self.fetch_types(make_id).await.map_err(|e| {
            tracing::error!(make_id, error = %e, "Failed to fetch vehicle types for makeId {}", make_id);
            SyncError::TypeFetchFailed {
                make_id,
                source: Box::new(e),
            }
        })
    }

    async fn fetch_types(&self, make_id: i64) -> Result<Vec<VehicleType>, SyncError> {
        let xml = self
            .fetcher
            .fetch(&self.config.vehicle_types_url(make_id))
            .await?;
        let document = self.parser.parse(&xml)?;
        let records: Vec<XmlVehicleType> =
            XmlParser::decode_records(&document, VEHICLE_TYPES_KEY)?;

        Ok(records
            .into_iter()
            .map(|record| {
                VehicleType::new(
                    record.vehicle_type_id.first().unwrap_or_default(),
                    record.vehicle_type_name.first().unwrap_or_default(),
                )
            })
            .collect())
    }
}

fn parse_make_id(xml_make: &XmlMake) -> Result<i64, ParseError> {
    let raw = xml_make.make_id.first().unwrap_or_default();
    raw.trim()
        .parse::<i64>()
        .map_err(|_| ParseError::InvalidValue {
            field: "Make_ID".to_string(),
            value: raw,
        })
}
