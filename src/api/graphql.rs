use async_graphql::{Context, EmptyMutation, EmptySubscription, Object, Schema, SimpleObject};
use std::sync::Arc;

use crate::model::{VehicleMake, VehicleType};
use crate::query::VehicleQueryService;

pub type VehicleSchema = Schema<QueryRoot, EmptyMutation, EmptySubscription>;

#[derive(Debug, Clone, SimpleObject)]
#[graphql(name = "VehicleType")]
pub struct VehicleTypeObject {
    pub vehicle_type_id: String,
    pub vehicle_type_name: String,
}

#[derive(Debug, Clone, SimpleObject)]
#[graphql(name = "Vehicle")]
pub struct VehicleObject {
    pub make_id: i64,
    pub make_name: String,
    pub vehicle_types: Vec<VehicleTypeObject>,
}

impl From<VehicleType> for VehicleTypeObject {
    fn from(vehicle_type: VehicleType) -> Self {
        Self {
            vehicle_type_id: vehicle_type.vehicle_type_id,
            vehicle_type_name: vehicle_type.vehicle_type_name,
        }
    }
}

impl From<VehicleMake> for VehicleObject {
    fn from(make: VehicleMake) -> Self {
        Self {
            make_id: make.make_id,
            make_name: make.make_name,
            vehicle_types: make.vehicle_types.into_iter().map(Into::into).collect(),
        }
    }
}

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    /// Stored vehicle makes, optionally filtered by a case-insensitive name fragment
    async fn get_vehicles(
        &self,
        ctx: &Context<'_>,
        make_name: Option<String>,
        limit: Option<i32>,
        offset: Option<i32>,
    ) -> async_graphql::Result<Vec<VehicleObject>> {
        let query = ctx.data::<Arc<VehicleQueryService>>()?;
        let makes = query
            .query(
                make_name.as_deref(),
                limit.map(i64::from),
                offset.map(i64::from),
            )
            .await?;
        Ok(makes.into_iter().map(Into::into).collect())
    }
}

pub fn build_schema(query: Arc<VehicleQueryService>) -> VehicleSchema {
    Schema::build(QueryRoot, EmptyMutation, EmptySubscription)
        .data(query)
        .finish()
}
