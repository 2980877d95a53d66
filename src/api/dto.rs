// REST response shapes, kept apart from the stored documents

use serde::Serialize;

use crate::model::{VehicleMake, VehicleType};

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VehicleTypeResponse {
    pub vehicle_type_id: String,
    pub vehicle_type_name: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VehicleMakeResponse {
    pub make_id: i64,
    pub make_name: String,
    pub vehicle_types: Vec<VehicleTypeResponse>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MessageResponse {
    pub message: String,
}

impl From<VehicleType> for VehicleTypeResponse {
    fn from(vehicle_type: VehicleType) -> Self {
        Self {
            vehicle_type_id: vehicle_type.vehicle_type_id,
            vehicle_type_name: vehicle_type.vehicle_type_name,
        }
    }
}

impl From<VehicleMake> for VehicleMakeResponse {
    fn from(make: VehicleMake) -> Self {
        Self {
            make_id: make.make_id,
            make_name: make.make_name,
            vehicle_types: make.vehicle_types.into_iter().map(Into::into).collect(),
        }
    }
}
