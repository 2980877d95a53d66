use serde::{Deserialize, Serialize};

// Persisted vehicle make document. Replaced wholesale on every sync run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleMake {
    pub make_id: i64,
    pub make_name: String,
    #[serde(default)]
    pub vehicle_types: Vec<VehicleType>,
}

// Embedded in its parent make, never stored on its own
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleType {
    pub vehicle_type_id: String,
    pub vehicle_type_name: String,
}

impl VehicleMake {
    pub fn new(make_id: i64, make_name: impl Into<String>, vehicle_types: Vec<VehicleType>) -> Self {
        Self {
            make_id,
            make_name: make_name.into(),
            vehicle_types,
        }
    }

    // Returns the name of the first required field that is missing
    pub fn missing_field(&self) -> Option<&'static str> {
        if self.make_id <= 0 {
            return Some("makeId");
        }
        if self.make_name.trim().is_empty() {
            return Some("makeName");
        }
        None
    }
}

impl VehicleType {
    pub fn new(vehicle_type_id: impl Into<String>, vehicle_type_name: impl Into<String>) -> Self {
        Self {
            vehicle_type_id: vehicle_type_id.into(),
            vehicle_type_name: vehicle_type_name.into(),
        }
    }
}

// Records as they come out of the vPIC XML, after the generic parse.
// Every child element is a sequence, so fields hold the first value.
#[derive(Debug, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct XmlMake {
    #[serde(rename = "Make_ID")]
    pub make_id: TextField,
    #[serde(rename = "Make_Name")]
    pub make_name: TextField,
}

#[derive(Debug, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct XmlVehicleType {
    #[serde(rename = "VehicleTypeId")]
    pub vehicle_type_id: TextField,
    #[serde(rename = "VehicleTypeName")]
    pub vehicle_type_name: TextField,
}

// Accepts a bare scalar or a sequence of scalars
#[derive(Debug, PartialEq, Clone, Deserialize)]
#[serde(untagged)]
pub enum TextField {
    Many(Vec<serde_json::Value>),
    One(serde_json::Value),
}

impl Default for TextField {
    fn default() -> Self {
        TextField::Many(Vec::new())
    }
}

impl TextField {
    // First value rendered as a string. Numbers keep their textual form.
    pub fn first(&self) -> Option<String> {
        let value = match self {
            TextField::Many(values) => values.first()?,
            TextField::One(value) => value,
        };
        match value {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Object(map) => map.get("_").and_then(|text| match text {
                serde_json::Value::String(s) => Some(s.clone()),
                _ => None,
            }),
            other => Some(other.to_string()),
        }
    }
}
