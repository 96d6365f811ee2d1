//! Equipment data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::utils::validation::validate_equipment_code;

/// A physical tool or machine identified by a QR/NFC code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Equipment {
    /// Unique identifier
    pub id: Uuid,

    /// Owning organization
    pub organization_id: Uuid,

    /// QR/NFC payload, unique inside the organization
    pub code: String,

    /// Display name
    pub name: String,

    /// Free-form category ("drill", "scaffolding", ...)
    pub category: Option<String>,

    /// Manufacturer serial number
    pub serial_number: Option<String>,

    /// Current lifecycle state
    pub status: EquipmentStatus,

    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Equipment lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EquipmentStatus {
    #[default]
    Available,
    Assigned,
    Maintenance,
    Retired,
}

impl EquipmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EquipmentStatus::Available => "available",
            EquipmentStatus::Assigned => "assigned",
            EquipmentStatus::Maintenance => "maintenance",
            EquipmentStatus::Retired => "retired",
        }
    }
}

impl std::str::FromStr for EquipmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "available" => Ok(EquipmentStatus::Available),
            "assigned" => Ok(EquipmentStatus::Assigned),
            "maintenance" => Ok(EquipmentStatus::Maintenance),
            "retired" => Ok(EquipmentStatus::Retired),
            _ => Err(format!("Unknown equipment status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateEquipmentRequest {
    #[validate(custom(function = "validate_equipment_code"))]
    pub code: String,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(max = 100))]
    pub category: Option<String>,
    #[validate(length(max = 100))]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub status: Option<EquipmentStatus>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateEquipmentRequest {
    #[validate(custom(function = "validate_equipment_code"))]
    pub code: Option<String>,
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(length(max = 100))]
    pub category: Option<String>,
    #[validate(length(max = 100))]
    pub serial_number: Option<String>,
    pub status: Option<EquipmentStatus>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

/// List filters accepted on `GET /equipment`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EquipmentQuery {
    /// Matches name, code or serial number
    pub search: Option<String>,
    pub status: Option<EquipmentStatus>,
    pub category: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}
