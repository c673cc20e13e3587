use serde::{Deserialize, Serialize};

use super::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeviceModelId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BrandId(pub i64);

/// Device category. The catalog only tracks the two kinds the repair shop
/// services; candidates never cross kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Phone,
    Tablet,
}

impl DeviceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Phone => "phone",
            Self::Tablet => "tablet",
        }
    }
}

impl std::str::FromStr for DeviceKind {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "phone" => Ok(Self::Phone),
            "tablet" => Ok(Self::Tablet),
            other => Err(DomainError::UnknownDeviceKind(other.to_string())),
        }
    }
}

/// Immutable reference data maintained by the catalog-management process.
/// The estimator reads device models but never writes them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeviceModel {
    pub id: DeviceModelId,
    pub name: String,
    pub brand_id: BrandId,
    pub brand_name: String,
    pub release_year: i32,
    pub kind: DeviceKind,
    pub screen_size: Option<f64>,
    pub is_active: bool,
}
