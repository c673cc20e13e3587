pub mod config;
pub mod domain;
pub mod estimate;

pub use chrono;

pub use config::{AppConfig, ConfigError, ConfigOverrides, EstimatorConfig, LoadOptions};
pub use domain::device::{BrandId, DeviceKind, DeviceModel, DeviceModelId};
pub use domain::DomainError;
pub use domain::pricing::{
    CandidateDevice, PartType, PartTypeId, PricingEntry, PricingEntryId, RepairType, RepairTypeId,
};
pub use estimate::{run_cascade, EstimationMethod, EstimationResult, Strategy, CASCADE};
