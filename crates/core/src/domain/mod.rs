use thiserror::Error;

pub mod device;
pub mod pricing;

/// Rejections from the closed vocabularies of the domain.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("unknown device kind `{0}` (expected phone|tablet)")]
    UnknownDeviceKind(String),
    #[error("unknown estimation method `{0}`")]
    UnknownEstimationMethod(String),
}
