pub mod backfill;
pub mod estimator;
pub mod logging;

pub use backfill::{BackfillDetail, BackfillOrchestrator, BackfillReport, BackfillStatus};
pub use estimator::{EstimateError, PriceEstimator};
pub use logging::init_logging;
