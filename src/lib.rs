pub mod calc;
pub mod config;
pub mod error;
pub mod io;
pub mod model;
pub mod pipeline;
pub mod pollutant;
pub mod select;
pub mod sources;
pub mod summary;
pub mod table;

pub use config::AssessmentConfig;
pub use error::{AssessmentError, AssessmentResult};
pub use pipeline::{Scenarios, run_pipeline};
pub use pollutant::{Column, ComidType, Metric, Pollutant, QuantityType};
pub use table::EnrichedTable;
