pub mod aggregator;
pub mod cache;
pub mod engine;
pub mod http;

pub use crate::domain::model::{ComparisonReport, Quote, Shipment};
pub use crate::domain::ports::{CarrierAdapter, Pipeline, Storage};
pub use crate::utils::error::Result;
