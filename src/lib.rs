pub mod app;
pub mod carriers;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::{cli::LocalStorage, toml_config::FreightConfig};

pub use app::ComparisonPipeline;
pub use core::{aggregator::QuoteAggregator, engine::ComparisonEngine};
pub use utils::error::{FreightError, Result};
