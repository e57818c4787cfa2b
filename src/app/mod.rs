pub mod comparison;

pub use comparison::{render_delimited, render_table, ComparisonPipeline};
