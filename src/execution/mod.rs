pub mod engine;
pub mod polars_engine;

pub use engine::*;
pub use polars_engine::*;
