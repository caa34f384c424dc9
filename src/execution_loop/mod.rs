pub mod context;
pub mod steps;
pub mod suggestions;
pub mod turn_loop;
pub mod visualization;

pub use context::*;
pub use steps::*;
pub use suggestions::*;
pub use turn_loop::*;
pub use visualization::*;
