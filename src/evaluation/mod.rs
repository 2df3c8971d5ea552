pub mod evaluator;
pub mod importance;
pub mod metrics;
pub mod report;

pub use evaluator::*;
pub use importance::*;
pub use report::*;
