pub mod aggregator;
pub mod scaling;
pub mod selection;

pub use aggregator::*;
pub use scaling::*;
pub use selection::*;
