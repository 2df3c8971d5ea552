pub mod events;
pub mod loader;
pub mod table;

pub use events::*;
pub use loader::*;
pub use table::*;
