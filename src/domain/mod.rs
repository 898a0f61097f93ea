pub mod recommendation;
pub mod types;

pub use recommendation::*;
pub use types::*;
