pub mod consumption;
pub mod trend;

pub use trend::*;
