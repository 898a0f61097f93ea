pub mod decision;
pub mod windows;

pub use decision::*;
pub use windows::*;
