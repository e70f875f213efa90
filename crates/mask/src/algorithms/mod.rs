pub mod extraction;
pub mod simplification;

pub use extraction::*;
pub use simplification::*;
