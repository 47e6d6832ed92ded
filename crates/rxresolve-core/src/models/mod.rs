//! Domain models for the resolution pipeline and the hybrid matcher.

mod candidate;
mod medication;
mod resolution;
mod similarity;

pub use candidate::*;
pub use medication::*;
pub use resolution::*;
pub use similarity::*;
