pub mod constraint;
pub mod geometry;
pub mod linkage;

pub use constraint::*;
pub use geometry::*;
pub use linkage::*;
