pub mod address;
pub mod array;
pub mod error;
pub mod geometry;
pub mod scalar;

pub use address::*;
pub use array::*;
pub use error::*;
pub use geometry::*;
pub use scalar::*;
