//! Models module
//!
//! Typed values, result sets and declared output schemas shared by the
//! extractor, stager and loader.

pub mod column;
pub mod result_set;
pub mod value;

pub use column::{DataType, OutputColumn};
pub use result_set::{ResultSet, Row};
pub use value::Scalar;
