//! Value and schema type model shared by the state upgrade pipeline.

mod model;
mod path;
pub mod typecheck;
mod value;

pub use model::*;
pub use path::{AttributePath, PathStep};
pub use typecheck::{ValueTypeError, validate_value};
pub use value::TreeValue;
