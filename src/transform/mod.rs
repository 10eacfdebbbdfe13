//! Import transforms
//!
//! Dataset-configured rename and type-cast steps applied to every row before
//! schema detection, field mapping and event creation. Steps run strictly in
//! configured order, each one's output feeding the next.

mod cast;
mod error;
mod path;
mod pipeline;
mod types;

pub use cast::cast_value;
pub(crate) use cast::parse_date;
pub use error::{TransformError, TransformResult};
pub use path::{get_path, leaf_paths, remove_path, set_path};
pub use pipeline::{TransformPipeline, TransformStep, TransformWarning, TransformedRow};
pub use types::{CastFailurePolicy, CastStrategy, FieldType, ImportTransform, TypeTransformation};
