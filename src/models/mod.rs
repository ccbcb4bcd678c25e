//! Data models: scalar values, records, schemas.

mod record;
mod schema;
mod value;

pub use record::{FieldMap, Record};
pub use schema::{JoinDefinition, JoinKind, Schema, SchemaRegistry};
pub use value::Value;
