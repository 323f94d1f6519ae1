//! Data model: element types, runtime values, rows.

mod decimal;
mod schema;
mod value;

pub use decimal::Decimal;
pub use schema::{DataType, Field, Schema};
pub use value::{Row, Value};
