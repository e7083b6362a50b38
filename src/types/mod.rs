//! Data model types: values, rows and table schemas

pub mod schema;
pub mod value;

pub use schema::{Column, TableSchema};
pub use value::{DataType, Row, Value};
