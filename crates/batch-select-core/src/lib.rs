//! Core types and traits for batch relationship loading.
//!
//! This crate provides the foundations the loader builds on:
//!
//! - `Model` trait for mapping row types to tables
//! - `RelationshipInfo` declarations and the `Schema` that resolves them
//! - `Connection` trait for synchronous store access
//! - `Value`/`Row` for parameters and results

pub mod connection;
pub mod error;
pub mod field;
pub mod model;
pub mod relationship;
pub mod row;
pub mod schema;
pub mod value;

pub use connection::{Connection, Dialect};
pub use error::{
    ConfigError, ConnectionError, ConnectionErrorKind, Error, QueryError, QueryErrorKind,
    RelationshipError, RelationshipErrorKind, Result, TypeError,
};
pub use field::FieldInfo;
pub use model::{Model, owning_id};
pub use relationship::{LinkTableInfo, RelationshipInfo, RelationshipKind, find_relationship};
pub use row::{ColumnInfo, FromValue, Row};
pub use schema::{
    BatchKind, JoinPath, ModelMeta, RelationshipDescriptor, Schema, SchemaBuilder, SchemaConfig,
};
pub use value::{GroupKey, Value};
