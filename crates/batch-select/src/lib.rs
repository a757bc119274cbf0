//! Batch loading of to-many relationships.
//!
//! Loading a relationship per entity costs one query per entity (the N+1
//! problem). This crate fetches a relationship for a whole collection in a
//! single query and attaches the grouped rows to each entity:
//!
//! - a base query plus `K` batch requests costs exactly `1 + K` queries;
//! - every registered target is present on every entity, possibly empty;
//! - entities keep their order, and rows keep the order of their query.
//!
//! # Quick Start
//!
//! ```ignore
//! use batch_select::prelude::*;
//!
//! let schema = Schema::builder()
//!     .model::<Entry>()
//!     .model::<Tag>()
//!     .model::<Section>()
//!     .build()?;
//!
//! let entries = schema
//!     .query::<Entry>()
//!     .order_by(vec![OrderBy::asc("title")])
//!     .batch_select("tags")?
//!     .batch_select(Batch::with_filter("tags", Expr::col("name").ne("draft")).target("public_tags"))?
//!     .all(&conn)?;
//!
//! for entry in &entries {
//!     let tags: Vec<Tag> = entry.related("tags_all")?;
//!     println!("{}: {}", entry.title, tags.len());
//! }
//! ```
//!
//! Relationships are declared on models through `Model::RELATIONSHIPS`.
//! A [`Schema`] derives the reverse side of every declaration, so a
//! many-to-many declared on `Entry` is also loadable from `Tag` under the
//! accessor `entry`, and a foreign key from `Entry` to `Section` is
//! loadable from `Section` as `entry` (or `entry_set`).

pub use batch_select_core::{
    BatchKind, ColumnInfo, ConfigError, Connection, ConnectionError, ConnectionErrorKind, Dialect,
    Error, FieldInfo, FromValue, GroupKey, JoinPath, LinkTableInfo, Model, ModelMeta, QueryError,
    QueryErrorKind, RelationshipDescriptor, RelationshipError, RelationshipErrorKind,
    RelationshipInfo, RelationshipKind, Result, Row, Schema, SchemaBuilder, SchemaConfig,
    TypeError, Value, owning_id,
};
pub use batch_select_loader::{
    Annotated, BatchLoader, BatchManager, BatchQuery, GroupedRows, LoaderConfig, QueryStats,
    TrackedConnection, attach, aux_select, batch_select,
};
pub use batch_select_query::{
    Batch, BatchOp, BinaryOp, Expr, Extra, Join, JoinType, NullsOrder, OrderBy, OrderDirection,
    Replay, Select,
};

/// Load settings for both the schema and the loader from one JSON document.
///
/// ```ignore
/// let settings = Settings::from_json(r#"{"schema": {"reverse_suffix": null}}"#)?;
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Settings {
    pub schema: SchemaConfig,
    pub loader: LoaderConfig,
}

impl Settings {
    #[allow(clippy::result_large_err)]
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            Error::Config(ConfigError {
                message: format!("invalid settings: {e}"),
                source: Some(Box::new(e)),
            })
        })
    }
}

pub mod prelude {
    pub use crate::{
        // Relationship loading
        Annotated,
        Batch,
        BatchManager,
        BatchQuery,
        // Core traits and types
        Connection,
        Error,
        // Query building
        Expr,
        FieldInfo,
        LinkTableInfo,
        Model,
        OrderBy,
        RelationshipInfo,
        RelationshipKind,
        Replay,
        Result,
        Row,
        Schema,
        Value,
    };
}
