//! Model trait for mapping row types to tables.

use crate::Result;
use crate::field::FieldInfo;
use crate::relationship::RelationshipInfo;
use crate::row::Row;
use crate::value::Value;

/// Trait for types that can be mapped to database tables.
///
/// The loader treats entities opaquely apart from their identifier and
/// their declared relationships.
///
/// # Example
///
/// ```ignore
/// impl Model for Entry {
///     const TABLE_NAME: &'static str = "entry";
///     const PRIMARY_KEY: &'static [&'static str] = &["id"];
///     const RELATIONSHIPS: &'static [RelationshipInfo] = &[
///         RelationshipInfo::new("tags", "tag", RelationshipKind::ManyToMany)
///             .link_table(LinkTableInfo::new("entry_tags", "entry_id", "tag_id")),
///         RelationshipInfo::new("section", "section", RelationshipKind::ManyToOne)
///             .local_key("section_id"),
///     ];
///     // ...
/// }
/// ```
pub trait Model: Sized + Send + Sync {
    /// The name of the database table.
    const TABLE_NAME: &'static str;

    /// The primary key column name(s).
    const PRIMARY_KEY: &'static [&'static str];

    /// Relationships declared on this model.
    const RELATIONSHIPS: &'static [RelationshipInfo] = &[];

    /// Get field metadata for all columns.
    fn fields() -> &'static [FieldInfo];

    /// Construct a model instance from a database row.
    #[allow(clippy::result_large_err)]
    fn from_row(row: &Row) -> Result<Self>;

    /// Get the value of the primary key field(s).
    fn primary_key_value(&self) -> Vec<Value>;
}

/// First primary key value of `model`, or NULL when it has none.
pub fn owning_id<M: Model>(model: &M) -> Value {
    model
        .primary_key_value()
        .into_iter()
        .next()
        .unwrap_or(Value::Null)
}
