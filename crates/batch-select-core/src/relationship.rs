//! Relationship metadata.
//!
//! Relationships are declared as static metadata on each `Model`. The
//! [`Schema`](crate::Schema) reads them once to build the lookup table the
//! batch loader resolves field names against.

use crate::field::FieldInfo;

/// The type of relationship between two models.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RelationshipKind {
    /// One-to-one: `Person` has one `Profile`.
    OneToOne,
    /// Many-to-one: many `Entry`s belong to one `Section`.
    #[default]
    ManyToOne,
    /// One-to-many: one `Section` has many `Entry`s.
    OneToMany,
    /// Many-to-many: `Entry`s have many `Tag`s via a link table.
    ManyToMany,
}

impl RelationshipKind {
    /// Whether the declaring side sees a collection.
    pub const fn is_collection(self) -> bool {
        matches!(self, RelationshipKind::OneToMany | RelationshipKind::ManyToMany)
    }

    /// Whether the other side of this relationship sees a collection.
    pub const fn reverse_is_collection(self) -> bool {
        matches!(self, RelationshipKind::ManyToOne | RelationshipKind::ManyToMany)
    }
}

/// Information about a link/join table for many-to-many relationships.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkTableInfo {
    /// The link table name (e.g., `"entry_tags"`).
    pub table_name: &'static str,

    /// Column in the link table pointing to the declaring model (e.g., `"entry_id"`).
    pub local_column: &'static str,

    /// Column in the link table pointing to the related model (e.g., `"tag_id"`).
    pub remote_column: &'static str,
}

impl LinkTableInfo {
    #[must_use]
    pub const fn new(
        table_name: &'static str,
        local_column: &'static str,
        remote_column: &'static str,
    ) -> Self {
        Self {
            table_name,
            local_column,
            remote_column,
        }
    }

    /// The same link table seen from the related model.
    #[must_use]
    pub const fn flipped(self) -> Self {
        Self {
            table_name: self.table_name,
            local_column: self.remote_column,
            remote_column: self.local_column,
        }
    }
}

/// Metadata about a relationship between models.
#[derive(Debug, Clone, Copy)]
pub struct RelationshipInfo {
    /// Name of the relationship field.
    pub name: &'static str,

    /// The related model's table name.
    pub related_table: &'static str,

    pub kind: RelationshipKind,

    /// Foreign key column on this model (ManyToOne / OneToOne).
    pub local_key: Option<&'static str>,

    /// Foreign key column on the related model (OneToMany).
    pub remote_key: Option<&'static str>,

    /// Link table for ManyToMany relationships.
    pub link_table: Option<LinkTableInfo>,

    /// Accessor name on the related model that points back here.
    ///
    /// When unset, the reverse accessor is the declaring model's table name.
    pub back_populates: Option<&'static str>,

    /// Default ordering for related rows (e.g., `"name"`, `"created_at DESC"`).
    pub order_by: Option<&'static str>,

    /// Returns the related model's field metadata.
    pub related_fields_fn: fn() -> &'static [FieldInfo],
}

impl PartialEq for RelationshipInfo {
    fn eq(&self, other: &Self) -> bool {
        // Function pointers are not compared.
        self.name == other.name
            && self.related_table == other.related_table
            && self.kind == other.kind
            && self.local_key == other.local_key
            && self.remote_key == other.remote_key
            && self.link_table == other.link_table
            && self.back_populates == other.back_populates
            && self.order_by == other.order_by
    }
}

impl Eq for RelationshipInfo {}

impl RelationshipInfo {
    fn empty_related_fields() -> &'static [FieldInfo] {
        &[]
    }

    #[must_use]
    pub const fn new(
        name: &'static str,
        related_table: &'static str,
        kind: RelationshipKind,
    ) -> Self {
        Self {
            name,
            related_table,
            kind,
            local_key: None,
            remote_key: None,
            link_table: None,
            back_populates: None,
            order_by: None,
            related_fields_fn: Self::empty_related_fields,
        }
    }

    /// Provide the related model's `Model::fields()` function pointer.
    #[must_use]
    pub const fn related_fields(mut self, f: fn() -> &'static [FieldInfo]) -> Self {
        self.related_fields_fn = f;
        self
    }

    #[must_use]
    pub const fn local_key(mut self, key: &'static str) -> Self {
        self.local_key = Some(key);
        self
    }

    #[must_use]
    pub const fn remote_key(mut self, key: &'static str) -> Self {
        self.remote_key = Some(key);
        self
    }

    #[must_use]
    pub const fn link_table(mut self, info: LinkTableInfo) -> Self {
        self.link_table = Some(info);
        self
    }

    #[must_use]
    pub const fn back_populates(mut self, field: &'static str) -> Self {
        self.back_populates = Some(field);
        self
    }

    #[must_use]
    pub const fn order_by(mut self, ordering: &'static str) -> Self {
        self.order_by = Some(ordering);
        self
    }

    /// Name of the accessor this relationship installs on the related model.
    pub fn reverse_accessor(&self, declaring_table: &'static str) -> &'static str {
        self.back_populates.unwrap_or(declaring_table)
    }

    pub fn related_field_info(&self) -> &'static [FieldInfo] {
        (self.related_fields_fn)()
    }
}

/// Find a relationship by field name.
pub fn find_relationship<'a>(
    relationships: &'a [RelationshipInfo],
    name: &str,
) -> Option<&'a RelationshipInfo> {
    relationships.iter().find(|r| r.name == name)
}
