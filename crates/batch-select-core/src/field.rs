//! Column metadata.

/// Metadata about a model field/column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldInfo {
    /// Rust field name
    pub name: &'static str,
    /// Database column name (may differ from field name)
    pub column_name: &'static str,
    /// Whether this field is nullable
    pub nullable: bool,
    /// Whether this is a primary key column
    pub primary_key: bool,
}

impl FieldInfo {
    /// Create a field whose column has the same name as the field.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            column_name: name,
            nullable: false,
            primary_key: false,
        }
    }

    /// Override the database column name.
    #[must_use]
    pub const fn column(mut self, name: &'static str) -> Self {
        self.column_name = name;
        self
    }

    #[must_use]
    pub const fn nullable(mut self, value: bool) -> Self {
        self.nullable = value;
        self
    }

    #[must_use]
    pub const fn primary_key(mut self, value: bool) -> Self {
        self.primary_key = value;
        self
    }
}

/// Column names of `fields`, in declaration order.
pub fn column_names(fields: &[FieldInfo]) -> Vec<&'static str> {
    fields.iter().map(|f| f.column_name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIELDS: &[FieldInfo] = &[
        FieldInfo::new("id").primary_key(true),
        FieldInfo::new("headline").column("title"),
        FieldInfo::new("section_id").nullable(true),
    ];

    #[test]
    fn builder_sets_flags() {
        assert!(FIELDS[0].primary_key);
        assert!(FIELDS[2].nullable);
        assert_eq!(FIELDS[1].name, "headline");
    }

    #[test]
    fn columns_follow_overrides() {
        assert_eq!(column_names(FIELDS), vec!["id", "title", "section_id"]);
    }
}
