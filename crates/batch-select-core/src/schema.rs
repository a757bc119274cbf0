//! Relationship declaration table and descriptor resolution.
//!
//! A [`Schema`] is built once from the `RELATIONSHIPS` of every registered
//! model. Building derives the reverse accessors each declaration installs on
//! the other side, so resolving `(table, field)` later is a map lookup.

use crate::error::{Error, Result};
use crate::field::FieldInfo;
use crate::model::Model;
use crate::relationship::{LinkTableInfo, RelationshipInfo, RelationshipKind};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

const IDENTIFIER_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";
const DEFAULT_PRIMARY_KEY: &[&str] = &["id"];

fn identifier_regex() -> Result<&'static Regex> {
    static IDENT: OnceLock<Regex> = OnceLock::new();
    if let Some(re) = IDENT.get() {
        return Ok(re);
    }
    let re = Regex::new(IDENTIFIER_PATTERN)?;
    Ok(IDENT.get_or_init(|| re))
}

fn check_identifier(re: &Regex, what: &str, name: &str) -> Result<()> {
    if re.is_match(name) {
        Ok(())
    } else {
        Err(Error::config(format!("invalid {what} identifier '{name}'")))
    }
}

/// Options for building a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    /// Suffix stripped and retried when a field name does not resolve.
    pub reverse_suffix: Option<String>,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            reverse_suffix: Some("_set".to_string()),
        }
    }
}

impl SchemaConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn reverse_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.reverse_suffix = Some(suffix.into());
        self
    }

    /// Resolve only names that are declared literally.
    #[must_use]
    pub fn without_suffix_fallback(mut self) -> Self {
        self.reverse_suffix = None;
        self
    }
}

/// Static metadata of one registered model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelMeta {
    pub table: &'static str,
    pub primary_key: &'static [&'static str],
    pub fields: &'static [FieldInfo],
    pub relationships: &'static [RelationshipInfo],
}

impl ModelMeta {
    pub const fn new(
        table: &'static str,
        primary_key: &'static [&'static str],
        fields: &'static [FieldInfo],
        relationships: &'static [RelationshipInfo],
    ) -> Self {
        Self {
            table,
            primary_key,
            fields,
            relationships,
        }
    }

    pub fn of<M: Model>() -> Self {
        Self::new(M::TABLE_NAME, M::PRIMARY_KEY, M::fields(), M::RELATIONSHIPS)
    }

    /// Column the batch loader groups by.
    pub fn pk_column(&self) -> &'static str {
        self.primary_key.first().copied().unwrap_or("id")
    }
}

/// How a to-many relationship is reached from the owning side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchKind {
    /// Many-to-many declared on the owning model.
    DirectManyToMany,
    /// Many-to-many declared on the related model.
    ReverseManyToMany,
    /// Foreign key on the related rows pointing at the owner.
    ReverseOneToMany,
}

/// Where the owning id lives relative to the related rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinPath {
    /// Through a link table.
    Link {
        table: &'static str,
        /// Link column holding the owner's id
        owner_column: &'static str,
        /// Link column holding the related row's id
        related_column: &'static str,
    },
    /// A foreign key column on the related table.
    ForeignKey { column: &'static str },
}

/// Everything needed to batch-fetch one relationship.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipDescriptor {
    pub kind: BatchKind,
    pub owner_table: &'static str,
    /// Declared accessor name, after any suffix stripping
    pub field: &'static str,
    /// Owner primary key column
    pub owning_id_column: &'static str,
    pub related: ModelMeta,
    pub join: JoinPath,
    pub default_order: Option<&'static str>,
}

impl RelationshipDescriptor {
    pub fn related_table(&self) -> &'static str {
        self.related.table
    }

    /// `(table, column)` compared against the owning ids.
    pub fn related_query_field(&self) -> (&'static str, &'static str) {
        match self.join {
            JoinPath::Link {
                table,
                owner_column,
                ..
            } => (table, owner_column),
            JoinPath::ForeignKey { column } => (self.related.table, column),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Declared {
    Direct(RelationshipInfo),
    Reverse {
        declaring: ModelMeta,
        info: RelationshipInfo,
    },
}

#[derive(Debug)]
struct ModelEntry {
    meta: ModelMeta,
    accessors: HashMap<&'static str, Declared>,
}

/// Builder for [`Schema`].
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    config: SchemaConfig,
    models: Vec<ModelMeta>,
}

impl SchemaBuilder {
    #[must_use]
    pub fn config(mut self, config: SchemaConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a model type.
    #[must_use]
    pub fn model<M: Model>(self) -> Self {
        self.meta(ModelMeta::of::<M>())
    }

    /// Register raw model metadata.
    #[must_use]
    pub fn meta(mut self, meta: ModelMeta) -> Self {
        self.models.push(meta);
        self
    }

    /// Validate declarations and derive reverse accessors.
    #[tracing::instrument(level = "debug", skip(self), fields(models = self.models.len()))]
    pub fn build(self) -> Result<Schema> {
        let ident = identifier_regex()?;
        let mut models: HashMap<&'static str, ModelEntry> = HashMap::new();

        for meta in &self.models {
            check_identifier(ident, "table", meta.table)?;
            for pk in meta.primary_key {
                check_identifier(ident, "primary key", pk)?;
            }
            if models.contains_key(meta.table) {
                return Err(Error::config(format!(
                    "model '{}' registered twice",
                    meta.table
                )));
            }
            models.insert(
                meta.table,
                ModelEntry {
                    meta: *meta,
                    accessors: HashMap::new(),
                },
            );
        }

        for meta in &self.models {
            for info in meta.relationships {
                validate_declaration(ident, meta, info)?;
                if let Some(entry) = models.get_mut(meta.table) {
                    if entry
                        .accessors
                        .insert(info.name, Declared::Direct(*info))
                        .is_some()
                    {
                        return Err(Error::config(format!(
                            "'{}.{}' declared twice",
                            meta.table, info.name
                        )));
                    }
                }
            }
        }

        for meta in &self.models {
            for info in meta.relationships {
                let Some(target) = models.get_mut(info.related_table) else {
                    continue;
                };
                let accessor = info.reverse_accessor(meta.table);
                check_identifier(ident, "reverse accessor", accessor)?;
                match target.accessors.get(accessor) {
                    Some(Declared::Direct(direct)) if is_partner(direct, meta.table, info) => {}
                    Some(Declared::Direct(_)) => {
                        return Err(Error::config(format!(
                            "reverse accessor '{}.{}' of '{}.{}' clashes with a declared field; set back_populates",
                            info.related_table, accessor, meta.table, info.name
                        )));
                    }
                    Some(Declared::Reverse { declaring, .. }) => {
                        return Err(Error::config(format!(
                            "reverse accessor '{}.{}' installed by both '{}' and '{}.{}'; set back_populates",
                            info.related_table, accessor, declaring.table, meta.table, info.name
                        )));
                    }
                    None => {
                        target.accessors.insert(
                            accessor,
                            Declared::Reverse {
                                declaring: *meta,
                                info: *info,
                            },
                        );
                    }
                }
            }
        }

        tracing::debug!(
            models = models.len(),
            accessors = models.values().map(|m| m.accessors.len()).sum::<usize>(),
            "Relationship table built"
        );

        Ok(Schema {
            config: self.config,
            models,
            cache: RwLock::new(HashMap::new()),
        })
    }
}

/// Whether `direct` is the other side of `info`, declared on the related model.
fn is_partner(direct: &RelationshipInfo, declaring_table: &str, info: &RelationshipInfo) -> bool {
    if direct.related_table != declaring_table {
        return false;
    }
    match (info.kind, direct.kind) {
        (RelationshipKind::ManyToOne, RelationshipKind::OneToMany) => direct.remote_key == info.local_key,
        (RelationshipKind::OneToMany, RelationshipKind::ManyToOne) => direct.local_key == info.remote_key,
        (RelationshipKind::ManyToMany, RelationshipKind::ManyToMany) => {
            direct.link_table == info.link_table.map(LinkTableInfo::flipped)
        }
        (RelationshipKind::OneToOne, RelationshipKind::OneToOne) => true,
        _ => false,
    }
}

fn validate_declaration(re: &Regex, meta: &ModelMeta, info: &RelationshipInfo) -> Result<()> {
    check_identifier(re, "relationship", info.name)?;
    check_identifier(re, "table", info.related_table)?;
    let missing = |what: &str| {
        Error::config(format!(
            "{:?} relationship '{}.{}' needs {what}",
            info.kind, meta.table, info.name
        ))
    };
    match info.kind {
        RelationshipKind::ManyToMany => {
            let link = info.link_table.ok_or_else(|| missing("a link table"))?;
            check_identifier(re, "link table", link.table_name)?;
            check_identifier(re, "link column", link.local_column)?;
            check_identifier(re, "link column", link.remote_column)?;
        }
        RelationshipKind::OneToMany => {
            let key = info.remote_key.ok_or_else(|| missing("a remote_key"))?;
            check_identifier(re, "foreign key", key)?;
        }
        RelationshipKind::ManyToOne => {
            let key = info.local_key.ok_or_else(|| missing("a local_key"))?;
            check_identifier(re, "foreign key", key)?;
        }
        RelationshipKind::OneToOne => {
            if let Some(key) = info.local_key {
                check_identifier(re, "foreign key", key)?;
            }
        }
    }
    Ok(())
}

/// The relationship-declaration table.
///
/// Resolved descriptors are cached for the lifetime of the schema. The cache
/// is safe to read from many threads; racing misses compute the same value.
#[derive(Debug)]
pub struct Schema {
    config: SchemaConfig,
    models: HashMap<&'static str, ModelEntry>,
    cache: RwLock<HashMap<(String, String), Arc<RelationshipDescriptor>>>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    pub fn config(&self) -> &SchemaConfig {
        &self.config
    }

    pub fn model(&self, table: &str) -> Option<&ModelMeta> {
        self.models.get(table).map(|entry| &entry.meta)
    }

    /// Accessor names resolvable on `table`, sorted.
    pub fn accessors(&self, table: &str) -> Vec<&'static str> {
        let mut names: Vec<_> = self
            .models
            .get(table)
            .map(|entry| entry.accessors.keys().copied().collect())
            .unwrap_or_default();
        names.sort_unstable();
        names
    }

    /// Number of cached descriptors.
    pub fn cached(&self) -> usize {
        self.cache.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn resolve_for<M: Model>(&self, field: &str) -> Result<Arc<RelationshipDescriptor>> {
        self.resolve(M::TABLE_NAME, field)
    }

    /// Resolve `field` on `table` into a batchable relationship.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn resolve(&self, table: &str, field: &str) -> Result<Arc<RelationshipDescriptor>> {
        let key = (table.to_string(), field.to_string());
        if let Some(hit) = self.cache.read().ok().and_then(|c| c.get(&key).cloned()) {
            tracing::trace!(table, field, "Descriptor cache hit");
            return Ok(hit);
        }

        let descriptor = Arc::new(self.resolve_uncached(table, field)?);
        if let Ok(mut cache) = self.cache.write() {
            let cached = cache.entry(key).or_insert_with(|| Arc::clone(&descriptor));
            return Ok(Arc::clone(cached));
        }
        Ok(descriptor)
    }

    fn resolve_uncached(&self, table: &str, field: &str) -> Result<RelationshipDescriptor> {
        let entry = self
            .models
            .get(table)
            .ok_or_else(|| Error::unknown_relationship(table, field))?;

        if let Some((name, declared)) = entry.accessors.get_key_value(field) {
            return self.classify(&entry.meta, *name, declared);
        }

        let stripped = self
            .config
            .reverse_suffix
            .as_deref()
            .and_then(|suffix| field.strip_suffix(suffix))
            .filter(|base| !base.is_empty());
        if let Some((name, declared)) = stripped.and_then(|base| entry.accessors.get_key_value(base)) {
            if let Ok(descriptor) = self.classify(&entry.meta, *name, declared) {
                if descriptor.kind == BatchKind::ReverseOneToMany {
                    tracing::debug!(table, field, resolved = *name, "Resolved through suffix fallback");
                    return Ok(descriptor);
                }
            }
        }

        Err(Error::unknown_relationship(table, field))
    }

    fn related_meta(&self, info: &RelationshipInfo) -> ModelMeta {
        self.model(info.related_table).copied().unwrap_or_else(|| {
            ModelMeta::new(
                info.related_table,
                DEFAULT_PRIMARY_KEY,
                info.related_field_info(),
                &[],
            )
        })
    }

    fn classify(
        &self,
        owner: &ModelMeta,
        name: &'static str,
        declared: &Declared,
    ) -> Result<RelationshipDescriptor> {
        let descriptor = |kind, related, join, default_order| RelationshipDescriptor {
            kind,
            owner_table: owner.table,
            field: name,
            owning_id_column: owner.pk_column(),
            related,
            join,
            default_order,
        };
        let incomplete = || Error::config(format!("'{}.{}' is incomplete", owner.table, name));

        match *declared {
            Declared::Direct(info) => match info.kind {
                RelationshipKind::ManyToMany => {
                    let link = info.link_table.ok_or_else(incomplete)?;
                    Ok(descriptor(
                        BatchKind::DirectManyToMany,
                        self.related_meta(&info),
                        JoinPath::Link {
                            table: link.table_name,
                            owner_column: link.local_column,
                            related_column: link.remote_column,
                        },
                        info.order_by,
                    ))
                }
                RelationshipKind::OneToMany => {
                    let column = info.remote_key.ok_or_else(incomplete)?;
                    Ok(descriptor(
                        BatchKind::ReverseOneToMany,
                        self.related_meta(&info),
                        JoinPath::ForeignKey { column },
                        info.order_by,
                    ))
                }
                RelationshipKind::ManyToOne | RelationshipKind::OneToOne => Err(Error::not_batchable(
                    owner.table,
                    name,
                    "forward reference to a single row",
                )),
            },
            Declared::Reverse { declaring, info } => match info.kind {
                RelationshipKind::ManyToMany => {
                    let link = info.link_table.ok_or_else(incomplete)?.flipped();
                    Ok(descriptor(
                        BatchKind::ReverseManyToMany,
                        declaring,
                        JoinPath::Link {
                            table: link.table_name,
                            owner_column: link.local_column,
                            related_column: link.remote_column,
                        },
                        None,
                    ))
                }
                RelationshipKind::ManyToOne => {
                    let column = info.local_key.ok_or_else(incomplete)?;
                    Ok(descriptor(
                        BatchKind::ReverseOneToMany,
                        declaring,
                        JoinPath::ForeignKey { column },
                        None,
                    ))
                }
                RelationshipKind::OneToOne | RelationshipKind::OneToMany => Err(
                    Error::not_batchable(owner.table, name, "reverse side holds a single row"),
                ),
            },
        }
    }
}
