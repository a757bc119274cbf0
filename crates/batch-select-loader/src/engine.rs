//! Batch fetch engine: one auxiliary query per relationship.
//!
//! For a list of owners and a to-many relationship the engine builds a
//! single query against the related table, restricted to the owners' ids
//! and tagged with the owning id of each row:
//!
//! ```text
//! SELECT tag.*, entry_tags.entry_id AS __entry_id
//! FROM tag INNER JOIN entry_tags ON entry_tags.tag_id = tag.id
//! WHERE entry_tags.entry_id IN (...)
//! ```
//!
//! The rows are grouped by the tag column and attached to every owner,
//! keeping the owners' order and the query's row order.

use crate::annotated::Annotated;
use crate::attach::{GroupedRows, attach};
use crate::config::LoaderConfig;
use batch_select_core::{
    Connection, GroupKey, JoinPath, Model, RelationshipDescriptor, Result, Schema, Value,
    owning_id,
};
use batch_select_query::{Batch, Expr, Join, OrderBy, Replay, Select};
use std::collections::HashSet;

/// Runs batch fetches against one connection and schema.
#[derive(Debug)]
pub struct BatchLoader<'a, C: Connection + ?Sized> {
    conn: &'a C,
    schema: &'a Schema,
    config: LoaderConfig,
}

impl<'a, C: Connection + ?Sized> BatchLoader<'a, C> {
    pub fn new(conn: &'a C, schema: &'a Schema) -> Self {
        Self {
            conn,
            schema,
            config: LoaderConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: LoaderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Load `field` for every instance and attach it under `target`.
    ///
    /// The relationship is resolved before `instances` is consumed, so an
    /// unknown or single-valued field fails without touching the store.
    /// Exactly one query is issued, even for an empty collection.
    #[allow(clippy::result_large_err)]
    #[tracing::instrument(level = "debug", skip(self, instances, replay))]
    pub fn fetch<M: Model>(
        &self,
        instances: impl IntoIterator<Item = M>,
        target: &str,
        field: &str,
        replay: Option<&Replay>,
    ) -> Result<Vec<Annotated<M>>> {
        let descriptor = self.schema.resolve(M::TABLE_NAME, field)?;
        let mut records: Vec<_> = instances.into_iter().map(Annotated::new).collect();
        self.run(&descriptor, &mut records, target, replay)?;
        Ok(records)
    }

    /// Run `batch` over records that are already wrapped.
    ///
    /// Returns the number of records that received at least one row.
    #[allow(clippy::result_large_err)]
    pub fn load<M: Model>(&self, records: &mut [Annotated<M>], batch: &Batch) -> Result<usize> {
        let descriptor = self.schema.resolve(M::TABLE_NAME, batch.field_name())?;
        self.run(
            &descriptor,
            records,
            batch.target_field_name(),
            Some(batch.replay()),
        )
    }

    #[allow(clippy::result_large_err)]
    fn run<M: Model>(
        &self,
        descriptor: &RelationshipDescriptor,
        records: &mut [Annotated<M>],
        target: &str,
        replay: Option<&Replay>,
    ) -> Result<usize> {
        let ids = self.owning_ids(records);
        let (_, column) = descriptor.related_query_field();
        let tag = self.config.tag_alias(column);

        tracing::info!(
            owner = descriptor.owner_table,
            field = descriptor.field,
            related = descriptor.related_table(),
            kind = ?descriptor.kind,
            owners = records.len(),
            ids = ids.len(),
            target = target,
            "Batch loading relationship"
        );

        let mut select = aux_select(descriptor, ids, &tag);
        if let Some(replay) = replay {
            select = replay.apply(select);
        }

        let rows = select.fetch_rows(self.conn)?;
        let grouped = GroupedRows::from_rows(rows, &tag);
        if grouped.untagged() > 0 {
            tracing::warn!(
                tag = %tag,
                untagged = grouped.untagged(),
                "Related rows without an owning id were dropped"
            );
        }

        let filled = attach(records, &grouped, target, |entity| {
            owning_id(entity).group_key()
        });
        tracing::debug!(
            rows = grouped.rows(),
            owners = grouped.owners(),
            filled = filled,
            "Attached related rows"
        );
        Ok(filled)
    }

    fn owning_ids<M: Model>(&self, records: &[Annotated<M>]) -> Vec<Value> {
        let mut seen: HashSet<GroupKey> = HashSet::new();
        records
            .iter()
            .map(|record| owning_id(record.entity()))
            .filter(|id| match id.group_key() {
                None => false,
                Some(key) => !self.config.dedupe_ids || seen.insert(key),
            })
            .collect()
    }
}

/// The auxiliary query for `descriptor`, before any replay.
///
/// Link-table relationships join the link onto the related table; foreign
/// keys are read from the related table directly. Either way the compared
/// column is projected as `tag_alias`.
pub fn aux_select(descriptor: &RelationshipDescriptor, ids: Vec<Value>, tag_alias: &str) -> Select {
    let related = &descriptor.related;
    let mut select = Select::from_meta(related);

    if let JoinPath::Link {
        table,
        related_column,
        ..
    } = descriptor.join
    {
        select = select.join(Join::inner(
            table,
            Expr::qualified(table, related_column).eq(Expr::qualified(related.table, related.pk_column())),
        ));
    }

    if let Some(order) = descriptor.default_order {
        select = select.order_by(OrderBy::parse_list(order));
    }

    let (table, column) = descriptor.related_query_field();
    select
        .annotate(tag_alias, Expr::qualified(table, column))
        .filter(Expr::qualified(table, column).in_list(ids))
}

/// Load `field` for an already materialized collection in one query.
///
/// `target` defaults to `"<field>_all"`.
#[allow(clippy::result_large_err)]
pub fn batch_select<M, C>(
    conn: &C,
    schema: &Schema,
    instances: impl IntoIterator<Item = M>,
    field: &str,
    target: Option<&str>,
    replay: Option<&Replay>,
) -> Result<Vec<Annotated<M>>>
where
    M: Model,
    C: Connection + ?Sized,
{
    let default_target;
    let target = match target {
        Some(name) => name,
        None => {
            default_target = Batch::new(field);
            default_target.target_field_name()
        }
    };
    BatchLoader::new(conn, schema).fetch(instances, target, field, replay)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Entry, MockConnection, Tag, named_row, schema};
    use batch_select_core::{BatchKind, Error};

    fn names(record: &Annotated<Entry>, target: &str) -> Vec<String> {
        record
            .related::<Tag>(target)
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect()
    }

    fn entries() -> Vec<Entry> {
        vec![Entry::new(1, "A"), Entry::new(2, "B"), Entry::new(3, "C")]
    }

    #[test]
    fn many_to_many_in_one_query() {
        let schema = schema();
        let conn = MockConnection::new().respond(vec![
            named_row(1, "red", "__entry_id", 1_i64),
            named_row(1, "red", "__entry_id", 2_i64),
            named_row(2, "blue", "__entry_id", 2_i64),
        ]);

        let records = BatchLoader::new(&conn, &schema)
            .fetch(entries(), "tags_all", "tags", None)
            .unwrap();

        assert_eq!(conn.query_calls(), 1);
        assert_eq!(
            conn.sql(0),
            "SELECT \"tag\".\"id\", \"tag\".\"name\", \"entry_tags\".\"entry_id\" AS \"__entry_id\" \
             FROM \"tag\" INNER JOIN \"entry_tags\" ON \"entry_tags\".\"tag_id\" = \"tag\".\"id\" \
             WHERE \"entry_tags\".\"entry_id\" IN (?1, ?2, ?3) ORDER BY \"tag\".\"name\" ASC"
        );
        assert_eq!(
            conn.params(0),
            vec![Value::BigInt(1), Value::BigInt(2), Value::BigInt(3)]
        );
        let titles: Vec<_> = records.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, ["A", "B", "C"]);
        assert_eq!(names(&records[0], "tags_all"), ["red"]);
        assert_eq!(names(&records[1], "tags_all"), ["red", "blue"]);
        assert!(names(&records[2], "tags_all").is_empty());
    }

    #[test]
    fn reverse_one_to_many_reads_the_foreign_key() {
        let schema = schema();
        let descriptor = schema.resolve("section", "entry_set").unwrap();
        assert_eq!(descriptor.kind, BatchKind::ReverseOneToMany);

        let (sql, params) = aux_select(&descriptor, vec![Value::BigInt(7)], "__section_id")
            .build(batch_select_core::Dialect::Sqlite)
            .unwrap();
        assert_eq!(
            sql,
            "SELECT \"entry\".\"id\", \"entry\".\"title\", \"entry\".\"section_id\", \
             \"entry\".\"section_id\" AS \"__section_id\" FROM \"entry\" \
             WHERE \"entry\".\"section_id\" IN (?1)"
        );
        assert_eq!(params, vec![Value::BigInt(7)]);
    }

    #[test]
    fn reverse_many_to_many_joins_the_flipped_link() {
        let schema = schema();
        let descriptor = schema.resolve("tag", "entry").unwrap();
        let (sql, _) = aux_select(&descriptor, vec![Value::BigInt(1)], "__tag_id")
            .build(batch_select_core::Dialect::Sqlite)
            .unwrap();
        assert!(sql.contains(
            "INNER JOIN \"entry_tags\" ON \"entry_tags\".\"entry_id\" = \"entry\".\"id\""
        ));
        assert!(sql.contains("\"entry_tags\".\"tag_id\" AS \"__tag_id\""));
        assert!(sql.ends_with("WHERE \"entry_tags\".\"tag_id\" IN (?1)"));
    }

    #[test]
    fn empty_collection_still_issues_one_query() {
        let schema = schema();
        let conn = MockConnection::new();
        let records = BatchLoader::new(&conn, &schema)
            .fetch(Vec::<Entry>::new(), "tags_all", "tags", None)
            .unwrap();
        assert!(records.is_empty());
        assert_eq!(conn.query_calls(), 1);
        assert!(conn.sql(0).contains("WHERE 1 = 0"));
    }

    #[test]
    fn duplicate_owners_are_sent_once_and_both_filled() {
        let schema = schema();
        let conn = MockConnection::new().respond(vec![named_row(1, "red", "__entry_id", 2_i64)]);
        let owners = vec![Entry::new(2, "B"), Entry::new(2, "B again")];

        let records = BatchLoader::new(&conn, &schema)
            .fetch(owners.clone(), "tags_all", "tags", None)
            .unwrap();
        assert_eq!(conn.params(0), vec![Value::BigInt(2)]);
        assert_eq!(names(&records[1], "tags_all"), ["red"]);

        let conn = MockConnection::new();
        BatchLoader::new(&conn, &schema)
            .with_config(LoaderConfig::new().dedupe_ids(false))
            .fetch(owners, "tags_all", "tags", None)
            .unwrap();
        assert_eq!(conn.params(0).len(), 2);
    }

    #[test]
    fn replay_runs_after_the_base_query() {
        let schema = schema();
        let conn = MockConnection::new();
        let replay = Replay::new()
            .filter(Expr::col("name").ne("blue"))
            .order_by(vec![OrderBy::desc("id")]);

        BatchLoader::new(&conn, &schema)
            .fetch(entries(), "live", "tags", Some(&replay))
            .unwrap();

        let sql = conn.sql(0);
        assert!(sql.contains(
            "WHERE (\"entry_tags\".\"entry_id\" IN (?1, ?2, ?3)) AND (\"tag\".\"name\" <> ?4)"
        ));
        assert!(sql.ends_with("ORDER BY \"tag\".\"id\" DESC"));
        assert_eq!(conn.params(0)[3], Value::Text("blue".into()));
    }

    #[test]
    fn resolution_errors_come_before_any_query() {
        let schema = schema();
        let conn = MockConnection::new();
        let loader = BatchLoader::new(&conn, &schema);

        let err = loader.fetch(entries(), "section_all", "section", None).unwrap_err();
        assert!(err.is_not_batchable());
        let err = loader.fetch(entries(), "x_all", "nothing", None).unwrap_err();
        assert!(err.is_unknown_relationship());
        assert_eq!(conn.query_calls(), 0);
    }

    #[test]
    fn store_failures_propagate_unchanged() {
        let schema = schema();
        let conn = MockConnection::new().fail(Error::Custom("disk on fire".into()));
        let err = BatchLoader::new(&conn, &schema)
            .fetch(entries(), "tags_all", "tags", None)
            .unwrap_err();
        assert!(matches!(err, Error::Custom(ref m) if m == "disk on fire"));
    }

    #[test]
    fn load_uses_the_batch_target() {
        let schema = schema();
        let conn = MockConnection::new().respond(vec![named_row(5, "green", "__entry_id", 3_i64)]);
        let mut records: Vec<_> = entries().into_iter().map(Annotated::new).collect();

        let filled = BatchLoader::new(&conn, &schema)
            .load(&mut records, &Batch::new("tags").target("labels"))
            .unwrap();
        assert_eq!(filled, 1);
        assert_eq!(names(&records[2], "labels"), ["green"]);
        assert!(records.iter().all(|r| r.has("labels") && !r.has("tags_all")));
    }

    #[test]
    fn free_function_defaults_the_target() {
        let schema = schema();
        let conn = MockConnection::new();
        let records = batch_select(&conn, &schema, entries(), "tags", None, None).unwrap();
        assert!(records.iter().all(|r| r.get("tags_all") == Some(&[][..])));

        let records = batch_select(&conn, &schema, entries(), "tags", Some("t"), None).unwrap();
        assert!(records[0].has("t"));
        assert_eq!(conn.query_calls(), 2);
    }
}
