//! Query builder carrying pending batch requests.

use crate::annotated::Annotated;
use crate::config::LoaderConfig;
use crate::engine::BatchLoader;
use batch_select_core::{Connection, Model, Result, Schema};
use batch_select_query::{Batch, Expr, OrderBy, Select};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// A base query over `M` plus the batch requests to run after it.
///
/// Every refinement returns a new value; the pending requests are shared
/// between clones and copied only when one of them registers another.
/// Evaluating with [`all`](Self::all) issues one query for the base rows
/// and one per pending request.
pub struct BatchQuery<'s, M: Model> {
    schema: &'s Schema,
    select: Select,
    batches: Arc<Vec<Batch>>,
    config: LoaderConfig,
    _marker: PhantomData<fn() -> M>,
}

impl<M: Model> Clone for BatchQuery<'_, M> {
    fn clone(&self) -> Self {
        Self {
            schema: self.schema,
            select: self.select.clone(),
            batches: Arc::clone(&self.batches),
            config: self.config.clone(),
            _marker: PhantomData,
        }
    }
}

impl<M: Model> fmt::Debug for BatchQuery<'_, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchQuery")
            .field("model", &M::TABLE_NAME)
            .field("select", &self.select)
            .field("batches", &self.batches)
            .finish_non_exhaustive()
    }
}

impl<'s, M: Model> BatchQuery<'s, M> {
    pub fn new(schema: &'s Schema) -> Self {
        Self {
            schema,
            select: Select::for_model::<M>(),
            batches: Arc::new(Vec::new()),
            config: LoaderConfig::default(),
            _marker: PhantomData,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: LoaderConfig) -> Self {
        self.config = config;
        self
    }

    /// The base query.
    pub fn select(&self) -> &Select {
        &self.select
    }

    /// Requests that will run on evaluation, in registration order.
    pub fn pending(&self) -> &[Batch] {
        &self.batches
    }

    fn map_select(mut self, f: impl FnOnce(Select) -> Select) -> Self {
        self.select = f(self.select);
        self
    }

    #[must_use]
    pub fn filter(self, expr: Expr) -> Self {
        self.map_select(|s| s.filter(expr))
    }

    #[must_use]
    pub fn exclude(self, expr: Expr) -> Self {
        self.map_select(|s| s.exclude(expr))
    }

    #[must_use]
    pub fn order_by(self, keys: Vec<OrderBy>) -> Self {
        self.map_select(|s| s.order_by(keys))
    }

    #[must_use]
    pub fn reverse(self) -> Self {
        self.map_select(Select::reverse)
    }

    #[must_use]
    pub fn limit(self, n: u64) -> Self {
        self.map_select(|s| s.limit(n))
    }

    #[must_use]
    pub fn offset(self, n: u64) -> Self {
        self.map_select(|s| s.offset(n))
    }

    #[must_use]
    pub fn distinct(self) -> Self {
        self.map_select(Select::distinct)
    }

    /// Join single-valued relations into the base query.
    ///
    /// Read them back per record with [`Annotated::joined`].
    #[must_use]
    pub fn select_related<S: Into<String>>(self, names: impl IntoIterator<Item = S>) -> Self {
        self.map_select(|s| s.select_related(names))
    }

    /// Restrict the base columns; `M::from_row` must tolerate the rest missing.
    #[must_use]
    pub fn only<S: Into<String>>(self, columns: impl IntoIterator<Item = S>) -> Self {
        self.map_select(|s| s.only(columns))
    }

    #[must_use]
    pub fn defer<S: Into<String>>(self, columns: impl IntoIterator<Item = S>) -> Self {
        self.map_select(|s| s.defer(columns))
    }

    /// Register a batch request.
    ///
    /// The relationship is resolved now, so unknown or single-valued
    /// fields fail here. A request whose target name is already pending
    /// replaces the earlier one in its position.
    #[allow(clippy::result_large_err)]
    pub fn batch_select(mut self, request: impl Into<Batch>) -> Result<Self> {
        let batch = request.into();
        self.schema.resolve(M::TABLE_NAME, batch.field_name())?;

        let batches = Arc::make_mut(&mut self.batches);
        match batches
            .iter_mut()
            .find(|b| b.target_field_name() == batch.target_field_name())
        {
            Some(existing) => {
                tracing::debug!(
                    target_field = batch.target_field_name(),
                    "Replacing pending batch"
                );
                *existing = batch;
            }
            None => batches.push(batch),
        }
        Ok(self)
    }

    /// Register `request` under an explicit target name.
    #[allow(clippy::result_large_err)]
    pub fn batch_select_as(self, target: impl Into<String>, request: impl Into<Batch>) -> Result<Self> {
        self.batch_select(request.into().target(target))
    }

    /// Register several requests, each under its paired target name.
    #[allow(clippy::result_large_err)]
    pub fn batch_select_named<T, B>(self, requests: impl IntoIterator<Item = (T, B)>) -> Result<Self>
    where
        T: Into<String>,
        B: Into<Batch>,
    {
        requests
            .into_iter()
            .try_fold(self, |query, (target, request)| query.batch_select_as(target, request))
    }

    /// Run the base query, then every pending request in order.
    #[allow(clippy::result_large_err)]
    #[tracing::instrument(level = "debug", skip(self, conn), fields(model = M::TABLE_NAME, batches = self.batches.len()))]
    pub fn all<C: Connection + ?Sized>(&self, conn: &C) -> Result<Vec<Annotated<M>>> {
        let mut records = self
            .select
            .fetch_rows(conn)?
            .into_iter()
            .map(|row| Ok(Annotated::with_row(M::from_row(&row)?, row)))
            .collect::<Result<Vec<_>>>()?;
        if self.batches.is_empty() {
            return Ok(records);
        }

        let loader = BatchLoader::new(conn, self.schema).with_config(self.config.clone());
        for batch in self.batches.iter() {
            loader.load(&mut records, batch)?;
        }
        Ok(records)
    }
}

/// Entry point for batch-aware queries on a [`Schema`].
pub trait BatchManager {
    /// A query over every row of `M`.
    fn query<M: Model>(&self) -> BatchQuery<'_, M>;
}

impl BatchManager for Schema {
    fn query<M: Model>(&self) -> BatchQuery<'_, M> {
        BatchQuery::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Entry, MockConnection, Section, Tag, entry_row, named_row, schema};
    use batch_select_core::{Error, Row, Value};

    fn tag_names(record: &Annotated<Entry>, target: &str) -> Vec<String> {
        record
            .related::<Tag>(target)
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect()
    }

    #[test]
    fn one_query_per_request_plus_base() {
        let schema = schema();
        let conn = MockConnection::new()
            .respond(vec![entry_row(1, "A"), entry_row(2, "B"), entry_row(3, "C")])
            .respond(vec![
                named_row(1, "red", "__entry_id", 1_i64),
                named_row(1, "red", "__entry_id", 2_i64),
                named_row(2, "blue", "__entry_id", 2_i64),
            ]);

        let records = schema
            .query::<Entry>()
            .order_by(vec![OrderBy::asc("id")])
            .batch_select("tags")
            .unwrap()
            .all(&conn)
            .unwrap();

        assert_eq!(conn.query_calls(), 2);
        assert_eq!(
            conn.sql(0),
            "SELECT \"entry\".\"id\", \"entry\".\"title\", \"entry\".\"section_id\" FROM \"entry\" ORDER BY \"entry\".\"id\" ASC"
        );
        assert_eq!(tag_names(&records[0], "tags_all"), ["red"]);
        assert_eq!(tag_names(&records[1], "tags_all"), ["red", "blue"]);
        assert!(tag_names(&records[2], "tags_all").is_empty());
    }

    #[test]
    fn nothing_pending_means_one_query() {
        let schema = schema();
        let conn = MockConnection::new().respond(vec![entry_row(1, "A")]);
        let records = schema.query::<Entry>().all(&conn).unwrap();
        assert_eq!(conn.query_calls(), 1);
        assert_eq!(records[0].targets().count(), 0);
        assert_eq!(records[0].entity(), &Entry::new(1, "A"));
    }

    #[test]
    fn joined_models_are_read_from_the_base_row() {
        let schema = schema();
        let columns = || -> Vec<String> {
            ["id", "title", "section_id", "section__id", "section__name"]
                .map(String::from)
                .to_vec()
        };
        let conn = MockConnection::new().respond(vec![
            Row::new(
                columns(),
                vec![
                    Value::BigInt(1),
                    Value::Text("A".into()),
                    Value::BigInt(7),
                    Value::BigInt(7),
                    Value::Text("news".into()),
                ],
            ),
            Row::new(
                columns(),
                vec![Value::BigInt(2), Value::Text("B".into()), Value::Null, Value::Null, Value::Null],
            ),
        ]);

        let records = schema
            .query::<Entry>()
            .select_related(["section"])
            .all(&conn)
            .unwrap();

        assert!(conn.sql(0).contains("LEFT JOIN \"section\""));
        assert_eq!(
            records[0].joined::<Section>("section").unwrap(),
            Some(Section {
                id: 7,
                name: "news".into()
            })
        );
        assert_eq!(records[1].joined::<Section>("section").unwrap(), None);
        assert!(records[0].joined::<Section>("location").is_err());
        assert_eq!(records[0].row().map(Row::len), Some(5));
        assert!(Annotated::new(Entry::new(3, "C")).joined::<Section>("section").is_err());
    }

    #[test]
    fn registration_fails_fast() {
        let schema = schema();
        let err = schema.query::<Entry>().batch_select("section").unwrap_err();
        assert!(err.is_not_batchable());
        let err = schema
            .query::<Entry>()
            .batch_select_named([("x", "tags"), ("y", "missing")])
            .unwrap_err();
        assert!(err.is_unknown_relationship());
    }

    #[test]
    fn same_target_replaces_in_place() {
        let schema = schema();
        let query = schema
            .query::<Entry>()
            .batch_select("tags")
            .unwrap()
            .batch_select_as("labels", "tags")
            .unwrap()
            .batch_select(Batch::new("tags").filter(Expr::col("name").eq("red")))
            .unwrap();

        let pending = query.pending();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].target_field_name(), "tags_all");
        assert_eq!(pending[0].replay().len(), 1);
        assert_eq!(pending[1].target_field_name(), "labels");
    }

    #[test]
    fn clones_do_not_see_later_registrations() {
        let schema = schema();
        let base = schema.query::<Entry>().batch_select("tags").unwrap();
        let wider = base.clone().batch_select_as("labels", "tags").unwrap();
        let narrowed = base.clone().filter(Expr::col("id").gt(1));

        assert_eq!(base.pending().len(), 1);
        assert_eq!(wider.pending().len(), 2);
        assert_eq!(narrowed.pending(), base.pending());
        assert!(narrowed.select().where_clause().is_some());
        assert!(base.select().where_clause().is_none());
    }

    #[test]
    fn named_requests_run_in_order() {
        let schema = schema();
        let conn = MockConnection::new()
            .respond(vec![entry_row(1, "A")])
            .respond(vec![named_row(1, "red", "__entry_id", 1_i64)])
            .respond(vec![]);

        let records = schema
            .query::<Entry>()
            .batch_select_named([
                ("all_tags", Batch::new("tags")),
                ("blue_tags", Batch::with_filter("tags", Expr::col("name").eq("blue"))),
            ])
            .unwrap()
            .all(&conn)
            .unwrap();

        assert_eq!(conn.query_calls(), 3);
        assert!(conn.sql(2).contains("\"tag\".\"name\" = ?2"));
        assert_eq!(conn.params(2)[1], Value::Text("blue".into()));
        assert_eq!(tag_names(&records[0], "all_tags"), ["red"]);
        assert!(tag_names(&records[0], "blue_tags").is_empty());
    }

    #[test]
    fn batch_failure_returns_no_partial_results() {
        let schema = schema();
        let conn = MockConnection::new()
            .respond(vec![entry_row(1, "A")])
            .fail(Error::Custom("gone".into()));
        let result = schema.query::<Entry>().batch_select("tags").unwrap().all(&conn);
        assert!(matches!(result, Err(Error::Custom(_))));
    }
}
