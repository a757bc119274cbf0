//! SELECT query builder.

use crate::clause::{Join, OrderBy};
use crate::expr::Expr;
use batch_select_core::{
    Connection, Dialect, Error, Model, ModelMeta, RelationshipInfo, RelationshipKind, Result, Row,
    Value, find_relationship,
};

/// Raw select-list entries and WHERE fragments appended verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extra {
    /// `(alias, sql)` pairs added to the select list
    pub select: Vec<(String, String)>,
    /// Conditions ANDed into the WHERE clause
    pub conditions: Vec<String>,
}

impl Extra {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn select(mut self, alias: impl Into<String>, sql: impl Into<String>) -> Self {
        self.select.push((alias.into(), sql.into()));
        self
    }

    #[must_use]
    pub fn condition(mut self, sql: impl Into<String>) -> Self {
        self.conditions.push(sql.into());
        self
    }
}

/// A SELECT over one table, with optional joins and projections.
///
/// The builder only records state; `build` renders SQL for a dialect and
/// reports refinements that name unknown columns or relationships.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    table: String,
    primary_key: String,
    fields: Vec<&'static str>,
    relationships: &'static [RelationshipInfo],
    joins: Vec<Join>,
    annotations: Vec<(String, Expr)>,
    where_clause: Option<Expr>,
    extra_conditions: Vec<String>,
    order_by: Vec<OrderBy>,
    standard_ordering: bool,
    limit: Option<u64>,
    offset: Option<u64>,
    distinct: bool,
    related: Vec<String>,
    deferred: Vec<String>,
    only: Option<Vec<String>>,
}

impl Select {
    /// SELECT over a table whose columns are not known (`table.*`).
    pub fn from_table(table: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            primary_key: primary_key.into(),
            fields: Vec::new(),
            relationships: &[],
            joins: Vec::new(),
            annotations: Vec::new(),
            where_clause: None,
            extra_conditions: Vec::new(),
            order_by: Vec::new(),
            standard_ordering: true,
            limit: None,
            offset: None,
            distinct: false,
            related: Vec::new(),
            deferred: Vec::new(),
            only: None,
        }
    }

    pub fn from_meta(meta: &ModelMeta) -> Self {
        let mut select = Self::from_table(meta.table, meta.pk_column());
        select.fields = meta.fields.iter().map(|f| f.column_name).collect();
        select.relationships = meta.relationships;
        select
    }

    pub fn for_model<M: Model>() -> Self {
        Self::from_meta(&ModelMeta::of::<M>())
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn order_keys(&self) -> &[OrderBy] {
        &self.order_by
    }

    /// Whether `reverse` has been applied an odd number of times.
    pub fn is_reversed(&self) -> bool {
        !self.standard_ordering
    }

    pub fn where_clause(&self) -> Option<&Expr> {
        self.where_clause.as_ref()
    }

    /// AND a condition into the WHERE clause.
    #[must_use]
    pub fn filter(mut self, expr: Expr) -> Self {
        self.where_clause = Some(match self.where_clause.take() {
            Some(existing) => existing.and(expr),
            None => expr,
        });
        self
    }

    /// AND the negation of a condition into the WHERE clause.
    #[must_use]
    pub fn exclude(self, expr: Expr) -> Self {
        self.filter(expr.not())
    }

    /// Add `expr AS alias` to the select list.
    #[must_use]
    pub fn annotate(mut self, alias: impl Into<String>, expr: Expr) -> Self {
        self.annotations.push((alias.into(), expr));
        self
    }

    /// Replace the ordering.
    #[must_use]
    pub fn order_by(mut self, keys: Vec<OrderBy>) -> Self {
        self.order_by = keys;
        self
    }

    /// Invert the ordering, including orderings set afterwards.
    #[must_use]
    pub fn reverse(mut self) -> Self {
        self.standard_ordering = !self.standard_ordering;
        self
    }

    /// LEFT JOIN forward single-valued relationships into each row.
    ///
    /// Joined columns are read back as `<name>__<column>`.
    #[must_use]
    pub fn select_related<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        for name in names {
            let name = name.into();
            if !self.related.contains(&name) {
                self.related.push(name);
            }
        }
        self
    }

    #[must_use]
    pub fn extra(mut self, extra: Extra) -> Self {
        for (alias, sql) in extra.select {
            self.annotations.push((alias, Expr::Raw(sql)));
        }
        self.extra_conditions.extend(extra.conditions);
        self
    }

    /// Leave columns out of the projection. The primary key is always kept.
    #[must_use]
    pub fn defer<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.deferred.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Project only these columns plus the primary key.
    #[must_use]
    pub fn only<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.only = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    #[must_use]
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    #[must_use]
    pub fn offset(mut self, n: u64) -> Self {
        self.offset = Some(n);
        self
    }

    #[must_use]
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    fn aliases(&self) -> Vec<String> {
        self.annotations.iter().map(|(alias, _)| alias.clone()).collect()
    }

    fn projected_columns(&self) -> Result<Option<Vec<String>>> {
        if self.fields.is_empty() {
            if let Some(only) = &self.only {
                let mut cols = vec![self.primary_key.clone()];
                for col in only {
                    if !cols.contains(col) && !self.deferred.contains(col) {
                        cols.push(col.clone());
                    }
                }
                return Ok(Some(cols));
            }
            if let Some(col) = self.deferred.first() {
                return Err(Error::not_found(format!(
                    "cannot defer '{}': no column list for '{}'",
                    col, self.table
                )));
            }
            return Ok(None);
        }

        let requested = self.only.iter().flatten().chain(self.deferred.iter());
        for col in requested {
            if !self.fields.iter().any(|f| f == col) {
                return Err(Error::not_found(format!(
                    "'{}' has no column '{}'",
                    self.table, col
                )));
            }
        }

        let cols = self
            .fields
            .iter()
            .filter(|&&f| {
                f == self.primary_key
                    || (self
                        .only
                        .as_ref()
                        .is_none_or(|only| only.iter().any(|c| c == f))
                        && !self.deferred.iter().any(|c| c == f))
            })
            .map(|f| (*f).to_string())
            .collect();
        Ok(Some(cols))
    }

    fn related_join(&self, name: &str) -> Result<(&'static RelationshipInfo, &'static str)> {
        let info = find_relationship(self.relationships, name)
            .filter(|r| matches!(r.kind, RelationshipKind::ManyToOne | RelationshipKind::OneToOne))
            .ok_or_else(|| {
                Error::not_found(format!(
                    "'{}' has no forward relationship '{}' to select_related",
                    self.table, name
                ))
            })?;
        let local_key = info.local_key.ok_or_else(|| {
            Error::not_found(format!("'{}.{}' has no local key", self.table, name))
        })?;
        if info.related_field_info().is_empty() {
            return Err(Error::not_found(format!(
                "'{}.{}' has no field metadata for its related model",
                self.table, name
            )));
        }
        Ok((info, local_key))
    }

    /// Render SQL and parameters for `dialect`.
    #[allow(clippy::result_large_err)]
    pub fn build(&self, dialect: Dialect) -> Result<(String, Vec<Value>)> {
        let mut params = Vec::new();
        let aliases = self.aliases();
        let table = dialect.quote_identifier(&self.table);

        let mut columns = match self.projected_columns()? {
            Some(cols) => cols
                .iter()
                .map(|c| dialect.qualified(&self.table, c))
                .collect(),
            None => vec![format!("{table}.*")],
        };

        let mut related_joins = Vec::new();
        for name in &self.related {
            let (info, local_key) = self.related_join(name)?;
            let fields = info.related_field_info();
            let related_pk = fields
                .iter()
                .find(|f| f.primary_key)
                .map_or("id", |f| f.column_name);
            for field in fields {
                columns.push(format!(
                    "{} AS {}",
                    dialect.qualified(name, field.column_name),
                    dialect.quote_identifier(&format!("{name}__{}", field.column_name))
                ));
            }
            related_joins.push(
                Join::left(
                    info.related_table,
                    Expr::qualified(name.clone(), related_pk)
                        .eq(Expr::qualified(self.table.clone(), local_key)),
                )
                .alias(name.clone()),
            );
        }

        for (alias, expr) in &self.annotations {
            let expr_sql = expr
                .qualify(&self.table, &aliases)
                .build_with_dialect(dialect, &mut params, 0);
            columns.push(format!("{expr_sql} AS {}", dialect.quote_identifier(alias)));
        }

        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }
        sql.push_str(&columns.join(", "));
        sql.push_str(" FROM ");
        sql.push_str(&table);

        for join in self.joins.iter().chain(related_joins.iter()) {
            sql.push_str(&join.build_with_dialect(dialect, &mut params, 0));
        }

        let mut conditions = Vec::new();
        if let Some(expr) = &self.where_clause {
            conditions.push(
                expr.qualify(&self.table, &aliases)
                    .build_with_dialect(dialect, &mut params, 0),
            );
        }
        conditions.extend(self.extra_conditions.iter().map(|c| format!("({c})")));
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        if !self.order_by.is_empty() {
            let keys: Vec<_> = self
                .order_by
                .iter()
                .map(|key| {
                    let key = if self.standard_ordering {
                        key.clone()
                    } else {
                        key.reversed()
                    };
                    OrderBy {
                        expr: key.expr.qualify(&self.table, &aliases),
                        ..key
                    }
                    .build_with_dialect(dialect, &mut params, 0)
                })
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&keys.join(", "));
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }

        Ok((sql, params))
    }

    /// Execute against `conn` and return the raw rows.
    #[allow(clippy::result_large_err)]
    pub fn fetch_rows<C: Connection + ?Sized>(&self, conn: &C) -> Result<Vec<Row>> {
        let (sql, params) = self.build(conn.dialect())?;
        tracing::debug!(sql = %sql, params = params.len(), "Executing select");
        conn.query(&sql, &params)
    }

    /// Execute and decode every row as `M`.
    #[allow(clippy::result_large_err)]
    pub fn fetch_all<M: Model, C: Connection + ?Sized>(&self, conn: &C) -> Result<Vec<M>> {
        self.fetch_rows(conn)?.iter().map(M::from_row).collect()
    }
}
