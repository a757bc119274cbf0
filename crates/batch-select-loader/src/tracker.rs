//! Query counting for N+1 detection.
//!
//! [`TrackedConnection`] wraps any [`Connection`] and counts what passes
//! through it, per table. When one table is read more often than the
//! threshold within a scope a warning is logged on the
//! `batch_select::n1` target.
//!
//! ```ignore
//! let conn = TrackedConnection::new(conn).with_threshold(3);
//! let entries = schema.query::<Entry>().batch_select("tags")?.all(&conn)?;
//! assert_eq!(conn.query_count(), 2);
//! ```

use batch_select_core::{Connection, Dialect, Result, Row, Value};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Snapshot of what a [`TrackedConnection`] has seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryStats {
    /// Queries that returned rows
    pub total_queries: usize,
    /// Statements run through `execute`
    pub total_executes: usize,
    /// Number of distinct tables read
    pub tables: usize,
    /// Tables whose read count reached the threshold
    pub potential_n1: usize,
}

#[derive(Debug, Default)]
struct TrackerState {
    queries: usize,
    executes: usize,
    per_table: HashMap<String, usize>,
    statements: Vec<String>,
}

/// A connection that counts the statements it forwards.
#[derive(Debug)]
pub struct TrackedConnection<C> {
    inner: C,
    threshold: usize,
    state: Mutex<TrackerState>,
}

impl<C: Connection> TrackedConnection<C> {
    /// Wrap `inner` with the default threshold (3).
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            threshold: 3,
            state: Mutex::new(TrackerState::default()),
        }
    }

    /// Warn once a single table has been read `threshold` times.
    #[must_use]
    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn into_inner(self) -> C {
        self.inner
    }

    fn state(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of queries forwarded since the last reset.
    pub fn query_count(&self) -> usize {
        self.state().queries
    }

    /// Number of queries that read `table`.
    pub fn count_for(&self, table: &str) -> usize {
        self.state().per_table.get(table).copied().unwrap_or(0)
    }

    /// Every statement forwarded since the last reset, in order.
    pub fn statements(&self) -> Vec<String> {
        self.state().statements.clone()
    }

    pub fn stats(&self) -> QueryStats {
        let state = self.state();
        QueryStats {
            total_queries: state.queries,
            total_executes: state.executes,
            tables: state.per_table.len(),
            potential_n1: state
                .per_table
                .values()
                .filter(|&&count| count >= self.threshold)
                .count(),
        }
    }

    /// Clear all counts. Call at the start of a new unit of work.
    pub fn reset(&self) {
        *self.state() = TrackerState::default();
    }

    fn record(&self, sql: &str) {
        let mut state = self.state();
        state.queries += 1;
        state.statements.push(sql.to_string());
        let Some(table) = table_of(sql) else {
            return;
        };
        let count = state.per_table.entry(table.clone()).or_insert(0);
        *count += 1;
        if *count == self.threshold {
            tracing::warn!(
                target: "batch_select::n1",
                table = %table,
                queries = *count,
                threshold = self.threshold,
                "N+1 query pattern detected; batch-load the relationship instead"
            );
        }
    }
}

/// First table named after `FROM`, without quotes.
fn table_of(sql: &str) -> Option<String> {
    let upper = sql.to_ascii_uppercase();
    let start = upper.find(" FROM ")? + " FROM ".len();
    let name = sql[start..]
        .split_whitespace()
        .next()?
        .trim_matches(|c| c == '"' || c == '`');
    (!name.is_empty()).then(|| name.to_string())
}

impl<C: Connection> Connection for TrackedConnection<C> {
    fn dialect(&self) -> Dialect {
        self.inner.dialect()
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.record(sql);
        self.inner.query(sql, params)
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        {
            let mut state = self.state();
            state.executes += 1;
            state.statements.push(sql.to_string());
        }
        self.inner.execute(sql, params)
    }
}
