//! Recorded query refinements, replayed later against a concrete query.
//!
//! A [`Replay`] is an immutable list of [`BatchOp`]s. Nothing runs when it is
//! built; [`Replay::apply`] folds the operations over a [`Select`] in the
//! order they were recorded. A [`Batch`] pairs a replay with the
//! relationship it refines and the name results are attached under.

use crate::clause::OrderBy;
use crate::expr::Expr;
use crate::select::{Extra, Select};
use std::sync::Arc;

/// Suffix of the default target name, `"<field>_all"`.
pub const DEFAULT_TARGET_SUFFIX: &str = "_all";

/// One recorded refinement.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOp {
    Filter(Expr),
    Exclude(Expr),
    Annotate { alias: String, expr: Expr },
    OrderBy(Vec<OrderBy>),
    Reverse,
    SelectRelated(Vec<String>),
    Extra(Extra),
    Defer(Vec<String>),
    Only(Vec<String>),
}

impl BatchOp {
    /// Name of the query method this operation replays.
    pub const fn name(&self) -> &'static str {
        match self {
            BatchOp::Filter(_) => "filter",
            BatchOp::Exclude(_) => "exclude",
            BatchOp::Annotate { .. } => "annotate",
            BatchOp::OrderBy(_) => "order_by",
            BatchOp::Reverse => "reverse",
            BatchOp::SelectRelated(_) => "select_related",
            BatchOp::Extra(_) => "extra",
            BatchOp::Defer(_) => "defer",
            BatchOp::Only(_) => "only",
        }
    }

    /// Invoke the matching method on `select`.
    pub fn apply(&self, select: Select) -> Select {
        match self {
            BatchOp::Filter(expr) => select.filter(expr.clone()),
            BatchOp::Exclude(expr) => select.exclude(expr.clone()),
            BatchOp::Annotate { alias, expr } => select.annotate(alias.clone(), expr.clone()),
            BatchOp::OrderBy(keys) => select.order_by(keys.clone()),
            BatchOp::Reverse => select.reverse(),
            BatchOp::SelectRelated(names) => select.select_related(names.iter().cloned()),
            BatchOp::Extra(extra) => select.extra(extra.clone()),
            BatchOp::Defer(cols) => select.defer(cols.iter().cloned()),
            BatchOp::Only(cols) => select.only(cols.iter().cloned()),
        }
    }
}

/// An immutable, ordered list of refinements.
///
/// Cloning is cheap: clones share the recorded list until one of them
/// records another step, which copies it first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Replay {
    ops: Arc<Vec<BatchOp>>,
}

impl Replay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Record `op` after the existing steps.
    #[must_use]
    pub fn push(mut self, op: BatchOp) -> Self {
        Arc::make_mut(&mut self.ops).push(op);
        self
    }

    #[must_use]
    pub fn filter(self, expr: Expr) -> Self {
        self.push(BatchOp::Filter(expr))
    }

    #[must_use]
    pub fn exclude(self, expr: Expr) -> Self {
        self.push(BatchOp::Exclude(expr))
    }

    #[must_use]
    pub fn annotate(self, alias: impl Into<String>, expr: Expr) -> Self {
        self.push(BatchOp::Annotate {
            alias: alias.into(),
            expr,
        })
    }

    #[must_use]
    pub fn order_by(self, keys: Vec<OrderBy>) -> Self {
        self.push(BatchOp::OrderBy(keys))
    }

    #[must_use]
    pub fn reverse(self) -> Self {
        self.push(BatchOp::Reverse)
    }

    #[must_use]
    pub fn select_related<S: Into<String>>(self, names: impl IntoIterator<Item = S>) -> Self {
        self.push(BatchOp::SelectRelated(
            names.into_iter().map(Into::into).collect(),
        ))
    }

    #[must_use]
    pub fn extra(self, extra: Extra) -> Self {
        self.push(BatchOp::Extra(extra))
    }

    #[must_use]
    pub fn defer<S: Into<String>>(self, columns: impl IntoIterator<Item = S>) -> Self {
        self.push(BatchOp::Defer(columns.into_iter().map(Into::into).collect()))
    }

    #[must_use]
    pub fn only<S: Into<String>>(self, columns: impl IntoIterator<Item = S>) -> Self {
        self.push(BatchOp::Only(columns.into_iter().map(Into::into).collect()))
    }

    /// Fold every recorded step over `select`, in order.
    pub fn apply(&self, select: Select) -> Select {
        self.ops.iter().fold(select, |query, op| {
            tracing::trace!(op = op.name(), table = query.table(), "Replaying refinement");
            op.apply(query)
        })
    }
}

/// A batch request: which relationship to load, where to attach it, and
/// how to refine the related rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    field_name: String,
    target_field_name: String,
    replay: Replay,
}

impl Batch {
    /// Load `field` into `"<field>_all"` with no refinements.
    pub fn new(field: impl Into<String>) -> Self {
        let field_name = field.into();
        let target_field_name = format!("{field_name}{DEFAULT_TARGET_SUFFIX}");
        Self {
            field_name,
            target_field_name,
            replay: Replay::new(),
        }
    }

    /// Same as `Batch::new(field).filter(expr)`.
    pub fn with_filter(field: impl Into<String>, expr: Expr) -> Self {
        Self::new(field).filter(expr)
    }

    /// Attach results under `name` instead of the default.
    #[must_use]
    pub fn target(mut self, name: impl Into<String>) -> Self {
        self.target_field_name = name.into();
        self
    }

    #[must_use]
    pub fn with_replay(mut self, replay: Replay) -> Self {
        self.replay = replay;
        self
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn target_field_name(&self) -> &str {
        &self.target_field_name
    }

    pub fn replay(&self) -> &Replay {
        &self.replay
    }

    pub fn apply(&self, select: Select) -> Select {
        self.replay.apply(select)
    }

    fn map_replay(mut self, f: impl FnOnce(Replay) -> Replay) -> Self {
        self.replay = f(self.replay);
        self
    }

    #[must_use]
    pub fn filter(self, expr: Expr) -> Self {
        self.map_replay(|r| r.filter(expr))
    }

    #[must_use]
    pub fn exclude(self, expr: Expr) -> Self {
        self.map_replay(|r| r.exclude(expr))
    }

    #[must_use]
    pub fn annotate(self, alias: impl Into<String>, expr: Expr) -> Self {
        self.map_replay(|r| r.annotate(alias, expr))
    }

    #[must_use]
    pub fn order_by(self, keys: Vec<OrderBy>) -> Self {
        self.map_replay(|r| r.order_by(keys))
    }

    #[must_use]
    pub fn reverse(self) -> Self {
        self.map_replay(Replay::reverse)
    }

    #[must_use]
    pub fn select_related<S: Into<String>>(self, names: impl IntoIterator<Item = S>) -> Self {
        self.map_replay(|r| r.select_related(names))
    }

    #[must_use]
    pub fn extra(self, extra: Extra) -> Self {
        self.map_replay(|r| r.extra(extra))
    }

    #[must_use]
    pub fn defer<S: Into<String>>(self, columns: impl IntoIterator<Item = S>) -> Self {
        self.map_replay(|r| r.defer(columns))
    }

    #[must_use]
    pub fn only<S: Into<String>>(self, columns: impl IntoIterator<Item = S>) -> Self {
        self.map_replay(|r| r.only(columns))
    }
}

impl From<&str> for Batch {
    fn from(field: &str) -> Self {
        Batch::new(field)
    }
}

impl From<String> for Batch {
    fn from(field: String) -> Self {
        Batch::new(field)
    }
}

impl From<&Batch> for Batch {
    fn from(batch: &Batch) -> Self {
        batch.clone()
    }
}
