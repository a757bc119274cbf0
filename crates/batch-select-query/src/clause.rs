//! ORDER BY and JOIN clause types.

use crate::expr::Expr;
use batch_select_core::{Dialect, Value};

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

impl OrderDirection {
    #[must_use]
    pub const fn flipped(self) -> Self {
        match self {
            OrderDirection::Asc => OrderDirection::Desc,
            OrderDirection::Desc => OrderDirection::Asc,
        }
    }
}

/// NULLS FIRST/LAST ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullsOrder {
    First,
    Last,
}

impl NullsOrder {
    const fn flipped(self) -> Self {
        match self {
            NullsOrder::First => NullsOrder::Last,
            NullsOrder::Last => NullsOrder::First,
        }
    }
}

/// One ORDER BY key.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub expr: Expr,
    pub direction: OrderDirection,
    pub nulls: Option<NullsOrder>,
}

impl OrderBy {
    pub fn asc(expr: impl Into<OrderTarget>) -> Self {
        Self {
            expr: expr.into().0,
            direction: OrderDirection::Asc,
            nulls: None,
        }
    }

    pub fn desc(expr: impl Into<OrderTarget>) -> Self {
        Self {
            expr: expr.into().0,
            direction: OrderDirection::Desc,
            nulls: None,
        }
    }

    #[must_use]
    pub fn nulls_first(mut self) -> Self {
        self.nulls = Some(NullsOrder::First);
        self
    }

    #[must_use]
    pub fn nulls_last(mut self) -> Self {
        self.nulls = Some(NullsOrder::Last);
        self
    }

    /// The same key sorted the other way.
    #[must_use]
    pub fn reversed(&self) -> Self {
        Self {
            expr: self.expr.clone(),
            direction: self.direction.flipped(),
            nulls: self.nulls.map(NullsOrder::flipped),
        }
    }

    /// Parse `"name"`, `"-name"` or `"name DESC"`, comma separated.
    pub fn parse_list(ordering: &str) -> Vec<OrderBy> {
        ordering
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                if let Some(column) = part.strip_prefix('-') {
                    return OrderBy::desc(column.trim());
                }
                let mut words = part.split_whitespace();
                let column = words.next().unwrap_or(part);
                match words.next() {
                    Some(dir) if dir.eq_ignore_ascii_case("desc") => OrderBy::desc(column),
                    _ => OrderBy::asc(column),
                }
            })
            .collect()
    }

    pub fn build_with_dialect(
        &self,
        dialect: Dialect,
        params: &mut Vec<Value>,
        offset: usize,
    ) -> String {
        let mut sql = self.expr.build_with_dialect(dialect, params, offset);
        sql.push_str(match self.direction {
            OrderDirection::Asc => " ASC",
            OrderDirection::Desc => " DESC",
        });
        if let Some(nulls) = self.nulls {
            sql.push_str(match nulls {
                NullsOrder::First => " NULLS FIRST",
                NullsOrder::Last => " NULLS LAST",
            });
        }
        sql
    }
}

/// Anything that can be ordered by: a column name or an expression.
#[derive(Debug, Clone)]
pub struct OrderTarget(Expr);

impl From<&str> for OrderTarget {
    fn from(column: &str) -> Self {
        OrderTarget(Expr::col(column))
    }
}

impl From<String> for OrderTarget {
    fn from(column: String) -> Self {
        OrderTarget(Expr::col(column))
    }
}

impl From<Expr> for OrderTarget {
    fn from(expr: Expr) -> Self {
        OrderTarget(expr)
    }
}

/// Types of SQL joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
}

impl JoinType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
        }
    }
}

/// A JOIN clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub join_type: JoinType,
    pub table: String,
    pub alias: Option<String>,
    pub on: Expr,
}

impl Join {
    pub fn inner(table: impl Into<String>, on: Expr) -> Self {
        Self {
            join_type: JoinType::Inner,
            table: table.into(),
            alias: None,
            on,
        }
    }

    pub fn left(table: impl Into<String>, on: Expr) -> Self {
        Self {
            join_type: JoinType::Left,
            table: table.into(),
            alias: None,
            on,
        }
    }

    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn build_with_dialect(
        &self,
        dialect: Dialect,
        params: &mut Vec<Value>,
        offset: usize,
    ) -> String {
        let mut sql = format!(
            " {} {}",
            self.join_type.as_str(),
            dialect.quote_identifier(&self.table)
        );
        if let Some(alias) = &self.alias {
            sql.push_str(" AS ");
            sql.push_str(&dialect.quote_identifier(alias));
        }
        sql.push_str(" ON ");
        sql.push_str(&self.on.build_with_dialect(dialect, params, offset));
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sql_of(order: &OrderBy) -> String {
        order.build_with_dialect(Dialect::Sqlite, &mut Vec::new(), 0)
    }

    #[test]
    fn order_by_renders_direction_and_nulls() {
        assert_eq!(sql_of(&OrderBy::asc("name")), "\"name\" ASC");
        assert_eq!(
            sql_of(&OrderBy::desc("created").nulls_last()),
            "\"created\" DESC NULLS LAST"
        );
    }

    #[test]
    fn reversing_flips_direction_and_nulls() {
        let order = OrderBy::asc("name").nulls_first().reversed();
        assert_eq!(order.direction, OrderDirection::Desc);
        assert_eq!(order.nulls, Some(NullsOrder::Last));
    }

    #[test]
    fn parse_list_accepts_common_spellings() {
        let parsed = OrderBy::parse_list("name, -created, rank DESC,  ");
        assert_eq!(
            parsed,
            vec![
                OrderBy::asc("name"),
                OrderBy::desc("created"),
                OrderBy::desc("rank")
            ]
        );
    }

    #[test]
    fn join_with_alias() {
        let join = Join::left(
            "section",
            Expr::qualified("s", "id").eq(Expr::qualified("entry", "section_id")),
        )
        .alias("s");
        assert_eq!(
            join.build_with_dialect(Dialect::Sqlite, &mut Vec::new(), 0),
            " LEFT JOIN \"section\" AS \"s\" ON \"s\".\"id\" = \"entry\".\"section_id\""
        );
    }
}
