//! Query building for batch-select.
//!
//! `Select` renders dialect-aware SQL for one table. `Replay` records
//! refinements without running them, and `Batch` ties a replay to the
//! relationship it refines.

pub mod clause;
pub mod expr;
pub mod replay;
pub mod select;

pub use clause::{Join, JoinType, NullsOrder, OrderBy, OrderDirection, OrderTarget};
pub use expr::{BinaryOp, Expr};
pub use replay::{Batch, BatchOp, DEFAULT_TARGET_SUFFIX, Replay};
pub use select::{Extra, Select};

pub use batch_select_core::Dialect;
