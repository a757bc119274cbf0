//! Batch loading of to-many relationships.
//!
//! Given a collection of entities and the name of a many-to-many, reverse
//! many-to-many or reverse one-to-many relationship, the loader fetches
//! every related row in one extra query and attaches the rows to their
//! owners under a target name.
//!
//! - [`BatchLoader`] runs a single fetch over a materialized collection.
//! - [`BatchQuery`] records batch requests on a base query and runs them
//!   after it, for `1 + K` queries in total.
//! - [`attach`] and [`GroupedRows`] do the grouping with no store access.
//! - [`TrackedConnection`] counts queries per table for N+1 checks.

pub mod annotated;
pub mod attach;
pub mod config;
pub mod engine;
pub mod query;
pub mod tracker;

#[cfg(test)]
mod testing;

pub use annotated::Annotated;
pub use attach::{GroupedRows, attach};
pub use config::LoaderConfig;
pub use engine::{BatchLoader, aux_select, batch_select};
pub use query::{BatchManager, BatchQuery};
pub use tracker::{QueryStats, TrackedConnection};
