//! Entities paired with the collections attached to them.

use batch_select_core::{Error, Model, Result, Row, Value};
use std::collections::BTreeMap;
use std::ops::Deref;

/// An entity plus one ordered row list per attached target name.
///
/// Entities are never modified; batch results live beside them. Records
/// produced by [`BatchQuery::all`](crate::BatchQuery::all) also keep the
/// base row they were decoded from, so models joined in with
/// `select_related` can be read back with [`joined`](Self::joined).
#[derive(Debug, Clone, PartialEq)]
pub struct Annotated<M> {
    entity: M,
    row: Option<Row>,
    attached: BTreeMap<String, Vec<Row>>,
}

impl<M> Annotated<M> {
    pub fn new(entity: M) -> Self {
        Self {
            entity,
            row: None,
            attached: BTreeMap::new(),
        }
    }

    /// Pair `entity` with the row it was decoded from.
    pub fn with_row(entity: M, row: Row) -> Self {
        Self {
            row: Some(row),
            ..Self::new(entity)
        }
    }

    /// The base row, when the record came from a query.
    pub fn row(&self) -> Option<&Row> {
        self.row.as_ref()
    }

    pub fn entity(&self) -> &M {
        &self.entity
    }

    pub fn into_entity(self) -> M {
        self.entity
    }

    /// Split into the entity and its attached collections.
    pub fn into_parts(self) -> (M, BTreeMap<String, Vec<Row>>) {
        (self.entity, self.attached)
    }

    /// Bind `rows` to `target`, replacing anything attached there before.
    pub fn attach(&mut self, target: impl Into<String>, rows: Vec<Row>) {
        self.attached.insert(target.into(), rows);
    }

    /// Rows attached under `target`, if that target was loaded.
    pub fn get(&self, target: &str) -> Option<&[Row]> {
        self.attached.get(target).map(Vec::as_slice)
    }

    pub fn has(&self, target: &str) -> bool {
        self.attached.contains_key(target)
    }

    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.attached.keys().map(String::as_str)
    }

    /// Decode the model joined in as `relation` by `select_related`.
    ///
    /// Returns `None` when the outer join found no row, i.e. the joined
    /// primary key is NULL.
    #[allow(clippy::result_large_err)]
    pub fn joined<R: Model>(&self, relation: &str) -> Result<Option<R>> {
        let row = self
            .row
            .as_ref()
            .ok_or_else(|| Error::not_found(format!("no base row to read '{relation}' from")))?;
        let subset = row.subset_by_prefix(&format!("{relation}__"));
        if subset.is_empty() {
            return Err(Error::not_found(format!("'{relation}' was not selected")));
        }
        let pk = R::PRIMARY_KEY.first().copied().unwrap_or("id");
        if matches!(subset.get_by_name(pk), None | Some(Value::Null)) {
            return Ok(None);
        }
        R::from_row(&subset).map(Some)
    }

    /// Decode the rows under `target` as `R`.
    #[allow(clippy::result_large_err)]
    pub fn related<R: Model>(&self, target: &str) -> Result<Vec<R>> {
        self.get(target)
            .ok_or_else(|| Error::not_found(format!("nothing attached as '{target}'")))?
            .iter()
            .map(R::from_row)
            .collect()
    }
}

impl<M> Deref for Annotated<M> {
    type Target = M;

    fn deref(&self) -> &M {
        &self.entity
    }
}
