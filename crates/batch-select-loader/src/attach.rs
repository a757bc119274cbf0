//! Grouping related rows by owner and attaching them.

use crate::annotated::Annotated;
use batch_select_core::{GroupKey, Row};
use std::collections::HashMap;

/// Related rows bucketed by owning id, in the order they were returned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupedRows {
    buckets: HashMap<GroupKey, Vec<Row>>,
    rows: usize,
    untagged: usize,
}

impl GroupedRows {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bucket `rows` by the value of their `tag` column.
    ///
    /// Rows whose tag is missing or NULL belong to no owner and are counted
    /// in [`untagged`](Self::untagged).
    pub fn from_rows(rows: Vec<Row>, tag: &str) -> Self {
        let mut grouped = Self::new();
        for row in rows {
            match row.get_by_name(tag).and_then(|v| v.group_key()) {
                Some(key) => grouped.push(key, row),
                None => grouped.untagged += 1,
            }
        }
        grouped
    }

    pub fn push(&mut self, key: GroupKey, row: Row) {
        self.buckets.entry(key).or_default().push(row);
        self.rows += 1;
    }

    pub fn get(&self, key: &GroupKey) -> Option<&[Row]> {
        self.buckets.get(key).map(Vec::as_slice)
    }

    /// Number of distinct owners with at least one row.
    pub fn owners(&self) -> usize {
        self.buckets.len()
    }

    /// Number of rows placed in a bucket.
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn untagged(&self) -> usize {
        self.untagged
    }
}

/// Attach each instance's bucket under `target_field_name`.
///
/// Instances without a bucket, or whose key is `None`, get an empty list.
/// Order of `instances` is untouched. Returns how many instances received
/// at least one row.
pub fn attach<M, F>(
    instances: &mut [Annotated<M>],
    grouped: &GroupedRows,
    target_field_name: &str,
    key_fn: F,
) -> usize
where
    F: Fn(&M) -> Option<GroupKey>,
{
    let mut filled = 0;
    for record in instances.iter_mut() {
        // Clone rather than take: the same owner may appear more than once.
        let rows = key_fn(record.entity())
            .and_then(|key| grouped.get(&key))
            .map(<[Row]>::to_vec)
            .unwrap_or_default();
        if !rows.is_empty() {
            filled += 1;
        }
        record.attach(target_field_name, rows);
    }
    filled
}

#[cfg(test)]
mod tests {
    use super::*;
    use batch_select_core::Value;

    fn tag_row(owner: Value, name: &str) -> Row {
        Row::new(
            vec!["name".into(), "__entry_id".into()],
            vec![Value::Text(name.into()), owner],
        )
    }

    fn names(rows: Option<&[Row]>) -> Vec<String> {
        rows.unwrap_or_default()
            .iter()
            .map(|r| r.get_named::<String>("name").unwrap())
            .collect()
    }

    #[test]
    fn grouping_keeps_returned_order() {
        let grouped = GroupedRows::from_rows(
            vec![
                tag_row(Value::BigInt(2), "red"),
                tag_row(Value::BigInt(1), "red"),
                tag_row(Value::BigInt(2), "blue"),
                tag_row(Value::Null, "orphan"),
            ],
            "__entry_id",
        );
        assert_eq!(grouped.owners(), 2);
        assert_eq!(grouped.rows(), 3);
        assert_eq!(grouped.untagged(), 1);
        assert_eq!(names(grouped.get(&GroupKey::Int(2))), ["red", "blue"]);
    }

    #[test]
    fn every_instance_gets_a_list_in_original_order() {
        let grouped = GroupedRows::from_rows(
            vec![
                tag_row(Value::Int(1), "red"),
                tag_row(Value::Int(2), "red"),
                tag_row(Value::Int(2), "blue"),
            ],
            "__entry_id",
        );
        let mut records: Vec<_> = [("A", 1_i64), ("B", 2), ("C", 3), ("B2", 2)]
            .into_iter()
            .map(Annotated::new)
            .collect();

        let filled = attach(&mut records, &grouped, "tags_all", |(_, id)| {
            Value::BigInt(*id).group_key()
        });

        assert_eq!(filled, 3);
        let order: Vec<_> = records.iter().map(|r| r.0).collect();
        assert_eq!(order, ["A", "B", "C", "B2"]);
        assert_eq!(names(records[0].get("tags_all")), ["red"]);
        assert_eq!(names(records[1].get("tags_all")), ["red", "blue"]);
        assert_eq!(records[2].get("tags_all"), Some(&[][..]));
        assert_eq!(names(records[3].get("tags_all")), ["red", "blue"]);
    }

    #[test]
    fn missing_key_attaches_empty_list() {
        let mut records = vec![Annotated::new(())];
        let filled = attach(&mut records, &GroupedRows::new(), "x_all", |()| None);
        assert_eq!(filled, 0);
        assert!(records[0].has("x_all"));
        assert!(records[0].get("x_all").unwrap().is_empty());
    }

    #[test]
    fn reattaching_replaces_the_target() {
        let mut record = Annotated::new(1);
        record.attach("t", vec![tag_row(Value::Int(1), "red")]);
        record.attach("t", Vec::new());
        assert_eq!(record.get("t"), Some(&[][..]));
        assert_eq!(record.targets().collect::<Vec<_>>(), ["t"]);
        assert_eq!(*record, 1);
    }
}
