//! Scripted connection and small models shared by the unit tests.

use batch_select_core::{
    Connection, Dialect, Error, FieldInfo, LinkTableInfo, Model, RelationshipInfo,
    RelationshipKind, Result, Row, Schema, Value,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
pub(crate) struct MockState {
    pub query_calls: usize,
    pub execute_calls: usize,
    pub statements: Vec<(String, Vec<Value>)>,
    pub responses: VecDeque<Result<Vec<Row>>>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct MockConnection {
    pub state: Arc<Mutex<MockState>>,
}

impl MockConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, rows: Vec<Row>) -> Self {
        self.state.lock().unwrap().responses.push_back(Ok(rows));
        self
    }

    pub fn fail(self, error: Error) -> Self {
        self.state.lock().unwrap().responses.push_back(Err(error));
        self
    }

    pub fn query_calls(&self) -> usize {
        self.state.lock().unwrap().query_calls
    }

    pub fn sql(&self, index: usize) -> String {
        self.state.lock().unwrap().statements[index].0.clone()
    }

    pub fn params(&self, index: usize) -> Vec<Value> {
        self.state.lock().unwrap().statements[index].1.clone()
    }
}

impl Connection for MockConnection {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let mut state = self.state.lock().unwrap();
        state.query_calls += 1;
        state.statements.push((sql.to_string(), params.to_vec()));
        state.responses.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        state.execute_calls += 1;
        state.statements.push((sql.to_string(), params.to_vec()));
        Ok(0)
    }
}

const ENTRY_FIELDS: &[FieldInfo] = &[
    FieldInfo::new("id").primary_key(true),
    FieldInfo::new("title"),
    FieldInfo::new("section_id").nullable(true),
];
const NAMED_FIELDS: &[FieldInfo] = &[FieldInfo::new("id").primary_key(true), FieldInfo::new("name")];

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Entry {
    pub id: i64,
    pub title: String,
    pub section_id: Option<i64>,
}

impl Entry {
    pub fn new(id: i64, title: &str) -> Self {
        Self {
            id,
            title: title.to_string(),
            section_id: None,
        }
    }
}

impl Model for Entry {
    const TABLE_NAME: &'static str = "entry";
    const PRIMARY_KEY: &'static [&'static str] = &["id"];
    const RELATIONSHIPS: &'static [RelationshipInfo] = &[
        RelationshipInfo::new("tags", "tag", RelationshipKind::ManyToMany)
            .link_table(LinkTableInfo::new("entry_tags", "entry_id", "tag_id"))
            .related_fields(Tag::fields)
            .order_by("name"),
        RelationshipInfo::new("section", "section", RelationshipKind::ManyToOne)
            .local_key("section_id")
            .related_fields(Section::fields),
    ];

    fn fields() -> &'static [FieldInfo] {
        ENTRY_FIELDS
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_named("id")?,
            title: row.get_named("title")?,
            section_id: row.get_named("section_id")?,
        })
    }

    fn primary_key_value(&self) -> Vec<Value> {
        vec![Value::BigInt(self.id)]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Tag {
    pub id: i64,
    pub name: String,
}

impl Model for Tag {
    const TABLE_NAME: &'static str = "tag";
    const PRIMARY_KEY: &'static [&'static str] = &["id"];

    fn fields() -> &'static [FieldInfo] {
        NAMED_FIELDS
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_named("id")?,
            name: row.get_named("name")?,
        })
    }

    fn primary_key_value(&self) -> Vec<Value> {
        vec![Value::BigInt(self.id)]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Section {
    pub id: i64,
    pub name: String,
}

impl Model for Section {
    const TABLE_NAME: &'static str = "section";
    const PRIMARY_KEY: &'static [&'static str] = &["id"];

    fn fields() -> &'static [FieldInfo] {
        NAMED_FIELDS
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_named("id")?,
            name: row.get_named("name")?,
        })
    }

    fn primary_key_value(&self) -> Vec<Value> {
        vec![Value::BigInt(self.id)]
    }
}

pub(crate) fn schema() -> Schema {
    Schema::builder()
        .model::<Entry>()
        .model::<Tag>()
        .model::<Section>()
        .build()
        .unwrap()
}

pub(crate) fn entry_row(id: i64, title: &str) -> Row {
    Row::new(
        vec!["id".into(), "title".into(), "section_id".into()],
        vec![Value::BigInt(id), Value::Text(title.into()), Value::Null],
    )
}

/// A related row tagged with its owner under `tag`.
pub(crate) fn named_row(id: i64, name: &str, tag: &str, owner: impl Into<Value>) -> Row {
    Row::new(
        vec!["id".into(), "name".into(), tag.into()],
        vec![Value::BigInt(id), Value::Text(name.into()), owner.into()],
    )
}
