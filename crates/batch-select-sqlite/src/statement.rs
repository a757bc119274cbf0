//! Prepared statements: binding, stepping and reading columns.

use batch_select_core::error::{QueryError, QueryErrorKind};
use batch_select_core::{ColumnInfo, Error, Result, Row, Value};
use libsqlite3_sys as ffi;
use std::ffi::{CStr, CString, c_int};
use std::ptr;
use std::sync::Arc;

/// A prepared statement, finalized on drop.
pub(crate) struct Statement<'db> {
    db: *mut ffi::sqlite3,
    stmt: *mut ffi::sqlite3_stmt,
    sql: &'db str,
}

impl<'db> Statement<'db> {
    /// Prepare `sql` on `db`.
    ///
    /// `db` must be an open handle that outlives the statement.
    #[allow(clippy::result_large_err)]
    pub(crate) fn prepare(db: *mut ffi::sqlite3, sql: &'db str) -> Result<Self> {
        let c_sql = CString::new(sql).map_err(|_| {
            query_error(QueryErrorKind::Syntax, sql, "SQL contains a NUL byte".to_string())
        })?;
        let len = c_int::try_from(c_sql.as_bytes().len()).map_err(|_| {
            query_error(QueryErrorKind::Syntax, sql, "SQL is too long".to_string())
        })?;

        let mut stmt = ptr::null_mut();
        // SAFETY: db is open; c_sql and stmt are valid for the call.
        let rc = unsafe { ffi::sqlite3_prepare_v2(db, c_sql.as_ptr(), len, &mut stmt, ptr::null_mut()) };
        if rc != ffi::SQLITE_OK {
            return Err(last_error(db, sql));
        }
        Ok(Self { db, stmt, sql })
    }

    /// Bind `params` to placeholders 1..=n.
    #[allow(clippy::result_large_err)]
    pub(crate) fn bind_all(&mut self, params: &[Value]) -> Result<()> {
        for (i, value) in params.iter().enumerate() {
            let index = c_int::try_from(i + 1).map_err(|_| {
                query_error(QueryErrorKind::Database, self.sql, "too many parameters".to_string())
            })?;
            let rc = self.bind(index, value);
            if rc != ffi::SQLITE_OK {
                let err = last_error(self.db, self.sql);
                return Err(query_error(
                    QueryErrorKind::Database,
                    self.sql,
                    format!("failed to bind parameter {}: {err}", i + 1),
                ));
            }
        }
        Ok(())
    }

    fn bind(&mut self, index: c_int, value: &Value) -> c_int {
        // SAFETY: stmt is a live prepared statement and index is 1-based.
        // Text and blob contents are copied by SQLite (SQLITE_TRANSIENT).
        unsafe {
            match value {
                Value::Null => ffi::sqlite3_bind_null(self.stmt, index),
                Value::Bool(b) => ffi::sqlite3_bind_int(self.stmt, index, c_int::from(*b)),
                Value::Int(v) => ffi::sqlite3_bind_int(self.stmt, index, *v),
                Value::BigInt(v) => ffi::sqlite3_bind_int64(self.stmt, index, *v),
                Value::Double(v) => ffi::sqlite3_bind_double(self.stmt, index, *v),
                Value::Text(s) => self.bind_text(index, s),
                Value::Json(json) => self.bind_text(index, &json.to_string()),
                Value::Bytes(b) => match c_int::try_from(b.len()) {
                    Ok(len) => ffi::sqlite3_bind_blob(
                        self.stmt,
                        index,
                        b.as_ptr().cast(),
                        len,
                        ffi::SQLITE_TRANSIENT(),
                    ),
                    Err(_) => ffi::SQLITE_TOOBIG,
                },
            }
        }
    }

    fn bind_text(&mut self, index: c_int, text: &str) -> c_int {
        let Ok(len) = c_int::try_from(text.len()) else {
            return ffi::SQLITE_TOOBIG;
        };
        // SAFETY: see `bind`.
        unsafe {
            ffi::sqlite3_bind_text(
                self.stmt,
                index,
                text.as_ptr().cast(),
                len,
                ffi::SQLITE_TRANSIENT(),
            )
        }
    }

    fn column_names(&self) -> Vec<String> {
        // SAFETY: stmt is a live prepared statement.
        let count = unsafe { ffi::sqlite3_column_count(self.stmt) };
        (0..count)
            .map(|i| {
                // SAFETY: i is below the column count; the name is NUL-terminated.
                let name = unsafe { ffi::sqlite3_column_name(self.stmt, i) };
                if name.is_null() {
                    format!("col{i}")
                } else {
                    unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned()
                }
            })
            .collect()
    }

    /// Step to completion, collecting every row.
    #[allow(clippy::result_large_err)]
    pub(crate) fn rows(&mut self) -> Result<Vec<Row>> {
        let columns = Arc::new(ColumnInfo::new(self.column_names()));
        let width = c_int::try_from(columns.len()).unwrap_or(c_int::MAX);
        let mut rows = Vec::new();
        loop {
            // SAFETY: stmt is a live prepared statement.
            match unsafe { ffi::sqlite3_step(self.stmt) } {
                ffi::SQLITE_ROW => {
                    let values = (0..width).map(|i| self.read(i)).collect();
                    rows.push(Row::with_columns(Arc::clone(&columns), values));
                }
                ffi::SQLITE_DONE => return Ok(rows),
                _ => return Err(last_error(self.db, self.sql)),
            }
        }
    }

    /// Step to completion, discarding rows, and report changed rows.
    #[allow(clippy::result_large_err)]
    pub(crate) fn run(&mut self) -> Result<u64> {
        loop {
            // SAFETY: stmt is a live prepared statement.
            match unsafe { ffi::sqlite3_step(self.stmt) } {
                ffi::SQLITE_ROW => continue,
                ffi::SQLITE_DONE => break,
                _ => return Err(last_error(self.db, self.sql)),
            }
        }
        // SAFETY: db is open.
        let changes = unsafe { ffi::sqlite3_changes(self.db) };
        Ok(u64::try_from(changes).unwrap_or(0))
    }

    fn read(&self, index: c_int) -> Value {
        // SAFETY: the last step returned SQLITE_ROW and index is in range.
        // Text and blob pointers stay valid until the next step.
        unsafe {
            match ffi::sqlite3_column_type(self.stmt, index) {
                ffi::SQLITE_INTEGER => {
                    let v = ffi::sqlite3_column_int64(self.stmt, index);
                    i32::try_from(v).map_or(Value::BigInt(v), Value::Int)
                }
                ffi::SQLITE_FLOAT => Value::Double(ffi::sqlite3_column_double(self.stmt, index)),
                ffi::SQLITE_TEXT => {
                    let text = ffi::sqlite3_column_text(self.stmt, index);
                    let len = ffi::sqlite3_column_bytes(self.stmt, index);
                    if text.is_null() {
                        Value::Null
                    } else {
                        let bytes =
                            std::slice::from_raw_parts(text, usize::try_from(len).unwrap_or(0));
                        Value::Text(String::from_utf8_lossy(bytes).into_owned())
                    }
                }
                ffi::SQLITE_BLOB => {
                    let blob = ffi::sqlite3_column_blob(self.stmt, index);
                    let len = usize::try_from(ffi::sqlite3_column_bytes(self.stmt, index)).unwrap_or(0);
                    if blob.is_null() || len == 0 {
                        Value::Bytes(Vec::new())
                    } else {
                        Value::Bytes(std::slice::from_raw_parts(blob.cast::<u8>(), len).to_vec())
                    }
                }
                _ => Value::Null,
            }
        }
    }
}

impl Drop for Statement<'_> {
    fn drop(&mut self) {
        // SAFETY: stmt came from sqlite3_prepare_v2 and is finalized once.
        unsafe {
            ffi::sqlite3_finalize(self.stmt);
        }
    }
}

pub(crate) fn query_error(kind: QueryErrorKind, sql: &str, message: String) -> Error {
    Error::Query(QueryError {
        kind,
        sql: Some(sql.to_string()),
        message,
        source: None,
    })
}

/// The handle's most recent error, as a query error for `sql`.
pub(crate) fn last_error(db: *mut ffi::sqlite3, sql: &str) -> Error {
    // SAFETY: db is open; errmsg returns a NUL-terminated string owned by SQLite.
    let (code, message) = unsafe {
        (
            ffi::sqlite3_errcode(db),
            CStr::from_ptr(ffi::sqlite3_errmsg(db))
                .to_string_lossy()
                .into_owned(),
        )
    };
    query_error(error_kind(code), sql, message)
}

pub(crate) fn error_kind(code: c_int) -> QueryErrorKind {
    match code & 0xff {
        ffi::SQLITE_CONSTRAINT => QueryErrorKind::Constraint,
        ffi::SQLITE_BUSY | ffi::SQLITE_LOCKED => QueryErrorKind::Busy,
        ffi::SQLITE_NOTFOUND => QueryErrorKind::NotFound,
        _ => QueryErrorKind::Database,
    }
}
