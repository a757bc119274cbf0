//! SQLite connection implementation.

use crate::statement::{Statement, error_kind, query_error};
use batch_select_core::error::{ConnectionError, ConnectionErrorKind, QueryErrorKind};
use batch_select_core::{Connection, Dialect, Error, Result, Row, Value};
use libsqlite3_sys as ffi;
use serde::{Deserialize, Serialize};
use std::ffi::{CStr, CString, c_char, c_int};
use std::ptr;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// How to open a database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// File path, or `:memory:`
    pub path: String,
    pub flags: OpenFlags,
    /// Milliseconds to wait on a locked database; 0 disables waiting
    pub busy_timeout_ms: u32,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self::memory()
    }
}

impl SqliteConfig {
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            flags: OpenFlags::CreateReadWrite,
            busy_timeout_ms: 5000,
        }
    }

    pub fn memory() -> Self {
        Self::file(":memory:")
    }

    #[must_use]
    pub fn flags(mut self, flags: OpenFlags) -> Self {
        self.flags = flags;
        self
    }

    #[must_use]
    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }
}

/// Access mode for [`SqliteConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenFlags {
    ReadOnly,
    ReadWrite,
    #[default]
    CreateReadWrite,
}

impl OpenFlags {
    fn to_sqlite(self) -> c_int {
        let mode = match self {
            OpenFlags::ReadOnly => ffi::SQLITE_OPEN_READONLY,
            OpenFlags::ReadWrite => ffi::SQLITE_OPEN_READWRITE,
            OpenFlags::CreateReadWrite => ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE,
        };
        mode | ffi::SQLITE_OPEN_URI
    }
}

struct Handle(*mut ffi::sqlite3);

// SAFETY: the handle is only touched while holding the connection's mutex.
unsafe impl Send for Handle {}

impl Drop for Handle {
    fn drop(&mut self) {
        // SAFETY: the handle was opened by sqlite3_open_v2 and is closed once.
        unsafe {
            ffi::sqlite3_close(self.0);
        }
    }
}

/// A connection to one SQLite database.
///
/// Statements are serialized through an internal mutex, so the connection
/// is `Send + Sync` and may be shared by reference.
pub struct SqliteConnection {
    handle: Mutex<Handle>,
    path: String,
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteConnection {
    /// Open a database with `config`.
    #[allow(clippy::result_large_err)]
    pub fn open(config: &SqliteConfig) -> Result<Self> {
        let c_path = CString::new(config.path.as_str())
            .map_err(|_| connect_error("invalid path: contains a NUL byte".to_string()))?;

        let mut db = ptr::null_mut();
        // SAFETY: c_path and db are valid for the call.
        let rc = unsafe {
            ffi::sqlite3_open_v2(c_path.as_ptr(), &mut db, config.flags.to_sqlite(), ptr::null())
        };
        // sqlite3_open_v2 may hand back a handle even on failure; it still has to be closed.
        let handle = (!db.is_null()).then(|| Handle(db));

        if rc != ffi::SQLITE_OK {
            let message = match &handle {
                // SAFETY: the handle is open; errmsg is NUL-terminated.
                Some(h) => unsafe { CStr::from_ptr(ffi::sqlite3_errmsg(h.0)) }
                    .to_string_lossy()
                    .into_owned(),
                None => error_string(rc),
            };
            return Err(connect_error(format!("failed to open '{}': {message}", config.path)));
        }
        let handle = handle.ok_or_else(|| connect_error("SQLite returned no handle".to_string()))?;

        if config.busy_timeout_ms > 0 {
            let ms = c_int::try_from(config.busy_timeout_ms).unwrap_or(c_int::MAX);
            // SAFETY: the handle is open.
            unsafe {
                ffi::sqlite3_busy_timeout(handle.0, ms);
            }
        }

        tracing::debug!(path = %config.path, flags = ?config.flags, "Opened SQLite database");
        Ok(Self {
            handle: Mutex::new(handle),
            path: config.path.clone(),
        })
    }

    /// Open a private in-memory database.
    #[allow(clippy::result_large_err)]
    pub fn open_memory() -> Result<Self> {
        Self::open(&SqliteConfig::memory())
    }

    #[allow(clippy::result_large_err)]
    pub fn open_file(path: impl Into<String>) -> Result<Self> {
        Self::open(&SqliteConfig::file(path))
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, Handle> {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one or more `;`-separated statements without parameters.
    #[allow(clippy::result_large_err)]
    pub fn execute_raw(&self, sql: &str) -> Result<()> {
        let handle = self.lock();
        let c_sql = CString::new(sql).map_err(|_| {
            query_error(QueryErrorKind::Syntax, sql, "SQL contains a NUL byte".to_string())
        })?;

        let mut errmsg: *mut c_char = ptr::null_mut();
        // SAFETY: the handle is open; all pointers are valid for the call.
        let rc = unsafe { ffi::sqlite3_exec(handle.0, c_sql.as_ptr(), None, ptr::null_mut(), &mut errmsg) };
        if rc == ffi::SQLITE_OK {
            return Ok(());
        }

        let message = if errmsg.is_null() {
            error_string(rc)
        } else {
            // SAFETY: errmsg was allocated by SQLite and is freed once here.
            unsafe {
                let message = CStr::from_ptr(errmsg).to_string_lossy().into_owned();
                ffi::sqlite3_free(errmsg.cast());
                message
            }
        };
        Err(query_error(error_kind(rc), sql, message))
    }

    /// Rowid of the most recent successful INSERT.
    pub fn last_insert_rowid(&self) -> i64 {
        let handle = self.lock();
        // SAFETY: the handle is open.
        unsafe { ffi::sqlite3_last_insert_rowid(handle.0) }
    }
}

impl Connection for SqliteConnection {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let handle = self.lock();
        let mut stmt = Statement::prepare(handle.0, sql)?;
        stmt.bind_all(params)?;
        let rows = stmt.rows()?;
        tracing::trace!(sql = %sql, rows = rows.len(), "SQLite query");
        Ok(rows)
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        let handle = self.lock();
        let mut stmt = Statement::prepare(handle.0, sql)?;
        stmt.bind_all(params)?;
        let changed = stmt.run()?;
        tracing::trace!(sql = %sql, changed = changed, "SQLite execute");
        Ok(changed)
    }
}

fn connect_error(message: String) -> Error {
    Error::Connection(ConnectionError {
        kind: ConnectionErrorKind::Connect,
        message,
        source: None,
    })
}

fn error_string(code: c_int) -> String {
    // SAFETY: sqlite3_errstr returns a static NUL-terminated string.
    unsafe { CStr::from_ptr(ffi::sqlite3_errstr(code)) }
        .to_string_lossy()
        .into_owned()
}
