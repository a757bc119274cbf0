//! SQLite connection for the batch relationship loader.
//!
// FFI calls into libsqlite3 need unsafe code.
#![allow(unsafe_code)]
//!
//! [`SqliteConnection`] implements the synchronous `Connection` trait over
//! a single SQLite handle guarded by a mutex.
//!
//! ```rust,ignore
//! use batch_select_sqlite::SqliteConnection;
//!
//! let conn = SqliteConnection::open_memory()?;
//! conn.execute_raw("CREATE TABLE tag (id INTEGER PRIMARY KEY, name TEXT)")?;
//! ```
//!
//! # Type Mapping
//!
//! | Value | SQLite |
//! |-------|--------|
//! | `Bool` | INTEGER (0/1) |
//! | `Int`, `BigInt` | INTEGER |
//! | `Double` | REAL |
//! | `Text` | TEXT |
//! | `Bytes` | BLOB |
//! | `Json` | TEXT |
//!
//! Integers are read back as `Int` when they fit in 32 bits, else `BigInt`.

pub mod connection;
mod statement;

pub use connection::{OpenFlags, SqliteConfig, SqliteConnection};

/// Version string of the linked SQLite library.
pub fn sqlite_version() -> String {
    // SAFETY: sqlite3_libversion returns a static NUL-terminated string.
    unsafe { std::ffi::CStr::from_ptr(libsqlite3_sys::sqlite3_libversion()) }
        .to_string_lossy()
        .into_owned()
}
