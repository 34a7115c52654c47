//! SQLite-backed implementation of the `Engine`/`PreparedStatement`
//! traits, used by this crate's own test suite and available to any
//! embedder that wants a working default.
//!
//! FFI marshalling follows the usual raw-pointer-plus-null-check idiom:
//! every handle is a non-null raw pointer owned exclusively by its
//! wrapper, every string crossing the boundary goes through `CString`/
//! `CStr`, and every call result is checked before the pointer is used
//! again.

use std::ffi::{CStr, CString};
use std::os::raw::c_int;
use std::ptr;

use libsqlite3_sys as ffi;

use crate::engine::{ColumnValue, Engine, PreparedStatement, StepOutcome};
use crate::error::{Error, ErrorKind, Result};

/// An open SQLite database handle.
pub struct SqliteEngine {
    db: *mut ffi::sqlite3,
}

// The handle is moved, never shared, across threads by this crate's own
// concurrency model (one handler per connection); SQLite itself is safe
// to hand off between threads as long as it isn't used concurrently.
unsafe impl Send for SqliteEngine {}

impl SqliteEngine {
    /// Open a database at `path` (`:memory:` for an in-memory instance).
    pub fn open(path: &str) -> Result<Self> {
        let c_path = CString::new(path)
            .map_err(|_| Error::new(ErrorKind::Error, "database path contains a NUL byte"))?;
        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        let rc = unsafe { ffi::sqlite3_open(c_path.as_ptr(), &mut db) };
        if rc != ffi::SQLITE_OK {
            let msg = last_error(db);
            unsafe { ffi::sqlite3_close(db) };
            return Err(Error::new(ErrorKind::Error, msg));
        }
        Ok(Self { db })
    }
}

impl Drop for SqliteEngine {
    fn drop(&mut self) {
        unsafe {
            ffi::sqlite3_close(self.db);
        }
    }
}

impl Engine for SqliteEngine {
    type Statement = SqliteStatement;

    fn prepare<'a>(&self, sql: &'a str) -> Result<(Self::Statement, &'a str)> {
        let c_sql = CString::new(sql)
            .map_err(|_| Error::new(ErrorKind::Error, "sql text contains a NUL byte"))?;
        let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();
        let mut tail: *const std::os::raw::c_char = ptr::null();
        let rc = unsafe {
            ffi::sqlite3_prepare_v2(
                self.db,
                c_sql.as_ptr(),
                -1,
                &mut stmt,
                &mut tail,
            )
        };
        if rc != ffi::SQLITE_OK {
            return Err(Error::new(ErrorKind::Error, last_error(self.db)));
        }
        let consumed = unsafe { tail.offset_from(c_sql.as_ptr()) } as usize;
        let remaining = sql.get(consumed.min(sql.len())..).unwrap_or("").trim_start();
        let column_names = {
            let count = unsafe { ffi::sqlite3_column_count(stmt) } as usize;
            (0..count)
                .map(|i| unsafe { cstr_to_string(ffi::sqlite3_column_name(stmt, i as c_int)) })
                .collect()
        };
        let column_decltypes = {
            let count = unsafe { ffi::sqlite3_column_count(stmt) } as usize;
            (0..count)
                .map(|i| unsafe {
                    let p = ffi::sqlite3_column_decltype(stmt, i as c_int);
                    if p.is_null() {
                        None
                    } else {
                        Some(cstr_to_string(p))
                    }
                })
                .collect()
        };
        Ok((
            SqliteStatement {
                stmt,
                db: self.db,
                column_names,
                column_decltypes,
            },
            remaining,
        ))
    }
}

/// A prepared SQLite statement. Column metadata is captured once at
/// prepare time so accessors can return borrowed `&str`s without holding
/// the FFI call alive.
pub struct SqliteStatement {
    stmt: *mut ffi::sqlite3_stmt,
    db: *mut ffi::sqlite3,
    column_names: Vec<String>,
    column_decltypes: Vec<Option<String>>,
}

unsafe impl Send for SqliteStatement {}

impl Drop for SqliteStatement {
    fn drop(&mut self) {
        unsafe {
            ffi::sqlite3_finalize(self.stmt);
        }
    }
}

impl SqliteStatement {
    fn check(&self, rc: c_int) -> Result<()> {
        if rc == ffi::SQLITE_OK {
            Ok(())
        } else if rc == ffi::SQLITE_RANGE {
            Err(Error::new(ErrorKind::Range, "column index out of range"))
        } else {
            Err(Error::new(ErrorKind::Error, last_error(self.db)))
        }
    }
}

impl PreparedStatement for SqliteStatement {
    fn bind_null(&mut self, index: usize) -> Result<()> {
        let rc = unsafe { ffi::sqlite3_bind_null(self.stmt, index as c_int) };
        self.check(rc)
    }

    fn bind_int64(&mut self, index: usize, value: i64) -> Result<()> {
        let rc = unsafe { ffi::sqlite3_bind_int64(self.stmt, index as c_int, value) };
        self.check(rc)
    }

    fn bind_float64(&mut self, index: usize, value: f64) -> Result<()> {
        let rc = unsafe { ffi::sqlite3_bind_double(self.stmt, index as c_int, value) };
        self.check(rc)
    }

    fn bind_text(&mut self, index: usize, value: &str) -> Result<()> {
        let rc = unsafe {
            ffi::sqlite3_bind_text(
                self.stmt,
                index as c_int,
                value.as_ptr() as *const std::os::raw::c_char,
                value.len() as c_int,
                ffi::SQLITE_TRANSIENT(),
            )
        };
        self.check(rc)
    }

    fn bind_blob(&mut self, index: usize, value: &[u8]) -> Result<()> {
        let rc = unsafe {
            ffi::sqlite3_bind_blob(
                self.stmt,
                index as c_int,
                value.as_ptr() as *const std::os::raw::c_void,
                value.len() as c_int,
                ffi::SQLITE_TRANSIENT(),
            )
        };
        self.check(rc)
    }

    fn step(&mut self) -> Result<StepOutcome> {
        let rc = unsafe { ffi::sqlite3_step(self.stmt) };
        match rc {
            ffi::SQLITE_ROW => Ok(StepOutcome::Row),
            ffi::SQLITE_DONE => Ok(StepOutcome::Done),
            _ => Err(Error::new(ErrorKind::Error, last_error(self.db))),
        }
    }

    fn column_count(&self) -> usize {
        self.column_names.len()
    }

    fn column_name(&self, index: usize) -> &str {
        &self.column_names[index]
    }

    fn column_decltype(&self, index: usize) -> Option<&str> {
        self.column_decltypes[index].as_deref()
    }

    fn column_value(&self, index: usize) -> ColumnValue {
        let idx = index as c_int;
        let col_type = unsafe { ffi::sqlite3_column_type(self.stmt, idx) };
        match col_type {
            ffi::SQLITE_NULL => ColumnValue::Null,
            ffi::SQLITE_INTEGER => {
                ColumnValue::Integer(unsafe { ffi::sqlite3_column_int64(self.stmt, idx) })
            }
            ffi::SQLITE_FLOAT => {
                ColumnValue::Float(unsafe { ffi::sqlite3_column_double(self.stmt, idx) })
            }
            ffi::SQLITE_TEXT => {
                let ptr = unsafe { ffi::sqlite3_column_text(self.stmt, idx) };
                let len = unsafe { ffi::sqlite3_column_bytes(self.stmt, idx) } as usize;
                let bytes =
                    unsafe { std::slice::from_raw_parts(ptr as *const u8, len) };
                ColumnValue::Text(String::from_utf8_lossy(bytes).into_owned())
            }
            ffi::SQLITE_BLOB => {
                let ptr = unsafe { ffi::sqlite3_column_blob(self.stmt, idx) };
                let len = unsafe { ffi::sqlite3_column_bytes(self.stmt, idx) } as usize;
                if ptr.is_null() || len == 0 {
                    ColumnValue::Blob(Vec::new())
                } else {
                    let bytes = unsafe { std::slice::from_raw_parts(ptr as *const u8, len) };
                    ColumnValue::Blob(bytes.to_vec())
                }
            }
            _ => ColumnValue::Null,
        }
    }
}

fn last_error(db: *mut ffi::sqlite3) -> String {
    if db.is_null() {
        return "sqlite error".to_string();
    }
    unsafe { cstr_to_string(ffi::sqlite3_errmsg(db)) }
}

unsafe fn cstr_to_string(ptr: *const std::os::raw::c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    unsafe { CStr::from_ptr(ptr).to_string_lossy().into_owned() }
}
