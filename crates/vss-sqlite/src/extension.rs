//! Registering the engine on a connection

use std::ffi::{c_char, c_void, CStr, CString};
use std::os::raw::c_int;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::OnceLock;

use rusqlite::ffi;
use rusqlite::vtab::{update_module_with_tx, Module};
use rusqlite::Connection;
use vss_core::{Result, VssConfig, VssError};

use crate::functions::{register_functions, unregister_functions};
use crate::fvecs::{register_fvecs_each, FVECS_EACH_NAME};
use crate::plan::{RANGE_SEARCH_FUNCTION_OP, SEARCH_FUNCTION_OP};
use crate::shadow::SHADOW_SUFFIXES;
use crate::vtab::VssTab;

/// Register the scalar functions, `vector_fvecs_each` and the `vss0` module
/// with default settings.
///
/// # Example
///
/// ```no_run
/// use rusqlite::Connection;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let conn = Connection::open_in_memory()?;
/// vss_sqlite::register(&conn)?;
/// conn.execute_batch("create virtual table items using vss0(embedding(384))")?;
/// # Ok(())
/// # }
/// ```
pub fn register(conn: &Connection) -> Result<()> {
    register_with_config(conn, VssConfig::default())
}

/// Register everything, handing `config` to the virtual table module.
pub fn register_with_config(conn: &Connection, config: VssConfig) -> Result<()> {
    if config.module_name.is_empty() {
        return Err(VssError::Config("module name must not be empty".to_string()));
    }
    register_functions(conn)?;
    register_fvecs_each(conn)?;

    let module_name = config.module_name.clone();
    conn.create_module(module_name.as_str(), vss_module(), Some(config))?;

    tracing::info!(module = %module_name, "Registered vss extension");
    Ok(())
}

/// Remove the functions and modules installed by [`register_with_config`].
///
/// Tables already connected keep working until the connection closes them.
pub fn unregister(conn: &Connection, module_name: &str) -> Result<()> {
    unregister_functions(conn)?;
    for name in [module_name, FVECS_EACH_NAME] {
        drop_module(conn, name)?;
    }
    tracing::info!(module = %module_name, "Unregistered vss extension");
    Ok(())
}

fn drop_module(conn: &Connection, name: &str) -> Result<()> {
    let name = CString::new(name)
        .map_err(|_| VssError::Config(format!("invalid module name {name:?}")))?;
    // A NULL module removes the registration.
    let rc = unsafe {
        ffi::sqlite3_create_module_v2(
            conn.handle(),
            name.as_ptr(),
            std::ptr::null(),
            std::ptr::null_mut(),
            None,
        )
    };
    if rc != ffi::SQLITE_OK {
        return Err(VssError::Sqlite(rusqlite::Error::SqliteFailure(
            ffi::Error::new(rc),
            None,
        )));
    }
    Ok(())
}

static MODULE: OnceLock<ffi::sqlite3_module> = OnceLock::new();

/// The rusqlite-generated module with the hooks rusqlite does not expose:
/// function overloading, shadow table names and savepoints.
fn vss_module() -> &'static Module<'static, VssTab> {
    let module = MODULE.get_or_init(|| {
        let base: &'static Module<'static, VssTab> = update_module_with_tx::<VssTab>();
        // `Module` is a transparent wrapper around `sqlite3_module`.
        let mut module =
            unsafe { *(base as *const Module<'static, VssTab> as *const ffi::sqlite3_module) };
        module.iVersion = 3;
        module.xFindFunction = Some(find_function);
        module.xSavepoint = Some(savepoint);
        module.xRelease = Some(release);
        module.xRollbackTo = Some(rollback_to);
        module.xShadowName = Some(shadow_name);
        module
    });
    unsafe { &*(module as *const ffi::sqlite3_module as *const Module<'static, VssTab>) }
}

type SqlFunction =
    unsafe extern "C" fn(*mut ffi::sqlite3_context, c_int, *mut *mut ffi::sqlite3_value);

/// Stand-in implementation for overloaded search functions. The table omits
/// the constraint, so it only runs if SQLite evaluates the call anyway.
unsafe extern "C" fn matches_all(
    ctx: *mut ffi::sqlite3_context,
    _argc: c_int,
    _argv: *mut *mut ffi::sqlite3_value,
) {
    ffi::sqlite3_result_int(ctx, 1);
}

unsafe extern "C" fn find_function(
    _vtab: *mut ffi::sqlite3_vtab,
    n_arg: c_int,
    name: *const c_char,
    px_func: *mut Option<SqlFunction>,
    pp_arg: *mut *mut c_void,
) -> c_int {
    if name.is_null() || n_arg != 2 {
        return 0;
    }
    let name = CStr::from_ptr(name).to_bytes();
    let op = if name.eq_ignore_ascii_case(b"vss_search") {
        SEARCH_FUNCTION_OP
    } else if name.eq_ignore_ascii_case(b"vss_range_search") {
        RANGE_SEARCH_FUNCTION_OP
    } else {
        return 0;
    };
    *px_func = Some(matches_all);
    *pp_arg = std::ptr::null_mut();
    c_int::from(op)
}

unsafe extern "C" fn shadow_name(name: *const c_char) -> c_int {
    if name.is_null() {
        return 0;
    }
    let name = CStr::from_ptr(name).to_bytes();
    c_int::from(SHADOW_SUFFIXES
        .iter()
        .any(|s| s.as_bytes().eq_ignore_ascii_case(name)))
}

unsafe fn with_table(vtab: *mut ffi::sqlite3_vtab, f: impl FnOnce(&VssTab)) -> c_int {
    if vtab.is_null() {
        return ffi::SQLITE_MISUSE;
    }
    let table = &*(vtab as *const VssTab);
    match catch_unwind(AssertUnwindSafe(|| f(table))) {
        Ok(()) => ffi::SQLITE_OK,
        Err(_) => ffi::SQLITE_ERROR,
    }
}

unsafe extern "C" fn savepoint(vtab: *mut ffi::sqlite3_vtab, level: c_int) -> c_int {
    with_table(vtab, |table| table.savepoint(level))
}

unsafe extern "C" fn release(vtab: *mut ffi::sqlite3_vtab, level: c_int) -> c_int {
    with_table(vtab, |table| table.release(level))
}

unsafe extern "C" fn rollback_to(vtab: *mut ffi::sqlite3_vtab, level: c_int) -> c_int {
    with_table(vtab, |table| table.rollback_to(level))
}
