//! Real Symbol Storage
//!
//! Addresses of the real implementations, taken from the core registry once
//! the process context exists. Calls arriving during library init, before the
//! context is built, look the name up directly without caching.

use libc::c_void;
use std::ffi::CStr;
use vchroot_core::resolver::{fatal, NextInScope, SymbolSource};
use vchroot_core::{Context, ResolveError};

/// Address of the real `name`. `name` carries a trailing NUL; the process
/// aborts when the symbol does not exist.
pub(crate) fn lookup(name: &'static str) -> *mut c_void {
    let bare = name.trim_end_matches('\0');
    if let Some(ctx) = Context::get() {
        return ctx.symbols.resolve_or_abort(bare).as_ptr();
    }

    let missing = || ResolveError::Missing {
        name: bare.to_string(),
    };
    let Ok(cname) = CStr::from_bytes_with_nul(name.as_bytes()) else {
        fatal(&missing())
    };
    match NextInScope.lookup(cname) {
        Some(p) => p.as_ptr(),
        None => fatal(&missing()),
    }
}
