//! fts(3) tree walks.
//!
//! Roots are expanded on the way in. Entries coming back from `fts_read`
//! and `fts_children` get their `fts_path` pointed at a narrowed copy. fts
//! keeps building later paths in the buffer the original pointer names, so
//! the originals are put back before fts runs again on the same handle.
//! `fts_accpath` keeps naming the real file.

use super::with_prepared;
use crate::set_errno;
use crate::state::InceptionLayerGuard;
use libc::{c_char, c_int, c_long, c_ushort, c_void};
use std::ffi::{CStr, CString};
use std::sync::{Mutex, MutexGuard};
use vchroot_core::{Context, Facade};

type FtsCompar = Option<unsafe extern "C" fn(*const *const c_void, *const *const c_void) -> c_int>;
type FtsOpenFn = unsafe extern "C" fn(*const *mut c_char, c_int, FtsCompar) -> *mut c_void;
type FtsReadFn = unsafe extern "C" fn(*mut c_void) -> *mut c_void;
type FtsChildrenFn = unsafe extern "C" fn(*mut c_void, c_int) -> *mut c_void;
type FtsCloseFn = unsafe extern "C" fn(*mut c_void) -> c_int;

/// Leading fields of glibc's `FTSENT`; `FTSENT64` shares them.
#[repr(C)]
#[allow(dead_code)]
struct FtsEntHead {
    fts_cycle: *mut FtsEntHead,
    fts_parent: *mut FtsEntHead,
    fts_link: *mut FtsEntHead,
    fts_number: c_long,
    fts_pointer: *mut c_void,
    fts_accpath: *mut c_char,
    fts_path: *mut c_char,
    fts_errno: c_int,
    fts_symfd: c_int,
    fts_pathlen: c_ushort,
}

/// An entry whose `fts_path` currently points at `narrowed`.
struct Swapped {
    entry: *mut FtsEntHead,
    path: *mut c_char,
    pathlen: c_ushort,
    _narrowed: CString,
}

struct Handle {
    fts: usize,
    swapped: Vec<Swapped>,
}

// Entries belong to their FTS handle and are only touched from calls on it.
unsafe impl Send for Handle {}

static HANDLES: Mutex<Vec<Handle>> = Mutex::new(Vec::new());

fn handles() -> MutexGuard<'static, Vec<Handle>> {
    HANDLES.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Put back every `fts_path` swapped on `fts`.
unsafe fn restore(fts: *mut c_void) {
    let mut handles = handles();
    let Some(pos) = handles.iter().position(|h| h.fts == fts as usize) else {
        return;
    };
    let handle = handles.swap_remove(pos);
    for swapped in &handle.swapped {
        (*swapped.entry).fts_path = swapped.path;
        (*swapped.entry).fts_pathlen = swapped.pathlen;
    }
}

/// Drop what is kept for `fts` without touching entries about to be freed.
fn forget(fts: *mut c_void) {
    handles().retain(|h| h.fts != fts as usize);
}

/// Narrow `entry` and, with `siblings`, every entry linked after it.
unsafe fn narrow_entries(
    facade: &Facade<'_>,
    fts: *mut c_void,
    mut entry: *mut FtsEntHead,
    siblings: bool,
) {
    let mut swapped = Vec::new();
    while !entry.is_null() {
        let path = (*entry).fts_path;
        let pathlen = (*entry).fts_pathlen;
        if !path.is_null() {
            if let Some((narrowed, len)) = facade.narrow_fts_path(CStr::from_ptr(path), pathlen) {
                (*entry).fts_path = narrowed.as_ptr() as *mut c_char;
                (*entry).fts_pathlen = len;
                swapped.push(Swapped {
                    entry,
                    path,
                    pathlen,
                    _narrowed: narrowed,
                });
            }
        }
        if !siblings {
            break;
        }
        entry = (*entry).fts_link;
    }
    if !swapped.is_empty() {
        handles().push(Handle {
            fts: fts as usize,
            swapped,
        });
    }
}

/// Every root path in the NULL-terminated `argv` is expanded; the FTS
/// handle keeps its own copies, so the translated array only lives for the
/// call.
unsafe fn open_with(
    real: FtsOpenFn,
    argv: *const *mut c_char,
    options: c_int,
    compar: FtsCompar,
) -> *mut c_void {
    if argv.is_null() {
        return real(argv, options, compar);
    }
    let Some(guard) = InceptionLayerGuard::enter() else {
        return real(argv, options, compar);
    };

    let translator = Context::global().translator();
    let mut expanded: Vec<CString> = Vec::new();
    let mut i = 0;
    while !(*argv.add(i)).is_null() {
        match translator.expand_cstr(CStr::from_ptr(*argv.add(i))) {
            Ok(path) => expanded.push(path.into_owned()),
            Err(e) => {
                set_errno(e.errno());
                return std::ptr::null_mut();
            }
        }
        i += 1;
    }
    drop(guard);

    let mut ptrs: Vec<*mut c_char> = expanded
        .iter()
        .map(|p| p.as_ptr() as *mut c_char)
        .collect();
    ptrs.push(std::ptr::null_mut());
    real(ptrs.as_ptr(), options, compar)
}

unsafe fn read_with(name: &'static str, real: FtsReadFn, fts: *mut c_void) -> *mut c_void {
    restore(fts);
    with_prepared(name, [], |facade, _| {
        let entry = real(fts);
        if let Some(facade) = facade {
            narrow_entries(facade, fts, entry as *mut FtsEntHead, false);
        }
        entry
    })
}

unsafe fn children_with(
    name: &'static str,
    real: FtsChildrenFn,
    fts: *mut c_void,
    options: c_int,
) -> *mut c_void {
    restore(fts);
    with_prepared(name, [], |facade, _| {
        let first = real(fts, options);
        if let Some(facade) = facade {
            narrow_entries(facade, fts, first as *mut FtsEntHead, true);
        }
        first
    })
}

#[no_mangle]
pub unsafe extern "C" fn fts_open(
    argv: *const *mut c_char,
    options: c_int,
    compar: FtsCompar,
) -> *mut c_void {
    open_with(real!(fts_open as FtsOpenFn), argv, options, compar)
}

#[no_mangle]
pub unsafe extern "C" fn fts64_open(
    argv: *const *mut c_char,
    options: c_int,
    compar: FtsCompar,
) -> *mut c_void {
    open_with(real!(fts64_open as FtsOpenFn), argv, options, compar)
}

#[no_mangle]
pub unsafe extern "C" fn fts_read(fts: *mut c_void) -> *mut c_void {
    read_with("fts_read", real!(fts_read as FtsReadFn), fts)
}

#[no_mangle]
pub unsafe extern "C" fn fts64_read(fts: *mut c_void) -> *mut c_void {
    read_with("fts64_read", real!(fts64_read as FtsReadFn), fts)
}

#[no_mangle]
pub unsafe extern "C" fn fts_children(fts: *mut c_void, options: c_int) -> *mut c_void {
    children_with("fts_children", real!(fts_children as FtsChildrenFn), fts, options)
}

#[no_mangle]
pub unsafe extern "C" fn fts64_children(fts: *mut c_void, options: c_int) -> *mut c_void {
    children_with("fts64_children", real!(fts64_children as FtsChildrenFn), fts, options)
}

#[no_mangle]
pub unsafe extern "C" fn fts_close(fts: *mut c_void) -> c_int {
    let real = real!(fts_close as FtsCloseFn);
    forget(fts);
    real(fts)
}

#[no_mangle]
pub unsafe extern "C" fn fts64_close(fts: *mut c_void) -> c_int {
    let real = real!(fts64_close as FtsCloseFn);
    forget(fts);
    real(fts)
}
