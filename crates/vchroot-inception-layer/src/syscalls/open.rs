//! The open family.
//!
//! On Linux the optional `mode` of `open` and friends arrives in the third
//! argument register whether or not the caller passed one, so the exports
//! take it as a fixed parameter. It is only forwarded when the flags ask
//! for it.

use super::with_paths;
use libc::{c_char, c_int, c_uint, mode_t, FILE};
use vchroot_core::{signature, PathArg};

type OpenFn = unsafe extern "C" fn(*const c_char, c_int, ...) -> c_int;
type OpenatFn = unsafe extern "C" fn(c_int, *const c_char, c_int, ...) -> c_int;
type FopenFn = unsafe extern "C" fn(*const c_char, *const c_char) -> *mut FILE;
type FreopenFn = unsafe extern "C" fn(*const c_char, *const c_char, *mut FILE) -> *mut FILE;

/// The mode to pass on: whatever sits in the mode slot is garbage unless
/// `flags` create something.
fn effective_mode(name: &str, flags: c_int, mode: mode_t) -> mode_t {
    match signature(name) {
        Some(sig) if sig.shape.takes_mode(flags) => mode,
        _ => 0,
    }
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn open(path: *const c_char, flags: c_int, mode: mode_t) -> c_int {
    open_path("open", real!(open as OpenFn), path, flags, mode)
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn open64(path: *const c_char, flags: c_int, mode: mode_t) -> c_int {
    open_path("open64", real!(open64 as OpenFn), path, flags, mode)
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn __open(path: *const c_char, flags: c_int, mode: mode_t) -> c_int {
    open_path("__open", real!(__open as OpenFn), path, flags, mode)
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn __open64(path: *const c_char, flags: c_int, mode: mode_t) -> c_int {
    open_path("__open64", real!(__open64 as OpenFn), path, flags, mode)
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn openat(
    dirfd: c_int,
    path: *const c_char,
    flags: c_int,
    mode: mode_t,
) -> c_int {
    open_at("openat", real!(openat as OpenatFn), dirfd, path, flags, mode)
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn openat64(
    dirfd: c_int,
    path: *const c_char,
    flags: c_int,
    mode: mode_t,
) -> c_int {
    open_at("openat64", real!(openat64 as OpenatFn), dirfd, path, flags, mode)
}

unsafe fn open_path(
    name: &'static str,
    real: OpenFn,
    path: *const c_char,
    flags: c_int,
    mode: mode_t,
) -> c_int {
    let mode = effective_mode(name, flags, mode);
    with_paths(name, [PathArg::path(path)], |[path]| {
        real(path, flags, mode as c_uint)
    })
}

unsafe fn open_at(
    name: &'static str,
    real: OpenatFn,
    dirfd: c_int,
    path: *const c_char,
    flags: c_int,
    mode: mode_t,
) -> c_int {
    let mode = effective_mode(name, flags, mode);
    with_paths(name, [PathArg::at(dirfd, path)], |[path]| {
        real(dirfd, path, flags, mode as c_uint)
    })
}

// Fortified callers land here when no mode is needed.
path_call!(fn __open_2(path: *const c_char, flags: c_int) -> c_int; paths = [path]);
path_call!(fn __open64_2(path: *const c_char, flags: c_int) -> c_int; paths = [path]);

path_call!(fn creat(path: *const c_char, mode: mode_t) -> c_int; paths = [path]);
path_call!(fn creat64(path: *const c_char, mode: mode_t) -> c_int; paths = [path]);

#[no_mangle]
pub unsafe extern "C" fn fopen(path: *const c_char, mode: *const c_char) -> *mut FILE {
    let real = real!(fopen as FopenFn);
    with_paths("fopen", [PathArg::path(path)], |[path]| real(path, mode))
}

#[no_mangle]
pub unsafe extern "C" fn fopen64(path: *const c_char, mode: *const c_char) -> *mut FILE {
    let real = real!(fopen64 as FopenFn);
    with_paths("fopen64", [PathArg::path(path)], |[path]| real(path, mode))
}

/// A NULL path reopens the stream's own file and needs no translation.
#[no_mangle]
pub unsafe extern "C" fn freopen(
    path: *const c_char,
    mode: *const c_char,
    stream: *mut FILE,
) -> *mut FILE {
    let real = real!(freopen as FreopenFn);
    with_paths("freopen", [PathArg::path(path)], |[path]| real(path, mode, stream))
}

#[no_mangle]
pub unsafe extern "C" fn freopen64(
    path: *const c_char,
    mode: *const c_char,
    stream: *mut FILE,
) -> *mut FILE {
    let real = real!(freopen64 as FreopenFn);
    with_paths("freopen64", [PathArg::path(path)], |[path]| real(path, mode, stream))
}
