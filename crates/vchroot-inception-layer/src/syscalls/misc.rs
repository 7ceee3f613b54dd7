//! Access checks, permissions, sizes, timestamps and extended attributes.
//! None of these return paths.

use super::with_paths;
use libc::{c_char, c_int, c_long, c_void, mode_t, off64_t, off_t, size_t, ssize_t, timespec, timeval, utimbuf};
use vchroot_core::PathArg;

path_call!(fn access(path: *const c_char, mode: c_int) -> c_int; paths = [path]);
path_call!(fn euidaccess(path: *const c_char, mode: c_int) -> c_int; paths = [path]);
path_call!(fn eaccess(path: *const c_char, mode: c_int) -> c_int; paths = [path]);
path_call!(fn acct(path: *const c_char) -> c_int; paths = [path]);
path_call!(fn chmod(path: *const c_char, mode: mode_t) -> c_int; paths = [path]);
path_call!(fn lchmod(path: *const c_char, mode: mode_t) -> c_int; paths = [path]);
path_call!(fn truncate(path: *const c_char, length: off_t) -> c_int; paths = [path]);
path_call!(fn truncate64(path: *const c_char, length: off64_t) -> c_int; paths = [path]);
path_call!(fn pathconf(path: *const c_char, name: c_int) -> c_long; paths = [path]);
path_call!(fn utime(path: *const c_char, times: *const utimbuf) -> c_int; paths = [path]);
path_call!(fn utimes(path: *const c_char, times: *const timeval) -> c_int; paths = [path]);
path_call!(fn lutimes(path: *const c_char, times: *const timeval) -> c_int; paths = [path]);

#[no_mangle]
pub unsafe extern "C" fn faccessat(
    dirfd: c_int,
    path: *const c_char,
    mode: c_int,
    flags: c_int,
) -> c_int {
    let real = real!(faccessat as unsafe extern "C" fn(c_int, *const c_char, c_int, c_int) -> c_int);
    with_paths("faccessat", [PathArg::at(dirfd, path)], |[path]| {
        real(dirfd, path, mode, flags)
    })
}

#[no_mangle]
pub unsafe extern "C" fn fchmodat(
    dirfd: c_int,
    path: *const c_char,
    mode: mode_t,
    flags: c_int,
) -> c_int {
    let real = real!(fchmodat as unsafe extern "C" fn(c_int, *const c_char, mode_t, c_int) -> c_int);
    with_paths("fchmodat", [PathArg::at(dirfd, path)], |[path]| {
        real(dirfd, path, mode, flags)
    })
}

/// A NULL path updates `dirfd` itself and is passed on as NULL.
#[no_mangle]
pub unsafe extern "C" fn utimensat(
    dirfd: c_int,
    path: *const c_char,
    times: *const timespec,
    flags: c_int,
) -> c_int {
    let real = real!(utimensat as unsafe extern "C" fn(c_int, *const c_char, *const timespec, c_int) -> c_int);
    with_paths("utimensat", [PathArg::at(dirfd, path)], |[path]| {
        real(dirfd, path, times, flags)
    })
}

// Extended attributes

path_call!(fn getxattr(path: *const c_char, name: *const c_char, value: *mut c_void, size: size_t) -> ssize_t; paths = [path]);
path_call!(fn lgetxattr(path: *const c_char, name: *const c_char, value: *mut c_void, size: size_t) -> ssize_t; paths = [path]);
path_call!(fn setxattr(path: *const c_char, name: *const c_char, value: *const c_void, size: size_t, flags: c_int) -> c_int; paths = [path]);
path_call!(fn lsetxattr(path: *const c_char, name: *const c_char, value: *const c_void, size: size_t, flags: c_int) -> c_int; paths = [path]);
path_call!(fn listxattr(path: *const c_char, list: *mut c_char, size: size_t) -> ssize_t; paths = [path]);
path_call!(fn llistxattr(path: *const c_char, list: *mut c_char, size: size_t) -> ssize_t; paths = [path]);
path_call!(fn removexattr(path: *const c_char, name: *const c_char) -> c_int; paths = [path]);
path_call!(fn lremovexattr(path: *const c_char, name: *const c_char) -> c_int; paths = [path]);
