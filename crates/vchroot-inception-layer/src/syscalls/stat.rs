//! The stat family, with recorded ownership and device attributes laid
//! over what the filesystem reports.

use super::with_prepared;
use libc::{c_char, c_int};
use vchroot_core::{PathArg, StatFields};

type StatFn = unsafe extern "C" fn(*const c_char, *mut libc::stat) -> c_int;
type Stat64Fn = unsafe extern "C" fn(*const c_char, *mut libc::stat64) -> c_int;
type FstatatFn = unsafe extern "C" fn(c_int, *const c_char, *mut libc::stat, c_int) -> c_int;
type Fstatat64Fn = unsafe extern "C" fn(c_int, *const c_char, *mut libc::stat64, c_int) -> c_int;
type XstatFn = unsafe extern "C" fn(c_int, *const c_char, *mut libc::stat) -> c_int;
type Xstat64Fn = unsafe extern "C" fn(c_int, *const c_char, *mut libc::stat64) -> c_int;
type FxstatatFn = unsafe extern "C" fn(c_int, c_int, *const c_char, *mut libc::stat, c_int) -> c_int;
type Fxstatat64Fn =
    unsafe extern "C" fn(c_int, c_int, *const c_char, *mut libc::stat64, c_int) -> c_int;

/// Run a stat call on the translated path and overlay the shadow entry for
/// the real path it used.
unsafe fn stat_into<S: StatFields>(
    name: &'static str,
    arg: PathArg<'_>,
    buf: *mut S,
    call: impl FnOnce(*const c_char) -> c_int,
) -> c_int {
    with_prepared(name, [arg], |facade, prepared| {
        let rc = call(prepared.ptr(0));
        if rc == 0 && !buf.is_null() {
            if let (Some(facade), Some(real)) = (facade, prepared.keyable(0)) {
                facade.overlay_stat(real, &mut *buf);
            }
        }
        rc
    })
}

#[no_mangle]
pub unsafe extern "C" fn stat(path: *const c_char, buf: *mut libc::stat) -> c_int {
    let real = real!(stat as StatFn);
    stat_into("stat", PathArg::path(path), buf, |p| real(p, buf))
}

#[no_mangle]
pub unsafe extern "C" fn lstat(path: *const c_char, buf: *mut libc::stat) -> c_int {
    let real = real!(lstat as StatFn);
    stat_into("lstat", PathArg::path(path), buf, |p| real(p, buf))
}

#[no_mangle]
pub unsafe extern "C" fn stat64(path: *const c_char, buf: *mut libc::stat64) -> c_int {
    let real = real!(stat64 as Stat64Fn);
    stat_into("stat64", PathArg::path(path), buf, |p| real(p, buf))
}

#[no_mangle]
pub unsafe extern "C" fn lstat64(path: *const c_char, buf: *mut libc::stat64) -> c_int {
    let real = real!(lstat64 as Stat64Fn);
    stat_into("lstat64", PathArg::path(path), buf, |p| real(p, buf))
}

#[no_mangle]
pub unsafe extern "C" fn fstatat(
    dirfd: c_int,
    path: *const c_char,
    buf: *mut libc::stat,
    flags: c_int,
) -> c_int {
    let real = real!(fstatat as FstatatFn);
    stat_into("fstatat", PathArg::at(dirfd, path), buf, |p| {
        real(dirfd, p, buf, flags)
    })
}

#[no_mangle]
pub unsafe extern "C" fn fstatat64(
    dirfd: c_int,
    path: *const c_char,
    buf: *mut libc::stat64,
    flags: c_int,
) -> c_int {
    let real = real!(fstatat64 as Fstatat64Fn);
    stat_into("fstatat64", PathArg::at(dirfd, path), buf, |p| {
        real(dirfd, p, buf, flags)
    })
}

// Versioned entry points of older glibc.

#[no_mangle]
pub unsafe extern "C" fn __xstat(ver: c_int, path: *const c_char, buf: *mut libc::stat) -> c_int {
    let real = real!(__xstat as XstatFn);
    stat_into("__xstat", PathArg::path(path), buf, |p| real(ver, p, buf))
}

#[no_mangle]
pub unsafe extern "C" fn __lxstat(ver: c_int, path: *const c_char, buf: *mut libc::stat) -> c_int {
    let real = real!(__lxstat as XstatFn);
    stat_into("__lxstat", PathArg::path(path), buf, |p| real(ver, p, buf))
}

#[no_mangle]
pub unsafe extern "C" fn __xstat64(ver: c_int, path: *const c_char, buf: *mut libc::stat64) -> c_int {
    let real = real!(__xstat64 as Xstat64Fn);
    stat_into("__xstat64", PathArg::path(path), buf, |p| real(ver, p, buf))
}

#[no_mangle]
pub unsafe extern "C" fn __lxstat64(ver: c_int, path: *const c_char, buf: *mut libc::stat64) -> c_int {
    let real = real!(__lxstat64 as Xstat64Fn);
    stat_into("__lxstat64", PathArg::path(path), buf, |p| real(ver, p, buf))
}

#[no_mangle]
pub unsafe extern "C" fn __fxstatat(
    ver: c_int,
    dirfd: c_int,
    path: *const c_char,
    buf: *mut libc::stat,
    flags: c_int,
) -> c_int {
    let real = real!(__fxstatat as FxstatatFn);
    stat_into("__fxstatat", PathArg::at(dirfd, path), buf, |p| {
        real(ver, dirfd, p, buf, flags)
    })
}

#[no_mangle]
pub unsafe extern "C" fn __fxstatat64(
    ver: c_int,
    dirfd: c_int,
    path: *const c_char,
    buf: *mut libc::stat64,
    flags: c_int,
) -> c_int {
    let real = real!(__fxstatat64 as Fxstatat64Fn);
    stat_into("__fxstatat64", PathArg::at(dirfd, path), buf, |p| {
        real(ver, dirfd, p, buf, flags)
    })
}
