//! Ownership changes and device nodes.
//!
//! An unprivileged process is refused these with EPERM. The requested
//! attributes are recorded for the real path and success is reported.
//! Later stat calls see the recorded values.

use super::with_privilege;
use libc::{c_char, c_int, dev_t, gid_t, mode_t, uid_t};
use vchroot_core::{PathArg, ShadowRequest};

#[no_mangle]
pub unsafe extern "C" fn chown(path: *const c_char, uid: uid_t, gid: gid_t) -> c_int {
    let real = real!(chown as unsafe extern "C" fn(*const c_char, uid_t, gid_t) -> c_int);
    with_privilege(
        "chown",
        [PathArg::path(path)],
        0,
        ShadowRequest::Owner { uid, gid },
        |[path]| real(path, uid, gid),
    )
}

#[no_mangle]
pub unsafe extern "C" fn lchown(path: *const c_char, uid: uid_t, gid: gid_t) -> c_int {
    let real = real!(lchown as unsafe extern "C" fn(*const c_char, uid_t, gid_t) -> c_int);
    with_privilege(
        "lchown",
        [PathArg::path(path)],
        0,
        ShadowRequest::Owner { uid, gid },
        |[path]| real(path, uid, gid),
    )
}

#[no_mangle]
pub unsafe extern "C" fn fchownat(
    dirfd: c_int,
    path: *const c_char,
    uid: uid_t,
    gid: gid_t,
    flags: c_int,
) -> c_int {
    let real = real!(fchownat as unsafe extern "C" fn(c_int, *const c_char, uid_t, gid_t, c_int) -> c_int);
    with_privilege(
        "fchownat",
        [PathArg::at(dirfd, path)],
        0,
        ShadowRequest::Owner { uid, gid },
        |[path]| real(dirfd, path, uid, gid, flags),
    )
}

#[no_mangle]
pub unsafe extern "C" fn mknod(path: *const c_char, mode: mode_t, dev: dev_t) -> c_int {
    let real = real!(mknod as unsafe extern "C" fn(*const c_char, mode_t, dev_t) -> c_int);
    with_privilege(
        "mknod",
        [PathArg::path(path)],
        0,
        ShadowRequest::Device { mode, dev },
        |[path]| real(path, mode, dev),
    )
}

#[no_mangle]
pub unsafe extern "C" fn mknodat(dirfd: c_int, path: *const c_char, mode: mode_t, dev: dev_t) -> c_int {
    let real = real!(mknodat as unsafe extern "C" fn(c_int, *const c_char, mode_t, dev_t) -> c_int);
    with_privilege(
        "mknodat",
        [PathArg::at(dirfd, path)],
        0,
        ShadowRequest::Device { mode, dev },
        |[path]| real(dirfd, path, mode, dev),
    )
}

// Versioned entry points of older glibc; the device is passed by pointer.

#[no_mangle]
pub unsafe extern "C" fn __xmknod(ver: c_int, path: *const c_char, mode: mode_t, dev: *mut dev_t) -> c_int {
    let real = real!(__xmknod as unsafe extern "C" fn(c_int, *const c_char, mode_t, *mut dev_t) -> c_int);
    let requested = if dev.is_null() { 0 } else { *dev };
    with_privilege(
        "__xmknod",
        [PathArg::path(path)],
        0,
        ShadowRequest::Device { mode, dev: requested },
        |[path]| real(ver, path, mode, dev),
    )
}

#[no_mangle]
pub unsafe extern "C" fn __xmknodat(
    ver: c_int,
    dirfd: c_int,
    path: *const c_char,
    mode: mode_t,
    dev: *mut dev_t,
) -> c_int {
    let real = real!(__xmknodat as unsafe extern "C" fn(c_int, c_int, *const c_char, mode_t, *mut dev_t) -> c_int);
    let requested = if dev.is_null() { 0 } else { *dev };
    with_privilege(
        "__xmknodat",
        [PathArg::at(dirfd, path)],
        0,
        ShadowRequest::Device { mode, dev: requested },
        |[path]| real(ver, dirfd, path, mode, dev),
    )
}
