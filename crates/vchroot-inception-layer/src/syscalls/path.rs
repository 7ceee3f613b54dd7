//! Links, renames, removal and path resolution.

use super::{narrow_in_place, with_paths, with_prepared};
use libc::{c_char, c_int, mode_t, size_t, ssize_t};
use vchroot_core::{Facade, PathArg, MAX_PATH};

type ReadlinkFn = unsafe extern "C" fn(*const c_char, *mut c_char, size_t) -> ssize_t;
type ReadlinkatFn = unsafe extern "C" fn(c_int, *const c_char, *mut c_char, size_t) -> ssize_t;

path_call!(fn link(old: *const c_char, new: *const c_char) -> c_int; paths = [old, new]);
path_call!(fn rename(old: *const c_char, new: *const c_char) -> c_int; paths = [old, new]);
path_call!(fn unlink(path: *const c_char) -> c_int; paths = [path]);
path_call!(fn remove(path: *const c_char) -> c_int; paths = [path]);
path_call!(fn mkfifo(path: *const c_char, mode: mode_t) -> c_int; paths = [path]);

#[no_mangle]
pub unsafe extern "C" fn linkat(
    olddirfd: c_int,
    old: *const c_char,
    newdirfd: c_int,
    new: *const c_char,
    flags: c_int,
) -> c_int {
    let real = real!(linkat as unsafe extern "C" fn(c_int, *const c_char, c_int, *const c_char, c_int) -> c_int);
    with_paths(
        "linkat",
        [PathArg::at(olddirfd, old), PathArg::at(newdirfd, new)],
        |[old, new]| real(olddirfd, old, newdirfd, new, flags),
    )
}

#[no_mangle]
pub unsafe extern "C" fn renameat(
    olddirfd: c_int,
    old: *const c_char,
    newdirfd: c_int,
    new: *const c_char,
) -> c_int {
    let real = real!(renameat as unsafe extern "C" fn(c_int, *const c_char, c_int, *const c_char) -> c_int);
    with_paths(
        "renameat",
        [PathArg::at(olddirfd, old), PathArg::at(newdirfd, new)],
        |[old, new]| real(olddirfd, old, newdirfd, new),
    )
}

/// The target is stored exactly as written; only the link itself moves.
#[no_mangle]
pub unsafe extern "C" fn symlink(target: *const c_char, linkpath: *const c_char) -> c_int {
    let real = real!(symlink as unsafe extern "C" fn(*const c_char, *const c_char) -> c_int);
    with_paths(
        "symlink",
        [PathArg::verbatim(target), PathArg::path(linkpath)],
        |[target, linkpath]| real(target, linkpath),
    )
}

#[no_mangle]
pub unsafe extern "C" fn symlinkat(
    target: *const c_char,
    newdirfd: c_int,
    linkpath: *const c_char,
) -> c_int {
    let real = real!(symlinkat as unsafe extern "C" fn(*const c_char, c_int, *const c_char) -> c_int);
    with_paths(
        "symlinkat",
        [PathArg::verbatim(target), PathArg::at(newdirfd, linkpath)],
        |[target, linkpath]| real(target, newdirfd, linkpath),
    )
}

#[no_mangle]
pub unsafe extern "C" fn unlinkat(dirfd: c_int, path: *const c_char, flags: c_int) -> c_int {
    let real = real!(unlinkat as unsafe extern "C" fn(c_int, *const c_char, c_int) -> c_int);
    with_paths("unlinkat", [PathArg::at(dirfd, path)], |[path]| {
        real(dirfd, path, flags)
    })
}

#[no_mangle]
pub unsafe extern "C" fn mkfifoat(dirfd: c_int, path: *const c_char, mode: mode_t) -> c_int {
    let real = real!(mkfifoat as unsafe extern "C" fn(c_int, *const c_char, mode_t) -> c_int);
    with_paths("mkfifoat", [PathArg::at(dirfd, path)], |[path]| {
        real(dirfd, path, mode)
    })
}

/// Read the link into a private buffer, narrow it and copy back what fits.
unsafe fn readlink_narrowed(
    facade: Option<&Facade<'_>>,
    buf: *mut c_char,
    bufsize: size_t,
    call: impl FnOnce(*mut c_char, size_t) -> ssize_t,
) -> ssize_t {
    let Some(facade) = facade else {
        return call(buf, bufsize);
    };
    if buf.is_null() || bufsize == 0 {
        return call(buf, bufsize);
    }

    let mut scratch = [0u8; MAX_PATH];
    let n = call(scratch.as_mut_ptr() as *mut c_char, scratch.len());
    if n < 0 {
        return n;
    }
    let out = std::slice::from_raw_parts_mut(buf as *mut u8, bufsize);
    facade.narrow_truncated(&scratch[..n as usize], out) as ssize_t
}

#[no_mangle]
pub unsafe extern "C" fn readlink(path: *const c_char, buf: *mut c_char, bufsize: size_t) -> ssize_t {
    let real = real!(readlink as ReadlinkFn);
    with_prepared("readlink", [PathArg::path(path)], |facade, prepared| {
        readlink_narrowed(facade, buf, bufsize, |out, len| real(prepared.ptr(0), out, len))
    })
}

#[no_mangle]
pub unsafe extern "C" fn readlinkat(
    dirfd: c_int,
    path: *const c_char,
    buf: *mut c_char,
    bufsize: size_t,
) -> ssize_t {
    let real = real!(readlinkat as ReadlinkatFn);
    with_prepared("readlinkat", [PathArg::at(dirfd, path)], |facade, prepared| {
        readlink_narrowed(facade, buf, bufsize, |out, len| {
            real(dirfd, prepared.ptr(0), out, len)
        })
    })
}

/// Both the caller-buffer and the allocating form are narrowed in place.
#[no_mangle]
pub unsafe extern "C" fn realpath(path: *const c_char, resolved: *mut c_char) -> *mut c_char {
    let real = real!(realpath as unsafe extern "C" fn(*const c_char, *mut c_char) -> *mut c_char);
    with_prepared("realpath", [PathArg::path(path)], |facade, prepared| {
        let ret = real(prepared.ptr(0), resolved);
        narrow_in_place(facade, ret);
        ret
    })
}

#[no_mangle]
pub unsafe extern "C" fn canonicalize_file_name(path: *const c_char) -> *mut c_char {
    let real = real!(canonicalize_file_name as unsafe extern "C" fn(*const c_char) -> *mut c_char);
    with_prepared("canonicalize_file_name", [PathArg::path(path)], |facade, prepared| {
        let ret = real(prepared.ptr(0));
        narrow_in_place(facade, ret);
        ret
    })
}
