//! Directories: creation, removal, scanning, the working directory and
//! pattern expansion.

use super::{narrow_in_place, with_paths, with_prepared};
use crate::set_errno;
use libc::{c_char, c_int, c_void, mode_t, size_t, DIR};
use vchroot_core::{PathArg, MAX_PATH};

type ScandirFilter = Option<unsafe extern "C" fn(*const c_void) -> c_int>;
type ScandirCompar = Option<unsafe extern "C" fn(*mut *const c_void, *mut *const c_void) -> c_int>;
type ScandirFn =
    unsafe extern "C" fn(*const c_char, *mut *mut *mut c_void, ScandirFilter, ScandirCompar) -> c_int;
type GlobErrFn = Option<unsafe extern "C" fn(*const c_char, c_int) -> c_int>;
type GlobFn = unsafe extern "C" fn(*const c_char, c_int, GlobErrFn, *mut c_void) -> c_int;

path_call!(fn mkdir(path: *const c_char, mode: mode_t) -> c_int; paths = [path]);
path_call!(fn rmdir(path: *const c_char) -> c_int; paths = [path]);
path_call!(fn chdir(path: *const c_char) -> c_int; paths = [path]);

#[no_mangle]
pub unsafe extern "C" fn mkdirat(dirfd: c_int, path: *const c_char, mode: mode_t) -> c_int {
    let real = real!(mkdirat as unsafe extern "C" fn(c_int, *const c_char, mode_t) -> c_int);
    with_paths("mkdirat", [PathArg::at(dirfd, path)], |[path]| {
        real(dirfd, path, mode)
    })
}

#[no_mangle]
pub unsafe extern "C" fn opendir(path: *const c_char) -> *mut DIR {
    let real = real!(opendir as unsafe extern "C" fn(*const c_char) -> *mut DIR);
    with_paths("opendir", [PathArg::path(path)], |[path]| real(path))
}

#[no_mangle]
pub unsafe extern "C" fn scandir(
    path: *const c_char,
    namelist: *mut *mut *mut c_void,
    filter: ScandirFilter,
    compar: ScandirCompar,
) -> c_int {
    let real = real!(scandir as ScandirFn);
    with_paths("scandir", [PathArg::path(path)], |[path]| {
        real(path, namelist, filter, compar)
    })
}

#[no_mangle]
pub unsafe extern "C" fn scandir64(
    path: *const c_char,
    namelist: *mut *mut *mut c_void,
    filter: ScandirFilter,
    compar: ScandirCompar,
) -> c_int {
    let real = real!(scandir64 as ScandirFn);
    with_paths("scandir64", [PathArg::path(path)], |[path]| {
        real(path, namelist, filter, compar)
    })
}

/// The real cwd is read into a private buffer first: it is longer than the
/// virtual one and may not fit where the narrowed answer would.
#[no_mangle]
pub unsafe extern "C" fn getcwd(buf: *mut c_char, size: size_t) -> *mut c_char {
    let real = real!(getcwd as unsafe extern "C" fn(*mut c_char, size_t) -> *mut c_char);
    with_prepared("getcwd", [], |facade, _| {
        let Some(facade) = facade else {
            return real(buf, size);
        };
        if buf.is_null() {
            // glibc allocates; narrowing only shortens the result
            let ret = real(buf, size);
            narrow_in_place(Some(facade), ret);
            return ret;
        }

        let mut scratch = [0u8; MAX_PATH + 1];
        if real(scratch.as_mut_ptr() as *mut c_char, scratch.len()).is_null() {
            return std::ptr::null_mut();
        }
        let Some(len) = facade.narrow_into(&mut scratch) else {
            set_errno(libc::ENAMETOOLONG);
            return std::ptr::null_mut();
        };
        if len + 1 > size {
            set_errno(libc::ERANGE);
            return std::ptr::null_mut();
        }
        std::ptr::copy_nonoverlapping(scratch.as_ptr(), buf as *mut u8, len + 1);
        buf
    })
}

#[no_mangle]
pub unsafe extern "C" fn getwd(buf: *mut c_char) -> *mut c_char {
    let real = real!(getwd as unsafe extern "C" fn(*mut c_char) -> *mut c_char);
    with_prepared("getwd", [], |facade, _| {
        let ret = real(buf);
        narrow_in_place(facade, ret);
        ret
    })
}

#[no_mangle]
pub unsafe extern "C" fn get_current_dir_name() -> *mut c_char {
    let real = real!(get_current_dir_name as unsafe extern "C" fn() -> *mut c_char);
    with_prepared("get_current_dir_name", [], |facade, _| {
        let ret = real();
        narrow_in_place(facade, ret);
        ret
    })
}

/// Leading fields shared by `glob_t` and `glob64_t`.
#[repr(C)]
struct GlobHead {
    gl_pathc: size_t,
    gl_pathv: *mut *mut c_char,
    gl_offs: size_t,
}

unsafe fn glob_with(
    name: &'static str,
    real: GlobFn,
    pattern: *const c_char,
    flags: c_int,
    errfunc: GlobErrFn,
    pglob: *mut c_void,
) -> c_int {
    with_prepared(name, [PathArg::path(pattern)], |facade, prepared| {
        let rc = real(prepared.ptr(0), flags, errfunc, pglob);
        if rc == 0 && !pglob.is_null() {
            let head = &*(pglob as *const GlobHead);
            // gl_offs is only honoured with GLOB_DOOFFS
            let offs = if flags & libc::GLOB_DOOFFS != 0 {
                head.gl_offs
            } else {
                0
            };
            if !head.gl_pathv.is_null() {
                for i in offs..offs + head.gl_pathc {
                    narrow_in_place(facade, *head.gl_pathv.add(i));
                }
            }
        }
        rc
    })
}

#[no_mangle]
pub unsafe extern "C" fn glob(
    pattern: *const c_char,
    flags: c_int,
    errfunc: GlobErrFn,
    pglob: *mut c_void,
) -> c_int {
    glob_with("glob", real!(glob as GlobFn), pattern, flags, errfunc, pglob)
}

#[no_mangle]
pub unsafe extern "C" fn glob64(
    pattern: *const c_char,
    flags: c_int,
    errfunc: GlobErrFn,
    pglob: *mut c_void,
) -> c_int {
    glob_with("glob64", real!(glob64 as GlobFn), pattern, flags, errfunc, pglob)
}
