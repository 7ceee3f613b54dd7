//! Root changes, program execution and dynamic loading.

use super::with_paths;
use crate::state::InceptionLayerGuard;
use crate::{get_errno, set_errno};
use libc::{c_char, c_int, c_long, c_void};
use std::ffi::CStr;
use vchroot_config::{log_shim_debug, log_shim_warn};
use vchroot_core::{Context, PathArg};

type DlopenFn = unsafe extern "C" fn(*const c_char, c_int) -> *mut c_void;
type DlmopenFn = unsafe extern "C" fn(c_long, *const c_char, c_int) -> *mut c_void;

/// Emulated without privilege: the directory becomes the virtual root of
/// this process and, through the environment, of its children.
#[no_mangle]
pub unsafe extern "C" fn chroot(path: *const c_char) -> c_int {
    if path.is_null() {
        set_errno(libc::EFAULT);
        return -1;
    }
    let Some(_guard) = InceptionLayerGuard::enter() else {
        let real = real!(chroot as unsafe extern "C" fn(*const c_char) -> c_int);
        return real(path);
    };

    let chdir = real!(chdir as unsafe extern "C" fn(*const c_char) -> c_int);
    let ctx = Context::global();
    let result = ctx.emulate_chroot(CStr::from_ptr(path), |dir| {
        if chdir(dir.as_ptr()) == 0 {
            Ok(())
        } else {
            Err(get_errno())
        }
    });
    match result {
        Ok(()) => {
            log_shim_debug!(
                "virtual root activated",
                root = tracing::field::debug(ctx.root.current().map(|r| &r.virtual_root))
            );
            0
        }
        Err(e) => {
            log_shim_debug!("chroot refused", error = tracing::field::display(&e));
            set_errno(e.errno());
            -1
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn execve(
    path: *const c_char,
    argv: *const *const c_char,
    envp: *const *const c_char,
) -> c_int {
    let real = real!(execve as unsafe extern "C" fn(*const c_char, *const *const c_char, *const *const c_char) -> c_int);
    with_paths("execve", [PathArg::path(path)], |[path]| real(path, argv, envp))
}

#[no_mangle]
pub unsafe extern "C" fn execv(path: *const c_char, argv: *const *const c_char) -> c_int {
    let real = real!(execv as unsafe extern "C" fn(*const c_char, *const *const c_char) -> c_int);
    with_paths("execv", [PathArg::path(path)], |[path]| real(path, argv))
}

/// Where the loader should look for `file`. The guard is released before
/// the real load so the library's constructors are translated too.
unsafe fn load_target(file: *const c_char, load: impl FnOnce(*const c_char) -> *mut c_void) -> *mut c_void {
    if file.is_null() {
        return load(file);
    }
    let Some(guard) = InceptionLayerGuard::enter() else {
        return load(file);
    };
    let name = CStr::from_ptr(file);
    let target = Context::global().facade().library_target(name);
    drop(guard);

    match target {
        Ok(target) => load(target.as_ptr()),
        Err(e) => {
            log_shim_warn!(
                "library path not translatable",
                file = tracing::field::display(name.to_string_lossy()),
                error = tracing::field::display(&e)
            );
            std::ptr::null_mut()
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn dlopen(file: *const c_char, mode: c_int) -> *mut c_void {
    let real = real!(dlopen as DlopenFn);
    load_target(file, |file| real(file, mode))
}

#[no_mangle]
pub unsafe extern "C" fn dlmopen(lmid: c_long, file: *const c_char, mode: c_int) -> *mut c_void {
    let real = real!(dlmopen as DlmopenFn);
    load_target(file, |file| real(lmid, file, mode))
}
