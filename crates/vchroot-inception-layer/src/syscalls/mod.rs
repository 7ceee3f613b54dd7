//! Intercepted entry points, grouped by family.
//!
//! Each adapter routes through one of the helpers below. They enter the
//! recursion guard, translate through the core facade and release the guard
//! again before the real call: walks and scans run caller callbacks that
//! must be translated like any other call.

pub mod dir;
pub mod fts;
pub mod misc;
pub mod open;
pub mod path;
pub mod privileged;
pub mod process;
pub mod stat;
pub mod tmp;
pub mod walk;

use crate::state::InceptionLayerGuard;
use crate::{get_errno, set_errno};
use libc::{c_char, c_int, c_uint, mode_t};
use std::ffi::CStr;
use vchroot_core::{
    signature, Context, Facade, FailureReturn, PathArg, Prepared, Privileged, ShadowRequest,
};

/// Translate `args` and run `call` on the results.
///
/// `call` gets the facade for rewriting outputs when the call table lists
/// an output for `name`. It gets `None` for calls without one, and for
/// calls made from inside the layer, which go through untouched.
pub(crate) unsafe fn with_prepared<'p, R: FailureReturn, const N: usize>(
    name: &'static str,
    args: [PathArg<'p>; N],
    call: impl FnOnce(Option<&Facade<'static>>, &Prepared<'p, N>) -> R,
) -> R {
    let Some(guard) = InceptionLayerGuard::enter() else {
        return call(None, &Prepared::untranslated(args));
    };
    let ctx = Context::global();
    let Some(sig) = signature(name) else {
        drop(guard);
        return call(None, &Prepared::untranslated(args));
    };

    let facade = ctx.facade();
    let output = sig.has_output().then_some(&facade);
    let result = facade.invoke(sig, args, |prepared| {
        drop(guard);
        call(output, prepared)
    });
    match result {
        Ok(r) => r,
        Err(e) => {
            set_errno(e.errno());
            R::failure()
        }
    }
}

/// [`with_prepared`] for calls with no path output.
pub(crate) unsafe fn with_paths<'p, R: FailureReturn, const N: usize>(
    name: &'static str,
    args: [PathArg<'p>; N],
    call: impl FnOnce([*const c_char; N]) -> R,
) -> R {
    with_prepared(name, args, |_, prepared| call(prepared.ptrs()))
}

/// Ownership and device-node calls: record the requested attributes and
/// report success when the kernel refuses with EPERM.
pub(crate) unsafe fn with_privilege<'p, const N: usize>(
    name: &'static str,
    args: [PathArg<'p>; N],
    target: usize,
    request: ShadowRequest,
    call: impl FnOnce([*const c_char; N]) -> c_int,
) -> c_int {
    let Some(_guard) = InceptionLayerGuard::enter() else {
        return call(Prepared::untranslated(args).ptrs());
    };
    let Some(sig) = signature(name) else {
        return call(Prepared::untranslated(args).ptrs());
    };

    let outcome = Context::global().facade().privileged(
        sig,
        args,
        target,
        request,
        |prepared| match call(prepared.ptrs()) {
            -1 => Err(get_errno()),
            rc => Ok(rc),
        },
        create_placeholder,
    );
    match outcome {
        Ok(Privileged::Failed(errno)) => {
            set_errno(errno);
            -1
        }
        Ok(done) => done.rc(),
        Err(e) => {
            set_errno(e.errno());
            -1
        }
    }
}

/// Regular file standing in for a device node the kernel refused to create.
fn create_placeholder(real: &CStr, perm: mode_t) -> Result<(), c_int> {
    let open = real!(open as unsafe extern "C" fn(*const c_char, c_int, ...) -> c_int);
    let flags = libc::O_WRONLY | libc::O_CREAT | libc::O_EXCL | libc::O_CLOEXEC;
    // SAFETY: real is NUL-terminated; the mode is passed promoted.
    let fd = unsafe { open(real.as_ptr(), flags, perm as c_uint) };
    if fd < 0 {
        // SAFETY: reading this thread's errno.
        return Err(unsafe { get_errno() });
    }
    // SAFETY: fd was just opened here.
    unsafe { libc::close(fd) };
    Ok(())
}

/// Length of the NUL-terminated string at `ptr`.
pub(crate) unsafe fn c_len(ptr: *const c_char) -> usize {
    CStr::from_ptr(ptr).to_bytes().len()
}

/// Narrow a heap or caller-owned C string in place.
pub(crate) unsafe fn narrow_in_place(facade: Option<&Facade<'_>>, ptr: *mut c_char) {
    let Some(facade) = facade else { return };
    if ptr.is_null() {
        return;
    }
    let len = c_len(ptr);
    let buf = std::slice::from_raw_parts_mut(ptr as *mut u8, len + 1);
    facade.narrow_into(buf);
}
