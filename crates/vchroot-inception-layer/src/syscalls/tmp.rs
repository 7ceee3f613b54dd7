//! Temporary names.
//!
//! Template calls work on a private expanded copy of the caller's template;
//! the generated `XXXXXX` suffix is copied back afterwards so the caller's
//! template names the same file in virtual terms.

use super::{c_len, narrow_in_place, with_prepared};
use libc::{c_char, c_int};
use vchroot_core::{FailureReturn, PathArg};

unsafe fn with_template<R: FailureReturn>(
    name: &'static str,
    template: *mut c_char,
    call: impl FnOnce(*mut c_char) -> R,
) -> R {
    with_prepared(name, [PathArg::path(template)], |facade, prepared| {
        let (Some(facade), Some(real)) = (facade, prepared.real(0)) else {
            return call(template);
        };
        let mut private = real.to_bytes_with_nul().to_vec();
        let ret = call(private.as_mut_ptr() as *mut c_char);

        let real_len = private.iter().position(|&b| b == 0).unwrap_or(private.len());
        let caller = std::slice::from_raw_parts_mut(template as *mut u8, c_len(template));
        facade.copy_template_suffix(&private[..real_len], caller);
        ret
    })
}

#[no_mangle]
pub unsafe extern "C" fn mkstemp(template: *mut c_char) -> c_int {
    let real = real!(mkstemp as unsafe extern "C" fn(*mut c_char) -> c_int);
    with_template("mkstemp", template, |t| real(t))
}

#[no_mangle]
pub unsafe extern "C" fn mkstemp64(template: *mut c_char) -> c_int {
    let real = real!(mkstemp64 as unsafe extern "C" fn(*mut c_char) -> c_int);
    with_template("mkstemp64", template, |t| real(t))
}

#[no_mangle]
pub unsafe extern "C" fn mkdtemp(template: *mut c_char) -> *mut c_char {
    let real = real!(mkdtemp as unsafe extern "C" fn(*mut c_char) -> *mut c_char);
    let ret = with_template("mkdtemp", template, |t| real(t));
    if ret.is_null() {
        ret
    } else {
        template
    }
}

/// On failure the real call empties the template, and so the caller's.
#[no_mangle]
pub unsafe extern "C" fn mktemp(template: *mut c_char) -> *mut c_char {
    let real = real!(mktemp as unsafe extern "C" fn(*mut c_char) -> *mut c_char);
    with_template("mktemp", template, |t| real(t));
    template
}

#[no_mangle]
pub unsafe extern "C" fn tempnam(dir: *const c_char, prefix: *const c_char) -> *mut c_char {
    let real = real!(tempnam as unsafe extern "C" fn(*const c_char, *const c_char) -> *mut c_char);
    with_prepared("tempnam", [PathArg::path(dir)], |facade, prepared| {
        let ret = real(prepared.ptr(0), prefix);
        narrow_in_place(facade, ret);
        ret
    })
}

/// Names under the host's temporary directory; passed through.
#[no_mangle]
pub unsafe extern "C" fn tmpnam(buf: *mut c_char) -> *mut c_char {
    let real = real!(tmpnam as unsafe extern "C" fn(*mut c_char) -> *mut c_char);
    real(buf)
}
