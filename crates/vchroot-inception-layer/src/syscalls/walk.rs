//! File tree walks.
//!
//! The walk itself runs on real paths. The caller's callback is swapped for
//! a trampoline that narrows each path, rebases `FTW.base` and overlays the
//! stat record before calling through. Callbacks are kept on a per-thread
//! stack so a walk started from inside a callback gets its own.

use super::with_paths;
use crate::state::InceptionLayerGuard;
use libc::{c_char, c_int};
use std::cell::RefCell;
use std::ffi::CStr;
use vchroot_core::{Context, PathArg, StatFields};

/// `struct FTW`.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct Ftw {
    base: c_int,
    level: c_int,
}

type FtwFn = unsafe extern "C" fn(*const c_char, *const libc::stat, c_int) -> c_int;
type Ftw64Fn = unsafe extern "C" fn(*const c_char, *const libc::stat64, c_int) -> c_int;
type NftwFn = unsafe extern "C" fn(*const c_char, *const libc::stat, c_int, *mut Ftw) -> c_int;
type Nftw64Fn = unsafe extern "C" fn(*const c_char, *const libc::stat64, c_int, *mut Ftw) -> c_int;

#[derive(Clone, Copy)]
enum Callback {
    Ftw(FtwFn),
    Ftw64(Ftw64Fn),
    Nftw(NftwFn),
    Nftw64(Nftw64Fn),
}

thread_local! {
    static CALLBACKS: RefCell<Vec<Callback>> = const { RefCell::new(Vec::new()) };
}

/// The caller's callback for the walk in progress on this thread.
struct Registered;

impl Registered {
    fn push(cb: Callback) -> Self {
        CALLBACKS.with(|stack| stack.borrow_mut().push(cb));
        Registered
    }
}

impl Drop for Registered {
    fn drop(&mut self) {
        CALLBACKS.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

fn current() -> Option<Callback> {
    CALLBACKS.with(|stack| stack.borrow().last().copied())
}

/// Narrow one walk entry and hand it to `user`.
unsafe fn deliver<S: StatFields + Copy>(
    path: *const c_char,
    sb: *const S,
    base: c_int,
    user: impl FnOnce(*const c_char, *const S, c_int) -> c_int,
) -> c_int {
    if path.is_null() {
        return user(path, sb, base);
    }
    let Some(guard) = InceptionLayerGuard::enter() else {
        return user(path, sb, base);
    };

    let facade = Context::global().facade();
    let real = CStr::from_ptr(path);
    let Ok((narrowed, base)) = facade.narrow_walk_entry(real, base) else {
        drop(guard);
        return user(path, sb, base);
    };
    let mut st = if sb.is_null() { None } else { Some(*sb) };
    if let Some(st) = st.as_mut() {
        facade.overlay_stat(real, st);
    }
    drop(guard);

    let sb = st.as_ref().map_or(sb, |st| st as *const S);
    user(narrowed.as_ptr(), sb, base)
}

unsafe extern "C" fn ftw_trampoline(path: *const c_char, sb: *const libc::stat, flag: c_int) -> c_int {
    match current() {
        Some(Callback::Ftw(cb)) => deliver(path, sb, 0, |path, sb, _| cb(path, sb, flag)),
        _ => -1,
    }
}

unsafe extern "C" fn ftw64_trampoline(path: *const c_char, sb: *const libc::stat64, flag: c_int) -> c_int {
    match current() {
        Some(Callback::Ftw64(cb)) => deliver(path, sb, 0, |path, sb, _| cb(path, sb, flag)),
        _ => -1,
    }
}

unsafe extern "C" fn nftw_trampoline(
    path: *const c_char,
    sb: *const libc::stat,
    flag: c_int,
    ftwbuf: *mut Ftw,
) -> c_int {
    let Some(Callback::Nftw(cb)) = current() else {
        return -1;
    };
    if ftwbuf.is_null() {
        return deliver(path, sb, 0, |path, sb, _| cb(path, sb, flag, ftwbuf));
    }
    let mut local = *ftwbuf;
    deliver(path, sb, local.base, |path, sb, base| {
        local.base = base;
        cb(path, sb, flag, &mut local)
    })
}

unsafe extern "C" fn nftw64_trampoline(
    path: *const c_char,
    sb: *const libc::stat64,
    flag: c_int,
    ftwbuf: *mut Ftw,
) -> c_int {
    let Some(Callback::Nftw64(cb)) = current() else {
        return -1;
    };
    if ftwbuf.is_null() {
        return deliver(path, sb, 0, |path, sb, _| cb(path, sb, flag, ftwbuf));
    }
    let mut local = *ftwbuf;
    deliver(path, sb, local.base, |path, sb, base| {
        local.base = base;
        cb(path, sb, flag, &mut local)
    })
}

#[no_mangle]
pub unsafe extern "C" fn ftw(dir: *const c_char, func: Option<FtwFn>, nopenfd: c_int) -> c_int {
    let real = real!(ftw as unsafe extern "C" fn(*const c_char, Option<FtwFn>, c_int) -> c_int);
    let Some(func) = func else {
        return real(dir, func, nopenfd);
    };
    with_paths("ftw", [PathArg::path(dir)], |[dir]| {
        let _registered = Registered::push(Callback::Ftw(func));
        real(dir, Some(ftw_trampoline), nopenfd)
    })
}

#[no_mangle]
pub unsafe extern "C" fn ftw64(dir: *const c_char, func: Option<Ftw64Fn>, nopenfd: c_int) -> c_int {
    let real = real!(ftw64 as unsafe extern "C" fn(*const c_char, Option<Ftw64Fn>, c_int) -> c_int);
    let Some(func) = func else {
        return real(dir, func, nopenfd);
    };
    with_paths("ftw64", [PathArg::path(dir)], |[dir]| {
        let _registered = Registered::push(Callback::Ftw64(func));
        real(dir, Some(ftw64_trampoline), nopenfd)
    })
}

#[no_mangle]
pub unsafe extern "C" fn nftw(
    dir: *const c_char,
    func: Option<NftwFn>,
    nopenfd: c_int,
    flags: c_int,
) -> c_int {
    let real = real!(nftw as unsafe extern "C" fn(*const c_char, Option<NftwFn>, c_int, c_int) -> c_int);
    let Some(func) = func else {
        return real(dir, func, nopenfd, flags);
    };
    with_paths("nftw", [PathArg::path(dir)], |[dir]| {
        let _registered = Registered::push(Callback::Nftw(func));
        real(dir, Some(nftw_trampoline), nopenfd, flags)
    })
}

#[no_mangle]
pub unsafe extern "C" fn nftw64(
    dir: *const c_char,
    func: Option<Nftw64Fn>,
    nopenfd: c_int,
    flags: c_int,
) -> c_int {
    let real = real!(nftw64 as unsafe extern "C" fn(*const c_char, Option<Nftw64Fn>, c_int, c_int) -> c_int);
    let Some(func) = func else {
        return real(dir, func, nopenfd, flags);
    };
    with_paths("nftw64", [PathArg::path(dir)], |[dir]| {
        let _registered = Registered::push(Callback::Nftw64(func));
        real(dir, Some(nftw64_trampoline), nopenfd, flags)
    })
}
