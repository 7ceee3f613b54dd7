//! # vchroot-inception-layer
//!
//! LD_PRELOAD inception layer presenting a virtual filesystem root.
//!
//! Every exported entry point is a thin adapter: it names its call in the
//! core call table, hands over its path arguments and calls the real
//! function with the translated pointers. All translation, privilege faking
//! and root state live in `vchroot-core`.
//!
//! Loaded with:
//! ```bash
//! VCHROOT_BASE=/srv/chroot LD_PRELOAD=libvchroot_inception_layer.so /bin/ls /
//! ```
//!
//! Settings come from the environment only (`VCHROOT_*`); nothing is read
//! from disk inside the target process.

// Allow unsafe FFI functions without safety docs - these are inherently unsafe C ABI
#![allow(clippy::missing_safety_doc)]

// Macros must be defined before modules that use them
#[macro_use]
mod macros;

mod reals;
mod state;
mod syscalls;

use libc::c_int;
use state::InceptionLayerGuard;
use vchroot_config::log_shim_debug;
use vchroot_config::logging::init_shim_logging;
use vchroot_core::Context;

#[inline]
pub(crate) unsafe fn set_errno(e: c_int) {
    *libc::__errno_location() = e;
}

#[inline]
pub(crate) unsafe fn get_errno() -> c_int {
    *libc::__errno_location()
}

/// Library constructor: build the process context and fill the real-symbol
/// cache before the program's own code runs.
#[cfg(target_os = "linux")]
#[link_section = ".init_array"]
#[used]
pub static VCHROOT_INIT_LINUX: unsafe extern "C" fn() = {
    unsafe extern "C" fn init() {
        let saved = get_errno();
        if let Some(_guard) = InceptionLayerGuard::enter() {
            let ctx = Context::global();
            if ctx.settings.logging_requested() {
                init_shim_logging(ctx.settings.log_filter.as_deref(), ctx.settings.debug);
            }
            let resolved = ctx.symbols.preload();
            log_shim_debug!(
                "inception layer loaded",
                resolved = resolved,
                root = tracing::field::debug(ctx.root.current().map(|r| &r.virtual_root))
            );
        }
        set_errno(saved);
    }
    init
};
