//! Per-thread recursion guard.
//!
//! Translation allocates, logs and resolves symbols. Anything it calls that
//! lands back in an intercepted entry point must go straight to the real
//! function, so every adapter enters the guard first and passes through when
//! it is already held on this thread.

use std::ffi::c_void;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

// Lock-free key storage: a OnceLock could block inside library init.
static RECURSION_KEY_INIT: AtomicBool = AtomicBool::new(false);
static RECURSION_KEY_VALUE: AtomicUsize = AtomicUsize::new(0);
static BOOTSTRAPPING: AtomicBool = AtomicBool::new(false);

/// The pthread key holding the guard flag, created on first use.
fn recursion_key() -> Option<libc::pthread_key_t> {
    if RECURSION_KEY_INIT.load(Ordering::Acquire) {
        return Some(RECURSION_KEY_VALUE.load(Ordering::Relaxed) as libc::pthread_key_t);
    }

    // pthread_key_create may itself allocate; a nested attempt gives up.
    if BOOTSTRAPPING.swap(true, Ordering::SeqCst) {
        return None;
    }

    let mut key: libc::pthread_key_t = 0;
    // SAFETY: key is a valid out pointer and no destructor is registered.
    let ret = unsafe { libc::pthread_key_create(&mut key, None) };
    let result = if ret != 0 {
        None
    } else {
        RECURSION_KEY_VALUE.store(key as usize, Ordering::Relaxed);
        RECURSION_KEY_INIT.store(true, Ordering::Release);
        Some(key)
    };
    BOOTSTRAPPING.store(false, Ordering::SeqCst);
    result
}

/// Held while this thread is inside the layer.
pub(crate) struct InceptionLayerGuard {
    key: libc::pthread_key_t,
}

impl InceptionLayerGuard {
    /// `None` when the thread is already inside the layer, or while the key
    /// is being created.
    pub(crate) fn enter() -> Option<Self> {
        let key = recursion_key()?;
        // SAFETY: key was created by pthread_key_create above.
        let held = unsafe { libc::pthread_getspecific(key) };
        if !held.is_null() {
            return None;
        }
        // SAFETY: any non-null value marks the slot as held.
        unsafe { libc::pthread_setspecific(key, ptr::NonNull::<c_void>::dangling().as_ptr()) };
        Some(Self { key })
    }
}

impl Drop for InceptionLayerGuard {
    fn drop(&mut self) {
        // SAFETY: same key as in enter().
        unsafe { libc::pthread_setspecific(self.key, ptr::null()) };
    }
}
