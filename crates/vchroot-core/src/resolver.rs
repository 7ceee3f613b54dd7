//! Real Symbol Storage
//!
//! Locates the next-in-scope definition of every intercepted name, skipping
//! this layer's own export, and caches it for the life of the process. The
//! cache is filled from the library constructor so that lookups never run
//! from inside another intercepted call in steady state.

use crate::error::ResolveError;
use crate::facade::CALL_TABLE;
use libc::c_void;
use std::ffi::{CStr, CString};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicPtr, Ordering};
use vchroot_config::log_core_debug;

/// Capability to find "the next definition of `name`".
pub trait SymbolSource: Send + Sync {
    fn lookup(&self, name: &CStr) -> Option<NonNull<c_void>>;
}

/// `dlsym(RTLD_NEXT, name)`.
pub struct NextInScope;

impl SymbolSource for NextInScope {
    fn lookup(&self, name: &CStr) -> Option<NonNull<c_void>> {
        // SAFETY: name is NUL-terminated; RTLD_NEXT is valid from a shared object.
        NonNull::new(unsafe { libc::dlsym(libc::RTLD_NEXT, name.as_ptr()) })
    }
}

/// One cached entry point.
pub struct RealSymbol {
    ptr: AtomicPtr<c_void>,
    name: CString,
}

impl RealSymbol {
    pub fn new(name: &str) -> Option<Self> {
        Some(Self {
            ptr: AtomicPtr::new(std::ptr::null_mut()),
            name: CString::new(name).ok()?,
        })
    }

    pub fn name(&self) -> &CStr {
        &self.name
    }

    /// First resolution wins; a concurrent duplicate lookup stores the same
    /// pointer and is harmless.
    pub fn get(&self, source: &dyn SymbolSource) -> Option<NonNull<c_void>> {
        if let Some(p) = NonNull::new(self.ptr.load(Ordering::Acquire)) {
            return Some(p);
        }
        let f = source.lookup(&self.name)?;
        self.ptr.store(f.as_ptr(), Ordering::Release);
        Some(f)
    }

    pub fn is_resolved(&self) -> bool {
        !self.ptr.load(Ordering::Acquire).is_null()
    }
}

/// Slots for every name in [`CALL_TABLE`], in table order.
pub struct SymbolRegistry {
    slots: Vec<RealSymbol>,
    source: Box<dyn SymbolSource>,
}

impl SymbolRegistry {
    pub fn new(source: Box<dyn SymbolSource>) -> Self {
        let slots = CALL_TABLE
            .iter()
            .filter_map(|sig| RealSymbol::new(sig.name))
            .collect();
        Self { slots, source }
    }

    fn slot(&self, name: &str) -> Option<&RealSymbol> {
        let idx = CALL_TABLE
            .binary_search_by(|sig| sig.name.cmp(name))
            .ok()?;
        self.slots.get(idx)
    }

    pub fn resolve(&self, name: &str) -> Result<NonNull<c_void>, ResolveError> {
        let slot = self.slot(name).ok_or_else(|| ResolveError::Unknown {
            name: name.to_string(),
        })?;
        slot.get(self.source.as_ref())
            .ok_or_else(|| ResolveError::Missing {
                name: name.to_string(),
            })
    }

    /// Resolve or terminate the process. There is no meaningful way to
    /// continue an intercepted call without its real implementation.
    pub fn resolve_or_abort(&self, name: &str) -> NonNull<c_void> {
        match self.resolve(name) {
            Ok(p) => p,
            Err(e) => fatal(&e),
        }
    }

    /// Resolve every table entry up front. Names the C library does not
    /// provide are skipped; they only abort if actually called.
    /// Returns the number resolved.
    pub fn preload(&self) -> usize {
        let mut resolved = 0;
        for slot in &self.slots {
            if slot.get(self.source.as_ref()).is_some() {
                resolved += 1;
            }
        }
        log_core_debug!(
            "real symbols preloaded",
            resolved = resolved,
            total = self.slots.len()
        );
        resolved
    }
}

/// Report on fd 2 without allocating through the logger, then abort.
pub fn fatal(err: &ResolveError) -> ! {
    let msg = format!("vchroot: {err}\n");
    // SAFETY: writing a valid buffer to stderr.
    unsafe {
        libc::write(2, msg.as_ptr() as *const c_void, msg.len());
    }
    std::process::abort()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    /// Hands out fake addresses and counts lookups.
    pub(crate) struct CountingSource {
        pub calls: Arc<AtomicUsize>,
        pub missing: Vec<&'static str>,
    }

    impl CountingSource {
        pub(crate) fn new() -> Self {
            Self {
                calls: Arc::new(AtomicUsize::new(0)),
                missing: Vec::new(),
            }
        }
    }

    impl SymbolSource for CountingSource {
        fn lookup(&self, name: &CStr) -> Option<NonNull<c_void>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let name = name.to_str().ok()?;
            if self.missing.contains(&name) {
                return None;
            }
            NonNull::new((0x1000 + name.len()) as *mut c_void)
        }
    }

    #[test]
    fn test_resolution_is_cached() {
        let source = CountingSource::new();
        let calls = source.calls.clone();
        let registry = SymbolRegistry::new(Box::new(source));

        let a = registry.resolve("open").unwrap();
        let b = registry.resolve("open").unwrap();
        assert_eq!(a, b);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_and_missing() {
        let mut source = CountingSource::new();
        source.missing.push("lchmod");
        let registry = SymbolRegistry::new(Box::new(source));

        assert!(matches!(
            registry.resolve("not_a_call"),
            Err(ResolveError::Unknown { .. })
        ));
        assert!(matches!(
            registry.resolve("lchmod"),
            Err(ResolveError::Missing { .. })
        ));
    }

    #[test]
    fn test_preload_skips_missing() {
        let mut source = CountingSource::new();
        source.missing.push("lchmod");
        let calls = source.calls.clone();
        let registry = SymbolRegistry::new(Box::new(source));

        let resolved = registry.preload();
        assert_eq!(resolved, CALL_TABLE.len() - 1);
        assert_eq!(calls.load(Ordering::SeqCst), CALL_TABLE.len());

        // Cached entries are not looked up again.
        registry.resolve("stat").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), CALL_TABLE.len());
    }

    #[test]
    fn test_next_in_scope_finds_libc() {
        // The test binary is not interposed, so RTLD_NEXT reaches libc.
        assert!(NextInScope.lookup(c"getpid").is_some());
        assert!(NextInScope.lookup(c"vchroot_no_such_symbol").is_none());
    }
}
