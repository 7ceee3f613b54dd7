//! Adapter helpers.

/// The real implementation of an intercepted name, typed.
///
/// ```ignore
/// let real = real!(access as unsafe extern "C" fn(*const c_char, c_int) -> c_int);
/// ```
macro_rules! real {
    ($name:ident as $ty:ty) => {{
        let ptr = $crate::reals::lookup(concat!(stringify!($name), "\0"));
        // SAFETY: the symbol was resolved under its own name and $ty is its
        // C prototype.
        unsafe { std::mem::transmute::<*mut libc::c_void, $ty>(ptr) }
    }};
}

/// Define an adapter whose path arguments are all plain paths and whose
/// result needs no narrowing.
///
/// ```ignore
/// path_call!(fn unlink(path: *const c_char) -> c_int; paths = [path]);
/// ```
macro_rules! path_call {
    (
        fn $name:ident($($arg:ident: $ty:ty),* $(,)?) -> $ret:ty;
        paths = [$($path:ident),+]
    ) => {
        #[no_mangle]
        pub unsafe extern "C" fn $name($($arg: $ty),*) -> $ret {
            let real = real!($name as unsafe extern "C" fn($($ty),*) -> $ret);
            $crate::syscalls::with_paths(
                stringify!($name),
                [$(vchroot_core::PathArg::path($path)),+],
                |[$($path),+]| real($($arg),*),
            )
        }
    };
}
