//! The generic adapter every intercepted entry point goes through.
//!
//! An adapter names its call in [`CALL_TABLE`], hands its path arguments to
//! [`Facade::invoke`] and calls the real implementation with the translated
//! pointers. Output paths come back through the `narrow_*` helpers and
//! privileged calls through [`Facade::privileged`].

use crate::context::Context;
use crate::error::Result;
use crate::path::{Translator, TEMPLATE_SUFFIX_LEN};
use crate::shadow::StatFields;
use libc::{c_char, c_int, dev_t, gid_t, mode_t, uid_t};
use std::borrow::Cow;
use std::ffi::{CStr, CString};
use vchroot_config::log_core_debug;

/// How the real function's arguments are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallShape {
    Fixed,
    /// Variadic `mode` present only when one of `flag_bits` is fully set
    /// in the flags argument.
    OptionalMode { flag_bits: &'static [c_int] },
}

impl CallShape {
    pub fn takes_mode(self, flags: c_int) -> bool {
        match self {
            CallShape::Fixed => false,
            CallShape::OptionalMode { flag_bits } => {
                flag_bits.iter().any(|&bits| flags & bits == bits)
            }
        }
    }
}

/// Path-valued output of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathResult {
    None,
    /// Return value is a path (`realpath`, `tempnam`).
    Returned,
    /// A caller buffer or structure receives paths (`getcwd`, `readlink`, `glob`).
    OutputBuffer,
    /// Caller template rewritten in place (`mkstemp`).
    InOutTemplate,
    /// Paths reported to a caller callback (`nftw`).
    WalkCallback,
    /// A stat record overlaid from the shadow store.
    Attributes,
}

/// Shadow store side effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowEffect {
    None,
    Owner,
    Device,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSignature {
    pub name: &'static str,
    /// Zero-based positions of path arguments that are expanded.
    pub path_args: &'static [usize],
    pub shape: CallShape,
    pub result: PathResult,
    pub effect: ShadowEffect,
}

impl CallSignature {
    /// Whether the adapter gets the facade to rewrite outputs.
    pub fn has_output(&self) -> bool {
        self.result != PathResult::None
    }

    /// Whether a privileged `request` is something this call records.
    pub fn records(&self, request: &ShadowRequest) -> bool {
        matches!(
            (self.effect, request),
            (ShadowEffect::Owner, ShadowRequest::Owner { .. })
                | (ShadowEffect::Device, ShadowRequest::Device { .. })
        )
    }
}

const fn sig(
    name: &'static str,
    path_args: &'static [usize],
    shape: CallShape,
    result: PathResult,
    effect: ShadowEffect,
) -> CallSignature {
    CallSignature {
        name,
        path_args,
        shape,
        result,
        effect,
    }
}

const OPEN_MODE: CallShape = CallShape::OptionalMode {
    flag_bits: &[libc::O_CREAT, libc::O_TMPFILE],
};

/// Every intercepted entry point, sorted by name.
///
/// `symlink` expands only the link path: the target text is stored as
/// written. `fts_open` expands each element of its argv array, and the
/// entries `fts_read` and `fts_children` return carry narrowed paths.
pub const CALL_TABLE: &[CallSignature] = &[
    sig("__fxstatat", &[2], CallShape::Fixed, PathResult::Attributes, ShadowEffect::None),
    sig("__fxstatat64", &[2], CallShape::Fixed, PathResult::Attributes, ShadowEffect::None),
    sig("__lxstat", &[1], CallShape::Fixed, PathResult::Attributes, ShadowEffect::None),
    sig("__lxstat64", &[1], CallShape::Fixed, PathResult::Attributes, ShadowEffect::None),
    sig("__open", &[0], OPEN_MODE, PathResult::None, ShadowEffect::None),
    sig("__open64", &[0], OPEN_MODE, PathResult::None, ShadowEffect::None),
    sig("__open64_2", &[0], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("__open_2", &[0], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("__xmknod", &[1], CallShape::Fixed, PathResult::None, ShadowEffect::Device),
    sig("__xmknodat", &[2], CallShape::Fixed, PathResult::None, ShadowEffect::Device),
    sig("__xstat", &[1], CallShape::Fixed, PathResult::Attributes, ShadowEffect::None),
    sig("__xstat64", &[1], CallShape::Fixed, PathResult::Attributes, ShadowEffect::None),
    sig("access", &[0], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("acct", &[0], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("canonicalize_file_name", &[0], CallShape::Fixed, PathResult::Returned, ShadowEffect::None),
    sig("chdir", &[0], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("chmod", &[0], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("chown", &[0], CallShape::Fixed, PathResult::None, ShadowEffect::Owner),
    sig("chroot", &[0], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("creat", &[0], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("creat64", &[0], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("dlmopen", &[1], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("dlopen", &[0], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("eaccess", &[0], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("euidaccess", &[0], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("execv", &[0], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("execve", &[0], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("faccessat", &[1], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("fchmodat", &[1], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("fchownat", &[1], CallShape::Fixed, PathResult::None, ShadowEffect::Owner),
    sig("fopen", &[0], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("fopen64", &[0], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("freopen", &[0], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("freopen64", &[0], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("fstatat", &[1], CallShape::Fixed, PathResult::Attributes, ShadowEffect::None),
    sig("fstatat64", &[1], CallShape::Fixed, PathResult::Attributes, ShadowEffect::None),
    sig("fts64_children", &[], CallShape::Fixed, PathResult::Returned, ShadowEffect::None),
    sig("fts64_close", &[], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("fts64_open", &[0], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("fts64_read", &[], CallShape::Fixed, PathResult::Returned, ShadowEffect::None),
    sig("fts_children", &[], CallShape::Fixed, PathResult::Returned, ShadowEffect::None),
    sig("fts_close", &[], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("fts_open", &[0], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("fts_read", &[], CallShape::Fixed, PathResult::Returned, ShadowEffect::None),
    sig("ftw", &[0], CallShape::Fixed, PathResult::WalkCallback, ShadowEffect::None),
    sig("ftw64", &[0], CallShape::Fixed, PathResult::WalkCallback, ShadowEffect::None),
    sig("get_current_dir_name", &[], CallShape::Fixed, PathResult::Returned, ShadowEffect::None),
    sig("getcwd", &[], CallShape::Fixed, PathResult::OutputBuffer, ShadowEffect::None),
    sig("getwd", &[], CallShape::Fixed, PathResult::OutputBuffer, ShadowEffect::None),
    sig("getxattr", &[0], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("glob", &[0], CallShape::Fixed, PathResult::OutputBuffer, ShadowEffect::None),
    sig("glob64", &[0], CallShape::Fixed, PathResult::OutputBuffer, ShadowEffect::None),
    sig("lchmod", &[0], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("lchown", &[0], CallShape::Fixed, PathResult::None, ShadowEffect::Owner),
    sig("lgetxattr", &[0], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("link", &[0, 1], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("linkat", &[1, 3], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("listxattr", &[0], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("llistxattr", &[0], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("lremovexattr", &[0], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("lsetxattr", &[0], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("lstat", &[0], CallShape::Fixed, PathResult::Attributes, ShadowEffect::None),
    sig("lstat64", &[0], CallShape::Fixed, PathResult::Attributes, ShadowEffect::None),
    sig("lutimes", &[0], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("mkdir", &[0], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("mkdirat", &[1], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("mkdtemp", &[0], CallShape::Fixed, PathResult::InOutTemplate, ShadowEffect::None),
    sig("mkfifo", &[0], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("mkfifoat", &[1], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("mknod", &[0], CallShape::Fixed, PathResult::None, ShadowEffect::Device),
    sig("mknodat", &[1], CallShape::Fixed, PathResult::None, ShadowEffect::Device),
    sig("mkstemp", &[0], CallShape::Fixed, PathResult::InOutTemplate, ShadowEffect::None),
    sig("mkstemp64", &[0], CallShape::Fixed, PathResult::InOutTemplate, ShadowEffect::None),
    sig("mktemp", &[0], CallShape::Fixed, PathResult::InOutTemplate, ShadowEffect::None),
    sig("nftw", &[0], CallShape::Fixed, PathResult::WalkCallback, ShadowEffect::None),
    sig("nftw64", &[0], CallShape::Fixed, PathResult::WalkCallback, ShadowEffect::None),
    sig("open", &[0], OPEN_MODE, PathResult::None, ShadowEffect::None),
    sig("open64", &[0], OPEN_MODE, PathResult::None, ShadowEffect::None),
    sig("openat", &[1], OPEN_MODE, PathResult::None, ShadowEffect::None),
    sig("openat64", &[1], OPEN_MODE, PathResult::None, ShadowEffect::None),
    sig("opendir", &[0], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("pathconf", &[0], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("readlink", &[0], CallShape::Fixed, PathResult::OutputBuffer, ShadowEffect::None),
    sig("readlinkat", &[1], CallShape::Fixed, PathResult::OutputBuffer, ShadowEffect::None),
    sig("realpath", &[0], CallShape::Fixed, PathResult::Returned, ShadowEffect::None),
    sig("remove", &[0], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("removexattr", &[0], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("rename", &[0, 1], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("renameat", &[1, 3], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("rmdir", &[0], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("scandir", &[0], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("scandir64", &[0], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("setxattr", &[0], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("stat", &[0], CallShape::Fixed, PathResult::Attributes, ShadowEffect::None),
    sig("stat64", &[0], CallShape::Fixed, PathResult::Attributes, ShadowEffect::None),
    sig("symlink", &[1], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("symlinkat", &[2], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("tempnam", &[0], CallShape::Fixed, PathResult::Returned, ShadowEffect::None),
    sig("tmpnam", &[], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("truncate", &[0], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("truncate64", &[0], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("unlink", &[0], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("unlinkat", &[1], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("utime", &[0], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("utimensat", &[1], CallShape::Fixed, PathResult::None, ShadowEffect::None),
    sig("utimes", &[0], CallShape::Fixed, PathResult::None, ShadowEffect::None),
];

/// Signature for an intercepted name.
pub fn signature(name: &str) -> Option<&'static CallSignature> {
    CALL_TABLE
        .binary_search_by(|sig| sig.name.cmp(name))
        .ok()
        .map(|idx| &CALL_TABLE[idx])
}

/// The value a wrapped call returns on failure.
pub trait FailureReturn {
    fn failure() -> Self;
}

impl FailureReturn for c_int {
    fn failure() -> Self {
        -1
    }
}

impl FailureReturn for isize {
    fn failure() -> Self {
        -1
    }
}

impl FailureReturn for i64 {
    fn failure() -> Self {
        -1
    }
}

impl<T> FailureReturn for *mut T {
    fn failure() -> Self {
        std::ptr::null_mut()
    }
}

/// One path argument as handed over by an adapter.
#[derive(Debug, Clone, Copy)]
pub enum PathArg<'p> {
    /// NULL pointer, passed on as NULL.
    Null,
    Path(&'p CStr),
    /// Relative to a directory descriptor (`*at` calls).
    At(c_int, &'p CStr),
    /// Passed through untranslated (`symlink` targets).
    Verbatim(&'p CStr),
}

impl<'p> PathArg<'p> {
    /// # Safety
    /// `ptr` is NULL or a valid C string outliving `'p`.
    pub unsafe fn path(ptr: *const c_char) -> Self {
        if ptr.is_null() {
            PathArg::Null
        } else {
            PathArg::Path(CStr::from_ptr(ptr))
        }
    }

    /// # Safety
    /// As for [`PathArg::path`].
    pub unsafe fn at(dirfd: c_int, ptr: *const c_char) -> Self {
        if ptr.is_null() {
            PathArg::Null
        } else {
            PathArg::At(dirfd, CStr::from_ptr(ptr))
        }
    }

    /// # Safety
    /// As for [`PathArg::path`].
    pub unsafe fn verbatim(ptr: *const c_char) -> Self {
        if ptr.is_null() {
            PathArg::Null
        } else {
            PathArg::Verbatim(CStr::from_ptr(ptr))
        }
    }
}

impl PathArg<'_> {
    /// Relative to a real directory descriptor rather than the cwd.
    fn is_dirfd_relative(&self) -> bool {
        match self {
            PathArg::At(dirfd, p) => *dirfd != libc::AT_FDCWD && p.to_bytes().first() != Some(&b'/'),
            _ => false,
        }
    }
}

/// Translated arguments, owned for the duration of the real call.
pub struct Prepared<'p, const N: usize> {
    args: [Option<Cow<'p, CStr>>; N],
    dirfd_relative: [bool; N],
}

impl<'p, const N: usize> Prepared<'p, N> {
    /// The arguments exactly as given, for calls made from inside the layer.
    pub fn untranslated(args: [PathArg<'p>; N]) -> Self {
        Self {
            dirfd_relative: args.map(|arg| arg.is_dirfd_relative()),
            args: args.map(|arg| match arg {
                PathArg::Null => None,
                PathArg::Path(p) | PathArg::At(_, p) | PathArg::Verbatim(p) => {
                    Some(Cow::Borrowed(p))
                }
            }),
        }
    }

    pub fn ptr(&self, i: usize) -> *const c_char {
        match &self.args[i] {
            Some(arg) => arg.as_ptr(),
            None => std::ptr::null(),
        }
    }

    pub fn ptrs(&self) -> [*const c_char; N] {
        std::array::from_fn(|i| self.ptr(i))
    }

    /// The path as handed to the kernel.
    pub fn real(&self, i: usize) -> Option<&CStr> {
        self.args[i].as_deref()
    }

    /// The real path when it names a file without a directory descriptor,
    /// i.e. one the shadow store can key.
    pub fn keyable(&self, i: usize) -> Option<&CStr> {
        if self.dirfd_relative[i] {
            return None;
        }
        self.real(i)
    }
}

/// Attributes a privileged call asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowRequest {
    Owner { uid: uid_t, gid: gid_t },
    Device { mode: mode_t, dev: dev_t },
}

/// Outcome of a privileged call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privileged {
    /// The real call succeeded with this value.
    Real(c_int),
    /// The kernel refused with EPERM and success is reported instead.
    Faked,
    /// Failed with this errno.
    Failed(c_int),
}

impl Privileged {
    pub fn rc(self) -> c_int {
        match self {
            Privileged::Real(rc) => rc,
            Privileged::Faked => 0,
            Privileged::Failed(_) => -1,
        }
    }
}

pub struct Facade<'c> {
    ctx: &'c Context,
}

impl<'c> Facade<'c> {
    pub fn new(ctx: &'c Context) -> Self {
        Self { ctx }
    }

    pub fn translator(&self) -> Translator<'c> {
        self.ctx.translator()
    }

    /// Expand every argument. Fails before anything reaches the kernel.
    pub fn prepare<'p, const N: usize>(&self, args: [PathArg<'p>; N]) -> Result<Prepared<'p, N>> {
        let t = self.translator();
        let dirfd_relative = args.map(|arg| arg.is_dirfd_relative());
        let mut out: [Option<Cow<'p, CStr>>; N] = std::array::from_fn(|_| None);
        for (slot, arg) in out.iter_mut().zip(args) {
            *slot = match arg {
                PathArg::Null => None,
                PathArg::Path(p) => Some(t.expand_cstr(p)?),
                PathArg::At(dirfd, p) => Some(t.expand_at_cstr(dirfd, p)?),
                PathArg::Verbatim(p) => Some(Cow::Borrowed(p)),
            };
        }
        Ok(Prepared {
            args: out,
            dirfd_relative,
        })
    }

    /// expand -> delegate. A translation failure is returned without the
    /// delegate ever running; the delegate's own result is untouched.
    ///
    /// `args` carries one entry per path position in `sig`.
    pub fn invoke<'p, R, const N: usize>(
        &self,
        sig: &CallSignature,
        args: [PathArg<'p>; N],
        delegate: impl FnOnce(&Prepared<'p, N>) -> R,
    ) -> Result<R> {
        debug_assert_eq!(
            N,
            sig.path_args.len(),
            "{} hands over a different number of paths than its signature",
            sig.name
        );
        let prepared = self.prepare(args).inspect_err(|e| {
            log_core_debug!("translation refused", call = sig.name, error = tracing::field::display(e));
        })?;
        Ok(delegate(&prepared))
    }

    /// Run an ownership or device-node call. `delegate` returns the real
    /// result or the errno it failed with; `placeholder` creates a regular
    /// file with the given permission bits when a device node is faked.
    pub fn privileged<'p, const N: usize>(
        &self,
        sig: &CallSignature,
        args: [PathArg<'p>; N],
        target: usize,
        request: ShadowRequest,
        delegate: impl FnOnce(&Prepared<'p, N>) -> std::result::Result<c_int, c_int>,
        placeholder: impl FnOnce(&CStr, mode_t) -> std::result::Result<(), c_int>,
    ) -> Result<Privileged> {
        // A call whose row records nothing keeps the kernel's answer.
        let records = sig.records(&request);
        self.invoke(sig, args, |prepared| {
            let Some(real) = prepared.real(target) else {
                return Privileged::Failed(libc::EFAULT);
            };
            let key = prepared.keyable(target);
            match delegate(prepared) {
                Ok(rc) => {
                    if records && records_real_success(request) {
                        self.record(key, request);
                    }
                    Privileged::Real(rc)
                }
                Err(libc::EPERM) if records && self.ctx.settings.fake_privileged => {
                    if let ShadowRequest::Device { mode, .. } = request {
                        if let Err(errno) = placeholder(real, mode & 0o7777) {
                            return Privileged::Failed(errno);
                        }
                    }
                    self.record(key, request);
                    log_core_debug!(
                        "privileged call faked",
                        call = sig.name,
                        path = tracing::field::display(real.to_string_lossy())
                    );
                    Privileged::Faked
                }
                Err(errno) => Privileged::Failed(errno),
            }
        })
    }

    fn record(&self, real: Option<&CStr>, request: ShadowRequest) {
        let Some(key) = real.and_then(|real| self.translator().shadow_key(real.to_bytes())) else {
            return;
        };
        match request {
            ShadowRequest::Owner { uid, gid } => self.ctx.shadow.record_owner(&key, uid, gid),
            ShadowRequest::Device { mode, dev } => self.ctx.shadow.record_device(&key, mode, dev),
        }
    }

    /// Overlay shadow attributes for the real path a stat call used.
    pub fn overlay_stat<S: StatFields>(&self, real: &CStr, st: &mut S) -> bool {
        match self.translator().shadow_key(real.to_bytes()) {
            Some(key) => self.ctx.shadow.overlay(&key, st),
            None => false,
        }
    }

    /// Narrow a NUL-terminated real path held in `buf`, in place. Returns
    /// the new length, or `None` when `buf` holds no terminator.
    pub fn narrow_into(&self, buf: &mut [u8]) -> Option<usize> {
        let len = buf.iter().position(|&b| b == 0)?;
        let narrowed = self.translator().narrow(&buf[..len]).into_owned();
        // narrow never lengthens a path
        let n = narrowed.len().min(len);
        buf[..n].copy_from_slice(&narrowed[..n]);
        buf[n] = 0;
        Some(n)
    }

    /// Narrow `real` and copy it into `out` without a terminator,
    /// truncating like `readlink`. Returns the copied length.
    pub fn narrow_truncated(&self, real: &[u8], out: &mut [u8]) -> usize {
        let narrowed = self.translator().narrow(real);
        let n = narrowed.len().min(out.len());
        out[..n].copy_from_slice(&narrowed[..n]);
        n
    }

    /// Copy the generated `XXXXXX` suffix from the expanded template back
    /// into the caller's template. An emptied template (failure) empties
    /// the caller's as well.
    pub fn copy_template_suffix(&self, real: &[u8], caller: &mut [u8]) {
        if real.is_empty() {
            if let Some(first) = caller.first_mut() {
                *first = 0;
            }
            return;
        }
        let n = TEMPLATE_SUFFIX_LEN.min(real.len()).min(caller.len());
        let dst = caller.len() - n;
        caller[dst..].copy_from_slice(&real[real.len() - n..]);
    }

    /// Narrowed path for a tree-walk callback with `base` (offset of the
    /// last component) rebased onto it.
    pub fn narrow_walk_entry<'p>(&self, path: &'p CStr, base: c_int) -> Result<(Cow<'p, CStr>, c_int)> {
        let narrowed = self.translator().narrow_cstr(path)?;
        let removed = path.to_bytes().len() - narrowed.to_bytes().len();
        let base = (base.max(0) as usize).saturating_sub(removed);
        let base = base.min(narrowed.to_bytes().len()) as c_int;
        Ok((narrowed, base))
    }

    /// Narrowed copy of an fts entry path, with `pathlen` shortened by the
    /// prefix removed. Child entries carry a `pathlen` past the text their
    /// shared buffer holds, so it is adjusted rather than recomputed.
    /// `None` when the path needs no narrowing.
    pub fn narrow_fts_path(&self, path: &CStr, pathlen: u16) -> Option<(CString, u16)> {
        match self.translator().narrow_cstr(path) {
            Ok(Cow::Owned(narrowed)) => {
                let removed = path.to_bytes().len() - narrowed.to_bytes().len();
                let pathlen = pathlen.saturating_sub(removed as u16);
                Some((narrowed, pathlen))
            }
            _ => None,
        }
    }

    /// Where `dlopen(name)` loads from.
    pub fn library_target<'p>(&self, name: &'p CStr) -> Result<Cow<'p, CStr>> {
        match self.translator().library_target(name.to_bytes())? {
            Cow::Borrowed(_) => Ok(Cow::Borrowed(name)),
            Cow::Owned(bytes) => Ok(Cow::Owned(crate::path::to_cstring(bytes)?)),
        }
    }
}

fn records_real_success(request: ShadowRequest) -> bool {
    match request {
        ShadowRequest::Owner { .. } => true,
        // A real regular file or fifo already reports its own type.
        ShadowRequest::Device { mode, .. } => {
            matches!(mode & libc::S_IFMT, libc::S_IFCHR | libc::S_IFBLK)
        }
    }
}
