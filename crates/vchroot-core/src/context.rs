//! The one process-scoped object every adapter reaches through.

use crate::error::{Result, TranslateError};
use crate::facade::Facade;
use crate::path::{CwdSource, PathPolicy, Translator, MAX_PATH};
use crate::resolver::{NextInScope, RealSymbol, SymbolRegistry, SymbolSource};
use crate::root::{Environ, ProcessEnviron, RootState};
use crate::shadow::ShadowStore;
use libc::{c_char, c_int, c_void};
use once_cell::sync::OnceCell;
use std::ffi::CStr;
use vchroot_config::{log_core_debug, ShimSettings};

static GLOBAL: OnceCell<Context> = OnceCell::new();

pub struct Context {
    pub settings: ShimSettings,
    pub root: RootState,
    pub shadow: ShadowStore,
    pub policy: PathPolicy,
    pub symbols: SymbolRegistry,
    cwd: Box<dyn CwdSource>,
}

impl Context {
    pub fn new(
        settings: ShimSettings,
        env: Box<dyn Environ>,
        symbols: Box<dyn SymbolSource>,
        cwd: Box<dyn CwdSource>,
        own_location: Option<String>,
    ) -> Self {
        let policy = PathPolicy::from_settings(&settings, own_location);
        let root = RootState::new(&settings, env, policy.max_len);
        Self {
            settings,
            root,
            shadow: ShadowStore::new(),
            policy,
            symbols: SymbolRegistry::new(symbols),
            cwd,
        }
    }

    /// Context for the current process: settings from the environment,
    /// `dlsym(RTLD_NEXT)` symbols and the kernel's working directory.
    pub fn from_process_env() -> Self {
        let settings = ShimSettings::from_env();
        let cwd = RealCwd::new();
        Self::new(
            settings,
            Box::new(ProcessEnviron),
            Box::new(NextInScope),
            Box::new(cwd),
            own_location(),
        )
    }

    /// The process context, created on first use.
    pub fn global() -> &'static Context {
        GLOBAL.get_or_init(Self::from_process_env)
    }

    /// The process context if it already exists.
    pub fn get() -> Option<&'static Context> {
        GLOBAL.get()
    }

    pub fn translator(&self) -> Translator<'_> {
        Translator::new(self.root.current(), &self.policy, self.cwd.as_ref())
    }

    pub fn facade(&self) -> Facade<'_> {
        Facade::new(self)
    }

    /// `chroot(path)` without privilege: enter the directory, read back its
    /// canonical real location and make that the virtual root.
    ///
    /// `chdir` is the real `chdir`, failing with an errno.
    pub fn emulate_chroot(
        &self,
        path: &CStr,
        chdir: impl FnOnce(&CStr) -> std::result::Result<(), c_int>,
    ) -> Result<()> {
        if let Some(active) = self.root.current() {
            return Err(TranslateError::AlreadyActive {
                root: active.virtual_root.clone(),
            });
        }
        self.root.check_activatable()?;

        let real = self.translator().expand_cstr(path)?;
        chdir(&real).map_err(|errno| TranslateError::Io(std::io::Error::from_raw_os_error(errno)))?;

        let cwd = self
            .cwd
            .real_cwd()
            .ok_or_else(|| TranslateError::Io(std::io::Error::last_os_error()))?;
        let cwd = String::from_utf8(cwd).map_err(|_| TranslateError::InteriorNul)?;
        self.root.activate(&cwd)
    }
}

/// Directory holding the library this code is linked into.
fn own_location() -> Option<String> {
    let mut info: libc::Dl_info = unsafe { std::mem::zeroed() };
    let addr = own_location as *const c_void;
    // SAFETY: dladdr only inspects the address and fills `info`.
    if unsafe { libc::dladdr(addr, &mut info) } == 0 || info.dli_fname.is_null() {
        return None;
    }
    // SAFETY: dli_fname is a NUL-terminated string owned by the loader.
    let fname = unsafe { CStr::from_ptr(info.dli_fname) }.to_str().ok()?;
    let (dir, _) = fname.rsplit_once('/')?;
    if dir.is_empty() {
        return None;
    }
    log_core_debug!("own location", dir = dir);
    Some(dir.to_string())
}

/// The working directory as the kernel reports it, through the real
/// `getcwd` so the answer is never narrowed.
pub struct RealCwd {
    getcwd: Option<RealSymbol>,
}

type GetcwdFn = unsafe extern "C" fn(*mut c_char, libc::size_t) -> *mut c_char;

impl RealCwd {
    pub fn new() -> Self {
        Self {
            getcwd: RealSymbol::new("getcwd"),
        }
    }
}

impl Default for RealCwd {
    fn default() -> Self {
        Self::new()
    }
}

impl CwdSource for RealCwd {
    fn real_cwd(&self) -> Option<Vec<u8>> {
        let f = self.getcwd.as_ref()?.get(&NextInScope)?;
        // SAFETY: the resolved symbol is libc's getcwd.
        let getcwd: GetcwdFn = unsafe { std::mem::transmute(f.as_ptr()) };
        let mut buf = vec![0u8; MAX_PATH + 1];
        // SAFETY: buf is writable for its full length.
        let ret = unsafe { getcwd(buf.as_mut_ptr() as *mut c_char, buf.len()) };
        if ret.is_null() {
            return None;
        }
        let len = buf.iter().position(|&b| b == 0)?;
        buf.truncate(len);
        Some(buf)
    }
}
