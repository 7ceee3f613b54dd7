//! Facade tests against a real fake-root on disk.
//!
//! The delegates here call libc directly, standing in for the symbols the
//! inception layer resolves at load time.

use libc::{c_int, c_void};
use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::ptr::NonNull;
use std::sync::Mutex;
use vchroot_config::testing::TestEnvironment;
use vchroot_config::ShimSettings;
use vchroot_core::resolver::SymbolSource;
use vchroot_core::{signature, Context, CwdSource, Environ, PathArg, Privileged, ShadowRequest};

#[derive(Default)]
struct MemEnv(Mutex<HashMap<String, String>>);

impl Environ for MemEnv {
    fn get(&self, key: &str) -> Option<String> {
        self.0.lock().unwrap().get(key).cloned()
    }
    fn set(&self, key: &str, value: &str) {
        self.0.lock().unwrap().insert(key.into(), value.into());
    }
}

struct NoSymbols;

impl SymbolSource for NoSymbols {
    fn lookup(&self, _name: &CStr) -> Option<NonNull<c_void>> {
        None
    }
}

struct Cwd(Vec<u8>);

impl CwdSource for Cwd {
    fn real_cwd(&self) -> Option<Vec<u8>> {
        Some(self.0.clone())
    }
}

fn context(env: &TestEnvironment, cwd: &str) -> Context {
    let root = env.root.to_str().unwrap().to_string();
    let settings = ShimSettings {
        base: Some(root.clone()),
        ..Default::default()
    };
    Context::new(
        settings,
        Box::new(MemEnv::default()),
        Box::new(NoSymbols),
        Box::new(Cwd(format!("{root}{cwd}").into_bytes())),
        None,
    )
}

fn errno() -> c_int {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

#[test]
fn test_open_reads_file_inside_root() {
    let env = TestEnvironment::new().unwrap();
    let ctx = context(&env, "/");
    let facade = ctx.facade();

    let fd = facade
        .invoke(
            signature("open").unwrap(),
            [PathArg::Path(c"/etc/passwd")],
            |p| unsafe { libc::open(p.ptr(0), libc::O_RDONLY) },
        )
        .unwrap();
    assert!(fd >= 0);

    let mut buf = [0u8; 64];
    let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut c_void, buf.len()) };
    unsafe { libc::close(fd) };
    assert!(n > 0);
    assert!(buf.starts_with(b"root:x:0:0"));
}

#[test]
fn test_relative_path_climbing_out_is_anchored_at_root() {
    let env = TestEnvironment::new().unwrap();
    env.create_file("/home/u/notes.txt", b"hi").unwrap();
    let ctx = context(&env, "/home/u");
    let facade = ctx.facade();

    // Inside the root the kernel resolves relative paths from the real cwd.
    let kept = facade
        .invoke(signature("access").unwrap(), [PathArg::Path(c"notes.txt")], |p| {
            p.real(0).unwrap().to_owned()
        })
        .unwrap();
    assert_eq!(kept.as_c_str(), c"notes.txt");

    // Climbing past the virtual `/` stops there instead of leaving the root.
    let rc = facade
        .invoke(
            signature("access").unwrap(),
            [PathArg::Path(c"../../../../home/u/notes.txt")],
            |p| unsafe { libc::access(p.ptr(0), libc::R_OK) },
        )
        .unwrap();
    assert_eq!(rc, 0);
}

#[test]
fn test_kernel_reports_dot_and_dotdot_errors() {
    let env = TestEnvironment::new().unwrap();
    let ctx = context(&env, "/");
    let facade = ctx.facade();

    let stat_errno = |path: &CStr| {
        facade
            .invoke(signature("stat").unwrap(), [PathArg::Path(path)], |p| {
                let mut st: libc::stat = unsafe { std::mem::zeroed() };
                let rc = unsafe { libc::stat(p.ptr(0), &mut st) };
                if rc == 0 {
                    0
                } else {
                    errno()
                }
            })
            .unwrap()
    };
    assert_eq!(stat_errno(c"/etc/passwd"), 0);
    assert_eq!(stat_errno(c"/etc/passwd/."), libc::ENOTDIR);
    assert_eq!(stat_errno(c"/etc/missing/../passwd"), libc::ENOENT);
    assert_eq!(stat_errno(c"/../../etc/passwd"), 0);
}

#[test]
fn test_missing_file_errno_untouched() {
    let env = TestEnvironment::new().unwrap();
    let ctx = context(&env, "/");
    let facade = ctx.facade();

    let (rc, err) = facade
        .invoke(
            signature("unlink").unwrap(),
            [PathArg::Path(c"/no/such/file")],
            |p| {
                let rc = unsafe { libc::unlink(p.ptr(0)) };
                (rc, errno())
            },
        )
        .unwrap();
    assert_eq!(rc, -1);
    assert_eq!(err, libc::ENOENT);
}

#[test]
fn test_chown_faked_then_stat_overlaid() {
    let env = TestEnvironment::new().unwrap();
    env.create_file("/etc/owned", b"x").unwrap();
    let ctx = context(&env, "/");
    let facade = ctx.facade();

    let outcome = facade
        .privileged(
            signature("chown").unwrap(),
            [PathArg::Path(c"/etc/owned")],
            0,
            ShadowRequest::Owner { uid: 4242, gid: 77 },
            |p| {
                let rc = unsafe { libc::chown(p.ptr(0), 4242, 77) };
                if rc == 0 {
                    Ok(0)
                } else {
                    Err(errno())
                }
            },
            |_, _| Ok(()),
        )
        .unwrap();
    // Root in a container may really succeed; either way the owner reads back.
    assert!(matches!(outcome, Privileged::Faked | Privileged::Real(0)));

    let mut st: libc::stat = unsafe { std::mem::zeroed() };
    let rc = facade
        .invoke(
            signature("stat").unwrap(),
            [PathArg::Path(c"/etc/owned")],
            |p| {
                let rc = unsafe { libc::stat(p.ptr(0), &mut st) };
                if rc == 0 {
                    facade.overlay_stat(p.real(0).unwrap(), &mut st);
                }
                rc
            },
        )
        .unwrap();
    assert_eq!(rc, 0);
    assert_eq!((st.st_uid, st.st_gid), (4242, 77));
}

#[test]
fn test_unrecorded_stat_is_real() {
    let env = TestEnvironment::new().unwrap();
    let ctx = context(&env, "/");
    let facade = ctx.facade();

    let mut st: libc::stat = unsafe { std::mem::zeroed() };
    facade
        .invoke(
            signature("stat").unwrap(),
            [PathArg::Path(c"/etc/passwd")],
            |p| {
                let rc = unsafe { libc::stat(p.ptr(0), &mut st) };
                assert_eq!(rc, 0);
                assert!(!facade.overlay_stat(p.real(0).unwrap(), &mut st));
            },
        )
        .unwrap();
    assert_eq!(st.st_uid, unsafe { libc::getuid() });
}

#[test]
fn test_mkstemp_template_round_trip() {
    let env = TestEnvironment::new().unwrap();
    let ctx = context(&env, "/");
    let facade = ctx.facade();

    let mut caller = *b"/tmp/vchrootXXXXXX";
    let template = CString::new(&caller[..]).unwrap();
    let prepared = facade.prepare([PathArg::Path(&template)]).unwrap();
    let mut real = prepared.real(0).unwrap().to_bytes_with_nul().to_vec();

    let fd = unsafe { libc::mkstemp(real.as_mut_ptr() as *mut libc::c_char) };
    assert!(fd >= 0);
    unsafe { libc::close(fd) };

    let real_len = real.len() - 1;
    facade.copy_template_suffix(&real[..real_len], &mut caller);
    assert!(!caller.ends_with(b"XXXXXX"));

    let virtual_path = std::str::from_utf8(&caller).unwrap();
    assert!(env.real(virtual_path).is_file());
}

#[test]
fn test_realpath_narrowed() {
    let env = TestEnvironment::new().unwrap();
    let ctx = context(&env, "/");
    let facade = ctx.facade();

    let resolved = facade
        .invoke(
            signature("realpath").unwrap(),
            [PathArg::Path(c"/etc/../etc/passwd")],
            |p| unsafe { libc::realpath(p.ptr(0), std::ptr::null_mut()) },
        )
        .unwrap();
    assert!(!resolved.is_null());

    let len = unsafe { libc::strlen(resolved) };
    let buf = unsafe { std::slice::from_raw_parts_mut(resolved as *mut u8, len + 1) };
    let n = facade.narrow_into(buf).unwrap();
    assert_eq!(&buf[..n], b"/etc/passwd");
    unsafe { libc::free(resolved as *mut c_void) };
}
