//! Translation properties through the public API.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use vchroot_config::{env, ShimSettings};
use vchroot_core::resolver::NextInScope;
use vchroot_core::{clean, Context, CwdSource, Environ, TranslateError};

#[derive(Clone, Default)]
struct MemEnv(Arc<Mutex<HashMap<String, String>>>);

impl Environ for MemEnv {
    fn get(&self, key: &str) -> Option<String> {
        self.0.lock().unwrap().get(key).cloned()
    }
    fn set(&self, key: &str, value: &str) {
        self.0.lock().unwrap().insert(key.into(), value.into());
    }
}

struct Cwd(&'static str);

impl CwdSource for Cwd {
    fn real_cwd(&self) -> Option<Vec<u8>> {
        Some(self.0.as_bytes().to_vec())
    }
}

fn context(base: Option<&str>, env: MemEnv) -> Context {
    let settings = ShimSettings {
        base: base.map(str::to_string),
        ..Default::default()
    };
    Context::new(
        settings,
        Box::new(env),
        Box::new(NextInScope),
        Box::new(Cwd("/srv/chroot/home/u")),
        None,
    )
}

const SAMPLES: &[&str] = &[
    "/",
    "/etc/passwd",
    "/usr//lib/./x.so",
    "/a/b/../../c",
    "/var/log/",
    "/srv/chroot-like",
];

#[test]
fn test_no_root_is_identity() {
    let ctx = context(None, MemEnv::default());
    let t = ctx.translator();
    for p in SAMPLES {
        assert_eq!(t.expand(p.as_bytes()).unwrap().as_ref(), p.as_bytes());
        assert_eq!(t.narrow(p.as_bytes()).as_ref(), p.as_bytes());
    }
}

#[test]
fn test_round_trip_and_idempotence() {
    let ctx = context(Some("/srv/chroot"), MemEnv::default());
    let t = ctx.translator();
    for p in SAMPLES {
        let real = t.expand(p.as_bytes()).unwrap().into_owned();
        assert_eq!(t.narrow(&real).as_ref(), clean(p.as_bytes()).as_slice(), "{p}");
        assert_eq!(t.expand(&real).unwrap().as_ref(), real.as_slice(), "{p}");
    }
}

#[test]
fn test_getcwd_scenario() {
    let ctx = context(Some("/srv/chroot"), MemEnv::default());
    let mut buf = [0u8; 32];
    buf[..19].copy_from_slice(b"/srv/chroot/home/u\0");
    let n = ctx.facade().narrow_into(&mut buf).unwrap();
    assert_eq!(&buf[..=n], b"/home/u\0");
}

#[test]
fn test_escape_passthrough() {
    let ctx = context(Some("/root"), MemEnv::default());
    assert_eq!(
        ctx.translator().narrow(b"/outside/root/thing").as_ref(),
        b"/outside/root/thing"
    );
}

#[test]
fn test_length_boundary_at_max_path() {
    let ctx = context(Some("/srv/chroot"), MemEnv::default());
    let t = ctx.translator();
    let room = vchroot_core::MAX_PATH - "/srv/chroot".len() - 1;

    let fits = format!("/{}", "a".repeat(room));
    let expanded = t.expand(fits.as_bytes()).unwrap().into_owned();
    assert_eq!(expanded.len(), vchroot_core::MAX_PATH);
    // With its terminator the longest accepted path still fits the kernel's buffer.
    let terminated = std::ffi::CString::new(expanded).unwrap();
    assert_eq!(terminated.as_bytes_with_nul().len(), libc::PATH_MAX as usize);

    let over = format!("/{}", "a".repeat(room + 1));
    assert!(matches!(
        t.expand(over.as_bytes()),
        Err(TranslateError::NameTooLong { .. })
    ));
}

#[test]
fn test_activation_exclusivity() {
    let environ = MemEnv::default();
    let ctx = context(None, environ.clone());

    ctx.root.activate("/root/a").unwrap();
    assert!(matches!(
        ctx.root.activate("/root/b"),
        Err(TranslateError::AlreadyActive { .. })
    ));
    assert_eq!(ctx.root.current().unwrap().virtual_root, "/root/a");
    assert_eq!(environ.get(env::BASE).as_deref(), Some("/root/a"));
}

#[test]
fn test_relative_from_virtual_cwd() {
    let ctx = context(Some("/srv/chroot"), MemEnv::default());
    let t = ctx.translator();
    // Inside the root the real cwd resolves it.
    assert_eq!(t.expand(b"../../tmp/x").unwrap().as_ref(), b"../../tmp/x");
    assert_eq!(t.expand(b"*.c").unwrap().as_ref(), b"*.c");
    // One level too many stops at the virtual `/`.
    assert_eq!(
        t.expand(b"../../../tmp/x").unwrap().as_ref(),
        b"/srv/chroot/home/u/../../tmp/x"
    );
}
