//! E2E tests for the inception layer
//!
//! Builds the real cdylib and runs ordinary host programs with it preloaded,
//! so the exported symbols are what gets exercised rather than the core
//! library behind them.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::OnceLock;

use tempfile::TempDir;
use vchroot_config::env;

/// Build the inception layer once per test binary. A private target
/// directory keeps this build off the lock of the one running the tests.
fn inception_layer() -> &'static Path {
    static LIBRARY: OnceLock<PathBuf> = OnceLock::new();
    LIBRARY.get_or_init(|| {
        let workspace = Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
        let target = Path::new(env!("CARGO_TARGET_TMPDIR")).join("inception-layer");
        let status = Command::new(env!("CARGO"))
            .args(["build", "--quiet", "--package", "vchroot-inception-layer", "--manifest-path"])
            .arg(workspace.join("Cargo.toml"))
            .env("CARGO_TARGET_DIR", &target)
            .env_remove(env::LD_PRELOAD)
            .status()
            .expect("Failed to execute cargo build");
        assert!(status.success(), "building the inception layer failed");

        let library = target.join("debug/libvchroot_inception_layer.so");
        assert!(library.is_file(), "{} not built", library.display());
        library
    })
}

struct Fixture {
    _dir: TempDir,
    root: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("root");
        for sub in ["etc", "home/u", "tmp"] {
            std::fs::create_dir_all(root.join(sub)).unwrap();
        }
        std::fs::write(root.join("etc/marker"), b"inside\n").unwrap();
        std::fs::write(root.join("etc/owned"), b"x").unwrap();
        std::fs::write(root.join("home/u/a.c"), b"").unwrap();
        std::fs::write(root.join("home/u/b.c"), b"").unwrap();
        let root = root.canonicalize().unwrap();
        Self { _dir: dir, root }
    }

    fn real(&self, virtual_path: &str) -> PathBuf {
        self.root.join(virtual_path.trim_start_matches('/'))
    }

    /// Run a host program with the layer preloaded and the fixture as root.
    fn run(&self, program: &str, args: &[&str]) -> Output {
        Command::new(program)
            .args(args)
            .env(env::LD_PRELOAD, inception_layer())
            .env(env::BASE, &self.root)
            .env("LC_ALL", "C")
            .env_remove(env::CROSS)
            .env_remove(env::EXCLUDE_PATH)
            .env_remove(env::FAKE_PRIVILEGED)
            .env_remove(env::LOG)
            .env_remove(env::DEBUG)
            .output()
            .expect("Failed to execute program under the inception layer")
    }

    fn sh(&self, script: &str) -> String {
        let output = self.run("/bin/sh", &["-c", script]);
        assert!(
            output.status.success(),
            "{script}: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).into_owned()
    }
}

#[test]
fn e2e_open_reads_inside_root() {
    let fx = Fixture::new();
    let output = fx.run("/bin/cat", &["/etc/marker"]);

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "inside\n");
}

#[test]
fn e2e_create_lands_inside_root() {
    let fx = Fixture::new();
    let name = format!("/vchroot-created-{}", std::process::id());

    fx.sh(&format!("echo made > {name}"));

    assert_eq!(std::fs::read(fx.real(&name)).unwrap(), b"made\n");
    assert!(!Path::new(&name).exists());
}

#[test]
fn e2e_getcwd_reports_virtual_directory() {
    let fx = Fixture::new();
    assert_eq!(fx.sh("cd /home/u && pwd -P"), "/home/u\n");
    assert_eq!(fx.sh("cd / && pwd -P"), "/\n");
}

#[test]
fn e2e_patterns_expand_in_virtual_view() {
    let fx = Fixture::new();
    assert_eq!(fx.sh("echo /home/u/*.c"), "/home/u/a.c /home/u/b.c\n");
    assert_eq!(fx.sh("cd /home/u && echo *.c"), "a.c b.c\n");
}

#[test]
fn e2e_dot_components_reach_the_kernel() {
    let fx = Fixture::new();
    let exists = |path: &str| fx.sh(&format!("if [ -e {path} ]; then echo yes; else echo no; fi"));

    assert_eq!(exists("/etc/marker"), "yes\n");
    assert_eq!(exists("/etc/marker/."), "no\n");
    assert_eq!(exists("/etc/missing/../marker"), "no\n");
    assert_eq!(exists("/../../etc/marker"), "yes\n");
}

#[test]
fn e2e_chown_then_stat_in_one_process() {
    // One process has to do both; the recorded owner lives in its memory.
    let perl = "/usr/bin/perl";
    if !Path::new(perl).exists() {
        eprintln!("skipping: {perl} not installed");
        return;
    }
    let fx = Fixture::new();
    let output = fx.run(
        perl,
        &[
            "-e",
            r#"chown(4242, 4242, "/etc/owned") or die "chown: $!\n"; print((stat "/etc/owned")[4], "\n");"#,
        ],
    );

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "4242\n");
}
