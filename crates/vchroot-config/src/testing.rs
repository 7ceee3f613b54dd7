//! Test environment abstraction for isolated testing.
//!
//! Provides `TestEnvironment` to manage a throwaway virtual root laid out like
//! a minimal system image:
//!
//! ```text
//! <tmp>/root/etc/passwd
//! <tmp>/root/home/u/
//! <tmp>/root/usr/lib/
//! <tmp>/root/lib/
//! <tmp>/cross/usr/lib/   (cross root)
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use vchroot_config::testing::TestEnvironment;
//!
//! let env = TestEnvironment::new().unwrap();
//! let vars = env.shim_env();
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use tempfile::TempDir;

/// Atomic counter for unique test IDs
static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Isolated fake root with unique paths
pub struct TestEnvironment {
    /// Temporary directory (dropped on cleanup)
    _temp_dir: TempDir,
    /// Canonical virtual root directory
    pub root: PathBuf,
    /// Canonical cross root directory
    pub cross_root: PathBuf,
    /// Unique test ID
    pub test_id: u32,
}

impl TestEnvironment {
    /// Create a new isolated fake root
    pub fn new() -> anyhow::Result<Self> {
        let test_id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_dir = TempDir::new()?;

        let root = temp_dir.path().join(format!("root-{}", test_id));
        let cross_root = temp_dir.path().join(format!("cross-{}", test_id));

        for dir in ["etc", "home/u", "usr/lib", "lib", "tmp"] {
            std::fs::create_dir_all(root.join(dir))?;
        }
        std::fs::create_dir_all(cross_root.join("usr/lib"))?;
        std::fs::create_dir_all(cross_root.join("lib"))?;
        std::fs::write(root.join("etc/passwd"), b"root:x:0:0:root:/root:/bin/sh\n")?;

        // tmpdirs can sit behind a symlink (macOS /var, some CI images)
        let root = root.canonicalize()?;
        let cross_root = cross_root.canonicalize()?;

        Ok(Self {
            _temp_dir: temp_dir,
            root,
            cross_root,
            test_id,
        })
    }

    /// Host path for a virtual path.
    pub fn real(&self, virtual_path: &str) -> PathBuf {
        self.root.join(virtual_path.trim_start_matches('/'))
    }

    /// Create a file at a virtual path
    pub fn create_file(&self, virtual_path: &str, content: &[u8]) -> anyhow::Result<PathBuf> {
        let path = self.real(virtual_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Create a directory at a virtual path
    pub fn create_dir(&self, virtual_path: &str) -> anyhow::Result<PathBuf> {
        let path = self.real(virtual_path);
        std::fs::create_dir_all(&path)?;
        Ok(path)
    }

    /// Config pointing at this fake root.
    pub fn config(&self) -> crate::Config {
        let mut cfg = crate::Config::default();
        cfg.root.base = Some(self.root.clone());
        cfg
    }

    /// Environment variables for a target process using this root.
    pub fn shim_env(&self) -> Vec<(String, String)> {
        self.config().shim_env()
    }

    /// Same, with the cross root configured.
    pub fn shim_env_with_cross(&self) -> Vec<(String, String)> {
        let mut cfg = self.config();
        cfg.root.cross = Some(self.cross_root.clone());
        cfg.shim_env()
    }
}
