//! Synthetic ownership and device-node attributes.
//!
//! Privileged calls the kernel refuses (`chown` to another user, `mknod` of
//! a device) are recorded here keyed by the expanded real path, and every
//! later `stat` of that path is overlaid with the recorded values.

use libc::{dev_t, gid_t, mode_t, uid_t};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadowOwner {
    pub uid: Option<uid_t>,
    pub gid: Option<gid_t>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadowDevice {
    pub mode: mode_t,
    pub dev: dev_t,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowAttributeEntry {
    pub path: Vec<u8>,
    pub owner: Option<ShadowOwner>,
    pub device: Option<ShadowDevice>,
}

/// Fields of a `stat`-like record the overlay touches.
pub trait StatFields {
    fn set_uid(&mut self, uid: uid_t);
    fn set_gid(&mut self, gid: gid_t);
    fn mode(&self) -> mode_t;
    fn set_mode(&mut self, mode: mode_t);
    fn set_rdev(&mut self, dev: dev_t);
}

macro_rules! impl_stat_fields {
    ($($ty:ty),*) => {$(
        impl StatFields for $ty {
            fn set_uid(&mut self, uid: uid_t) {
                self.st_uid = uid;
            }
            fn set_gid(&mut self, gid: gid_t) {
                self.st_gid = gid;
            }
            fn mode(&self) -> mode_t {
                self.st_mode
            }
            fn set_mode(&mut self, mode: mode_t) {
                self.st_mode = mode;
            }
            fn set_rdev(&mut self, dev: dev_t) {
                self.st_rdev = dev;
            }
        }
    )*};
}

impl_stat_fields!(libc::stat);
#[cfg(all(target_os = "linux", target_env = "gnu"))]
impl_stat_fields!(libc::stat64);

/// Process-lifetime store; entries are never evicted.
#[derive(Default)]
pub struct ShadowStore {
    entries: RwLock<HashMap<Vec<u8>, ShadowAttributeEntry>>,
    // Skips the lock on the stat fast path until something is recorded.
    populated: AtomicBool,
}

impl ShadowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record ownership. `uid`/`gid` of `-1` mean "unchanged" and keep
    /// whatever was recorded before.
    pub fn record_owner(&self, real_path: &[u8], uid: uid_t, gid: gid_t) {
        self.update(real_path, |entry| {
            let prior = entry.owner.unwrap_or(ShadowOwner {
                uid: None,
                gid: None,
            });
            entry.owner = Some(ShadowOwner {
                uid: if uid == uid_t::MAX { prior.uid } else { Some(uid) },
                gid: if gid == gid_t::MAX { prior.gid } else { Some(gid) },
            });
        });
    }

    /// Record a device node (or fifo/socket) created at `real_path`.
    pub fn record_device(&self, real_path: &[u8], mode: mode_t, dev: dev_t) {
        self.update(real_path, |entry| {
            entry.device = Some(ShadowDevice { mode, dev });
        });
    }

    pub fn lookup(&self, real_path: &[u8]) -> Option<ShadowAttributeEntry> {
        if !self.populated.load(Ordering::Acquire) {
            return None;
        }
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(real_path)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Overlay the recorded attributes for `real_path` onto `st`. Only
    /// recorded fields change; permission bits always stay as reported.
    /// Returns whether anything was applied.
    pub fn overlay<S: StatFields>(&self, real_path: &[u8], st: &mut S) -> bool {
        let Some(entry) = self.lookup(real_path) else {
            return false;
        };
        if let Some(owner) = entry.owner {
            if let Some(uid) = owner.uid {
                st.set_uid(uid);
            }
            if let Some(gid) = owner.gid {
                st.set_gid(gid);
            }
        }
        if let Some(device) = entry.device {
            let mode = (st.mode() & !libc::S_IFMT) | (device.mode & libc::S_IFMT);
            st.set_mode(mode);
            st.set_rdev(device.dev);
        }
        true
    }

    /// Replace the whole record for `real_path` under the write lock.
    fn update(&self, real_path: &[u8], apply: impl FnOnce(&mut ShadowAttributeEntry)) {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut entry = entries
            .get(real_path)
            .cloned()
            .unwrap_or_else(|| ShadowAttributeEntry {
                path: real_path.to_vec(),
                owner: None,
                device: None,
            });
        apply(&mut entry);
        entries.insert(real_path.to_vec(), entry);
        self.populated.store(true, Ordering::Release);
    }
}
