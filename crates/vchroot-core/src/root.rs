//! Process-wide virtual root state.
//!
//! Two states only: inactive (pure pass-through) and active. Activation is
//! one-shot for the life of the process and is signalled to children through
//! `VCHROOT_BASE`.

use crate::error::{Result, TranslateError};
use std::sync::OnceLock;
use vchroot_config::{env, log_core_info, path::prepend_search_path, ShimSettings};

/// The active root and optional cross root. Both are absolute, without a
/// trailing slash, and never `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootConfig {
    pub virtual_root: String,
    pub cross_root: Option<String>,
}

/// Access to the process environment.
///
/// Injectable so root activation can be tested without mutating the test
/// process's own environment.
pub trait Environ: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
}

/// The real process environment.
pub struct ProcessEnviron;

impl Environ for ProcessEnviron {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }

    fn set(&self, key: &str, value: &str) {
        std::env::set_var(key, value);
    }
}

pub struct RootState {
    active: OnceLock<RootConfig>,
    cross_root: Option<String>,
    require_cross: bool,
    max_len: usize,
    env: Box<dyn Environ>,
}

impl RootState {
    /// Build from settings. A root already named in the environment is active
    /// from the start (the launcher or a parent process activated it).
    pub fn new(settings: &ShimSettings, env: Box<dyn Environ>, max_len: usize) -> Self {
        let active = OnceLock::new();
        if let Some(base) = &settings.base {
            let _ = active.set(RootConfig {
                virtual_root: base.clone(),
                cross_root: settings.cross.clone(),
            });
        }
        Self {
            active,
            cross_root: settings.cross.clone(),
            require_cross: settings.require_cross,
            max_len,
            env,
        }
    }

    /// The active root, or `None` for pass-through.
    pub fn current(&self) -> Option<&RootConfig> {
        self.active.get()
    }

    pub fn is_active(&self) -> bool {
        self.current().is_some() || self.env.get(env::BASE).is_some()
    }

    /// Activate `new_root` (a real, absolute path).
    ///
    /// Fails with `AlreadyActive` when a root is active, including one only
    /// visible through the environment. When a cross root is configured its
    /// library directories are prefixed onto `LD_LIBRARY_PATH`.
    pub fn activate(&self, new_root: &str) -> Result<()> {
        self.check_activatable()?;

        let root = new_root.trim_end_matches('/');
        if root.is_empty() {
            // chroot("/") from the real root changes nothing
            return Ok(());
        }

        // Compute everything fallible before claiming the slot.
        let library_path = match &self.cross_root {
            Some(cross) => Some(self.library_search_path(cross)?),
            None => None,
        };

        let config = RootConfig {
            virtual_root: root.to_string(),
            cross_root: self.cross_root.clone(),
        };
        if self.active.set(config).is_err() {
            return Err(TranslateError::AlreadyActive {
                root: self.existing_root().unwrap_or_default(),
            });
        }

        self.env.set(env::BASE, root);
        if let Some(search) = library_path {
            self.env.set(env::LD_LIBRARY_PATH, &search);
        }
        log_core_info!("virtual root activated", root = root);
        Ok(())
    }

    /// Refusals `activate` would report, checked without side effects.
    pub fn check_activatable(&self) -> Result<()> {
        if let Some(existing) = self.existing_root() {
            return Err(TranslateError::AlreadyActive { root: existing });
        }
        if self.require_cross && self.cross_root.is_none() {
            return Err(TranslateError::CrossRootMissing);
        }
        Ok(())
    }

    fn existing_root(&self) -> Option<String> {
        if let Some(active) = self.active.get() {
            return Some(active.virtual_root.clone());
        }
        self.env.get(env::BASE).filter(|v| !v.is_empty())
    }

    fn library_search_path(&self, cross: &str) -> Result<String> {
        let entries = [format!("{cross}/usr/lib"), format!("{cross}/lib")];
        let existing = self.env.get(env::LD_LIBRARY_PATH);
        let search = prepend_search_path(&entries, existing.as_deref());
        if search.len() > self.max_len {
            return Err(TranslateError::LibraryPathTooLong {
                len: search.len(),
                max: self.max_len,
            });
        }
        Ok(search)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory environment for tests.
    #[derive(Default)]
    pub(crate) struct MapEnviron(pub Mutex<HashMap<String, String>>);

    impl MapEnviron {
        pub(crate) fn with(pairs: &[(&str, &str)]) -> Self {
            Self(Mutex::new(
                pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ))
        }
    }

    impl Environ for MapEnviron {
        fn get(&self, key: &str) -> Option<String> {
            self.0.lock().unwrap().get(key).cloned()
        }

        fn set(&self, key: &str, value: &str) {
            self.0
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
        }
    }

    pub(crate) struct Shared(pub std::sync::Arc<MapEnviron>);

    impl Environ for Shared {
        fn get(&self, key: &str) -> Option<String> {
            self.0.get(key)
        }
        fn set(&self, key: &str, value: &str) {
            self.0.set(key, value)
        }
    }

    fn state(settings: ShimSettings, env: std::sync::Arc<MapEnviron>) -> RootState {
        RootState::new(&settings, Box::new(Shared(env)), 4096)
    }

    #[test]
    fn test_inactive_by_default() {
        let environ = std::sync::Arc::new(MapEnviron::default());
        let root = state(ShimSettings::default(), environ);
        assert!(root.current().is_none());
        assert!(!root.is_active());
    }

    #[test]
    fn test_activation_is_exclusive() {
        let environ = std::sync::Arc::new(MapEnviron::default());
        let root = state(ShimSettings::default(), environ.clone());

        root.activate("/root/a").unwrap();
        let err = root.activate("/root/b").unwrap_err();

        assert!(matches!(err, TranslateError::AlreadyActive { ref root } if root == "/root/a"));
        assert_eq!(root.current().unwrap().virtual_root, "/root/a");
        assert_eq!(environ.get(env::BASE).as_deref(), Some("/root/a"));
    }

    #[test]
    fn test_environment_root_blocks_activation() {
        let environ = std::sync::Arc::new(MapEnviron::with(&[(env::BASE, "/parent")]));
        let root = state(ShimSettings::default(), environ);
        let err = root.activate("/child").unwrap_err();
        assert_eq!(err.errno(), libc::EFAULT);
    }

    #[test]
    fn test_preactivated_from_settings() {
        let environ = std::sync::Arc::new(MapEnviron::default());
        let settings = ShimSettings {
            base: Some("/srv/chroot".into()),
            cross: Some("/opt/cross".into()),
            ..Default::default()
        };
        let root = state(settings, environ);
        let current = root.current().unwrap();
        assert_eq!(current.virtual_root, "/srv/chroot");
        assert_eq!(current.cross_root.as_deref(), Some("/opt/cross"));
    }

    #[test]
    fn test_cross_root_prefixes_library_path() {
        let environ = std::sync::Arc::new(MapEnviron::with(&[(
            env::LD_LIBRARY_PATH,
            "/usr/local/lib",
        )]));
        let settings = ShimSettings {
            cross: Some("/opt/cross".into()),
            ..Default::default()
        };
        let root = state(settings, environ.clone());
        root.activate("/srv/chroot/").unwrap();

        assert_eq!(root.current().unwrap().virtual_root, "/srv/chroot");
        assert_eq!(
            environ.get(env::LD_LIBRARY_PATH).as_deref(),
            Some("/opt/cross/usr/lib:/opt/cross/lib:/usr/local/lib")
        );
    }

    #[test]
    fn test_require_cross() {
        let environ = std::sync::Arc::new(MapEnviron::default());
        let settings = ShimSettings {
            require_cross: true,
            ..Default::default()
        };
        let root = state(settings, environ);
        assert!(matches!(
            root.activate("/srv/chroot"),
            Err(TranslateError::CrossRootMissing)
        ));
        assert!(root.current().is_none());
    }

    #[test]
    fn test_library_path_overflow_leaves_root_inactive() {
        let long = format!("/{}", "x".repeat(5000));
        let environ = std::sync::Arc::new(MapEnviron::with(&[(env::LD_LIBRARY_PATH, &long)]));
        let settings = ShimSettings {
            cross: Some("/opt/cross".into()),
            ..Default::default()
        };
        let root = state(settings, environ.clone());
        let err = root.activate("/srv/chroot").unwrap_err();

        assert_eq!(err.errno(), libc::ENAMETOOLONG);
        assert!(root.current().is_none());
        assert!(environ.get(env::BASE).is_none());
    }

    #[test]
    fn test_slash_root_is_noop() {
        let environ = std::sync::Arc::new(MapEnviron::default());
        let root = state(ShimSettings::default(), environ);
        root.activate("/").unwrap();
        assert!(root.current().is_none());
    }
}
