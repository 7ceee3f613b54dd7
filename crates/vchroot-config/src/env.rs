//! Environment contract between the launcher and the inception layer.
//!
//! The inception layer is configured exclusively through these variables so
//! that nothing inside the target process touches config files at load time.

/// Active virtual root (absolute, no trailing slash). Its presence means a
/// root is already active.
pub const BASE: &str = "VCHROOT_BASE";
/// Optional cross root holding host libraries for foreign-architecture runs.
pub const CROSS: &str = "VCHROOT_CROSS";
/// Colon list of virtual prefixes that are never expanded.
pub const EXCLUDE_PATH: &str = "VCHROOT_EXCLUDE_PATH";
/// Colon list of extra locations holding the layer's own components.
pub const OWN_PATH: &str = "VCHROOT_OWN_PATH";
/// `1` makes `chroot()` emulation refuse to activate without a cross root.
pub const REQUIRE_CROSS: &str = "VCHROOT_REQUIRE_CROSS";
/// `0` disables privilege faking for ownership and device-node calls.
pub const FAKE_PRIVILEGED: &str = "VCHROOT_FAKE_PRIVILEGED";
/// Any non-empty value enables debug logging inside the target.
pub const DEBUG: &str = "VCHROOT_DEBUG";
/// `EnvFilter` directive for both the launcher and the inception layer.
pub const LOG: &str = "VCHROOT_LOG";
/// Launcher-only: path of the inception layer library.
pub const LIBRARY: &str = "VCHROOT_LIBRARY";

pub const LD_LIBRARY_PATH: &str = "LD_LIBRARY_PATH";
pub const LD_PRELOAD: &str = "LD_PRELOAD";

/// Default exclusions when `VCHROOT_EXCLUDE_PATH` is unset.
pub const DEFAULT_EXCLUDES: &[&str] = &["/proc", "/sys", "/dev"];

/// Settings the inception layer derives from its environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShimSettings {
    pub base: Option<String>,
    pub cross: Option<String>,
    pub exclude: Vec<String>,
    pub own: Vec<String>,
    pub require_cross: bool,
    pub fake_privileged: bool,
    pub debug: bool,
    pub log_filter: Option<String>,
}

impl Default for ShimSettings {
    fn default() -> Self {
        Self {
            base: None,
            cross: None,
            exclude: DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect(),
            own: Vec::new(),
            require_cross: false,
            fake_privileged: true,
            debug: false,
            log_filter: None,
        }
    }
}

impl ShimSettings {
    /// Read settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary lookup (tests pass a map).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Self::default();

        settings.base = lookup(BASE).and_then(|v| non_root(&v));
        settings.cross = lookup(CROSS).and_then(|v| non_root(&v));
        if let Some(list) = lookup(EXCLUDE_PATH) {
            settings.exclude = split_path_list(&list);
        }
        if let Some(list) = lookup(OWN_PATH) {
            settings.own = split_path_list(&list);
        }
        settings.require_cross = lookup(REQUIRE_CROSS).is_some_and(|v| parse_flag(&v));
        if let Some(flag) = lookup(FAKE_PRIVILEGED) {
            settings.fake_privileged = parse_flag(&flag);
        }
        settings.debug = lookup(DEBUG).is_some_and(|v| !v.is_empty() && v != "0");
        settings.log_filter = lookup(LOG).filter(|v| !v.is_empty());

        settings
    }

    /// Whether the layer should install a log subscriber at all.
    pub fn logging_requested(&self) -> bool {
        self.debug || self.log_filter.is_some()
    }
}

/// Trim trailing slashes; an empty or `/` root means no virtualization.
fn non_root(value: &str) -> Option<String> {
    let trimmed = value.trim_end_matches('/');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Split a colon-separated path list, dropping empty entries and trailing
/// slashes.
pub fn split_path_list(list: &str) -> Vec<String> {
    list.split(':')
        .map(|p| p.trim_end_matches('/'))
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// `1`, `true`, `yes`, `on` are truthy; anything else is false.
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
