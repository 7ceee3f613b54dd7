//! Path translation between the virtual view and the real filesystem.
//!
//! Everything here works on raw bytes: paths arriving from C are not
//! guaranteed to be UTF-8. `expand` maps a virtual path to the real path
//! handed to the kernel, `narrow` maps a real path coming back out of a
//! call to what the program should see.

use crate::error::{Result, TranslateError};
use crate::root::RootConfig;
use libc::c_int;
use std::borrow::Cow;
use std::ffi::{CStr, CString};
use vchroot_config::{log_core_debug, ShimSettings};

/// Longest translated path accepted, in bytes, excluding the terminator.
/// `PATH_MAX` counts the terminator.
pub const MAX_PATH: usize = libc::PATH_MAX as usize - 1;

/// Template suffix generated by the `mkstemp` family.
pub const TEMPLATE_SUFFIX_LEN: usize = 6;

/// Static classification rules applied during translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPolicy {
    pub max_len: usize,
    /// Virtual prefixes passed through unexpanded.
    pub exclude: Vec<String>,
    /// Host locations holding this layer's own components.
    pub own: Vec<String>,
}

impl Default for PathPolicy {
    fn default() -> Self {
        Self {
            max_len: MAX_PATH,
            exclude: Vec::new(),
            own: Vec::new(),
        }
    }
}

impl PathPolicy {
    pub fn from_settings(settings: &ShimSettings, own_location: Option<String>) -> Self {
        let mut own = settings.own.clone();
        if let Some(location) = own_location {
            if !own.contains(&location) {
                own.push(location);
            }
        }
        Self {
            max_len: MAX_PATH,
            exclude: settings.exclude.clone(),
            own,
        }
    }
}

/// Where relative paths are anchored: the real working directory as the
/// kernel reports it.
pub trait CwdSource: Send + Sync {
    fn real_cwd(&self) -> Option<Vec<u8>>;
}

/// A length-checked path under construction.
#[derive(Debug, Clone)]
pub struct PathBuffer {
    bytes: Vec<u8>,
    max: usize,
}

impl PathBuffer {
    pub fn with_max(max: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(max.min(256)),
            max,
        }
    }

    /// Append, refusing to grow past the bound.
    pub fn push(&mut self, part: &[u8]) -> Result<()> {
        let len = self.bytes.len() + part.len();
        if len > self.max {
            return Err(TranslateError::NameTooLong { len, max: self.max });
        }
        self.bytes.extend_from_slice(part);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn into_cstring(self) -> Result<CString> {
        to_cstring(self.bytes)
    }
}

pub(crate) fn to_cstring(bytes: Vec<u8>) -> Result<CString> {
    CString::new(bytes).map_err(|_| TranslateError::InteriorNul)
}

/// Lexical normalization: collapse `//` and `.`, resolve `..` (clamped at
/// `/` for absolute paths). A trailing slash survives since it changes
/// meaning for symlinks and non-directories.
///
/// Only used to classify paths. What reaches the kernel comes from
/// [`clean`].
pub fn normalize(path: &[u8]) -> Vec<u8> {
    if path.is_empty() {
        return Vec::new();
    }

    let absolute = path[0] == b'/';
    let mut out = Vec::with_capacity(path.len());
    // Start offset of each popable component in `out`.
    let mut marks: Vec<usize> = Vec::new();

    if absolute {
        out.push(b'/');
    }

    for component in path.split(|&b| b == b'/') {
        match component {
            b"" | b"." => continue,
            b".." => {
                if let Some(start) = marks.pop() {
                    out.truncate(start);
                } else if !absolute {
                    if !out.is_empty() {
                        out.push(b'/');
                    }
                    out.extend_from_slice(b"..");
                }
            }
            _ => {
                let start = out.len();
                if !out.is_empty() && out[out.len() - 1] != b'/' {
                    out.push(b'/');
                }
                out.extend_from_slice(component);
                marks.push(start);
            }
        }
    }

    if out.is_empty() {
        out.push(if absolute { b'/' } else { b'.' });
    }
    if path.len() > 1 && path[path.len() - 1] == b'/' && out != b"/" {
        out.push(b'/');
    }
    out
}

/// Rewrite that keeps the kernel's answer: `//` and inner `.` components
/// collapse, a trailing `.` stays (`file/.` is ENOTDIR), and `..` is left
/// for the kernel to walk (`missing/../x` is ENOENT, `link/..` follows the
/// link). The only `..` dropped are those climbing above `/`, which the
/// kernel would resolve to `/` itself but which must not climb out of a
/// root prefixed in front.
pub fn clean(path: &[u8]) -> Vec<u8> {
    if path.is_empty() {
        return Vec::new();
    }

    let absolute = path[0] == b'/';
    let components: Vec<&[u8]> = path.split(|&b| b == b'/').filter(|c| !c.is_empty()).collect();
    let mut out = Vec::with_capacity(path.len());
    let mut depth = 0usize;

    for (i, &component) in components.iter().enumerate() {
        let last = i + 1 == components.len();
        match component {
            b"." if !last => continue,
            b".." if depth == 0 && absolute => continue,
            b".." => depth = depth.saturating_sub(1),
            b"." => {}
            _ => depth += 1,
        }
        if absolute || !out.is_empty() {
            out.push(b'/');
        }
        out.extend_from_slice(component);
    }

    if out.is_empty() {
        out.push(if absolute { b'/' } else { b'.' });
    }
    if path.len() > 1 && path[path.len() - 1] == b'/' && out != b"/" {
        out.push(b'/');
    }
    out
}

/// A relative path whose `..` components climb above `/` when appended to
/// the absolute `base`.
fn climbs_above(base: &[u8], relative: &[u8]) -> bool {
    let mut depth = base
        .split(|&b| b == b'/')
        .filter(|c| !c.is_empty() && *c != b".")
        .count();
    for component in relative.split(|&b| b == b'/') {
        match component {
            b"" | b"." => {}
            b".." if depth == 0 => return true,
            b".." => depth -= 1,
            _ => depth += 1,
        }
    }
    false
}

/// `path` equals `prefix` or continues it at a component boundary.
fn within(path: &[u8], prefix: &[u8]) -> bool {
    if prefix.is_empty() || prefix == b"/" {
        return path.first() == Some(&b'/');
    }
    path.starts_with(prefix) && (path.len() == prefix.len() || path[prefix.len()] == b'/')
}

/// Translation bound to one root and policy.
pub struct Translator<'a> {
    root: Option<&'a RootConfig>,
    policy: &'a PathPolicy,
    cwd: &'a dyn CwdSource,
}

impl<'a> Translator<'a> {
    pub fn new(root: Option<&'a RootConfig>, policy: &'a PathPolicy, cwd: &'a dyn CwdSource) -> Self {
        Self { root, policy, cwd }
    }

    pub fn root(&self) -> Option<&'a RootConfig> {
        self.root
    }

    /// Virtual path -> real path.
    ///
    /// A relative path stays relative while the working directory is inside
    /// the root and the path does not climb above the virtual `/`: the kernel
    /// resolves it from the real cwd already, and results such as glob
    /// matches keep the caller's relative form.
    pub fn expand<'p>(&self, path: &'p [u8]) -> Result<Cow<'p, [u8]>> {
        let Some(root) = self.root else {
            return Ok(Cow::Borrowed(path));
        };
        if path.is_empty() {
            return Ok(Cow::Borrowed(path));
        }
        let root = root.virtual_root.as_bytes();

        let Some(absolute) = self.virtual_absolute(path) else {
            return Ok(Cow::Borrowed(path));
        };
        let cleaned = clean(&absolute);

        if within(&cleaned, root) {
            // Already real; re-expanding must not double the prefix.
            let rest = clean(&cleaned[root.len()..]);
            let mut buf = PathBuffer::with_max(self.policy.max_len);
            buf.push(root)?;
            buf.push(&rest)?;
            return Ok(Cow::Owned(buf.into_bytes()));
        }
        let lexical = normalize(&cleaned);
        if self.is_excluded(&lexical) || self.is_own_elf(&lexical) {
            self.check_len(cleaned.len())?;
            return Ok(Cow::Owned(cleaned));
        }
        // `absolute` is the virtual cwd with `path` appended.
        if path[0] != b'/' && !climbs_above(&absolute[..absolute.len() - path.len()], path) {
            return Ok(Cow::Borrowed(path));
        }

        let mut buf = PathBuffer::with_max(self.policy.max_len);
        buf.push(root)?;
        buf.push(&cleaned)?;
        Ok(Cow::Owned(buf.into_bytes()))
    }

    /// `*at` variant: paths relative to a real directory descriptor are
    /// already real and stay untouched.
    pub fn expand_at<'p>(&self, dirfd: c_int, path: &'p [u8]) -> Result<Cow<'p, [u8]>> {
        if path.first() == Some(&b'/') || dirfd == libc::AT_FDCWD {
            self.expand(path)
        } else {
            Ok(Cow::Borrowed(path))
        }
    }

    /// Real path -> virtual path.
    pub fn narrow<'p>(&self, path: &'p [u8]) -> Cow<'p, [u8]> {
        let Some(root) = self.root else {
            return Cow::Borrowed(path);
        };
        let root = root.virtual_root.as_bytes();

        if within(path, root) {
            let rest = &path[root.len()..];
            if rest.is_empty() {
                Cow::Owned(b"/".to_vec())
            } else {
                Cow::Borrowed(rest)
            }
        } else {
            if path.first() != Some(&b'/') {
                // Relative results were never expanded.
                return Cow::Borrowed(path);
            }
            log_core_debug!(
                "narrow could not find the root prefix",
                path = tracing::field::display(String::from_utf8_lossy(path))
            );
            Cow::Borrowed(path)
        }
    }

    pub fn expand_cstr<'p>(&self, path: &'p CStr) -> Result<Cow<'p, CStr>> {
        match self.expand(path.to_bytes())? {
            Cow::Borrowed(_) => Ok(Cow::Borrowed(path)),
            Cow::Owned(bytes) => Ok(Cow::Owned(to_cstring(bytes)?)),
        }
    }

    pub fn expand_at_cstr<'p>(&self, dirfd: c_int, path: &'p CStr) -> Result<Cow<'p, CStr>> {
        match self.expand_at(dirfd, path.to_bytes())? {
            Cow::Borrowed(_) => Ok(Cow::Borrowed(path)),
            Cow::Owned(bytes) => Ok(Cow::Owned(to_cstring(bytes)?)),
        }
    }

    pub fn narrow_cstr<'p>(&self, path: &'p CStr) -> Result<Cow<'p, CStr>> {
        let bytes = path.to_bytes();
        match self.narrow(bytes) {
            Cow::Borrowed(b) if b.len() == bytes.len() => Ok(Cow::Borrowed(path)),
            other => Ok(Cow::Owned(to_cstring(other.into_owned())?)),
        }
    }

    /// Absolute virtual form of `path`. Relative paths are anchored at the
    /// virtual working directory; `None` when the real cwd is unknown or
    /// lies outside the root, in which case the kernel's own relative
    /// lookup already does the right thing.
    pub fn virtual_absolute(&self, path: &[u8]) -> Option<Vec<u8>> {
        if path.first() == Some(&b'/') {
            return Some(path.to_vec());
        }
        let root = self.root?;
        let cwd = self.cwd.real_cwd()?;
        if !within(&cwd, root.virtual_root.as_bytes()) {
            return None;
        }
        let mut absolute = self.narrow(&cwd).into_owned();
        if absolute.last() != Some(&b'/') {
            absolute.push(b'/');
        }
        absolute.extend_from_slice(path);
        Some(absolute)
    }

    /// The form a real path takes as a shadow store key: absolute, lexically
    /// normalized and without a trailing slash, so spellings of one file meet. Relative
    /// paths are anchored at the real cwd; `None` when it is unknown.
    pub fn shadow_key(&self, real: &[u8]) -> Option<Vec<u8>> {
        if real.is_empty() {
            return None;
        }
        let mut key = if real[0] == b'/' {
            normalize(real)
        } else {
            let mut absolute = self.cwd.real_cwd()?;
            absolute.push(b'/');
            absolute.extend_from_slice(real);
            normalize(&absolute)
        };
        if key.len() > 1 && key.last() == Some(&b'/') {
            key.pop();
        }
        Some(key)
    }

    /// Virtual path equal to or below an excluded prefix.
    pub fn is_excluded(&self, virtual_path: &[u8]) -> bool {
        self.policy
            .exclude
            .iter()
            .any(|prefix| within(virtual_path, prefix.as_bytes()))
    }

    /// Path names one of this layer's own components.
    pub fn is_own_elf(&self, path: &[u8]) -> bool {
        if path.first() != Some(&b'/') {
            return false;
        }
        let normalized = normalize(path);
        self.policy
            .own
            .iter()
            .any(|prefix| within(&normalized, prefix.trim_end_matches('/').as_bytes()))
    }

    /// Where `dlopen(name)` should load from.
    pub fn library_target<'p>(&self, name: &'p [u8]) -> Result<Cow<'p, [u8]>> {
        // Bare sonames go through the loader's search path.
        if !name.contains(&b'/') || self.is_own_elf(name) {
            return Ok(Cow::Borrowed(name));
        }
        let Some(root) = self.root else {
            return Ok(Cow::Borrowed(name));
        };
        let Some(cross) = root.cross_root.as_deref() else {
            return self.expand(name);
        };

        let Some(absolute) = self.virtual_absolute(name) else {
            return Ok(Cow::Borrowed(name));
        };
        let cleaned = clean(&absolute);
        let virtual_path = if within(&cleaned, root.virtual_root.as_bytes()) {
            clean(&cleaned[root.virtual_root.len()..])
        } else {
            cleaned
        };

        let mut buf = PathBuffer::with_max(self.policy.max_len);
        buf.push(cross.as_bytes())?;
        buf.push(&virtual_path)?;
        Ok(Cow::Owned(buf.into_bytes()))
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len > self.policy.max_len {
            return Err(TranslateError::NameTooLong {
                len,
                max: self.policy.max_len,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;
    use std::os::unix::fs::MetadataExt;

    pub(crate) struct FixedCwd(pub Option<&'static str>);

    impl CwdSource for FixedCwd {
        fn real_cwd(&self) -> Option<Vec<u8>> {
            self.0.map(|c| c.as_bytes().to_vec())
        }
    }

    fn root(base: &str) -> RootConfig {
        RootConfig {
            virtual_root: base.to_string(),
            cross_root: None,
        }
    }

    fn expand(t: &Translator<'_>, p: &str) -> String {
        String::from_utf8(t.expand(p.as_bytes()).unwrap().into_owned()).unwrap()
    }

    fn narrow(t: &Translator<'_>, p: &str) -> String {
        String::from_utf8(t.narrow(p.as_bytes()).into_owned()).unwrap()
    }

    #[test]
    fn test_normalize() {
        let cases = [
            ("/a//b/./c", "/a/b/c"),
            ("/a/b/../c", "/a/c"),
            ("/../../etc", "/etc"),
            ("/", "/"),
            ("//", "/"),
            ("/etc/", "/etc/"),
            ("/etc/.", "/etc"),
            ("a/../../b", "../b"),
            ("./", "./"),
        ];
        for (input, expected) in cases {
            assert_eq!(
                String::from_utf8(normalize(input.as_bytes())).unwrap(),
                expected,
                "normalize({input})"
            );
        }
    }

    #[test]
    fn test_clean() {
        let cases = [
            ("/a//b/./c", "/a/b/c"),
            ("/a/b/../c", "/a/b/../c"),
            ("/../../etc", "/etc"),
            ("/a/../../b", "/a/../b"),
            ("/", "/"),
            ("//", "/"),
            ("/etc/", "/etc/"),
            ("/etc/passwd/.", "/etc/passwd/."),
            ("/etc/passwd/./", "/etc/passwd/./"),
            ("/missing/../x", "/missing/../x"),
            ("a/../../b", "a/../../b"),
        ];
        for (input, expected) in cases {
            assert_eq!(
                String::from_utf8(clean(input.as_bytes())).unwrap(),
                expected,
                "clean({input})"
            );
        }
    }

    #[test]
    fn test_expand_keeps_components_the_kernel_resolves() {
        let root = root("/srv/chroot");
        let policy = PathPolicy::default();
        let cwd = FixedCwd(None);
        let t = Translator::new(Some(&root), &policy, &cwd);

        assert_eq!(expand(&t, "/etc/passwd/."), "/srv/chroot/etc/passwd/.");
        assert_eq!(expand(&t, "/etc/missing/../passwd"), "/srv/chroot/etc/missing/../passwd");
        assert_eq!(expand(&t, "/lib64/../bin"), "/srv/chroot/lib64/../bin");
        // Already real, and climbing past the root prefix is clamped.
        assert_eq!(expand(&t, "/srv/chroot/../../etc"), "/srv/chroot/etc");
        assert_eq!(expand(&t, "/srv/chroot/a/.."), "/srv/chroot/a/..");
    }

    fn stat_errno(path: &[u8]) -> Option<i32> {
        std::fs::metadata(OsStr::from_bytes(path))
            .err()
            .and_then(|e| e.raw_os_error())
    }

    #[test]
    fn test_kernel_errors_survive_expansion() {
        let dir = tempfile::TempDir::new().unwrap();
        let base = dir.path().canonicalize().unwrap();
        std::fs::create_dir_all(base.join("etc")).unwrap();
        std::fs::create_dir_all(base.join("usr/lib/deep")).unwrap();
        std::fs::write(base.join("etc/passwd"), b"root:x:0:0::/root:/bin/sh\n").unwrap();
        std::os::unix::fs::symlink("usr/lib/deep", base.join("lib")).unwrap();

        let root = root(base.to_str().unwrap());
        let policy = PathPolicy::default();
        let cwd = FixedCwd(None);
        let t = Translator::new(Some(&root), &policy, &cwd);

        let real = t.expand(b"/etc/passwd").unwrap();
        assert_eq!(stat_errno(&real), None);

        let real = t.expand(b"/etc/passwd/.").unwrap();
        assert_eq!(stat_errno(&real), Some(libc::ENOTDIR));

        let real = t.expand(b"/etc/missing/../passwd").unwrap();
        assert_eq!(stat_errno(&real), Some(libc::ENOENT));

        // `..` after a symlink leaves the link target, not the link.
        let real = t.expand(b"/lib/..").unwrap();
        let via_link = std::fs::metadata(OsStr::from_bytes(&real)).unwrap();
        let target_parent = std::fs::metadata(base.join("usr/lib")).unwrap();
        assert_eq!(via_link.ino(), target_parent.ino());
    }

    #[test]
    fn test_no_root_pass_through() {
        let policy = PathPolicy::default();
        let cwd = FixedCwd(Some("/home/me"));
        let t = Translator::new(None, &policy, &cwd);
        for p in ["/etc/passwd", "relative/x", "", "/a//b/../c"] {
            assert!(matches!(t.expand(p.as_bytes()).unwrap(), Cow::Borrowed(b) if b == p.as_bytes()));
            assert!(matches!(t.narrow(p.as_bytes()), Cow::Borrowed(b) if b == p.as_bytes()));
        }
    }

    #[test]
    fn test_expand_absolute() {
        let root = root("/srv/chroot");
        let policy = PathPolicy::default();
        let cwd = FixedCwd(None);
        let t = Translator::new(Some(&root), &policy, &cwd);

        assert_eq!(expand(&t, "/etc/passwd"), "/srv/chroot/etc/passwd");
        assert_eq!(expand(&t, "/"), "/srv/chroot/");
        assert_eq!(expand(&t, "/../../etc//hosts"), "/srv/chroot/etc/hosts");
    }

    #[test]
    fn test_expand_is_idempotent() {
        let root = root("/srv/chroot");
        let policy = PathPolicy::default();
        let cwd = FixedCwd(Some("/srv/chroot/home/u"));
        let t = Translator::new(Some(&root), &policy, &cwd);

        for p in ["/etc/passwd", "/", "docs/a.txt", "/usr/lib/../bin/"] {
            let once = expand(&t, p);
            assert_eq!(expand(&t, &once), once, "expand twice: {p}");
        }
    }

    #[test]
    fn test_prefix_match_respects_component_boundary() {
        let root = root("/srv/chroot");
        let policy = PathPolicy::default();
        let cwd = FixedCwd(None);
        let t = Translator::new(Some(&root), &policy, &cwd);

        assert_eq!(expand(&t, "/srv/chrootx/a"), "/srv/chroot/srv/chrootx/a");
        assert_eq!(narrow(&t, "/srv/chrootx/a"), "/srv/chrootx/a");
    }

    #[test]
    fn test_relative_uses_virtual_cwd() {
        let root = root("/srv/chroot");
        let policy = PathPolicy::default();
        let cwd = FixedCwd(Some("/srv/chroot/home/u"));
        let t = Translator::new(Some(&root), &policy, &cwd);

        // The kernel resolves these from the real cwd already.
        assert_eq!(expand(&t, "notes.txt"), "notes.txt");
        assert_eq!(expand(&t, "../u/*.c"), "../u/*.c");
        assert_eq!(expand(&t, "../.."), "../..");
        // Climbing out is anchored at the root instead.
        assert_eq!(expand(&t, "../../../../etc"), "/srv/chroot/home/u/../../etc");
        assert_eq!(expand(&t, "../../../.."), "/srv/chroot/home/u/../..");
    }

    #[test]
    fn test_relative_outside_root_untouched() {
        let root = root("/srv/chroot");
        let policy = PathPolicy::default();
        let cwd = FixedCwd(Some("/home/me"));
        let t = Translator::new(Some(&root), &policy, &cwd);

        assert_eq!(expand(&t, "notes.txt"), "notes.txt");
    }

    #[test]
    fn test_round_trip() {
        let root = root("/srv/chroot");
        let policy = PathPolicy::default();
        let cwd = FixedCwd(Some("/srv/chroot"));
        let t = Translator::new(Some(&root), &policy, &cwd);

        for p in ["/etc/passwd", "/", "/a//b/./c/", "/x/../y", "/usr/lib/", "/etc/hosts/."] {
            let real = t.expand(p.as_bytes()).unwrap().into_owned();
            assert_eq!(t.narrow(&real).into_owned(), clean(p.as_bytes()), "{p}");
        }
    }

    #[test]
    fn test_narrow() {
        let root = root("/srv/chroot");
        let policy = PathPolicy::default();
        let cwd = FixedCwd(None);
        let t = Translator::new(Some(&root), &policy, &cwd);

        assert_eq!(narrow(&t, "/srv/chroot/home/u"), "/home/u");
        assert_eq!(narrow(&t, "/srv/chroot"), "/");
        assert_eq!(narrow(&t, "/srv/chroot/"), "/");
        assert_eq!(narrow(&t, "/outside/root/thing"), "/outside/root/thing");
    }

    #[test]
    fn test_length_boundary() {
        let root = root("/r");
        let policy = PathPolicy {
            max_len: 16,
            ..Default::default()
        };
        let cwd = FixedCwd(None);
        let t = Translator::new(Some(&root), &policy, &cwd);

        // "/r" + 14 bytes == 16
        assert_eq!(expand(&t, "/abcdefghijklm"), "/r/abcdefghijklm");
        let err = t.expand(b"/abcdefghijklmn").unwrap_err();
        assert!(matches!(err, TranslateError::NameTooLong { len: 17, max: 16 }));
    }

    #[test]
    fn test_excluded_prefixes() {
        let root = root("/srv/chroot");
        let policy = PathPolicy {
            exclude: vec!["/proc".into(), "/dev".into()],
            ..Default::default()
        };
        let cwd = FixedCwd(None);
        let t = Translator::new(Some(&root), &policy, &cwd);

        assert_eq!(expand(&t, "/proc/self/maps"), "/proc/self/maps");
        assert_eq!(expand(&t, "/dev"), "/dev");
        assert_eq!(expand(&t, "/devices"), "/srv/chroot/devices");
    }

    #[test]
    fn test_own_components() {
        let root = root("/srv/chroot");
        let policy = PathPolicy {
            own: vec!["/opt/vchroot/lib/".into()],
            ..Default::default()
        };
        let cwd = FixedCwd(None);
        let t = Translator::new(Some(&root), &policy, &cwd);

        assert!(t.is_own_elf(b"/opt/vchroot/lib/libvchroot_inception_layer.so"));
        assert!(t.is_own_elf(b"/opt/vchroot/lib/../lib/x.so"));
        assert!(!t.is_own_elf(b"/opt/vchroot/library.so"));
        assert!(!t.is_own_elf(b"libc.so.6"));
        assert_eq!(
            expand(&t, "/opt/vchroot/lib/libvchroot_inception_layer.so"),
            "/opt/vchroot/lib/libvchroot_inception_layer.so"
        );
    }

    #[test]
    fn test_library_target() {
        let mut cfg = root("/srv/chroot");
        let policy = PathPolicy {
            own: vec!["/opt/vchroot".into()],
            ..Default::default()
        };
        let cwd = FixedCwd(None);

        let t = Translator::new(Some(&cfg), &policy, &cwd);
        let target = |t: &Translator<'_>, n: &str| {
            String::from_utf8(t.library_target(n.as_bytes()).unwrap().into_owned()).unwrap()
        };
        assert_eq!(target(&t, "libm.so.6"), "libm.so.6");
        assert_eq!(target(&t, "/usr/lib/libfoo.so"), "/srv/chroot/usr/lib/libfoo.so");
        assert_eq!(target(&t, "/opt/vchroot/libx.so"), "/opt/vchroot/libx.so");

        cfg.cross_root = Some("/opt/cross".into());
        let t = Translator::new(Some(&cfg), &policy, &cwd);
        assert_eq!(target(&t, "/usr/lib/libfoo.so"), "/opt/cross/usr/lib/libfoo.so");
        assert_eq!(
            target(&t, "/srv/chroot/usr/lib/libfoo.so"),
            "/opt/cross/usr/lib/libfoo.so"
        );
    }

    #[test]
    fn test_expand_at_leaves_dirfd_relative() {
        let root = root("/srv/chroot");
        let policy = PathPolicy::default();
        let cwd = FixedCwd(Some("/srv/chroot"));
        let t = Translator::new(Some(&root), &policy, &cwd);

        assert_eq!(t.expand_at(7, b"sub/file").unwrap().as_ref(), b"sub/file");
        assert_eq!(t.expand_at(7, b"/etc").unwrap().as_ref(), b"/srv/chroot/etc");
        assert_eq!(t.expand_at(libc::AT_FDCWD, b"etc").unwrap().as_ref(), b"etc");
        assert_eq!(
            t.expand_at(libc::AT_FDCWD, b"../etc").unwrap().as_ref(),
            b"/srv/chroot/etc"
        );
    }

    #[test]
    fn test_cstr_wrappers() {
        let root = root("/srv/chroot");
        let policy = PathPolicy::default();
        let cwd = FixedCwd(None);
        let t = Translator::new(Some(&root), &policy, &cwd);

        let real = t.expand_cstr(c"/etc/passwd").unwrap();
        assert_eq!(real.to_bytes(), b"/srv/chroot/etc/passwd");
        let back = t.narrow_cstr(&real).unwrap();
        assert_eq!(back.to_bytes(), b"/etc/passwd");
        assert!(matches!(t.narrow_cstr(c"/outside").unwrap(), Cow::Borrowed(_)));
    }

    #[test]
    fn test_shadow_key_anchors_relative_paths() {
        let root = root("/srv/chroot");
        let policy = PathPolicy::default();
        let cwd = FixedCwd(Some("/srv/chroot/home/u"));
        let t = Translator::new(Some(&root), &policy, &cwd);

        let key = |p: &str| t.shadow_key(p.as_bytes()).map(|k| String::from_utf8(k).unwrap());
        assert_eq!(key("file").as_deref(), Some("/srv/chroot/home/u/file"));
        assert_eq!(key("./sub/../file"), key("/srv/chroot/home/u/file"));
        assert_eq!(key("/srv/chroot//etc/x/").as_deref(), Some("/srv/chroot/etc/x"));
        assert_eq!(key("/").as_deref(), Some("/"));
        assert_eq!(key(""), None);

        let unknown = FixedCwd(None);
        let t = Translator::new(Some(&root), &policy, &unknown);
        assert_eq!(t.shadow_key(b"file"), None);
    }

    #[test]
    fn test_path_buffer_bound() {
        let mut buf = PathBuffer::with_max(4);
        buf.push(b"/ab").unwrap();
        buf.push(b"c").unwrap();
        assert_eq!(buf.len(), 4);
        assert!(buf.push(b"d").is_err());
        assert_eq!(buf.as_bytes(), b"/abc");
    }
}
