//! `vchroot run` and `vchroot env`: compose the environment contract for a
//! virtual root and start the target under the inception layer.

use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use anyhow::{bail, Context, Result};
use clap::Args;
use vchroot_config::env;
use vchroot_config::path::{display_root, normalize_root, prepend_search_path};
use vchroot_config::{log_cli_debug, log_cli_info, Config, ShimSettings};
use vchroot_core::{CwdSource, PathPolicy, RootConfig, Translator};

pub const LIBRARY_NAME: &str = "libvchroot_inception_layer.so";

/// Search path used when the caller has no `PATH`.
const DEFAULT_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// Same bound the kernel applies to symlink chains.
const MAX_LINK_DEPTH: usize = 40;

#[derive(Args, Debug, Clone, Default)]
pub struct RootArgs {
    /// Directory presented as `/` (defaults to `root.base` from config)
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Alternate root serving libraries for foreign-architecture programs
    #[arg(long, value_name = "DIR")]
    pub cross: Option<PathBuf>,

    /// Virtual prefix that always addresses the host (repeatable, replaces
    /// the configured list)
    #[arg(long = "exclude", value_name = "PATH")]
    pub exclude: Vec<String>,

    /// Inception layer to preload
    #[arg(long, value_name = "SO")]
    pub library: Option<PathBuf>,

    /// Propagate EPERM from chown/mknod instead of recording the request
    #[arg(long)]
    pub no_fake_privileged: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub root: RootArgs,

    /// Command and arguments, resolved inside the root
    #[arg(
        trailing_var_arg = true,
        allow_hyphen_values = true,
        required = true,
        value_name = "CMD"
    )]
    pub command: Vec<String>,
}

/// Command-line flags over the loaded configuration, with roots resolved
/// to canonical absolute directories.
pub fn apply_args(args: &RootArgs, mut config: Config) -> Result<Config> {
    if let Some(root) = &args.root {
        config.root.base = Some(root.clone());
    }
    let base = config
        .root
        .base
        .as_ref()
        .context("No root given: pass --root or set root.base in the config")?;
    config.root.base = Some(normalize_root(base)?);

    if let Some(cross) = &args.cross {
        config.root.cross = Some(cross.clone());
    }
    if let Some(cross) = &config.root.cross {
        config.root.cross = Some(normalize_root(cross)?);
    }
    if !args.exclude.is_empty() {
        config.paths.exclude = args.exclude.clone();
    }
    if let Some(library) = &args.library {
        config.shim.library = Some(library.clone());
    }
    if args.no_fake_privileged {
        config.shadow.fake_privileged = false;
    }
    Ok(config)
}

/// The child's environment: the contract from the config, the layer
/// prepended to `LD_PRELOAD` and, with a cross root, its library
/// directories prepended to `LD_LIBRARY_PATH`.
pub fn compose_env(
    config: &Config,
    library: &Path,
    lookup: impl Fn(&str) -> Option<String>,
) -> Vec<(String, String)> {
    let mut vars = config.shim_env();

    let preload = prepend_search_path(
        &[library.to_string_lossy().into_owned()],
        lookup(env::LD_PRELOAD).as_deref(),
    );
    vars.push((env::LD_PRELOAD.to_string(), preload));

    if let Some(cross) = &config.root.cross {
        let cross = display_root(cross);
        let dirs = [format!("{cross}/usr/lib"), format!("{cross}/lib")];
        let search = prepend_search_path(&dirs, lookup(env::LD_LIBRARY_PATH).as_deref());
        vars.push((env::LD_LIBRARY_PATH.to_string(), search));
    }
    vars
}

/// Everything `vchroot env` prints.
pub fn environment(args: &RootArgs, config: Config) -> Result<Vec<(String, String)>> {
    let config = apply_args(args, config)?;
    let library = find_library(&config)?;
    Ok(compose_env(&config, &library, |key| std::env::var(key).ok()))
}

/// Locate the inception layer: the configured path, then next to this
/// binary, then the usual build and install locations.
pub fn find_library(config: &Config) -> Result<PathBuf> {
    if let Some(library) = &config.shim.library {
        if !library.is_file() {
            bail!("Inception layer not found: {}", library.display());
        }
        return library
            .canonicalize()
            .with_context(|| format!("Failed to resolve {}", library.display()));
    }

    let candidates = [
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|dir| dir.join(LIBRARY_NAME))),
        Some(PathBuf::from("target/release").join(LIBRARY_NAME)),
        Some(PathBuf::from("/usr/local/lib/vchroot").join(LIBRARY_NAME)),
    ];
    for candidate in candidates.into_iter().flatten() {
        if candidate.is_file() {
            log_cli_debug!("inception layer found", path = tracing::field::display(candidate.display()));
            return candidate
                .canonicalize()
                .with_context(|| format!("Failed to resolve {}", candidate.display()));
        }
    }

    bail!(
        "Could not find {LIBRARY_NAME}.\n\
        Build with: cargo build -p vchroot-inception-layer --release\n\
        or pass --library / set {}",
        env::LIBRARY
    );
}

/// Working directory source pinned at the root, so relative commands
/// resolve from the virtual `/`.
struct AtRoot(Vec<u8>);

impl CwdSource for AtRoot {
    fn real_cwd(&self) -> Option<Vec<u8>> {
        Some(self.0.clone())
    }
}

/// Real location of `command` inside the root.
///
/// Names without a `/` are looked up along `search` (virtual directories).
/// Symlinks are followed within the root, since an absolute target names a
/// virtual path the kernel would look up on the host.
pub fn resolve_program(config: &Config, command: &str, search: Option<&str>) -> Result<PathBuf> {
    let vars = config.shim_env();
    let settings = ShimSettings::from_lookup(|key| {
        vars.iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.clone())
    });
    let root = settings.base.clone().map(|virtual_root| RootConfig {
        virtual_root,
        cross_root: settings.cross.clone(),
    });
    let policy = PathPolicy::from_settings(&settings, None);
    let cwd = AtRoot(settings.base.clone().unwrap_or_else(|| "/".to_string()).into_bytes());
    let translator = Translator::new(root.as_ref(), &policy, &cwd);

    // Relative names start from the virtual `/`, where the command starts.
    let expand = |virtual_path: &[u8]| -> Result<PathBuf> {
        let anchored = match virtual_path.first() {
            Some(b'/') => virtual_path.to_vec(),
            _ => [b"/", virtual_path].concat(),
        };
        let real = translator.expand(&anchored)?;
        Ok(PathBuf::from(OsStr::from_bytes(&real)))
    };
    let follow = |mut real: PathBuf| -> Result<PathBuf> {
        for _ in 0..MAX_LINK_DEPTH {
            let Ok(target) = std::fs::read_link(&real) else {
                return Ok(real);
            };
            real = if target.is_absolute() {
                expand(target.as_os_str().as_bytes())?
            } else {
                real.parent().unwrap_or(Path::new("/")).join(target)
            };
        }
        bail!("Too many levels of symbolic links: {command}")
    };

    let shown_root = settings.base.as_deref().unwrap_or("/");
    if command.contains('/') {
        let real = follow(expand(command.as_bytes())?)?;
        if is_executable(&real) {
            return Ok(real);
        }
        bail!("{command}: not an executable inside {shown_root}");
    }

    for dir in search.unwrap_or(DEFAULT_PATH).split(':').filter(|d| !d.is_empty()) {
        let candidate = format!("{}/{}", dir.trim_end_matches('/'), command);
        let real = follow(expand(candidate.as_bytes())?)?;
        if is_executable(&real) {
            return Ok(real);
        }
    }
    bail!("{command}: command not found inside {shown_root}")
}

fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Start the command and wait for it. Returns the exit code to pass on;
/// death by signal maps to `128 + signal` as shells report it.
pub fn run(args: &RunArgs, config: Config) -> Result<i32> {
    let config = apply_args(&args.root, config)?;
    let library = find_library(&config)?;
    let root = config
        .root
        .base
        .clone()
        .context("No root given: pass --root or set root.base in the config")?;
    let (command, rest) = args
        .command
        .split_first()
        .context("No command specified")?;

    let search = std::env::var("PATH").ok();
    let program = resolve_program(&config, command, search.as_deref())?;
    let vars = compose_env(&config, &library, |key| std::env::var(key).ok());

    log_cli_info!(
        "launching",
        program = tracing::field::display(program.display()),
        root = tracing::field::display(root.display())
    );

    let status = Command::new(&program)
        .arg0(command)
        .args(rest)
        .current_dir(&root)
        .envs(vars)
        .status()
        .with_context(|| format!("Failed to execute: {command}"))?;
    Ok(exit_code(status))
}

fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .unwrap_or_else(|| 128 + status.signal().unwrap_or(0))
}

/// Single-quote `value` for a POSIX shell.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
