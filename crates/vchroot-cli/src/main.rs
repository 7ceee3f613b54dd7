//! # vchroot CLI
//!
//! Runs programs inside a virtual root without privilege, by preloading the
//! vchroot inception layer.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use vchroot_config::logging::{init_logging, LogLevel};
use vchroot_config::{log_cli_debug, Config};

mod launch;

/// vchroot - unprivileged chroot through path virtualization
#[derive(Parser)]
#[command(name = "vchroot")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a command with DIR presented as `/`
    Run(launch::RunArgs),

    /// Print the environment for a virtual root as shell exports
    Env(launch::RootArgs),

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file locations
    Path,
}

fn main() -> Result<()> {
    #[cfg(unix)]
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }

    let cli = Cli::parse();
    let config = Config::load().context("Failed to load configuration")?;
    init_logging(LogLevel::parse(&config.log.level).unwrap_or(LogLevel::Warn));
    log_cli_debug!("configuration loaded", level = config.log.level.as_str());

    match cli.command {
        Commands::Run(args) => {
            let code = launch::run(&args, config)?;
            std::process::exit(code);
        }
        Commands::Env(args) => {
            let plan = launch::environment(&args, config)?;
            for (key, value) in plan {
                println!("export {}={}", key, launch::shell_quote(&value));
            }
            Ok(())
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                print!("{}", config.to_toml());
                Ok(())
            }
            ConfigCommands::Path => {
                cmd_config_path();
                Ok(())
            }
        },
    }
}

fn cmd_config_path() {
    let describe = |path: Option<PathBuf>| match path {
        Some(p) if p.exists() => format!("{} (exists)", p.display()),
        Some(p) => format!("{} (not found)", p.display()),
        None => "(no home directory)".to_string(),
    };
    println!("Global:  {}", describe(Config::global_config_path()));
    println!("Project: {}", describe(Some(Config::project_config_path())));
}
