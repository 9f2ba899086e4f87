//! # mfs CLI
//!
//! Interactive shell over a single mfs disk image.

use std::fs::File;
use std::io::{self, BufReader, IsTerminal, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mfs_config::logging::init_logging;
use mfs_config::{log_image_info, log_image_warn, Config};
use mfs_core::MockFs;

mod command;
mod output;
mod shell;

use command::Command;
use shell::{Shell, ShellOptions};

/// mfs - a flat, inode-based mock file system in a single image file
#[derive(Parser)]
#[command(name = "mfs")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Image to open before the first command
    #[arg(long, value_name = "PATH")]
    image: Option<PathBuf>,

    /// Read commands from FILE instead of standard input
    #[arg(long, value_name = "FILE")]
    script: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the interactive shell (default)
    Shell,

    /// Show configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Open IMAGE, run one shell command, and save if it changed the image
    Exec {
        #[arg(value_name = "IMAGE")]
        image: PathBuf,

        #[arg(
            value_name = "COMMAND",
            required = true,
            trailing_var_arg = true,
            allow_hyphen_values = true
        )]
        command: Vec<String>,
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
    let cli = Cli::parse();
    let config = mfs_config::config().clone();
    init_logging(config.log_level());

    match cli.command.unwrap_or(Commands::Shell) {
        Commands::Shell => cmd_shell(&config, cli.image.as_deref(), cli.script.as_deref()),
        Commands::Config { command } => cmd_config(&config, command),
        Commands::Exec { image, command } => cmd_exec(&image, &command),
    }
}

fn cmd_shell(config: &Config, image: Option<&Path>, script: Option<&Path>) -> Result<()> {
    let stdin = io::stdin();
    let interactive = script.is_none() && stdin.is_terminal();
    let echo = config.shell.echo && !interactive;
    let options = ShellOptions {
        prompt: (interactive || echo).then(|| config.shell.prompt.clone()),
        echo,
        autosave_on_quit: config.image.autosave_on_quit,
    };

    let mut shell = Shell::new(MockFs::new(), options);
    let stdout = io::stdout();
    let mut out = stdout.lock();

    if let Some(path) = image.or(config.image.default_path.as_deref()) {
        log_image_info!("Opening startup image", path = path.display().to_string());
        if let Err(e) = shell.fs_mut().open(path) {
            log_image_warn!("Startup image not opened", error = e.to_string());
            writeln!(out, "ERROR: {}", e)?;
        }
    }

    match script {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open script {}", path.display()))?;
            shell.run(BufReader::new(file), &mut out)?;
        }
        None => shell.run(stdin.lock(), &mut out)?,
    }
    Ok(())
}

fn cmd_config(config: &Config, command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Show => print!("{}", config.to_toml()?),
        ConfigCommands::Path => {
            match Config::global_config_path() {
                Some(path) => println!("Global:  {}", path.display()),
                None => println!("Global:  (no home directory)"),
            }
            println!("Project: {}", Config::project_config_path().display());
        }
    }
    Ok(())
}

fn cmd_exec(image: &Path, words: &[String]) -> Result<()> {
    let command: Command = words.join(" ").parse()?;

    let mut fs = MockFs::new();
    fs.open(image)
        .with_context(|| format!("Failed to open image {}", image.display()))?;

    let mut shell = Shell::from(fs);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    shell.execute(command.clone(), &mut out)?;

    if command.mutates() {
        shell
            .fs_mut()
            .save()
            .with_context(|| format!("Failed to save image {}", image.display()))?;
        log_image_info!("Saved image", path = image.display().to_string());
    }
    Ok(())
}
