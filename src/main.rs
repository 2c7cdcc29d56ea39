use anyhow::Result;
use clap::{Parser, Subcommand};
use console::Term;
use depmanifest::{
    config::Config,
    export::Exporter,
    output::{print_result, OutputFormat},
    scanner::ModuleScanner,
    shell::{self, Session},
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Exit codes for scripting
mod exit_codes {
    pub const SUCCESS: u8 = 0;
    pub const ERROR: u8 = 1;
}

#[derive(Parser)]
#[command(name = "depmanifest")]
#[command(
    author,
    version,
    about = "List the third-party modules shipped in a product installation"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Exclude modules whose filename, title, or copyright contains this text
    #[arg(long, global = true)]
    exclude: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the interactive shell (default)
    Shell {
        /// Installation directory to start with
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Scan an installation directory and write the manifest
    Export {
        /// Installation directory to scan
        input: PathBuf,

        /// Directory the manifest is written into
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Scan an installation directory and print the modules found
    List {
        /// Installation directory to scan
        input: PathBuf,

        /// Output format (table, json, xml)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Show the effective settings, or create the config file
    Config {
        /// Generate default config file
        #[arg(long)]
        init: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,
    },
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            if let Some(hint) = e
                .downcast_ref::<depmanifest::Error>()
                .and_then(|err| err.suggestion())
            {
                eprintln!("Hint: {}", hint);
            }
            ExitCode::from(exit_codes::ERROR)
        }
    }
}

fn init_logging(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match verbose {
            0 => "depmanifest=warn",
            1 => "depmanifest=info",
            _ => "depmanifest=debug",
        })
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_config(exclude: Option<String>) -> Config {
    let mut config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            warn!(error = %err, "ignoring unreadable config file");
            Config::default()
        }
    };
    if let Some(exclude) = exclude {
        config.exclude_substring = exclude;
    }
    config
}

fn run() -> Result<u8> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = load_config(cli.exclude);

    match cli.command.unwrap_or(Commands::Shell { dir: None }) {
        Commands::Shell { dir } => {
            let mut session = Session::new(config);
            if let Some(dir) = dir {
                session = session.with_install_dir(dir.display().to_string());
            }
            shell::terminal::run(&mut session)?;
            Ok(exit_codes::SUCCESS)
        }
        Commands::Export { input, output } => {
            let progress = scan_progress();
            let exported = Exporter::new(&config)
                .with_progress(progress.clone())
                .export(&input, &output);
            progress.finish_and_clear();

            println!("{}", exported?.success_message());
            Ok(exit_codes::SUCCESS)
        }
        Commands::List { input, format } => {
            let format = OutputFormat::from_str(&format).map_err(anyhow::Error::msg)?;
            let progress = if format == OutputFormat::Table {
                scan_progress()
            } else {
                ProgressBar::hidden()
            };
            let scanned = ModuleScanner::new(&config)
                .with_progress(progress.clone())
                .scan(&input);
            progress.finish_and_clear();

            print_result(&scanned?, format)?;
            Ok(exit_codes::SUCCESS)
        }
        Commands::Config { init, path } => {
            handle_config(&config, init, path)?;
            Ok(exit_codes::SUCCESS)
        }
    }
}

/// A spinner on stderr when it is a terminal, hidden otherwise.
fn scan_progress() -> ProgressBar {
    if !Term::stderr().is_term() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) =
        ProgressStyle::default_spinner().template("{spinner:.green} [{pos}/{len}] Reading {msg}")
    {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn handle_config(config: &Config, init: bool, show_path: bool) -> Result<()> {
    let config_path = Config::config_path();

    if show_path {
        println!("{}", config_path.display());
        return Ok(());
    }

    if init {
        if config_path.exists() {
            println!("Config file already exists at: {}", config_path.display());
            return Ok(());
        }

        Config::default().save()?;
        println!("Created config file at: {}", config_path.display());
        println!();
        println!("Default configuration:");
        println!("{}", Config::generate_default_config());
        return Ok(());
    }

    let source = config_path.exists().then_some(config_path.as_path());
    print!("{}", render_config(config, source)?);
    if source.is_none() {
        println!();
        println!("Run 'depmanifest config --init' to create {}", config_path.display());
    }

    Ok(())
}

/// The settings a run would use, headed by where they came from.
fn render_config(config: &Config, source: Option<&Path>) -> Result<String> {
    let origin = match source {
        Some(path) => format!("Config file: {}", path.display()),
        None => "No config file found, using built-in defaults".to_string(),
    };
    Ok(format!(
        "{}\n\nEffective configuration:\n{}",
        origin,
        config.to_toml()?
    ))
}
