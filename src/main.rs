//! dosetap CLI - inspect the dose-timing engine from a terminal
//!
//! Evaluates the pure parts of the engine against the user's configuration:
//! - dosing window phase for a given dose 1 / dose 2 history
//! - rollover-corrected intervals between two times
//! - the night session an instant belongs to

use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser};

use dosetap::cli::{Cli, Commands, Display, PhaseArgs};
use dosetap::clock::{Clock, SystemClock};
use dosetap::config::AppConfig;
use dosetap::interval::measure_interval;
use dosetap::phase::{PhaseCalculator, PhaseInput};
use dosetap::session::session_key;
use dosetap::types::Timestamp;

/// Main entry point
fn main() {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    init_tracing(cli.verbose);

    // Execute command
    if let Err(e) = execute(cli) {
        Display::show_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

/// Initializes the tracing subscriber for logging.
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_level = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

/// Executes the CLI command.
fn execute(cli: Cli) -> Result<()> {
    let clock = SystemClock;
    let Cli {
        command,
        config: config_arg,
        ..
    } = cli;
    let config_arg = config_arg.as_deref();

    match command {
        Some(Commands::Phase(args)) => {
            let config = load_config(config_arg)?;
            run_phase(&config, &args, clock.now())?;
        }
        Some(Commands::Interval { start, end }) => {
            Display::show_interval(&measure_interval(start, end));
        }
        Some(Commands::SessionKey { at, utc_offset }) => {
            let config = load_config(config_arg)?;
            let mut session = config.session;
            if let Some(offset) = utc_offset {
                session = session.with_utc_offset_minutes(offset);
            }
            let timezone = session.timezone().context("invalid --utc-offset")?;
            let at = at.unwrap_or_else(|| clock.now());
            Display::show_session_key(&session_key(at, &timezone, session.rollover_hour));
        }
        Some(Commands::Config { path }) => {
            let config_path = match config_arg {
                Some(path) => path.to_path_buf(),
                None => AppConfig::default_config_path()?,
            };
            if path {
                println!("{}", config_path.display());
            } else {
                let config = load_config(config_arg)?;
                Display::show_config(&config_path, config_path.exists(), &config.to_toml()?);
            }
        }
        Some(Commands::Completions { shell }) => {
            generate_completions(shell);
        }
        None => {
            // No command provided, show help
            Cli::command().print_help()?;
        }
    }

    Ok(())
}

/// Loads the configuration from `--config` or the default location.
fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::load_from(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => AppConfig::load().context("failed to load configuration")?,
    };
    Ok(config)
}

/// Evaluates and prints the dosing window context.
fn run_phase(config: &AppConfig, args: &PhaseArgs, now: Timestamp) -> Result<()> {
    if args.dose1.is_none() && (args.dose2.is_some() || args.skipped) {
        bail!("--dose2 and --skipped require --dose1");
    }

    let calculator = PhaseCalculator::new(config.dose_window.clone());
    let input = PhaseInput {
        dose1_at: args.dose1,
        dose2_at: args.dose2,
        dose2_skipped: args.skipped,
        snooze_count: args.snoozes,
        wake_final_at: args.wake_final,
        check_in_completed: false,
    };
    let context = calculator.phase(args.now.unwrap_or(now), &input);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&context)?);
    } else {
        Display::show_phase(&context);
    }
    Ok(())
}

/// Generates shell completion scripts.
fn generate_completions(shell: clap_complete::Shell) {
    use clap_complete::generate;
    use std::io;

    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();
    generate(shell, &mut cmd, bin_name, &mut io::stdout());
}

// ============================================================================
// Tests
// ============================================================================
