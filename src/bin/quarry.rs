//! Quarry CLI Binary
//!
//! Command-line interface for resumable batch record generation.

use clap::Parser;
use quarry::cli::{Cli, Commands, RunContext};
use quarry::config::ConfigLoader;
use quarry::logging::{init_logging, LoggingConfig};
use quarry::session::generate_session_id;
use std::process;
use tracing::{error, info};

fn main() {
    let mut cli = Cli::parse();

    // Fix the session id up front so the default log file carries it
    let session_label = assign_session_label(&mut cli.command);

    let logging_config = build_logging_config(&cli);
    if let Err(e) = init_logging(Some(&logging_config), &session_label) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    info!(session = %session_label, "Quarry CLI starting");

    let context = match RunContext::new(cli.config.clone()) {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("Error loading configuration: {}", e);
            eprintln!("{}", quarry::cli::map_error(&e));
            process::exit(1);
        }
    };

    match context.execute(&cli.command) {
        Ok(output) => {
            info!("Command completed successfully");
            println!("{}", output);
        }
        Err(e) => {
            error!("Command failed: {}", e);
            eprintln!("{}", quarry::cli::map_error(&e));
            process::exit(1);
        }
    }
}

/// Session id for `run` (resumed, explicit or freshly generated); `cli` otherwise.
fn assign_session_label(command: &mut Commands) -> String {
    match command {
        Commands::Run {
            resume: Some(id), ..
        } => id.clone(),
        Commands::Run { session_id, .. } => session_id.get_or_insert_with(generate_session_id).clone(),
        _ => "cli".to_string(),
    }
}

/// Build logging configuration from CLI args and config file.
/// Precedence: CLI flags override config file override defaults.
fn build_logging_config(cli: &Cli) -> LoggingConfig {
    let mut config = ConfigLoader::load(cli.config.as_deref())
        .ok()
        .map(|c| c.logging)
        .unwrap_or_default();

    if cli.verbose {
        config.level = "debug".to_string();
    }
    if let Some(ref level) = cli.log_level {
        config.level = level.clone();
    }
    if let Some(ref format) = cli.log_format {
        config.format = format.clone();
    }
    if let Some(ref output) = cli.log_output {
        config.output = output.clone();
    }
    if let Some(ref file) = cli.log_file {
        config.file = Some(file.clone());
        if cli.log_output.is_none() {
            config.output = "file".to_string();
        }
    }

    config
}
