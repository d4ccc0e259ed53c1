//! CLI domain: parse, route and output only.
//! No domain orchestration; a single route table dispatches to the runner and stores.

mod output;
mod parse;
mod route;

pub use output::{
    format_checkpoint_text, format_run_summary, format_section_heading, format_sessions_text,
    map_error,
};
pub use parse::{CheckpointCommands, Cli, Commands};
pub use route::{command_name, RunContext};
