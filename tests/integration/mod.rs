//! Integration tests for the Quarry batch generation pipeline

mod checkpoint_store;
mod config_loading;
mod recovery_scenarios;
mod retry_policy;
mod runner_export;
mod session_resume;
mod test_utils;
