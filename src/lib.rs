//! Quarry: resilient, resumable batch generation of structured records
//!
//! A batch session drives an LLM provider until a target number of validated
//! records exists. Transient provider failures are retried with linear
//! backoff, malformed responses are repaired where possible, host load gates
//! new work, and progress is checkpointed so an interrupted run resumes
//! without duplicating records.

pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod governor;
pub mod ledger;
pub mod logging;
pub mod metrics;
pub mod provider;
pub mod record;
pub mod recovery;
pub mod request;
pub mod retry;
pub mod runner;
pub mod session;
