//! ugc-studio library crate.
//!
//! Credits, provider access, the generation job state machine and the local
//! selection store behind the `ugc-studio` CLI.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod ledger;
pub mod orchestrator;
pub mod provider;
pub mod selection;
pub mod session;
