//! mandate — a hierarchical multi-role contract workflow engine.
//!
//! A contract moves through a fixed organization of four roles (director,
//! planner, executor, reviewer) connected by a chain-of-command mail system.
//! The engine interprets a node graph over the contract's state: dispatch,
//! planning, an explicit ownership step, execution with optional progress
//! checks, independent review, and a final approval gate that is answered
//! automatically or by a human. Human approval suspends the contract to a
//! durable checkpoint and resumes from a callback, possibly in a different
//! process.
//!
//! The host constructs the collaborators ([`collab::ModelClient`],
//! [`collab::ApprovalNotifier`]) and stores ([`checkpoint::CheckpointStore`],
//! [`approval::ApprovalLedger`]) and injects them into the [`Engine`].

pub mod approval;
pub mod checkpoint;
pub mod collab;
pub mod config;
pub mod engine;
pub mod errors;
pub mod mail;
pub mod nodes;
pub mod phase;
pub mod role;
pub mod router;
pub mod state;

pub use config::EngineConfig;
pub use engine::{ContractIntake, Engine, RunOutcome};
pub use errors::{ApprovalError, EngineError};

/// Install a global `tracing` subscriber honoring `RUST_LOG`, defaulting to
/// `info`. Intended for host binaries; call once at startup.
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
