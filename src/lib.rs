//! Questline - gamified challenge engine for a game catalog app
//!
//! Generates daily challenges for users through an external completion
//! API, verifies user actions against them with per-type heuristics, and
//! tracks a rolling 30-day verification status.
//!
//! ## Services
//!
//! - **Generator**: batch challenge creation with per-user dedup and a
//!   shared daily expiry
//! - **Verifier**: per-type verification (text similarity, activity
//!   counts, vision-assisted avatar checks)
//! - **Status**: rolling-window verified standing with a 30-day lease

pub mod ai;
pub mod config;
pub mod db;
pub mod routes;
pub mod server;
pub mod services;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{QuestlineError, Result};
