// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod commands;
pub mod config;
pub mod telemetry;
pub mod persist;
pub mod poll;
pub mod state;

// Review cache + merge engine
pub mod reviews;

// Alert registry, throttling and dispatch
pub mod alerts;
pub mod notify;

// ---- Re-exports for stable public API ----
pub use crate::alerts::dispatch::{dispatch_once, spawn_dispatch_loop, DispatchReport};
pub use crate::config::Config;
pub use crate::poll::{poll_once, spawn_poll_loop, PollReport};
pub use crate::reviews::{merge, MergeOutcome, Review, Timestamp};
pub use crate::state::{AppState, Core, SharedCore};

use tokio::task::JoinHandle;

/// Spawn the poll loop and one dispatch loop per alert kind.
pub fn spawn_background_loops(state: &AppState) -> Vec<JoinHandle<()>> {
    vec![
        spawn_poll_loop(state.clone()),
        spawn_dispatch_loop(state.clone(), alerts::AlertVariant::NewReviews),
        spawn_dispatch_loop(state.clone(), alerts::AlertVariant::UpdatedReviews),
    ]
}
