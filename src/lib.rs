//! # Ops-Core
//!
//! Ops-Core is the control plane for a fleet of autonomous agents. It
//! maintains each agent's lifecycle state, receives asynchronous state
//! callbacks, dispatches tasks from declarative workflow templates through
//! an external agent-routing service, and tracks multi-step sessions.
//!
//! ## Architecture
//!
//! - **State Store**: pluggable persistence (in-memory or Redis) for
//!   registrations, agent states, sessions, and workflow definitions.
//! - **Lifecycle Manager**: registration, state transitions, session
//!   bookkeeping — the only component that touches the store directly on
//!   behalf of the rest of the system.
//! - **Workflow Engine**: template loading, task enqueueing, and the
//!   cooperative dispatch loop that gates delivery on agent readiness.
//! - **Agent-Routing Client**: the outbound HTTP leg that hands tasks to
//!   the external routing service.
//! - **HTTP Surface**: the versioned ingress that binds the above
//!   together behind bearer-token auth.

/// HTTP API server and route handlers
pub mod api;
/// Bearer-token authentication middleware
pub mod auth;
/// Startup configuration loaded from the environment
pub mod config;
/// System-wide constants (timeouts, retry defaults, queue tuning)
pub mod constants;
/// Error taxonomy and HTTP status mapping
pub mod error;
/// Registration, state transition, and session bookkeeping
pub mod lifecycle;
/// Core data models
pub mod models;
/// Outbound HTTP client for the agent-routing service
pub mod routing_client;
/// Loading workflow definitions seeded at startup
pub mod seed;
/// Pluggable agent/session/workflow persistence
pub mod store;
/// Template loading, task queueing, and the dispatch loop
pub mod workflow;

#[cfg(test)]
mod tests;

pub use error::{OpsCoreError, Result};

/// Resolves once a SIGINT/SIGTERM is observed, used to drive graceful
/// shutdown of both the HTTP listener and the dispatch loop.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
