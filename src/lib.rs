//! conlink library
//!
//! Declarative container networking: a network description (links between
//! container interfaces, tunnels, host interfaces and commands) is loaded,
//! merged and normalized, then realized by watching container starts and
//! invoking external drivers as each link's two endpoints become available.
//!
//! The `wait` and `copy` modules back two small helpers meant to run
//! inside the linked containers themselves.

// Use mimalloc as the global allocator for tests (non-Windows only)
#[cfg(not(windows))]
#[cfg(test)]
#[global_allocator]
static ALLOC: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod builder;
pub mod compose;
pub mod config;
pub mod copy;
pub mod dot;
pub mod driver;
pub mod error;
pub mod interpolation;
pub mod loader;
pub mod merge;
pub mod network;
pub mod normalize;
pub mod orchestrator;
pub mod runner;
pub mod runtime;
pub mod state;
pub mod utils;
pub mod wait;

// Test helpers module - available when test-internals feature is enabled
#[cfg(any(test, feature = "test-internals"))]
pub mod test_helpers;

#[cfg(test)]
pub mod tests;

// Re-export commonly used items
pub use config::Settings;
pub use error::{ConlinkError, Result};
pub use network::NetworkConfig;
pub use orchestrator::Orchestrator;
pub use state::ConnectivityState;
