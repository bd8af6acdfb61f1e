//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → broadcast → background tasks exit → process exits
//! ```
//!
//! # Design Decisions
//! - The library never installs signal handlers on its own; the binary does
//! - Shutdown is idempotent: the first trigger wins

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
