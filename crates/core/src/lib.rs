//! Swap orchestration core.
//!
//! This crate provides:
//! - Environment-driven configuration
//! - Integer human ↔ base-unit amount conversion
//! - The live quote display with in-place redraw and user confirmation
//! - The typed `swap` entry point wiring resolution, streaming,
//!   confirmation, assembly, and submission together
//! - The user-facing error taxonomy

pub mod amounts;
mod config;
mod display;
mod error;
mod swap;

pub use config::SwapConfig;
pub use display::DisplayContext;
pub use error::{SwapError, SwapOutcome};
pub use swap::swap;
