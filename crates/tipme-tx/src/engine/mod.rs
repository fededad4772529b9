//! Public transfer entry points and the retry loop behind them.

/// Bounded end-to-end transfer retry loop.
mod transfer;
/// Transfer errors, results, and shared state.
mod types;

pub use transfer::TransferEngine;
pub use types::{EngineState, TransferError, TransferResult};
