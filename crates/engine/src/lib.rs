// In crates/engine/src/lib.rs

//! The session evaluation engine.
//!
//! One [`evaluator::SessionEvaluator`] serves every session: the sweep loop
//! and the HTTP surface both call into it, and it serializes concurrent
//! ticks per session. The trading pipeline for one tick is
//! signal ([`signal`]) -> reconciliation ([`reconciler`]) -> order placement
//! ([`executor`]), with every decision mirrored into the session's audit log.

pub mod error;
pub mod evaluator;
pub mod executor;
pub mod journal;
pub mod reconciler;
pub mod signal;
pub mod sweep;

#[cfg(test)]
mod testutil;

pub use error::{Error, Result};
pub use evaluator::SessionEvaluator;
