//! End-to-end tests for the public API, organized the way
//! `crates/broker/broker/src/core/tests/mod.rs` splits its suite: one
//! file per concern, driven against a paused virtual clock.

mod invariants;
mod scenarios;
