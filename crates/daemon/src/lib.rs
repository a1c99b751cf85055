//! `siesta-daemon` library crate.
//!
//! Re-exports internal modules for integration testing. The binary
//! entrypoint lives in `main.rs`.

pub mod controller;
pub mod idle;
pub mod monitor;
pub mod power;
pub mod sampler;
