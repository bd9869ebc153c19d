// Public API - data types, the probe transport, and the monitor engine
pub mod config;
pub mod monitor;
pub mod probe;
pub mod state;

// Binary-facing plumbing
pub mod cli;
pub mod tui;
