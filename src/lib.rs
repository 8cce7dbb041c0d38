pub mod classify;
pub mod cli;
pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod exit;
pub mod logs;
pub mod platform;
pub mod probes;
pub mod remediate;
pub mod ui;
