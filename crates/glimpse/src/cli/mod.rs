//! Subcommand implementations.

pub mod caption;
pub mod config;
pub mod models;
pub mod serve;
pub mod vocab;
