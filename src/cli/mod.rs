//! Command handlers

mod commands;

pub use commands::*;
