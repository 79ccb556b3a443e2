//! CLI module for branch-promoter
//!
//! This module contains all CLI command definitions and handlers using clap.

pub mod auth;
pub mod commands;
pub mod exec;
pub mod outputs;
pub mod pr;
pub mod tag;

pub use commands::{Cli, Commands};
