//! CLI interface for pktforge
//!
//! This crate provides the `pktforge` command line front-end: argument
//! parsing and the decode, craft and registry commands.

pub mod args;
pub mod commands;

pub use args::{Cli, Commands, CraftArgs};
