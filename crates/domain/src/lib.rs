//! Shared types for kbagent: errors, configuration, provider-agnostic
//! messages and streaming events, and structured trace events.

pub mod config;
pub mod error;
pub mod stream;
pub mod tool;
pub mod trace;
