//! Command handlers: bridge CLI args -> cache/config operations -> output.

pub mod cache;
pub mod config_cmd;
pub mod util;
