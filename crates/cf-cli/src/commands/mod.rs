//! CLI subcommand implementations.

mod serve;

pub use serve::{run_server, ServeConfig};
