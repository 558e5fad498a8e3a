//! CLI command handlers, one file per command.

mod cleanup;
mod import;
mod serve;
mod status;

pub use cleanup::run_cleanup;
pub use import::run_import;
pub use serve::run_serve;
pub use status::run_status;
