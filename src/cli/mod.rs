mod commands;
mod handlers;

pub use commands::{Cli, Commands};
pub use handlers::{handle_run, handle_status, load_config};
