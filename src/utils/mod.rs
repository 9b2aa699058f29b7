//! Shared utilities: command execution and interval parsing.

pub mod command;
pub mod duration;

pub use command::{
    display_command, powershell_args, CommandOutput, CommandRunner, SystemCommandRunner,
};
pub use duration::parse_interval;
