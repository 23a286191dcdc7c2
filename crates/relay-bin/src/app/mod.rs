//! Application wiring and one-shot maintenance commands.

mod commands;
mod run;

pub use commands::{print_status, sweep_now};
pub use run::run_relay;
