pub mod config;
pub mod daemon;
pub mod plan;
pub mod schedule;
pub mod timer;

use serde::Serialize;

pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

pub fn print_json<T: Serialize>(value: &T) -> CommandResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
