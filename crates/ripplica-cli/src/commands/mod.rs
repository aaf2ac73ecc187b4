//! CLI command handlers

pub mod cache;
pub mod classify;
pub mod query;
pub mod scrape;
pub mod search;
pub mod serve;

use serde::Serialize;

pub(crate) fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
