//! Search command

use super::print_json;
use crate::app::{OutputFormat, SearchArgs};
use anyhow::Result;
use ripplica_core::{Config, Runtime};

pub async fn run(args: SearchArgs, config: Config, format: OutputFormat) -> Result<()> {
    let runtime = Runtime::build(config).await?;
    let outcome = runtime
        .pipeline
        .search_only(&args.query(), args.max_results)
        .await;

    match format {
        OutputFormat::Json => print_json(&outcome)?,
        OutputFormat::Cli => {
            if let Some(error) = &outcome.error {
                eprintln!("Search failed: {}", error);
            }
            if outcome.urls.is_empty() {
                println!("No results");
            }
            for (i, url) in outcome.urls.iter().enumerate() {
                println!("{:>2}. {}", i + 1, url);
            }
        }
    }
    Ok(())
}
