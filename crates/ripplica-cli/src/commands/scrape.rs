//! Scrape command

use super::print_json;
use crate::app::{OutputFormat, ScrapeArgs};
use anyhow::Result;
use ripplica_core::text::truncate_chars;
use ripplica_core::{Config, Runtime};
use tokio_util::sync::CancellationToken;

const PREVIEW_CHARS: usize = 200;

pub async fn run(args: ScrapeArgs, config: Config, format: OutputFormat) -> Result<()> {
    let runtime = Runtime::build(config).await?;
    let outcome = runtime
        .pipeline
        .scrape_only(&args.urls, &CancellationToken::new())
        .await;

    match format {
        OutputFormat::Json => print_json(&outcome)?,
        OutputFormat::Cli => {
            for result in &outcome.results {
                let status = if result.success { "ok" } else { "failed" };
                println!("[{}] {} ({} chars)", status, result.url, result.content_length);
                if let Some(error) = &result.error {
                    println!("    {}", error);
                } else if !result.content.is_empty() {
                    println!("    {}", truncate_chars(&result.content, PREVIEW_CHARS));
                }
            }
            println!();
            println!(
                "Scraped {}/{} pages",
                outcome.successful_scrapes, outcome.urls_processed
            );
        }
    }
    Ok(())
}
