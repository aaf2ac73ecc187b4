//! Cache maintenance commands

use super::print_json;
use crate::app::{CacheAction, CacheArgs, OutputFormat};
use anyhow::Result;
use ripplica_core::{Config, Runtime};
use serde_json::json;

pub async fn run(args: CacheArgs, config: Config, format: OutputFormat) -> Result<()> {
    let runtime = Runtime::build_without_browser(config)?;
    let pipeline = &runtime.pipeline;

    match args.action {
        CacheAction::Stats => {
            let stats = pipeline.cache_stats().await?;
            match format {
                OutputFormat::Json => print_json(&stats)?,
                OutputFormat::Cli => {
                    println!("Cached answers: {}", stats.cache_count);
                    for cached in &stats.cached_queries {
                        println!(
                            "  {}  {}",
                            cached.timestamp.format("%Y-%m-%d %H:%M"),
                            cached.query
                        );
                    }
                }
            }
        }
        CacheAction::Clear => {
            let removed = pipeline.cache_clear().await?;
            match format {
                OutputFormat::Json => print_json(&json!({ "removed": removed }))?,
                OutputFormat::Cli => println!("Cleared {} cached answers", removed),
            }
        }
        CacheAction::Check { query, threshold } => {
            let check = pipeline.cache_check(&query, threshold).await?;
            match format {
                OutputFormat::Json => print_json(&check)?,
                OutputFormat::Cli => {
                    let verdict = if check.hit { "HIT" } else { "MISS" };
                    println!(
                        "{} (similarity {:.3}, threshold {:.2})",
                        verdict, check.similarity, check.threshold
                    );
                    if let Some(cached) = &check.cached_query {
                        println!("Nearest: {}", cached);
                    }
                }
            }
        }
        CacheAction::Add { query, answer } => {
            let added = pipeline.cache_add(&query, &answer).await?;
            match format {
                OutputFormat::Json => print_json(&added)?,
                OutputFormat::Cli => println!("Cached answer {} for '{}'", added.doc_id, added.query),
            }
        }
        CacheAction::Similar { query, threshold } => {
            let similar = pipeline.cache_similar(&query, threshold).await?;
            match format {
                OutputFormat::Json => print_json(&similar)?,
                OutputFormat::Cli => {
                    println!(
                        "{} of {} cached queries at or above {:.2}",
                        similar.similar_count, similar.total_cached_queries, similar.threshold
                    );
                    for entry in &similar.similar_queries {
                        println!("  {:.3}  {}", entry.similarity, entry.cached_query);
                        println!("         {}", entry.summary_preview);
                    }
                }
            }
        }
    }
    Ok(())
}
