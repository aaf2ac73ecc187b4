//! Query command

use super::print_json;
use crate::app::{OutputFormat, QueryArgs};
use crate::progress::StepPrinter;
use anyhow::Result;
use ripplica_core::{Config, ProgressEmitter, QueryOutcome, RipplicaError, Runtime};
use tokio_util::sync::CancellationToken;

pub async fn run(args: QueryArgs, mut config: Config, format: OutputFormat) -> Result<()> {
    if let Some(threshold) = args.threshold {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(RipplicaError::InvalidInput(format!(
                "threshold must be within [0, 1], got {}",
                threshold
            ))
            .into());
        }
        config.cache.threshold = threshold;
    }
    let query = args.query();
    let runtime = Runtime::build(config).await?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let outcome = if format == OutputFormat::Cli {
        let (emitter, printer) = StepPrinter::start();
        let result = runtime.pipeline.run(&query, &emitter, &cancel).await;
        drop(emitter);
        printer.finish().await;
        result?
    } else {
        runtime
            .pipeline
            .run(&query, &ProgressEmitter::noop(), &cancel)
            .await?
    };

    match format {
        OutputFormat::Json => print_json(&outcome)?,
        OutputFormat::Cli => print_outcome(&outcome),
    }
    Ok(())
}

fn print_outcome(outcome: &QueryOutcome) {
    if !outcome.is_valid {
        println!("{}", outcome.summary);
        if let Some(failure) = &outcome.failure {
            println!("Reason: {}", failure.reasoning);
        }
        return;
    }

    println!("{}", outcome.summary);
    println!();
    if outcome.from_cache {
        println!(
            "From cache (similarity {:.3}, cached query: {})",
            outcome.cache_similarity,
            outcome.cached_query.as_deref().unwrap_or("-")
        );
    } else {
        println!(
            "Sources: {}/{} pages scraped",
            outcome.content_scraped, outcome.urls_found
        );
        for url in &outcome.scraped_urls {
            println!("  {}", url);
        }
    }
    println!("Time:    {:.2}s", outcome.processing_time);
}
