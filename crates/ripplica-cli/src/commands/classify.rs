//! Classify command

use super::print_json;
use crate::app::{OutputFormat, TextArgs};
use anyhow::Result;
use ripplica_core::{Config, Runtime};

pub async fn run(args: TextArgs, config: Config, format: OutputFormat) -> Result<()> {
    let runtime = Runtime::build_without_browser(config)?;
    let verdict = runtime.pipeline.classify(&args.query()).await?;

    match format {
        OutputFormat::Json => print_json(&verdict)?,
        OutputFormat::Cli => {
            println!("Valid:          {}", verdict.is_valid);
            println!("Time-sensitive: {}", verdict.is_time_sensitive);
            println!("Intent:         {}", verdict.intent);
            println!("Confidence:     {:.2}", verdict.confidence);
            if !verdict.reasoning.is_empty() {
                println!("Reasoning:      {}", verdict.reasoning);
            }
        }
    }
    Ok(())
}
