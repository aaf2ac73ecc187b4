//! Pipeline progress printed to stderr

use ripplica_core::{ProgressEmitter, ProgressEvent, Step};
use std::io::{self, Write};
use tokio::task::JoinHandle;

/// Prints each pipeline step as it happens
pub struct StepPrinter {
    handle: JoinHandle<()>,
}

impl StepPrinter {
    /// Emitter plus the task printing its events
    pub fn start() -> (ProgressEmitter, Self) {
        let (emitter, mut rx) = ProgressEmitter::channel();
        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                eprint!("\r{:<60}", describe(&event));
                if matches!(event.step, Step::Done | Step::Invalid | Step::CacheHit) {
                    eprintln!();
                }
                io::stderr().flush().ok();
            }
        });
        (emitter, Self { handle })
    }

    /// Wait until every event has been printed. The emitter must be dropped first.
    pub async fn finish(self) {
        self.handle.await.ok();
    }
}

fn describe(event: &ProgressEvent) -> String {
    let number = |key: &str| event.payload.get(key).and_then(|v| v.as_f64()).unwrap_or(0.0);
    match event.step {
        Step::Validating => "Validating query...".to_string(),
        Step::Classifying => "Classifying...".to_string(),
        Step::Invalid => "Query rejected".to_string(),
        Step::Similarity => format!("Cache similarity {:.3}", number("similarity")),
        Step::CacheHit => "Served from cache".to_string(),
        Step::Searching => "Searching the web...".to_string(),
        Step::Scraping => format!("Fetching {} pages...", number("urls_found") as usize),
        Step::Extracting => format!("Distilling {} sources...", number("sources") as usize),
        Step::Summarizing => "Summarizing...".to_string(),
        Step::Caching => "Caching answer...".to_string(),
        Step::Done => format!("Done in {:.2}s", number("processing_time")),
        other => other.to_string(),
    }
}
