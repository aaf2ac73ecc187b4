//! Composition root: builds every collaborator from configuration

use crate::cache::{SimilarityCache, SqliteVectorStore};
use crate::config::Config;
use crate::distill::Distiller;
use crate::error::Result;
use crate::llm::{
    HttpClassifier, HttpEmbedder, HttpPassageExtractor, HttpSummarizer, LLMClient, VLLMClient,
};
use crate::pipeline::{Collaborators, Pipeline, PipelineOptions};
use crate::progress::ProgressHub;
use crate::retrieval::{default_fetcher, HttpFetcher, PageFetcher, Retriever};
use std::sync::Arc;

/// Process-wide services shared by every request
pub struct Runtime {
    pub config: Config,
    pub pipeline: Arc<Pipeline>,
    pub hub: Arc<ProgressHub>,
    pub llm: Arc<VLLMClient>,
}

impl Runtime {
    /// Build with headless Chromium for fetching, when one can be launched
    pub async fn build(config: Config) -> Result<Self> {
        let fetcher = default_fetcher(&config.retrieval).await;
        Self::assemble(config, fetcher)
    }

    /// Build without launching a browser; pages are fetched over plain HTTP
    pub fn build_without_browser(config: Config) -> Result<Self> {
        let fetcher: Arc<dyn PageFetcher> = Arc::new(HttpFetcher::new(&config.retrieval.user_agent));
        Self::assemble(config, fetcher)
    }

    fn assemble(config: Config, fetcher: Arc<dyn PageFetcher>) -> Result<Self> {
        let llm = Arc::new(VLLMClient::new(config.llm_service.clone())?);
        let client: Arc<dyn LLMClient> = llm.clone();

        let db_path = config.cache.database_path();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let store = SqliteVectorStore::open(&db_path)?;
        tracing::debug!("Opened cache database at {}", db_path.display());

        let collaborators = Collaborators {
            classifier: Arc::new(HttpClassifier::new(client.clone(), &config.classifier)),
            embedder: Arc::new(HttpEmbedder::new(client.clone())),
            summarizer: Arc::new(HttpSummarizer::new(client.clone(), &config.summarizer)),
            cache: Arc::new(SimilarityCache::new(Arc::new(store), (&config.cache).into())),
            retriever: Arc::new(Retriever::with_fetcher(fetcher, config.retrieval.clone())),
            distiller: Arc::new(
                Distiller::new(config.distill.clone())
                    .with_extractor(Arc::new(HttpPassageExtractor::new(client))),
            ),
        };

        let pipeline = Arc::new(Pipeline::new(collaborators, PipelineOptions::from(&config)));
        let hub = Arc::new(ProgressHub::new(config.server.channel_capacity));

        Ok(Self {
            config,
            pipeline,
            hub,
            llm,
        })
    }
}
