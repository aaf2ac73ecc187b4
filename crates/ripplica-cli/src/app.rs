//! CLI argument definitions

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "ripplica")]
#[command(
    author,
    version,
    about = "Answer research questions from the web, with a semantic answer cache"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "cli")]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP and WebSocket server
    Serve(ServeArgs),

    /// Answer a query through the full pipeline
    Query(QueryArgs),

    /// Search for candidate URLs only
    Search(SearchArgs),

    /// Fetch and extract pages only
    Scrape(ScrapeArgs),

    /// Classify a query without answering it
    Classify(TextArgs),

    /// Inspect and maintain the answer cache
    Cache(CacheArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    /// Address to listen on (default from config)
    #[arg(long)]
    pub bind: Option<String>,
}

#[derive(Args)]
pub struct QueryArgs {
    /// Query text
    #[arg(required = true, num_args = 1..)]
    pub text: Vec<String>,

    /// Cache admission threshold
    #[arg(long)]
    pub threshold: Option<f32>,
}

#[derive(Args)]
pub struct SearchArgs {
    /// Query text
    #[arg(required = true, num_args = 1..)]
    pub text: Vec<String>,

    /// Maximum number of URLs
    #[arg(short = 'n', long)]
    pub max_results: Option<usize>,
}

#[derive(Args)]
pub struct ScrapeArgs {
    /// URLs to fetch
    #[arg(required = true, num_args = 1..)]
    pub urls: Vec<String>,
}

#[derive(Args)]
pub struct TextArgs {
    /// Query text
    #[arg(required = true, num_args = 1..)]
    pub text: Vec<String>,
}

impl QueryArgs {
    pub fn query(&self) -> String {
        self.text.join(" ")
    }
}

impl SearchArgs {
    pub fn query(&self) -> String {
        self.text.join(" ")
    }
}

impl TextArgs {
    pub fn query(&self) -> String {
        self.text.join(" ")
    }
}

#[derive(Args)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub action: CacheAction,
}

#[derive(Subcommand)]
pub enum CacheAction {
    /// Show cached queries
    Stats,

    /// Remove every cached answer
    Clear,

    /// Check whether a query would be served from cache
    Check {
        query: String,
        #[arg(long)]
        threshold: Option<f32>,
    },

    /// Store an answer for a query
    Add {
        query: String,
        /// Answer text to store
        #[arg(long)]
        answer: String,
    },

    /// List cached queries similar to a query
    Similar {
        query: String,
        #[arg(long, default_value = "0.7")]
        threshold: f32,
    },
}

#[derive(Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Cli,
    Json,
}
