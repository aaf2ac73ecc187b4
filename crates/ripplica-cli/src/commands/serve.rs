//! Serve command

use crate::app::ServeArgs;
use anyhow::Result;
use ripplica_core::{Config, Runtime};
use ripplica_server::AppState;

pub async fn run(args: ServeArgs, config: Config) -> Result<()> {
    let bind = args.bind.unwrap_or_else(|| config.server.bind.clone());
    let runtime = Runtime::build(config).await?;
    eprintln!("Serving on http://{}", bind);
    ripplica_server::start(&bind, AppState::from_runtime(&runtime)).await
}
