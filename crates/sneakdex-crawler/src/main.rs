mod feeder;
mod orchestrator;

use orchestrator::Orchestrator;
use sneakdex_config::CrawlerConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CrawlerConfig::from_env()?;

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).json().init();

    tracing::info!(
        start_urls = config.start_urls.len(),
        crawl_depth = config.crawl_depth,
        max_pages = config.max_pages,
        max_concurrency = config.max_concurrency,
        monitor_port = config.monitor_port,
        "starting sneakdex crawler"
    );

    let orchestrator = Orchestrator::build(config).await?;
    orchestrator.run().await;

    Ok(())
}
