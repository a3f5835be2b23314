use tokio_util::sync::CancellationToken;
use tracing::info;
use url::Url;
use uuid::Uuid;

use websearch_core::AppConfig;

use super::Pipeline;

pub async fn run(
    config: AppConfig,
    url: String,
    query: String,
    max_pages: Option<usize>,
) -> anyhow::Result<()> {
    let seed = Url::parse(&url)?;
    let max_pages = max_pages.unwrap_or(config.general.max_pages);
    let pipeline = Pipeline::connect(config).await?;

    let search_id = Uuid::new_v4().to_string();
    info!(search_id = %search_id, %url, %query, max_pages, "starting search");

    let cancel = CancellationToken::new();
    let results = pipeline
        .orchestrator
        .search(&search_id, &seed, &query, max_pages, &cancel)
        .await?;

    println!("search {search_id} complete, {} result(s)", results.len());
    for (rank, result) in results.iter().enumerate() {
        println!(
            "{:>3}. [{:.2}] {} - {}",
            rank + 1,
            result.relevance,
            result.title,
            result.url
        );
        println!("     ({} match{}) ...{}...", result.count, if result.count == 1 { "" } else { "es" }, result.context);
    }

    Ok(())
}
