mod config;
mod layers;

use crate::config::Config;
use crate::layers::discovery::ArxivClient;
use crate::layers::download::{BatchSummary, Downloader};
use crate::layers::screening::DateWindow;
use crate::layers::{Combinator, SearchCriteria, YearMonth};
use anyhow::{bail, Result};
use chrono::Datelike;
use clap::Parser;
use dotenvy::dotenv;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Search arXiv by keyword and download the matching PDFs", long_about = None)]
struct Args {
    /// Search keywords (several may be given)
    #[arg(required = true, num_args = 1..)]
    keywords: Vec<String>,

    /// Maximum number of papers to fetch
    #[arg(long, default_value_t = 200, value_parser = clap::value_parser!(u64).range(1..))]
    max_results: u64,

    /// Join keywords with OR instead of AND
    #[arg(long, default_value_t = false)]
    use_or: bool,

    /// Download again even if the PDF is already present
    #[arg(long, default_value_t = false)]
    force_download: bool,

    /// Also write <arxiv-id>.json with the paper metadata
    #[arg(long, default_value_t = false)]
    save_metadata: bool,

    /// Earliest submission month, inclusive
    #[arg(long, value_name = "YYYYMM")]
    date_from: Option<YearMonth>,

    /// Latest submission month, inclusive
    #[arg(long, value_name = "YYYYMM")]
    date_to: Option<YearMonth>,

    /// Download directory (defaults to `dl` next to the executable)
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

impl Args {
    fn criteria(&self) -> Result<SearchCriteria> {
        if let (Some(from), Some(to)) = (self.date_from, self.date_to) {
            if from > to {
                bail!("--date-from {} is after --date-to {}", from, to);
            }
        }
        Ok(SearchCriteria {
            keywords: self.keywords.clone(),
            combinator: if self.use_or { Combinator::Or } else { Combinator::And },
            max_results: usize::try_from(self.max_results).unwrap_or(usize::MAX),
            date_from: self.date_from,
            date_to: self.date_to,
        })
    }
}

fn search_report(found: usize) -> String {
    match found {
        0 => "No papers found.".to_string(),
        n => format!("Found {} papers.", n),
    }
}

/// Returns `None` when the search found nothing.
async fn run(args: Args, config: Config) -> Result<Option<BatchSummary>> {
    let criteria = args.criteria()?;

    let download_dir = args.output_dir.clone().unwrap_or_else(|| config.download_dir.clone());
    let downloader = Downloader::new(download_dir)
        .force(args.force_download)
        .save_metadata(args.save_metadata)
        .pause(config.download_pause);
    downloader.prepare().await?;

    // 1. Discovery
    println!("Searching arXiv for '{}'...", criteria.keywords.join(" "));
    let client = ArxivClient::from_config(&config);
    let mut papers = client.search(&criteria).await?;

    // 2. Date screening
    if let Some(window) = DateWindow::new(criteria.date_from, criteria.date_to) {
        papers = window.retain(papers);
    }
    println!("{}", search_report(papers.len()));

    if papers.is_empty() {
        return Ok(None);
    }

    println!("\nSearch results:");
    for (i, paper) in papers.iter().enumerate() {
        println!("{}. {} ({})", i + 1, paper.title, paper.published.year());
    }

    // 3. Download
    println!("\nStarting PDF downloads...");
    let summary = downloader.download_all(&papers).await;

    println!(
        "\nDownload complete: {}/{} PDFs downloaded.",
        summary.succeeded, summary.total
    );
    println!("Download directory: {}", downloader.base_dir().display());
    tracing::info!(
        "Batch finished: {} downloaded, {} already present, {} failed",
        summary.succeeded - summary.skipped,
        summary.skipped,
        summary.failed
    );

    Ok(Some(summary))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("arxiv_downloader=info,warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = Config::from_env()?;
    tracing::debug!("Configuration: {:?}", config);

    run(args, config).await?;
    Ok(())
}
