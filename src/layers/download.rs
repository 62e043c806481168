use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::{create_dir_all, rename, File};
use tokio::io::AsyncWriteExt;
use crate::layers::PaperRecord;

#[derive(Debug, Clone, PartialEq)]
pub enum DownloadOutcome {
    /// Already on disk and not forced; no request was made.
    Skipped(PathBuf),
    Downloaded(PathBuf),
    Failed(String),
}

impl DownloadOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, DownloadOutcome::Failed(_))
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub total: usize,
}

impl BatchSummary {
    fn record(&mut self, outcome: &DownloadOutcome) {
        self.total += 1;
        if outcome.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        if matches!(outcome, DownloadOutcome::Skipped(_)) {
            self.skipped += 1;
        }
    }
}

pub struct Downloader {
    client: Client,
    base_dir: PathBuf,
    force: bool,
    save_metadata: bool,
    pause: Duration,
}

impl Downloader {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            client: Client::new(),
            base_dir: base_dir.into(),
            force: false,
            save_metadata: false,
            pause: Duration::from_secs(1),
        }
    }

    /// Re-download files that are already present.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Write `<arxiv-id>.json` next to each freshly downloaded PDF.
    pub fn save_metadata(mut self, save_metadata: bool) -> Self {
        self.save_metadata = save_metadata;
        self
    }

    /// Delay between consecutive download requests.
    pub fn pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub async fn prepare(&self) -> Result<()> {
        create_dir_all(&self.base_dir)
            .await
            .with_context(|| format!("cannot create download directory {:?}", self.base_dir))
    }

    pub fn target_path(&self, paper: &PaperRecord) -> PathBuf {
        self.base_dir.join(paper.file_name())
    }

    /// Fetches one paper. Errors are returned to the caller; see
    /// [`Downloader::download_all`] for the batch behaviour.
    pub async fn download_paper(&self, paper: &PaperRecord) -> Result<DownloadOutcome> {
        let file_name = paper.file_name();
        let pdf_path = self.target_path(paper);

        if !self.force && tokio::fs::try_exists(&pdf_path).await.unwrap_or(false) {
            println!("File {} already exists, skipping.", file_name);
            return Ok(DownloadOutcome::Skipped(pdf_path));
        }

        println!("Downloading: {} ({})", paper.title, file_name);
        tracing::info!("Downloading PDF from: {}", paper.pdf_url);
        let mut response = self.client.get(&paper.pdf_url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow!("Failed to download PDF: {}", response.status()));
        }

        // a `.part` file never satisfies the existence check above
        let part_path = self.base_dir.join(format!("{}.part", file_name));
        let mut file = File::create(&part_path)
            .await
            .with_context(|| format!("cannot create {:?}", part_path))?;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        drop(file);

        // the PDF only lands once its sidecar is written
        if self.save_metadata {
            self.write_metadata(paper).await?;
        }

        rename(&part_path, &pdf_path)
            .await
            .with_context(|| format!("cannot move {:?} into place", part_path))?;

        println!("Downloaded: {}", pdf_path.display());
        Ok(DownloadOutcome::Downloaded(pdf_path))
    }

    /// Downloads every paper in order. A failure is logged and counted but
    /// never stops the batch.
    pub async fn download_all(&self, papers: &[PaperRecord]) -> BatchSummary {
        let mut summary = BatchSummary::default();

        for (i, paper) in papers.iter().enumerate() {
            let outcome = match self.download_paper(paper).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    let message = format!("{:#}", e);
                    tracing::error!("Download of {} failed: {}", paper.arxiv_id, message);
                    println!("Download failed: {} - error: {}", paper.file_name(), message);
                    self.discard_partial(paper).await;
                    DownloadOutcome::Failed(message)
                }
            };
            summary.record(&outcome);

            let is_last = i + 1 == papers.len();
            if pauses_after(&outcome, is_last) && !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }
        }

        summary
    }

    async fn write_metadata(&self, paper: &PaperRecord) -> Result<()> {
        let metadata_path = self.base_dir.join(format!("{}.json", paper.arxiv_id));
        tracing::info!("Saving metadata to: {:?}", metadata_path);
        let metadata_json = serde_json::to_string_pretty(paper)?;
        let mut meta_file = File::create(&metadata_path)
            .await
            .with_context(|| format!("cannot create {:?}", metadata_path))?;
        meta_file.write_all(metadata_json.as_bytes()).await?;
        meta_file.flush().await?;
        Ok(())
    }

    async fn discard_partial(&self, paper: &PaperRecord) {
        let part_path = self.base_dir.join(format!("{}.part", paper.file_name()));
        if tokio::fs::remove_file(&part_path).await.is_ok() {
            tracing::debug!("Removed partial file {:?}", part_path);
        }
    }
}

/// Skips made no request, and nothing follows the last item.
fn pauses_after(outcome: &DownloadOutcome, is_last: bool) -> bool {
    !is_last && !matches!(outcome, DownloadOutcome::Skipped(_))
}
