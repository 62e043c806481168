use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://export.arxiv.org/api/query";
pub const DEFAULT_DOWNLOAD_SUBDIR: &str = "dl";

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub download_dir: PathBuf,
    pub page_size: usize,
    /// Minimum spacing between two search page requests.
    pub page_delay: Duration,
    pub num_retries: u32,
    /// Pause after each download attempt.
    pub download_pause: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let download_dir = match env::var("DOWNLOAD_DIR") {
            Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
            _ => default_download_dir()?,
        };

        Ok(Self {
            api_url: env::var("ARXIV_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            download_dir,
            page_size: parse_var("ARXIV_PAGE_SIZE", 100usize).max(1),
            page_delay: Duration::from_secs(parse_var("ARXIV_PAGE_DELAY_SECS", 3u64)),
            num_retries: parse_var("ARXIV_NUM_RETRIES", 3u32),
            download_pause: Duration::from_millis(parse_var("DOWNLOAD_PAUSE_MS", 1000u64)),
        })
    }
}

/// `dl` next to the running executable.
fn default_download_dir() -> Result<PathBuf> {
    let exe = env::current_exe().context("cannot locate the running executable")?;
    let base = exe
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    Ok(base.join(DEFAULT_DOWNLOAD_SUBDIR))
}

fn parse_var<T: FromStr + Copy + std::fmt::Display>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid {}='{}', using {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_var_falls_back_on_garbage() {
        env::set_var("ARXIV_DL_TEST_GARBAGE", "not-a-number");
        assert_eq!(parse_var("ARXIV_DL_TEST_GARBAGE", 7u32), 7);
        env::remove_var("ARXIV_DL_TEST_GARBAGE");
    }

    #[test]
    fn test_parse_var_reads_value() {
        env::set_var("ARXIV_DL_TEST_VALUE", " 42 ");
        assert_eq!(parse_var("ARXIV_DL_TEST_VALUE", 7u64), 42);
        env::remove_var("ARXIV_DL_TEST_VALUE");
    }

    #[test]
    fn test_parse_var_missing_uses_default() {
        assert_eq!(parse_var("ARXIV_DL_TEST_MISSING", 100usize), 100);
    }

    #[test]
    fn test_default_download_dir_is_dl_subdir() {
        let dir = default_download_dir().unwrap();
        assert!(dir.ends_with(DEFAULT_DOWNLOAD_SUBDIR));
    }
}
