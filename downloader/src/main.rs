use anyhow::{anyhow, bail, Result};
use clap::Parser;
use datamart_core::corpus::DatalakeCorpus;
use reqwest::{Client, Url};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing_subscriber::{fmt, EnvFilter};

const START_MARKER: &str = "*** START OF THE PROJECT GUTENBERG EBOOK";
const END_MARKER: &str = "*** END OF THE PROJECT GUTENBERG EBOOK";

#[derive(Parser, Debug)]
#[command(name = "downloader")]
#[command(about = "Fetch Project Gutenberg texts into the datalake as header/body pairs")]
struct Cli {
    /// Text URLs, e.g. https://www.gutenberg.org/cache/epub/1342/pg1342.txt
    urls: Vec<String>,
    /// File with one URL per line ('#' starts a comment)
    #[arg(long)]
    urls_file: Option<String>,
    /// Datalake directory receiving header_<id>.txt / body_<id>.txt
    #[arg(long, env = "DATALAKE_PATH", default_value = "./datalake")]
    output: String,
    /// Maximum downloads in flight
    #[arg(long, default_value_t = 5)]
    concurrency: usize,
    /// Request timeout seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
    /// Extra attempts per URL after the first failure
    #[arg(long, default_value_t = 3)]
    retries: u32,
    /// Base delay between attempts; attempt n waits n times this
    #[arg(long, default_value_t = 1000)]
    backoff_ms: u64,
    #[arg(long, default_value = "datamart-downloader/0.1")]
    user_agent: String,
}

#[derive(Debug)]
enum Outcome {
    Stored,
    Failed(String),
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Cli::parse();

    let mut urls: Vec<String> = args.urls.clone();
    if let Some(path) = &args.urls_file {
        for line in BufReader::new(File::open(path)?).lines() {
            let s = line?.trim().to_string();
            if s.is_empty() || s.starts_with('#') { continue; }
            urls.push(s);
        }
    }
    if urls.is_empty() { bail!("no URLs given"); }

    let client = Client::builder()
        .user_agent(args.user_agent.clone())
        .redirect(reqwest::redirect::Policy::limited(5))
        .timeout(Duration::from_secs(args.timeout_secs))
        .build()?;
    let lake = Arc::new(DatalakeCorpus::new(&args.output));
    let permits = Arc::new(Semaphore::new(args.concurrency.max(1)));
    let backoff = Duration::from_millis(args.backoff_ms);

    let mut skipped = 0usize;
    let mut failed = 0usize;
    let mut tasks = JoinSet::new();
    for raw in urls {
        let url = match Url::parse(&raw) {
            Ok(u) => u,
            Err(e) => {
                tracing::error!(url = %raw, error = %e, "invalid url");
                failed += 1;
                continue;
            }
        };
        let Some(id) = document_id_from_url(&url) else {
            tracing::error!(%url, "cannot derive a document id from url");
            failed += 1;
            continue;
        };
        if lake.contains(&id) {
            tracing::info!(document_id = %id, "already downloaded, skipping");
            skipped += 1;
            continue;
        }

        let client = client.clone();
        let lake = lake.clone();
        let permits = permits.clone();
        let retries = args.retries;
        tasks.spawn(async move {
            let outcome = match permits.acquire_owned().await {
                Ok(_permit) => download(&client, &lake, &url, &id, retries, backoff).await,
                Err(e) => Err(anyhow!(e)),
            };
            let outcome = match outcome {
                Ok(()) => Outcome::Stored,
                Err(e) => Outcome::Failed(e.to_string()),
            };
            (id, outcome)
        });
    }

    let mut stored = 0usize;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((id, Outcome::Stored)) => {
                stored += 1;
                tracing::info!(document_id = %id, "stored");
            }
            Ok((id, Outcome::Failed(reason))) => {
                failed += 1;
                tracing::error!(document_id = %id, %reason, "download failed");
            }
            Err(e) => {
                failed += 1;
                tracing::error!(error = %e, "download task panicked");
            }
        }
    }

    tracing::info!(stored, skipped, failed, output = %args.output, "download run complete");
    Ok(())
}

async fn download(client: &Client, lake: &DatalakeCorpus, url: &Url, id: &str, retries: u32, backoff: Duration) -> Result<()> {
    let text = fetch_with_retry(client, url, retries, backoff).await?;
    let (header, body) = split_gutenberg_text(&text).ok_or_else(|| anyhow!("start/end markers not found"))?;
    lake.store(id, &header, &body)?;
    Ok(())
}

async fn fetch_with_retry(client: &Client, url: &Url, retries: u32, backoff: Duration) -> Result<String> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let result = async {
            let resp = client.get(url.clone()).send().await?.error_for_status()?;
            resp.text().await
        }
        .await;
        match result {
            Ok(text) => return Ok(text),
            Err(e) if attempt <= retries => {
                tracing::warn!(%url, attempt, error = %e, "fetch failed, retrying");
                sleep(backoff * attempt).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// `.../pg1342.txt` -> `1342`; other names keep their stem.
fn document_id_from_url(url: &Url) -> Option<String> {
    let name = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let stem = name.split('.').next()?;
    let id = match stem.strip_prefix("pg") {
        Some(rest) if !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()) => rest,
        _ => stem,
    };
    if id.is_empty() { None } else { Some(id.to_string()) }
}

/// Split a Gutenberg text into the header before the start marker and the body between the markers.
fn split_gutenberg_text(text: &str) -> Option<(String, String)> {
    let start = text.find(START_MARKER)?;
    let end = text.find(END_MARKER)?;
    if start >= end {
        return None;
    }
    // The start marker line carries the title and a closing "***"; the body begins after it.
    let after_marker = &text[start..end];
    let body_offset = after_marker.find('\n').map(|i| i + 1).unwrap_or(after_marker.len());
    let header = text[..start].trim().to_string();
    let body = after_marker[body_offset..].trim().to_string();
    Some((header, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_from_gutenberg_urls() {
        let u = Url::parse("https://www.gutenberg.org/cache/epub/1342/pg1342.txt").unwrap();
        assert_eq!(document_id_from_url(&u).as_deref(), Some("1342"));
        let u = Url::parse("https://example.org/texts/page.txt").unwrap();
        assert_eq!(document_id_from_url(&u).as_deref(), Some("page"));
        let u = Url::parse("https://example.org/").unwrap();
        assert_eq!(document_id_from_url(&u), None);
    }

    #[test]
    fn splits_on_markers() {
        let text = "Title: Emma\r\nAuthor: Jane Austen\r\n\r\n*** START OF THE PROJECT GUTENBERG EBOOK EMMA ***\r\nEmma Woodhouse, handsome, clever, and rich.\r\n*** END OF THE PROJECT GUTENBERG EBOOK EMMA ***\r\nLicense text";
        let (header, body) = split_gutenberg_text(text).unwrap();
        assert_eq!(header, "Title: Emma\r\nAuthor: Jane Austen");
        assert_eq!(body, "Emma Woodhouse, handsome, clever, and rich.");
    }

    #[test]
    fn rejects_texts_without_markers() {
        assert!(split_gutenberg_text("just some text").is_none());
        assert!(split_gutenberg_text("*** END OF THE PROJECT GUTENBERG EBOOK X *** then *** START OF THE PROJECT GUTENBERG EBOOK X").is_none());
    }
}
