//! Direct HTTP fetch for links that need no extractor (calendar files).

use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::core::error::{AppError, AppResult};

const DEFAULT_FILE_NAME: &str = "calendar.ics";

/// A file fetched over plain HTTP.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedFile {
    pub path: PathBuf,
    /// Name to show the user
    pub file_name: String,
}

/// Builds the client used for direct fetches.
pub fn build_client(timeout: Duration) -> AppResult<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

/// Last path segment of `url`, without query, or `calendar.ics`.
pub fn file_name_from_url(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .map(|name| name.replace(['/', '\\'], "_"))
        .filter(|name| !name.is_empty() && name != "." && name != "..")
        .unwrap_or_else(|| DEFAULT_FILE_NAME.to_string())
}

/// Downloads `url` into `dir` as `<prefix>_<name>`, streaming to disk.
///
/// Non-2xx responses are errors, as is a body larger than `max_bytes`
/// (rejected up front when the server announces its length).
pub async fn fetch_to_file(
    client: &reqwest::Client,
    url: &str,
    dir: &Path,
    prefix: &str,
    max_bytes: u64,
) -> AppResult<FetchedFile> {
    let parsed = Url::parse(url)?;
    let file_name = file_name_from_url(&parsed);

    log::info!("📅 Fetching {} directly", parsed);
    let response = client.get(parsed).send().await?.error_for_status()?;
    if let Some(size) = response.content_length().filter(|size| *size > max_bytes) {
        return Err(AppError::FileTooLarge { size, limit: max_bytes });
    }

    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!("{}_{}", prefix, file_name));
    let written = match write_body(response, &path, max_bytes).await {
        Ok(written) => written,
        Err(e) => {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(e);
        }
    };
    log::debug!("Saved {} bytes to {}", written, path.display());

    if written == 0 {
        let _ = tokio::fs::remove_file(&path).await;
        return Err(AppError::Validation(format!("{} returned an empty body", url)));
    }

    Ok(FetchedFile { path, file_name })
}

async fn write_body(response: reqwest::Response, path: &Path, max_bytes: u64) -> AppResult<u64> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut downloaded: u64 = 0;

    // Stream response body in chunks
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        downloaded += chunk.len() as u64;
        if downloaded > max_bytes {
            return Err(AppError::FileTooLarge {
                size: downloaded,
                limit: max_bytes,
            });
        }
        file.write_all(&chunk).await?;
    }

    file.flush().await?;
    Ok(downloaded)
}
