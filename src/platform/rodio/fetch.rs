//! Pulls a remote stream into a temporary file.

use futures_util::StreamExt;
use reqwest::Client;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;

use crate::error::NativeError;

/// Download `url` completely into a fresh temporary file.
///
/// A failure status, a transport error, or a broken body all fail the fetch.
/// There is no retry; the partial file is removed with the returned error.
pub async fn fetch_to_temp(http: &Client, url: &str) -> Result<NamedTempFile, NativeError> {
    let resp = http.get(url).send().await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(NativeError::HttpStatus {
            status,
            url: url.to_owned(),
        });
    }

    let suffix = extension_hint(url)
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default();
    let temp = tempfile::Builder::new()
        .prefix("barplayer-")
        .suffix(&suffix)
        .tempfile()?;
    let mut file = tokio::fs::File::from_std(temp.reopen()?);

    let mut written = 0u64;
    let mut stream = resp.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let bytes = chunk?;
        file.write_all(&bytes).await?;
        written += bytes.len() as u64;
    }
    file.flush().await?;

    tracing::debug!(url, bytes = written, path = %temp.path().display(), "stream fetched");
    Ok(temp)
}

/// File extension of the URL's last path segment, used as a probe hint.
pub fn extension_hint(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next()?;
    let path = path.split_once("://").map_or(path, |(_, rest)| rest);
    let (_, segment) = path.rsplit_once('/')?;
    let (_, ext) = segment.rsplit_once('.')?;
    let valid = !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric());
    valid.then_some(ext)
}
