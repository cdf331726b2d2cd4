//! Shared HTTP plumbing: client construction, JSON fetching and streamed
//! downloads with hash validation.

use anyhow::{Context, Result};
use futures::StreamExt;
use reqwest::Client;
use sha1::{Digest, Sha1};
use sha2::Sha512;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::{create_dir_all, File};
use tokio::io::AsyncWriteExt;

pub const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Longest body snippet embedded in schema/HTTP error messages.
const ERROR_SNIPPET_LEN: usize = 200;

/// Shared HTTP client used across one session.
pub fn build_http_client() -> Result<Client> {
    let client = Client::builder()
        .user_agent(concat!("hopper/", env!("CARGO_PKG_VERSION")))
        .pool_max_idle_per_host(8)
        .tcp_keepalive(Some(Duration::from_secs(30)))
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()?;
    Ok(client)
}

/// Truncate a response body for inclusion in an error message.
pub fn truncate_snippet(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.len() <= ERROR_SNIPPET_LEN {
        trimmed.to_string()
    } else {
        let mut end = ERROR_SNIPPET_LEN;
        while !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &trimmed[..end])
    }
}

/// GET a JSON document. Non-2xx responses and bodies that fail to parse as
/// `T` both surface a truncated snippet of the offending body.
pub async fn get_json<T: serde::de::DeserializeOwned>(client: &Client, url: &str) -> Result<T> {
    log::debug!("GET {}", url);

    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Request to {} failed", url))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .with_context(|| format!("Failed to read response body from {}", url))?;

    if !status.is_success() {
        anyhow::bail!("HTTP {} from {}: {}", status, url, truncate_snippet(&body));
    }

    serde_json::from_str(&body).with_context(|| {
        format!(
            "Unexpected response shape from {}: {}",
            url,
            truncate_snippet(&body)
        )
    })
}

/// Download a file to `path`, streaming through a SHA-1 hasher when an
/// expected hash is given. Writes to a `.part` sibling first and renames
/// into place so a failed download never leaves a partial file at the
/// destination. An existing file with a matching hash is left untouched.
pub async fn download_to_path(
    client: &Client,
    url: &str,
    path: &Path,
    expected_sha1: Option<&str>,
) -> Result<()> {
    log::debug!("Downloading {} -> {:?}", url, path);

    if path.exists() {
        match expected_sha1 {
            Some(expected) => {
                let bytes = tokio::fs::read(path).await?;
                let computed = sha1_hex(&bytes);
                if computed.eq_ignore_ascii_case(expected) {
                    log::debug!("File exists and hash matches, skipping: {:?}", path);
                    return Ok(());
                }
                log::info!(
                    "File exists but hash mismatches ({} != {}), re-downloading: {:?}",
                    computed,
                    expected,
                    path
                );
            }
            None => {
                log::debug!("File exists and no hash provided, skipping: {:?}", path);
                return Ok(());
            }
        }
    }

    if let Some(parent) = path.parent() {
        create_dir_all(parent).await?;
    }

    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Request to {} failed", url))?;

    if !response.status().is_success() {
        anyhow::bail!("HTTP {} when downloading {}", response.status(), url);
    }

    let tmp_name = format!(
        "{}.part",
        path.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("download")
    );
    let tmp_path = path.with_file_name(tmp_name);

    let mut file = File::create(&tmp_path).await?;
    let mut hasher = Sha1::new();
    let mut downloaded: u64 = 0;

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.with_context(|| format!("Stream error while downloading {}", url))?;
        file.write_all(&chunk).await?;
        hasher.update(&chunk);
        downloaded += chunk.len() as u64;
    }
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    if let Some(expected) = expected_sha1 {
        let computed = format!("{:x}", hasher.finalize());
        if !computed.eq_ignore_ascii_case(expected) {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            anyhow::bail!(
                "SHA1 mismatch for {}: expected {}, got {}",
                url,
                expected,
                computed
            );
        }
    }

    tokio::fs::rename(&tmp_path, path).await?;
    log::debug!("Downloaded {} bytes to {:?}", downloaded, path);
    Ok(())
}

/// Download into `dir` under a unique name, returning the file path.
/// Used for pack archives whose name is irrelevant.
pub async fn download_to_temp_file(client: &Client, url: &str, dir: &Path) -> Result<PathBuf> {
    create_dir_all(dir).await?;
    let path = dir.join(format!("archive_{}.zip", uuid::Uuid::new_v4().simple()));
    download_to_path(client, url, &path, None).await?;
    Ok(path)
}

pub fn sha1_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Verify a file on disk against a SHA-512 hex digest. Manifests that carry
/// only the stronger hash are validated after download with this.
pub async fn verify_file_sha512(path: &Path, expected: &str) -> Result<()> {
    let bytes = tokio::fs::read(path).await?;
    let mut hasher = Sha512::new();
    hasher.update(&bytes);
    let computed = format!("{:x}", hasher.finalize());

    if !computed.eq_ignore_ascii_case(expected) {
        anyhow::bail!(
            "SHA512 mismatch for {:?}: expected {}, got {}",
            path,
            expected,
            computed
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path as url_path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn snippet_is_truncated_and_char_safe() {
        let long = "x".repeat(500);
        let snippet = truncate_snippet(&long);
        assert_eq!(snippet.len(), 203); // 200 chars + "..."

        let short = "tiny body";
        assert_eq!(truncate_snippet(short), "tiny body");
    }

    #[tokio::test]
    async fn get_json_reports_schema_mismatch_with_snippet() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path("/weird"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
            .mount(&server)
            .await;

        let client = build_http_client().unwrap();
        let result: Result<serde_json::Value> =
            get_json(&client, &format!("{}/weird", server.uri())).await;

        let err = format!("{:#}", result.unwrap_err());
        assert!(err.contains("Unexpected response shape"));
        assert!(err.contains("not json"));
    }

    #[tokio::test]
    async fn download_validates_sha1_and_skips_existing() {
        let server = MockServer::start().await;
        let body = b"jar bytes".to_vec();
        let expected = sha1_hex(&body);

        Mock::given(method("GET"))
            .and(url_path("/file.jar"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .expect(1)
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("nested/file.jar");
        let client = build_http_client().unwrap();
        let url = format!("{}/file.jar", server.uri());

        download_to_path(&client, &url, &dest, Some(&expected))
            .await
            .unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), body);

        // Second call must not hit the server again (expect(1) above).
        download_to_path(&client, &url, &dest, Some(&expected))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn corrupt_download_is_rejected_and_leaves_no_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path("/bad.jar"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"tampered".to_vec()))
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("bad.jar");
        let client = build_http_client().unwrap();

        let result = download_to_path(
            &client,
            &format!("{}/bad.jar", server.uri()),
            &dest,
            Some("0000000000000000000000000000000000000000"),
        )
        .await;

        assert!(result.unwrap_err().to_string().contains("SHA1 mismatch"));
        assert!(!dest.exists());
    }
}
