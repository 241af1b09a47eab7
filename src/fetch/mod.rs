//! Retrieval of raw source tables from a URL or the local filesystem.

mod basic;

pub use basic::BasicClient;

use async_trait::async_trait;
use flate2::read::GzDecoder;
use reqwest::{Request, Response};
use std::io::Read;
use tracing::debug;

use crate::error::{PipelineError, Result};

#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}

/// Downloads `url` and returns the body, failing on any non-success status.
pub async fn fetch_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Vec<u8>> {
    let parsed = url
        .parse::<reqwest::Url>()
        .map_err(|e| PipelineError::DataUnavailable(format!("invalid url '{url}': {e}")))?;
    let req = Request::new(reqwest::Method::GET, parsed);

    let resp = client
        .execute(req)
        .await
        .and_then(Response::error_for_status)
        .map_err(|e| PipelineError::DataUnavailable(format!("fetch of '{url}' failed: {e}")))?;

    let bytes = resp
        .bytes()
        .await
        .map_err(|e| PipelineError::DataUnavailable(format!("reading body of '{url}': {e}")))?;
    Ok(bytes.to_vec())
}

/// Loads a table from an `http(s)` URL or a local path. Sources ending in
/// `.gz` are decompressed.
#[tracing::instrument(skip(client))]
pub async fn load_source<C: HttpClient>(client: &C, source: &str) -> Result<Vec<u8>> {
    let bytes = if source.starts_with("http://") || source.starts_with("https://") {
        fetch_bytes(client, source).await?
    } else {
        std::fs::read(source)
            .map_err(|e| PipelineError::DataUnavailable(format!("reading '{source}': {e}")))?
    };
    debug!(bytes = bytes.len(), "Source bytes loaded");

    if source.ends_with(".gz") {
        gunzip(&bytes)
            .map_err(|e| PipelineError::DataUnavailable(format!("decompressing '{source}': {e}")))
    } else {
        Ok(bytes)
    }
}

fn gunzip(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    GzDecoder::new(bytes).read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::env;
    use std::fs;
    use std::io::Write;

    struct OfflineClient;

    #[async_trait]
    impl HttpClient for OfflineClient {
        async fn execute(&self, _req: Request) -> reqwest::Result<Response> {
            unreachable!("local sources never hit the network")
        }
    }

    fn temp_path(name: &str) -> String {
        format!("{}/{}", env::temp_dir().display(), name)
    }

    #[tokio::test]
    async fn test_load_local_file() {
        let path = temp_path("vax_cutoff_test_plain.csv");
        fs::write(&path, "a,b\n1,2\n").unwrap();

        let bytes = load_source(&OfflineClient, &path).await.unwrap();
        assert_eq!(bytes, b"a,b\n1,2\n");

        fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_load_gzipped_file() {
        let path = temp_path("vax_cutoff_test_plain.csv.gz");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"a,b\n1,2\n").unwrap();
        fs::write(&path, encoder.finish().unwrap()).unwrap();

        let bytes = load_source(&OfflineClient, &path).await.unwrap();
        assert_eq!(bytes, b"a,b\n1,2\n");

        fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_missing_file_is_data_unavailable() {
        let result = load_source(&OfflineClient, "/nonexistent/cases.csv").await;
        assert!(matches!(result, Err(PipelineError::DataUnavailable(_))));
    }

    #[tokio::test]
    async fn test_invalid_url_is_data_unavailable() {
        let result = fetch_bytes(&OfflineClient, "not a url").await;
        assert!(matches!(result, Err(PipelineError::DataUnavailable(_))));
    }
}
