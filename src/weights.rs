// Weight artifact cache: resolves each weight URL of a model descriptor to a
// local file, downloading on first use. Files are written atomically
// (temp-then-rename) and a present file is trusted without validation.

use crate::error::InferError;
use crate::registry::ModelDescriptor;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub struct WeightStore {
    dir: PathBuf,
    client: reqwest::Client,
    // Per-URL single-flight guards. Concurrent cache misses for the same URL
    // serialize here; losers re-check existence after acquiring the lock.
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl WeightStore {
    pub fn new(dir: impl Into<PathBuf>, client: reqwest::Client) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            client,
            in_flight: Mutex::new(HashMap::new()),
        })
    }

    /// Local path for a weight URL: the cache directory joined with the URL's
    /// trailing path segment. Pure function of the URL.
    pub fn local_path(&self, url: &str) -> PathBuf {
        let filename = url.rsplit('/').next().unwrap_or(url);
        self.dir.join(filename)
    }

    /// Resolve every weight URL of `descriptor` to a local file, preserving
    /// the catalog's order (the order is meaningful for dual-weight blending).
    pub async fn resolve(&self, descriptor: &ModelDescriptor) -> Result<Vec<PathBuf>, InferError> {
        let mut paths = Vec::with_capacity(descriptor.urls.len());
        for url in &descriptor.urls {
            paths.push(self.ensure_cached(url).await?);
        }
        Ok(paths)
    }

    async fn ensure_cached(&self, url: &str) -> Result<PathBuf, InferError> {
        let path = self.local_path(url);

        // Fast path without taking the per-URL guard.
        if path.is_file() {
            return Ok(path);
        }

        let guard = {
            let mut map = self.in_flight.lock().await;
            map.entry(url.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _locked = guard.lock().await;

        // Another request may have completed the download while we waited.
        if path.is_file() {
            return Ok(path);
        }

        self.fetch_to(url, &path).await?;
        Ok(path)
    }

    async fn fetch_to(&self, url: &str, path: &Path) -> Result<(), InferError> {
        info!("Downloading '{}' to '{}'", url, path.display());

        let fetch_err = |message: String| InferError::Fetch {
            url: url.to_string(),
            message,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_err(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(fetch_err(format!("HTTP {}", response.status())));
        }

        // Stream into a sibling temp file so an interrupted download can
        // never appear at the final path.
        let temp_path = {
            let mut os = path.as_os_str().to_owned();
            os.push(".part");
            PathBuf::from(os)
        };
        let write_result = async {
            let mut file = tokio::fs::File::create(&temp_path)
                .await
                .map_err(|e| fetch_err(format!("cannot create temp file: {}", e)))?;

            let mut response = response;
            let mut total: u64 = 0;
            while let Some(chunk) = response
                .chunk()
                .await
                .map_err(|e| fetch_err(format!("read failed: {}", e)))?
            {
                total += chunk.len() as u64;
                file.write_all(&chunk)
                    .await
                    .map_err(|e| fetch_err(format!("write failed: {}", e)))?;
            }
            file.flush()
                .await
                .map_err(|e| fetch_err(format!("flush failed: {}", e)))?;
            Ok::<u64, InferError>(total)
        }
        .await;

        match write_result {
            Ok(total) => {
                tokio::fs::rename(&temp_path, path)
                    .await
                    .map_err(|e| fetch_err(format!("rename failed: {}", e)))?;
                debug!("Downloaded {} bytes to '{}'", total, path.display());
                Ok(())
            }
            Err(err) => {
                let _ = tokio::fs::remove_file(&temp_path).await;
                Err(err)
            }
        }
    }
}
