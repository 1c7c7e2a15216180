//! Audio asset loading
//!
//! Assets are addressed by a relative path (`common/open_meadow.wav`). The
//! loader answers an existence check and decodes the file header into a
//! [`DecodedBuffer`]; sample data stays with the backend.

use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::error::{AeolusError, Result};

/// A decoded audio file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedBuffer {
    pub path: String,
    /// Length in seconds.
    pub duration: f64,
    pub channels: u16,
    pub sample_rate: u32,
}

impl DecodedBuffer {
    pub fn is_playable(&self) -> bool {
        self.duration > 0.0
    }
}

#[async_trait]
pub trait AssetLoader: Send + Sync {
    /// Whether `path` can be fetched.
    async fn exists(&self, path: &str) -> bool;

    async fn load(&self, path: &str) -> Result<DecodedBuffer>;
}

/// Decode a WAV stream's header into a buffer description.
fn decode_wav<R: Read>(path: &str, reader: R) -> Result<DecodedBuffer> {
    let wav = hound::WavReader::new(reader).map_err(|e| AeolusError::AssetDecode {
        path: path.to_string(),
        reason: e.to_string(),
    })?;
    let spec = wav.spec();
    let frames = wav.duration();
    let duration = if spec.sample_rate > 0 {
        frames as f64 / spec.sample_rate as f64
    } else {
        0.0
    };

    Ok(DecodedBuffer {
        path: path.to_string(),
        duration,
        channels: spec.channels,
        sample_rate: spec.sample_rate,
    })
}

/// Loads WAV files below a local directory.
#[derive(Debug, Clone)]
pub struct FsAssetLoader {
    root: PathBuf,
}

impl FsAssetLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

#[async_trait]
impl AssetLoader for FsAssetLoader {
    async fn exists(&self, path: &str) -> bool {
        tokio::fs::metadata(self.resolve(path))
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    async fn load(&self, path: &str) -> Result<DecodedBuffer> {
        let full = self.resolve(path);
        let bytes = tokio::fs::read(&full).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => AeolusError::AssetNotFound {
                path: path.to_string(),
            },
            _ => AeolusError::Io(e),
        })?;
        debug!(path, bytes = bytes.len(), "Asset read from disk");
        decode_wav(path, Cursor::new(bytes))
    }
}

/// Loads WAV files from an HTTP base URL.
#[cfg(feature = "http")]
pub struct HttpAssetLoader {
    client: reqwest::Client,
    base_url: String,
}

#[cfg(feature = "http")]
impl HttpAssetLoader {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl AssetLoader for HttpAssetLoader {
    async fn exists(&self, path: &str) -> bool {
        match self.client.head(self.url(path)).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(path, error = %e, "Asset HEAD failed");
                false
            }
        }
    }

    async fn load(&self, path: &str) -> Result<DecodedBuffer> {
        let response = self.client.get(self.url(path)).send().await?;
        if !response.status().is_success() {
            return Err(AeolusError::AssetNotFound {
                path: path.to_string(),
            });
        }
        let bytes = response.bytes().await?;
        decode_wav(path, Cursor::new(bytes))
    }
}

/// In-memory asset table.
#[derive(Debug, Default)]
pub struct StaticAssetLoader {
    buffers: HashMap<String, DecodedBuffer>,
    loads: AtomicUsize,
}

impl StaticAssetLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an asset of the given length.
    pub fn with(mut self, path: &str, duration: f64) -> Self {
        self.insert(path, duration);
        self
    }

    pub fn insert(&mut self, path: &str, duration: f64) {
        self.buffers.insert(
            path.to_string(),
            DecodedBuffer {
                path: path.to_string(),
                duration,
                channels: 2,
                sample_rate: 44_100,
            },
        );
    }

    /// Number of `load` calls so far.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssetLoader for StaticAssetLoader {
    async fn exists(&self, path: &str) -> bool {
        self.buffers.contains_key(path)
    }

    async fn load(&self, path: &str) -> Result<DecodedBuffer> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.buffers
            .get(path)
            .cloned()
            .ok_or_else(|| AeolusError::AssetNotFound {
                path: path.to_string(),
            })
    }
}
