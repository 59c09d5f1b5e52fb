//! Material and background music preparation.
//!
//! Everything a job renders from is copied or downloaded into its working
//! directory first, so the originals are never touched.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use rand::seq::IndexedRandom;
use reqwest::Client;
use sgen_models::{BgmSettings, BgmSource, Material, MaterialKind};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult};

const BGM_EXTENSIONS: [&str; 2] = ["mp3", "wav"];

/// A material copied into the job directory.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedMaterial {
    pub path: PathBuf,
    pub material: Material,
}

/// Copies local files and downloads remote ones.
#[derive(Debug, Clone)]
pub struct MaterialFetcher {
    client: Client,
}

impl MaterialFetcher {
    /// Create a fetcher whose downloads fail after `timeout`.
    pub fn new(timeout: Duration) -> MediaResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MediaError::internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Copy or download every material to `work_dir/materials/mat_{i}{ext}`.
    pub async fn prepare_materials(
        &self,
        materials: &[Material],
        work_dir: &Path,
    ) -> MediaResult<Vec<PreparedMaterial>> {
        let dir = work_dir.join("materials");
        fs::create_dir_all(&dir).await?;

        let mut prepared = Vec::with_capacity(materials.len());
        for (i, material) in materials.iter().enumerate() {
            let dest = dir.join(format!("mat_{}{}", i, material_extension(material)));
            self.fetch(&material.path, material.is_url(), &dest).await?;
            debug!("Prepared material {} -> {}", material.path, dest.display());
            prepared.push(PreparedMaterial {
                path: dest,
                material: material.clone(),
            });
        }

        info!("Prepared {} materials in {}", prepared.len(), dir.display());
        Ok(prepared)
    }

    /// Resolve the background track for a job.
    ///
    /// Presets come from `bgm_dir` and must exist. Uploads are copied and URLs
    /// downloaded. If the prepared file is missing or empty, the first track
    /// in `bgm_dir` is used instead, and with no track at all music is
    /// disabled.
    pub async fn prepare_bgm(
        &self,
        settings: &BgmSettings,
        bgm_dir: &Path,
        work_dir: &Path,
    ) -> MediaResult<Option<PathBuf>> {
        let dest = work_dir.join(format!("bgm{}", extension_of(&settings.path).unwrap_or_else(|| ".mp3".to_string())));

        match settings.source {
            BgmSource::None => return Ok(None),
            BgmSource::Preset => {
                let preset = bgm_dir.join(&settings.path);
                if !preset.exists() {
                    return Err(MediaError::FileNotFound(preset));
                }
                fs::copy(&preset, &dest).await?;
            }
            BgmSource::Upload => self.fetch(&settings.path, false, &dest).await?,
            BgmSource::Url => self.fetch(&settings.path, true, &dest).await?,
        }

        if is_usable_file(&dest).await {
            return Ok(Some(dest));
        }

        match first_track(bgm_dir).await {
            Some(fallback) => {
                warn!(
                    "Background music {} unavailable, falling back to {}",
                    settings.path,
                    fallback.display()
                );
                Ok(Some(fallback))
            }
            None => {
                warn!("Background music {} unavailable and no fallback track, disabling music", settings.path);
                Ok(None)
            }
        }
    }

    async fn fetch(&self, source: &str, is_url: bool, dest: &Path) -> MediaResult<()> {
        if is_url {
            self.download(source, dest).await
        } else {
            let src = Path::new(source);
            if !src.exists() {
                return Err(MediaError::FileNotFound(src.to_path_buf()));
            }
            fs::copy(src, dest).await?;
            Ok(())
        }
    }

    /// Stream `url` into `dest`. Non-success statuses fail.
    pub async fn download(&self, url: &str, dest: &Path) -> MediaResult<()> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| MediaError::download_failed(format!("{}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::download_failed(format!("{} returned {}", url, status)));
        }

        let mut file = fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| MediaError::download_failed(format!("{}: {}", url, e)))?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        debug!("Downloaded {} -> {}", url, dest.display());
        Ok(())
    }
}

/// Extension for a material copy, falling back on its kind.
pub fn material_extension(material: &Material) -> String {
    extension_of(&material.path).unwrap_or_else(|| match material.kind {
        MaterialKind::Image => ".png".to_string(),
        MaterialKind::Video => ".mp4".to_string(),
    })
}

fn extension_of(source: &str) -> Option<String> {
    // Ignore query strings and fragments of URLs
    let path = source.split(['?', '#']).next().unwrap_or(source);
    let name = path.rsplit('/').next().unwrap_or(path);
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() || ext.len() > 5 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(format!(".{}", ext.to_ascii_lowercase()))
}

async fn is_usable_file(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

/// Background tracks available in `dir`, sorted by file name.
pub async fn list_tracks(dir: &Path) -> Vec<PathBuf> {
    let mut tracks = Vec::new();
    let Ok(mut entries) = fs::read_dir(dir).await else {
        return tracks;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let is_track = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| BGM_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if is_track && path.is_file() {
            tracks.push(path);
        }
    }
    tracks.sort();
    tracks
}

async fn first_track(dir: &Path) -> Option<PathBuf> {
    list_tracks(dir).await.into_iter().next()
}

/// File name of a randomly chosen track in `dir`.
pub async fn pick_random_track(dir: &Path) -> Option<String> {
    let tracks = list_tracks(dir).await;
    tracks
        .choose(&mut rand::rng())
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().to_string())
}
