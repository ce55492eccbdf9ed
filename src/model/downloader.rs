use crate::config::Config;
use crate::error::{Error, Result};
use crate::fsutil;
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use glob::Pattern;
use hf_hub::api::tokio::{Api, ApiBuilder, ApiRepo};
use hf_hub::{Cache, Repo, RepoType};
use std::fs;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    /// Root of the fetched snapshot; registry paths are relative to it.
    pub local_path: PathBuf,
    pub bytes_transferred: u64,
    pub files: usize,
}

/// Source of remote artifact snapshots.
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    /// Fetch the files of `repository_id` matching `include_patterns` (all
    /// files when `None`) into `destination`.
    async fn fetch(
        &self,
        repository_id: &str,
        destination: &Path,
        include_patterns: Option<&[String]>,
    ) -> Result<FetchResult>;

    fn registry_name(&self) -> &str;
}

/// HuggingFace hub client.
///
/// Downloads go through a persistent hf-hub cache so files completed by an
/// interrupted run are not pulled again; each finished blob is then moved
/// out of the cache into the destination directory.
pub struct HfRegistryClient {
    revision: String,
    cache_dir: PathBuf,
    concurrency: usize,
    show_progress: bool,
    token: Option<String>,
}

impl HfRegistryClient {
    pub fn new(config: &Config) -> Self {
        Self {
            revision: config.revision.clone(),
            cache_dir: config.cache_dir.clone(),
            concurrency: config.download_concurrency.max(1),
            show_progress: config.show_progress,
            token: std::env::var("HF_TOKEN").ok().filter(|t| !t.is_empty()),
        }
    }

    fn api(&self) -> Result<Api> {
        fs::create_dir_all(&self.cache_dir)?;

        let mut builder = ApiBuilder::new()
            .with_cache_dir(self.cache_dir.clone())
            .with_progress(self.show_progress);
        if let Some(token) = &self.token {
            builder = builder.with_token(Some(token.clone()));
        }

        builder
            .build()
            .map_err(|e| Error::RegistryUnavailable(format!("Failed to initialize HuggingFace API: {}", e)))
    }

    fn repo(&self, repository_id: &str) -> Repo {
        Repo::with_revision(
            repository_id.to_string(),
            RepoType::Model,
            self.revision.clone(),
        )
    }

    /// Stage `file` from the local hf-hub cache, if an earlier run finished it.
    ///
    /// Returns the staged size, or `None` when the file is not cached.
    pub fn restore_cached(
        &self,
        repository_id: &str,
        file: &str,
        snapshot: &Path,
    ) -> Result<Option<u64>> {
        let cache = Cache::new(self.cache_dir.clone());
        match cache.repo(self.repo(repository_id)).get(file) {
            Some(cached) => Ok(Some(stage_blob(&cached, &snapshot.join(file))?)),
            None => Ok(None),
        }
    }

    /// Returns the number of bytes pulled over the network.
    async fn fetch_file(
        &self,
        repo: &ApiRepo,
        repository_id: &str,
        file: &str,
        snapshot: &Path,
    ) -> Result<u64> {
        if self.restore_cached(repository_id, file, snapshot)?.is_some() {
            tracing::debug!("Reusing cached {}", file);
            return Ok(0);
        }

        tracing::debug!("Downloading {}", file);
        let cached = repo
            .get(file)
            .await
            .map_err(|e| classify_error(repository_id, &e.to_string()))?;

        stage_blob(&cached, &snapshot.join(file))
    }
}

/// Link a cache entry into staging, leaving the cache intact for later runs.
fn stage_blob(cached: &Path, target: &Path) -> Result<u64> {
    // cache snapshot entries are symlinks into the blob store
    let blob = fs::canonicalize(cached)?;
    let size = fs::metadata(&blob)?.len();

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    fsutil::link_or_copy(&blob, target)?;
    Ok(size)
}

#[async_trait]
impl ArtifactFetcher for HfRegistryClient {
    async fn fetch(
        &self,
        repository_id: &str,
        destination: &Path,
        include_patterns: Option<&[String]>,
    ) -> Result<FetchResult> {
        let patterns = include_patterns.map(compile_patterns).transpose()?;

        tracing::info!("Fetching from HuggingFace: {}@{}", repository_id, self.revision);

        let api = self.api()?;
        let repo = api.repo(self.repo(repository_id));

        let info = repo
            .info()
            .await
            .map_err(|e| classify_error(repository_id, &e.to_string()))?;

        let files = select_files(
            info.siblings.into_iter().map(|s| s.rfilename),
            patterns.as_deref(),
        );
        if files.is_empty() {
            tracing::warn!("No files in {} match {:?}", repository_id, include_patterns);
        } else {
            tracing::info!("Downloading {} file(s) from {}", files.len(), repository_id);
        }

        let snapshot = destination.join("snapshot");
        fs::create_dir_all(&snapshot)?;

        let downloads: Vec<_> = files
            .iter()
            .map(|file| self.fetch_file(&repo, repository_id, file, &snapshot))
            .collect();
        let results: Vec<Result<u64>> = stream::iter(downloads)
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut bytes_transferred = 0;
        for result in results {
            bytes_transferred += result?;
        }

        tracing::info!(
            "Fetched {} file(s), {} MB",
            files.len(),
            bytes_transferred / 1_000_000
        );

        Ok(FetchResult {
            local_path: snapshot,
            bytes_transferred,
            files: files.len(),
        })
    }

    fn registry_name(&self) -> &str {
        "huggingface"
    }
}

pub fn compile_patterns(patterns: &[String]) -> Result<Vec<Pattern>> {
    patterns
        .iter()
        .map(|p| {
            Pattern::new(p)
                .map_err(|e| Error::ConfigError(format!("Invalid include pattern '{}': {}", p, e)))
        })
        .collect()
}

/// Registry paths to download, sorted. Paths escaping the snapshot root are dropped.
pub fn select_files(
    files: impl IntoIterator<Item = String>,
    patterns: Option<&[Pattern]>,
) -> Vec<String> {
    let mut selected: Vec<String> = files
        .into_iter()
        .filter(|f| {
            Path::new(f)
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
        })
        .filter(|f| patterns.map_or(true, |ps| ps.iter().any(|p| p.matches(f))))
        .collect();
    selected.sort();
    selected
}

/// Map a registry failure onto not-found vs. unavailable.
pub fn classify_error(repository_id: &str, message: &str) -> Error {
    let lowered = message.to_lowercase();
    if lowered.contains("404") || lowered.contains("not found") {
        Error::RegistryNotFound(format!("{}: {}", repository_id, message))
    } else {
        Error::RegistryUnavailable(format!("{}: {}", repository_id, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const REPO: &str = "wanderkid/PDF-Extract-Kit";

    fn listing() -> Vec<String> {
        [
            "README.md",
            "models/Layout/model_final.pth",
            "models/Layout/config.json",
            "models/MFD/weights.pt",
            "models/MFR/unimernet_small/pytorch_model.pth",
            "../escape.bin",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    #[test]
    fn test_select_all_files() {
        let files = select_files(listing(), None);
        assert_eq!(files.len(), 5);
        assert!(!files.iter().any(|f| f.contains("..")));
    }

    #[test]
    fn test_select_by_pattern() {
        let patterns = compile_patterns(&["models/Layout/**".to_string()]).unwrap();
        let files = select_files(listing(), Some(&patterns));
        assert_eq!(
            files,
            vec![
                "models/Layout/config.json".to_string(),
                "models/Layout/model_final.pth".to_string()
            ]
        );
    }

    #[test]
    fn test_nested_pattern_matches_deep_paths() {
        let patterns = compile_patterns(&["models/MFR/**".to_string()]).unwrap();
        let files = select_files(listing(), Some(&patterns));
        assert_eq!(files, vec!["models/MFR/unimernet_small/pytorch_model.pth".to_string()]);
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(matches!(
            compile_patterns(&["models/[".to_string()]),
            Err(Error::ConfigError(_))
        ));
    }

    #[test]
    fn test_classify_error() {
        assert!(matches!(
            classify_error(
                "nobody/missing",
                "request error: HTTP status client error (404 Not Found) for url"
            ),
            Error::RegistryNotFound(_)
        ));
        assert!(matches!(
            classify_error("wanderkid/PDF-Extract-Kit", "error sending request: connection refused"),
            Error::RegistryUnavailable(_)
        ));
        assert!(matches!(
            classify_error("private/repo", "HTTP status client error (401 Unauthorized)"),
            Error::RegistryUnavailable(_)
        ));
    }

    /// Lay out an hf-hub cache entry the way a finished download leaves it.
    fn seed_cache(cache_dir: &Path, file: &str, contents: &str) -> PathBuf {
        let repo_dir = cache_dir.join("models--wanderkid--PDF-Extract-Kit");
        fs::create_dir_all(repo_dir.join("refs")).unwrap();
        fs::write(repo_dir.join("refs/main"), "0123abcd").unwrap();

        let cached = repo_dir.join("snapshots/0123abcd").join(file);
        fs::create_dir_all(cached.parent().unwrap()).unwrap();
        fs::write(&cached, contents).unwrap();
        cached
    }

    #[test]
    fn test_cached_file_is_restored_on_every_run() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::for_store(temp_dir.path());
        let client = HfRegistryClient::new(&config);
        let file = "models/Layout/model_final.pth";
        let cached = seed_cache(&config.cache_dir, file, "layout weights");

        for _ in 0..2 {
            let staging = TempDir::new().unwrap();
            let staged = client.restore_cached(REPO, file, staging.path()).unwrap();
            assert_eq!(staged, Some(14));
            assert_eq!(
                fs::read_to_string(staging.path().join(file)).unwrap(),
                "layout weights"
            );
        }
        assert_eq!(fs::read_to_string(&cached).unwrap(), "layout weights");
    }

    #[test]
    fn test_uncached_file_is_not_restored() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::for_store(temp_dir.path());
        let client = HfRegistryClient::new(&config);
        seed_cache(&config.cache_dir, "models/Layout/model_final.pth", "layout weights");

        let staging = TempDir::new().unwrap();
        let staged = client
            .restore_cached(REPO, "models/MFD/YOLO/yolo_v8_ft.pt", staging.path())
            .unwrap();
        assert_eq!(staged, None);
        assert!(!staging.path().join("models/MFD").exists());
    }
}
