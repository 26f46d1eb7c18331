//! Model-hub downloader (§4.E). Distinct from `download.rs`: the source is
//! a hub repository (file-or-snapshot semantics, cache-aware single-file
//! fast path) rather than one URL.

use imagebridge_core::AgentConfig;
use std::path::{Path, PathBuf};

const HUB_BASE: &str = "https://huggingface.co";

#[derive(Debug, Clone, thiserror::Error)]
pub enum ModelRegistryError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("io error: {0}")]
    Io(String),
}

#[derive(Clone)]
pub struct ModelRegistryClient {
    http: reqwest::Client,
    shared_models_dir: PathBuf,
    hub_cache_root: Option<PathBuf>,
}

impl ModelRegistryClient {
    pub fn new(config: &AgentConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.limits.model_hub_head_timeout)
            .connect_timeout(config.limits.model_hub_connect_timeout)
            .build()
            .unwrap_or_default();
        Self {
            http,
            shared_models_dir: config.models_shared_dir(),
            hub_cache_root: config.hf_home.clone(),
        }
    }

    /// §4.E `download(repoId, localDir?, filename?, allowPatterns?, revision?) -> alreadyCached`.
    pub async fn download(
        &self,
        repo_id: &str,
        local_dir: Option<&str>,
        filename: Option<&str>,
        allow_patterns: Option<&[String]>,
        revision: Option<&str>,
    ) -> Result<bool, ModelRegistryError> {
        let revision = revision.unwrap_or("main");
        let dest_dir = self.resolve_local_dir(local_dir).await;

        match filename {
            Some(filename) => {
                let dest = dest_dir.join(filename);
                if tokio::fs::metadata(&dest).await.is_ok() {
                    return Ok(true);
                }
                self.fetch_file(repo_id, revision, filename, &dest).await?;
                Ok(false)
            }
            None => {
                let files = self.list_repo_files(repo_id, revision).await?;
                let selected: Vec<&String> = match allow_patterns {
                    Some(patterns) => files.iter().filter(|f| matches_any(f, patterns)).collect(),
                    None => files.iter().collect(),
                };
                for path in selected {
                    let dest = dest_dir.join(path);
                    self.fetch_file(repo_id, revision, path, &dest).await?;
                }
                Ok(false)
            }
        }
    }

    /// §4.E `localDir` resolution: exists-and-writable, else file's parent,
    /// else `<backend-install>/models/shared`, else the hub's own cache root.
    async fn resolve_local_dir(&self, local_dir: Option<&str>) -> PathBuf {
        if let Some(dir) = local_dir {
            let path = PathBuf::from(dir);
            let candidate = if path.extension().is_some() {
                path.parent().map(Path::to_path_buf).unwrap_or(path)
            } else {
                path
            };
            if self.ensure_writable(&candidate).await {
                return candidate;
            }
        }
        if self.ensure_writable(&self.shared_models_dir).await {
            return self.shared_models_dir.clone();
        }
        self.hub_cache_root.clone().unwrap_or_else(default_hub_cache)
    }

    async fn ensure_writable(&self, dir: &Path) -> bool {
        if tokio::fs::create_dir_all(dir).await.is_err() {
            return false;
        }
        let probe = dir.join(".imagebridge-write-probe");
        let ok = tokio::fs::write(&probe, b"").await.is_ok();
        let _ = tokio::fs::remove_file(&probe).await;
        ok
    }

    async fn fetch_file(
        &self,
        repo_id: &str,
        revision: &str,
        filename: &str,
        dest: &Path,
    ) -> Result<(), ModelRegistryError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ModelRegistryError::Io(e.to_string()))?;
        }
        let url = format!("{HUB_BASE}/{repo_id}/resolve/{revision}/{filename}");
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ModelRegistryError::Transport(e.to_string()))?
            .error_for_status()
            .map_err(|e| ModelRegistryError::Transport(e.to_string()))?;

        let tmp = tmp_sibling(dest);
        let mut file = tokio::fs::File::create(&tmp).await.map_err(|e| ModelRegistryError::Io(e.to_string()))?;
        let mut stream = resp.bytes_stream();
        use futures_util::StreamExt;
        use tokio::io::AsyncWriteExt;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ModelRegistryError::Transport(e.to_string()))?;
            file.write_all(&chunk).await.map_err(|e| ModelRegistryError::Io(e.to_string()))?;
        }
        file.flush().await.map_err(|e| ModelRegistryError::Io(e.to_string()))?;
        drop(file);
        tokio::fs::rename(&tmp, dest).await.map_err(|e| ModelRegistryError::Io(e.to_string()))?;
        Ok(())
    }

    async fn list_repo_files(&self, repo_id: &str, revision: &str) -> Result<Vec<String>, ModelRegistryError> {
        let url = format!("{HUB_BASE}/api/models/{repo_id}?revision={revision}");
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ModelRegistryError::Transport(e.to_string()))?
            .error_for_status()
            .map_err(|e| ModelRegistryError::Transport(e.to_string()))?;
        let body: serde_json::Value = resp.json().await.map_err(|e| ModelRegistryError::Transport(e.to_string()))?;
        let files = body["siblings"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|s| s["rfilename"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Ok(files)
    }
}

fn matches_any(path: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|p| glob_match(p, path))
}

/// Minimal glob matcher supporting `*` (any run of non-slash-agnostic chars)
/// — good enough for hub allow-pattern filters like `*.safetensors`.
fn glob_match(pattern: &str, text: &str) -> bool {
    fn inner(p: &[u8], t: &[u8]) -> bool {
        match p.first() {
            None => t.is_empty(),
            Some(b'*') => inner(&p[1..], t) || (!t.is_empty() && inner(p, &t[1..])),
            Some(c) => !t.is_empty() && t[0] == *c && inner(&p[1..], &t[1..]),
        }
    }
    inner(pattern.as_bytes(), text.as_bytes())
}

fn tmp_sibling(dest: &Path) -> PathBuf {
    let mut tmp = dest.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

fn default_hub_cache() -> PathBuf {
    std::env::var("HOME")
        .map(|h| PathBuf::from(h).join(".cache/huggingface/hub"))
        .unwrap_or_else(|_| PathBuf::from("/root/.cache/huggingface/hub"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_match_supports_star_suffix() {
        assert!(glob_match("*.safetensors", "model.safetensors"));
        assert!(!glob_match("*.safetensors", "model.bin"));
    }

    #[test]
    fn glob_match_supports_star_prefix_and_middle() {
        assert!(glob_match("vae/*", "vae/diffusion_pytorch_model.bin"));
        assert!(!glob_match("vae/*", "unet/model.bin"));
    }

    #[test]
    fn matches_any_checks_every_pattern() {
        let patterns = vec!["*.json".to_string(), "*.safetensors".to_string()];
        assert!(matches_any("config.json", &patterns));
        assert!(matches_any("model.safetensors", &patterns));
        assert!(!matches_any("model.bin", &patterns));
    }

    #[tokio::test]
    async fn resolve_local_dir_falls_back_when_no_hint_given() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = AgentConfig::from_env();
        cfg.backend_install_dir = tmp.path().to_path_buf();
        let client = ModelRegistryClient::new(&cfg);
        let dir = client.resolve_local_dir(None).await;
        assert_eq!(dir, cfg.models_shared_dir());
    }
}
