//! The input rewriter (§4.I): finds externally-hosted asset URLs in a
//! workflow, pulls each one into the backend's input directory exactly
//! once, and substitutes the synthesized filename back into every
//! occurrence of that URL.

use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;

const ASSET_HOST: &str = "fussion.studio";
const MAX_CONCURRENT_DOWNLOADS: usize = 3;

#[derive(Debug, Clone, thiserror::Error)]
pub enum RewriteError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("io error: {0}")]
    Io(String),
}

/// Walks `workflow` depth-first, collecting every distinct string value
/// that parses as an HTTPS URL on [`ASSET_HOST`].
fn collect_asset_urls(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => {
            if is_asset_url(s) && !out.contains(s) {
                out.push(s.clone());
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_asset_urls(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_asset_urls(v, out)),
        _ => {}
    }
}

fn is_asset_url(s: &str) -> bool {
    reqwest::Url::parse(s)
        .map(|u| u.scheme() == "https" && u.host_str() == Some(ASSET_HOST))
        .unwrap_or(false)
}

/// `<origStem>_<8-hex>.<origExt>` (§4.I step 1).
fn synthesize_filename(url: &str) -> String {
    let stem_and_ext = url.rsplit('/').next().unwrap_or("asset");
    let (stem, ext) = match stem_and_ext.rsplit_once('.') {
        Some((stem, ext)) => (stem, Some(ext)),
        None => (stem_and_ext, None),
    };
    let suffix = &uuid::Uuid::new_v4().simple().to_string()[..8];
    match ext {
        Some(ext) => format!("{stem}_{suffix}.{ext}"),
        None => format!("{stem}_{suffix}"),
    }
}

fn replace_url_everywhere(value: &mut Value, url: &str, filename: &str) {
    match value {
        Value::String(s) if s == url => *s = filename.to_string(),
        Value::Array(items) => items.iter_mut().for_each(|v| replace_url_everywhere(v, url, filename)),
        Value::Object(map) => map.values_mut().for_each(|v| replace_url_everywhere(v, url, filename)),
        _ => {}
    }
}

/// §4.I: mutates `workflow` in place, replacing every asset URL with its
/// downloaded filename. Download failures leave the URL untouched and are
/// logged, never surfaced as an error of the overall rewrite.
pub async fn rewrite_external_inputs(workflow: &mut Value, http: &reqwest::Client, input_dir: &Path) {
    let mut urls = Vec::new();
    collect_asset_urls(workflow, &mut urls);
    if urls.is_empty() {
        return;
    }

    let _ = tokio::fs::create_dir_all(input_dir).await;
    let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_DOWNLOADS));

    let mut tasks = Vec::with_capacity(urls.len());
    for url in urls {
        let http = http.clone();
        let input_dir = input_dir.to_path_buf();
        let semaphore = Arc::clone(&semaphore);
        tasks.push(tokio::spawn(async move {
            let _permit = semaphore.acquire().await;
            let filename = synthesize_filename(&url);
            let result = download_one(&http, &url, &input_dir, &filename).await;
            (url, filename, result)
        }));
    }

    let mut replacements: HashMap<String, String> = HashMap::new();
    for task in tasks {
        let Ok((url, filename, result)) = task.await else { continue };
        match result {
            Ok(()) => {
                replacements.insert(url, filename);
            }
            Err(e) => tracing::warn!(url = %url, error = %e, "input rewrite download failed, leaving URL in place"),
        }
    }

    for (url, filename) in replacements {
        replace_url_everywhere(workflow, &url, &filename);
    }
}

async fn download_one(
    http: &reqwest::Client,
    url: &str,
    input_dir: &Path,
    filename: &str,
) -> Result<(), RewriteError> {
    let resp = http
        .get(url)
        .send()
        .await
        .map_err(|e| RewriteError::Transport(e.to_string()))?
        .error_for_status()
        .map_err(|e| RewriteError::Transport(e.to_string()))?;

    let dest = input_dir.join(filename);
    let tmp = input_dir.join(format!("{filename}.tmp"));
    let mut file = tokio::fs::File::create(&tmp).await.map_err(|e| RewriteError::Io(e.to_string()))?;
    let mut stream = resp.bytes_stream();
    use futures_util::StreamExt;
    use tokio::io::AsyncWriteExt;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| RewriteError::Transport(e.to_string()))?;
        file.write_all(&chunk).await.map_err(|e| RewriteError::Io(e.to_string()))?;
    }
    file.flush().await.map_err(|e| RewriteError::Io(e.to_string()))?;
    drop(file);
    tokio::fs::rename(&tmp, &dest).await.map_err(|e| RewriteError::Io(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_asset_url_requires_https_and_fixed_host() {
        assert!(is_asset_url("https://fussion.studio/a/img.png"));
        assert!(!is_asset_url("http://fussion.studio/a/img.png"));
        assert!(!is_asset_url("https://example.com/a/img.png"));
        assert!(!is_asset_url("not a url"));
    }

    #[test]
    fn synthesize_filename_keeps_stem_and_extension() {
        let name = synthesize_filename("https://fussion.studio/a/img.png");
        assert!(name.starts_with("img_"));
        assert!(name.ends_with(".png"));
        assert_eq!(name.len(), "img_".len() + 8 + ".png".len());
    }

    #[test]
    fn collect_asset_urls_walks_nested_structures_and_dedupes() {
        let workflow = serde_json::json!({
            "a": { "inputs": { "image": "https://fussion.studio/x/y.png" } },
            "b": ["https://fussion.studio/x/y.png", "https://example.com/z.png"],
        });
        let mut urls = Vec::new();
        collect_asset_urls(&workflow, &mut urls);
        assert_eq!(urls, vec!["https://fussion.studio/x/y.png".to_string()]);
    }

    #[test]
    fn replace_url_everywhere_hits_every_occurrence() {
        let mut workflow = serde_json::json!({
            "a": "https://fussion.studio/x/y.png",
            "b": ["https://fussion.studio/x/y.png"],
        });
        replace_url_everywhere(&mut workflow, "https://fussion.studio/x/y.png", "y_abcd1234.png");
        assert_eq!(workflow["a"], "y_abcd1234.png");
        assert_eq!(workflow["b"][0], "y_abcd1234.png");
    }
}
