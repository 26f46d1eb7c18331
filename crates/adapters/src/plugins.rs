//! Plugin (custom node) installer (§4.F): clone-or-skip, then a
//! dependency-protected `pip install` against the plugin's own
//! `requirements.txt`, run in a background worker.

use imagebridge_core::deps::critical::CriticalPackages;
use imagebridge_core::deps::requirement::{parse_requirements, plan_install};
use std::path::{Path, PathBuf};
use tokio::process::Command;

#[derive(Debug, Clone, thiserror::Error)]
pub enum PluginError {
    #[error("malformed git url: {0}")]
    MalformedUrl(String),
    #[error("clone failed: {0}")]
    CloneFailed(String),
}

/// A git URL reduced to its clone essentials: `{user, repo, branch, subfolder}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRepoUrl {
    pub clone_url: String,
    pub repo: String,
    pub branch: Option<String>,
    pub subfolder: Option<String>,
}

/// Parses a GitHub-style URL, optionally carrying a `tree/<branch>[/<subfolder>]`
/// segment, into a clean clone target. §4.F.
pub fn parse_repo_url(url: &str) -> Result<ParsedRepoUrl, PluginError> {
    let trimmed = url.trim().trim_end_matches('/');
    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .ok_or_else(|| PluginError::MalformedUrl(url.to_string()))?;

    let mut segments = without_scheme.splitn(2, '/');
    let host = segments.next().ok_or_else(|| PluginError::MalformedUrl(url.to_string()))?;
    let rest = segments.next().ok_or_else(|| PluginError::MalformedUrl(url.to_string()))?;

    let parts: Vec<&str> = rest.split('/').collect();
    if parts.len() < 2 {
        return Err(PluginError::MalformedUrl(url.to_string()));
    }
    let user = parts[0];
    let repo = parts[1].trim_end_matches(".git");

    let (branch, subfolder) = if parts.len() > 2 && parts[2] == "tree" {
        let branch = parts.get(3).map(|s| s.to_string());
        let subfolder = if parts.len() > 4 { Some(parts[4..].join("/")) } else { None };
        (branch, subfolder)
    } else {
        (None, None)
    };

    Ok(ParsedRepoUrl {
        clone_url: format!("https://{host}/{user}/{repo}.git"),
        repo: repo.to_string(),
        branch,
        subfolder,
    })
}

#[derive(Clone)]
pub struct PluginInstaller {
    custom_nodes_dir: PathBuf,
    critical: CriticalPackages,
    pip_binary: String,
}

impl PluginInstaller {
    pub fn new(custom_nodes_dir: PathBuf, critical: CriticalPackages) -> Self {
        Self { custom_nodes_dir, critical, pip_binary: "pip".to_string() }
    }

    /// §4.F `install(gitUrl) -> existed`. Runs dependency install
    /// asynchronously regardless of branch; only the clone step blocks.
    pub async fn install(&self, git_url: &str) -> Result<bool, PluginError> {
        let parsed = parse_repo_url(git_url)?;
        let install_dir = self.custom_nodes_dir.join(&parsed.repo);
        let existed = tokio::fs::metadata(&install_dir).await.is_ok();

        if !existed {
            self.clone(&parsed, &install_dir).await?;
        }

        let requirements_path = install_dir.join("requirements.txt");
        let this = self.clone();
        tokio::spawn(async move {
            this.install_requirements(&requirements_path).await;
        });

        Ok(existed)
    }

    async fn clone(&self, parsed: &ParsedRepoUrl, install_dir: &Path) -> Result<(), PluginError> {
        if let Some(parent) = install_dir.parent() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }
        let mut cmd = Command::new("git");
        cmd.arg("clone");
        if let Some(branch) = &parsed.branch {
            cmd.arg("--single-branch").arg("--branch").arg(branch);
        }
        cmd.arg(&parsed.clone_url).arg(install_dir);

        let output = cmd
            .output()
            .await
            .map_err(|e| PluginError::CloneFailed(e.to_string()))?;
        if !output.status.success() {
            return Err(PluginError::CloneFailed(String::from_utf8_lossy(&output.stderr).to_string()));
        }
        Ok(())
    }

    /// §4.F dependency-protection policy: critical packages already present
    /// are skipped (never upgraded); everything else is written to a scratch
    /// requirements file and installed in one invocation.
    async fn install_requirements(&self, requirements_path: &Path) {
        let Ok(text) = tokio::fs::read_to_string(requirements_path).await else {
            return;
        };
        let requirements = parse_requirements(&text);
        if requirements.is_empty() {
            return;
        }

        let installed = self.installed_package_names().await;
        let plan = plan_install(&requirements, &self.critical, |name| {
            installed.iter().any(|i| i.eq_ignore_ascii_case(name))
        });

        for pkg in &plan.protected {
            tracing::info!(package = %pkg, "skipping protected dependency, already installed");
        }
        if plan.to_install.is_empty() {
            return;
        }

        let Ok(tmp) = tempfile_path() else { return };
        if tokio::fs::write(&tmp, plan.to_install.join("\n")).await.is_err() {
            return;
        }

        let output = Command::new(&self.pip_binary)
            .arg("install")
            .arg("-r")
            .arg(&tmp)
            .output()
            .await;
        match output {
            Ok(out) if !out.status.success() => {
                tracing::error!(stderr = %String::from_utf8_lossy(&out.stderr), "dependency install failed");
            }
            Err(e) => tracing::error!(error = %e, "failed to spawn dependency installer"),
            _ => {}
        }
        let _ = tokio::fs::remove_file(&tmp).await;
    }

    async fn installed_package_names(&self) -> Vec<String> {
        let output = Command::new(&self.pip_binary).arg("list").arg("--format=freeze").output().await;
        match output {
            Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout)
                .lines()
                .filter_map(|l| l.split("==").next().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }
}

fn tempfile_path() -> std::io::Result<PathBuf> {
    let mut path = std::env::temp_dir();
    let unique = uuid::Uuid::new_v4();
    path.push(format!("imagebridge-requirements-{unique}.txt"));
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_repo_url() {
        let parsed = parse_repo_url("https://github.com/acme/cool-nodes").unwrap();
        assert_eq!(parsed.clone_url, "https://github.com/acme/cool-nodes.git");
        assert_eq!(parsed.repo, "cool-nodes");
        assert!(parsed.branch.is_none());
    }

    #[test]
    fn parses_tree_branch_and_subfolder() {
        let parsed = parse_repo_url("https://github.com/acme/cool-nodes/tree/dev/nodes/sub").unwrap();
        assert_eq!(parsed.repo, "cool-nodes");
        assert_eq!(parsed.branch.as_deref(), Some("dev"));
        assert_eq!(parsed.subfolder.as_deref(), Some("nodes/sub"));
        assert_eq!(parsed.clone_url, "https://github.com/acme/cool-nodes.git");
    }

    #[test]
    fn strips_dot_git_suffix() {
        let parsed = parse_repo_url("https://github.com/acme/cool-nodes.git").unwrap();
        assert_eq!(parsed.repo, "cool-nodes");
    }

    #[test]
    fn rejects_malformed_url() {
        assert!(parse_repo_url("not-a-url").is_err());
        assert!(parse_repo_url("https://github.com/only-one-segment").is_err());
    }
}
