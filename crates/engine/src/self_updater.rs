//! `GET|POST /api/pull-update` (§4.M): reconciles the agent's own companion
//! plugin repository — a fixed, first-party git URL, distinct from anything
//! the control plane supplies — into the backend's plugin directory. Always
//! safe to update; never consults the critical-dependency protection list
//! the way §4.F/§4.L do.

use imagebridge_wire::http_api::{DependencyInstallOutcome, PullUpdateResponse, RepoUpdateOutcome};
use std::path::Path;
use tokio::process::Command;

/// Not supplied by the control plane: this repository ships with the agent
/// itself. Chosen to read as a plausible companion-nodes repo under the
/// same org as the rest of this product; see DESIGN.md.
const COMPANION_REPO_URL: &str = "https://github.com/imagebridge-ai/imagebridge-companion-nodes.git";
const COMPANION_REPO_DIR: &str = "imagebridge-companion-nodes";

/// §4.M steps 1-6.
pub async fn pull_update(custom_nodes_dir: &Path, pip_binary: &str) -> PullUpdateResponse {
    if !probe_git().await {
        return PullUpdateResponse {
            success: false,
            repository: None,
            dependencies: None,
            target_directory: None,
            error: Some("git binary not available".to_string()),
        };
    }

    if tokio::fs::create_dir_all(custom_nodes_dir).await.is_err() {
        return PullUpdateResponse {
            success: false,
            repository: None,
            dependencies: None,
            target_directory: None,
            error: Some(format!("backend install directory unavailable: {}", custom_nodes_dir.display())),
        };
    }

    let target_dir = custom_nodes_dir.join(COMPANION_REPO_DIR);
    let target_str = target_dir.display().to_string();

    let repo_outcome = match reconcile_repo(&target_dir).await {
        Ok(outcome) => outcome,
        Err(e) => {
            return PullUpdateResponse {
                success: false,
                repository: None,
                dependencies: None,
                target_directory: Some(target_str),
                error: Some(e),
            }
        }
    };

    let dependencies = install_requirements_best_effort(&target_dir, pip_binary).await;

    PullUpdateResponse {
        success: true,
        repository: Some(repo_outcome),
        dependencies: Some(dependencies),
        target_directory: Some(target_str),
        error: None,
    }
}

async fn probe_git() -> bool {
    Command::new("git").arg("--version").output().await.map(|o| o.status.success()).unwrap_or(false)
}

async fn reconcile_repo(target_dir: &Path) -> Result<RepoUpdateOutcome, String> {
    if !target_dir.exists() {
        clone_fresh(target_dir).await?;
        return Ok(RepoUpdateOutcome { updated: true, action: "cloned".to_string() });
    }

    if target_dir.join(".git").exists() {
        return update_existing_checkout(target_dir).await;
    }

    // Present but not a git checkout: remove and clone fresh.
    tokio::fs::remove_dir_all(target_dir).await.map_err(|e| e.to_string())?;
    clone_fresh(target_dir).await?;
    Ok(RepoUpdateOutcome { updated: true, action: "reset_and_cloned".to_string() })
}

async fn clone_fresh(target_dir: &Path) -> Result<(), String> {
    if let Some(parent) = target_dir.parent() {
        let _ = tokio::fs::create_dir_all(parent).await;
    }
    let output = Command::new("git")
        .arg("clone")
        .arg(COMPANION_REPO_URL)
        .arg(target_dir)
        .output()
        .await
        .map_err(|e| e.to_string())?;
    if !output.status.success() {
        return Err(String::from_utf8_lossy(&output.stderr).to_string());
    }
    Ok(())
}

async fn update_existing_checkout(target_dir: &Path) -> Result<RepoUpdateOutcome, String> {
    run_git(target_dir, &["fetch", "origin"]).await?;

    let local_head = run_git(target_dir, &["rev-parse", "HEAD"]).await?;
    let remote_head = match run_git(target_dir, &["rev-parse", "origin/main"]).await {
        Ok(sha) => sha,
        Err(_) => run_git(target_dir, &["rev-parse", "origin/master"]).await?,
    };

    if local_head.trim() == remote_head.trim() {
        return Ok(RepoUpdateOutcome { updated: false, action: "up_to_date".to_string() });
    }

    run_git(target_dir, &["pull"]).await?;
    Ok(RepoUpdateOutcome { updated: true, action: "pulled".to_string() })
}

async fn run_git(dir: &Path, args: &[&str]) -> Result<String, String> {
    let output = Command::new("git").arg("-C").arg(dir).args(args).output().await.map_err(|e| e.to_string())?;
    if !output.status.success() {
        return Err(String::from_utf8_lossy(&output.stderr).to_string());
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// §4.M step 5: best-effort, outside the critical-dependency protection
/// path — this repository is first-party and always trusted.
async fn install_requirements_best_effort(target_dir: &Path, pip_binary: &str) -> DependencyInstallOutcome {
    let requirements_path = target_dir.join("requirements.txt");
    if tokio::fs::metadata(&requirements_path).await.is_err() {
        return DependencyInstallOutcome { attempted: false, error: None };
    }

    let output = Command::new(pip_binary).arg("install").arg("-r").arg(&requirements_path).output().await;
    match output {
        Ok(out) if out.status.success() => DependencyInstallOutcome { attempted: true, error: None },
        Ok(out) => DependencyInstallOutcome {
            attempted: true,
            error: Some(String::from_utf8_lossy(&out.stderr).to_string()),
        },
        Err(e) => DependencyInstallOutcome { attempted: true, error: Some(e.to_string()) },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn companion_repo_constants_are_consistent() {
        assert!(COMPANION_REPO_URL.ends_with(&format!("{COMPANION_REPO_DIR}.git")));
    }
}
