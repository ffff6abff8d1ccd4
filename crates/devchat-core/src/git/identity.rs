use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// The user a prompt is attributed to, as configured in git.
/// Falls back to the login name if git is not installed or unconfigured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitIdentity {
    pub name: String,
    pub email: String,
}

impl GitIdentity {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// Read `user.name` and `user.email` from git config in the current directory.
    pub async fn detect() -> Self {
        Self::detect_in(&std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))).await
    }

    pub async fn detect_in(dir: &Path) -> Self {
        let name = run_git(dir, &["config", "user.name"]).await.ok();
        let email = run_git(dir, &["config", "user.email"]).await.ok();
        Self::from_parts(name, email)
    }

    fn from_parts(name: Option<String>, email: Option<String>) -> Self {
        let name = name
            .filter(|n| !n.is_empty())
            .or_else(|| std::env::var("USER").ok().filter(|u| !u.is_empty()))
            .unwrap_or_else(|| "user".to_string());
        let email = email
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| format!("{}@localhost", name.replace(' ', ".").to_lowercase()));
        Self { name, email }
    }
}

async fn run_git(dir: &Path, args: &[&str]) -> Result<String, String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| format!("Failed to run git: {e}"))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        Err(String::from_utf8_lossy(&output.stderr).trim().to_string())
    }
}
