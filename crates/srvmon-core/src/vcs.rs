//! Source-control pull collaborator.

use std::path::Path;

use tokio::process::Command;

use crate::{Error, Result};

/// Run `git pull` in `repo_dir`; a non-zero exit surfaces stderr as the
/// error text.
pub async fn pull(repo_dir: &Path) -> Result<()> {
    let output = Command::new("git")
        .arg("pull")
        .current_dir(repo_dir)
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(Error::Collaborator(stderr));
    }
    Ok(())
}
