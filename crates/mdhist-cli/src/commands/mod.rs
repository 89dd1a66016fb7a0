pub mod history;

use anyhow::{Context, Result};
use std::path::{Component, Path, PathBuf};

/// Find workspace root by looking for .git, .mdhist, Cargo.toml, or package.json
pub fn find_workspace_root(file: &Path) -> Result<PathBuf> {
    let mut current = if file.is_file() {
        file.parent().unwrap_or(file).to_owned()
    } else {
        file.to_path_buf()
    };

    loop {
        if current.join(".git").exists()
            || current.join(mdhist_config::WORKSPACE_DIR).exists()
            || current.join("Cargo.toml").exists()
            || current.join("package.json").exists()
        {
            return Ok(current);
        }

        if !current.pop() {
            return Ok(file.parent().unwrap_or(file).to_owned());
        }
    }
}

/// Workspace-relative, `/`-separated path of `file`
pub fn logical_path(workspace: &Path, file: &Path) -> Result<String> {
    let absolute = if file.is_absolute() {
        file.to_path_buf()
    } else {
        std::env::current_dir()?.join(file)
    };
    // Files that no longer exist can still have history
    let absolute = std::fs::canonicalize(&absolute).unwrap_or(absolute);

    let relative = absolute.strip_prefix(workspace).with_context(|| {
        format!(
            "{} is not inside workspace {}",
            file.display(),
            workspace.display()
        )
    })?;

    let segments: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if segments.is_empty() {
        anyhow::bail!("{} is not a file", file.display());
    }
    Ok(segments.join("/"))
}
