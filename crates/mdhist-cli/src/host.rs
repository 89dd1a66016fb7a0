//! Terminal implementation of the editor capabilities

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use mdhist_engine::{DiffLineKind, DocumentSource, EditorHost, NotifyLevel, TextDiffResult};

pub struct TerminalHost {
    workspace: PathBuf,
    assume_yes: bool,
}

impl TerminalHost {
    pub fn new(workspace: &Path, assume_yes: bool) -> Self {
        Self {
            workspace: workspace.to_path_buf(),
            assume_yes,
        }
    }

    fn disk_path(&self, file_path: &str) -> PathBuf {
        self.workspace.join(file_path)
    }
}

#[async_trait]
impl EditorHost for TerminalHost {
    async fn confirm(&self, message: &str) -> bool {
        if self.assume_yes {
            return true;
        }

        print!("{} [y/N] ", message);
        if std::io::Write::flush(&mut std::io::stdout()).is_err() {
            return false;
        }

        let mut input = String::new();
        if std::io::stdin().read_line(&mut input).is_err() {
            return false;
        }
        input.trim().eq_ignore_ascii_case("y")
    }

    async fn show_snapshot(&self, title: &str, content: &str) -> Result<()> {
        eprintln!("── {} ──", title);
        print!("{}", content);
        if !content.ends_with('\n') {
            println!();
        }
        Ok(())
    }

    async fn show_diff(&self, title: &str, diff: &TextDiffResult) -> Result<()> {
        println!("── {} ──", title);
        if !diff.has_changes() {
            println!("No differences.");
            return Ok(());
        }
        for line in &diff.lines {
            let marker = match line.kind {
                DiffLineKind::Added => '+',
                DiffLineKind::Deleted => '-',
                DiffLineKind::Context => ' ',
            };
            println!("{}{}", marker, line.content);
        }
        println!("\n{} addition(s), {} deletion(s)", diff.added(), diff.deleted());
        Ok(())
    }

    async fn replace_document(&self, file_path: &str, content: &str) -> Result<bool> {
        let path = self.disk_path(file_path);
        tokio::fs::write(&path, content)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(true)
    }

    async fn write_clipboard(&self, text: &str) -> Result<()> {
        let mut clipboard = arboard::Clipboard::new()?;
        clipboard.set_text(text.to_string())?;
        Ok(())
    }

    fn notify(&self, level: NotifyLevel, message: &str) {
        match level {
            NotifyLevel::Info => println!("✓ {}", message),
            NotifyLevel::Error => eprintln!("✗ {}", message),
        }
    }
}

#[async_trait]
impl DocumentSource for TerminalHost {
    async fn current_text(&self, file_path: &str) -> Option<String> {
        tokio::fs::read_to_string(self.disk_path(file_path)).await.ok()
    }
}
