use crate::backend::{Artifact, ChosenFile};
use crate::error::PickError;
use crate::session::{PagePreview, SourceHandle, View};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// View for one-shot command line runs: previews become PNG files, the
/// artifact is held until the command writes it out.
pub struct TerminalView {
    preview_dir: Option<PathBuf>,
    only_page: Option<u32>,
    artifact: Mutex<Option<Artifact>>,
}

impl TerminalView {
    pub fn new(preview_dir: Option<PathBuf>) -> Self {
        Self {
            preview_dir,
            only_page: None,
            artifact: Mutex::new(None),
        }
    }

    /// Only write the preview for this 1-based page number
    pub fn only_page(mut self, number: u32) -> Self {
        self.only_page = Some(number);
        self
    }

    pub fn take_artifact(&self) -> Option<Artifact> {
        self.artifact
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    fn write_preview(&self, dir: &Path, page: &PagePreview) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        let path = dir.join(format!("page-{:04}.png", page.number()));
        std::fs::write(&path, page.surface.to_png()?)
            .with_context(|| format!("Failed to write preview: {}", path.display()))?;
        Ok(path)
    }
}

impl View for TerminalView {
    fn show_page(&self, page: PagePreview) {
        if self.only_page.is_some_and(|only| only != page.number()) {
            return;
        }
        let Some(dir) = &self.preview_dir else {
            return;
        };
        match self.write_preview(dir, &page) {
            Ok(path) => println!(
                "Page {}/{} ({}x{}){} -> {}",
                page.number(),
                page.page_count,
                page.surface.width,
                page.surface.height,
                if page.selected { " [selected]" } else { "" },
                path.display()
            ),
            Err(e) => eprintln!("Error: {:#}", e),
        }
    }

    fn page_number_restored(&self, current: u32) {
        eprintln!("Staying on page {}", current);
    }

    fn notify(&self, error: &PickError) {
        eprintln!("{} ({})", error.user_message(), error);
    }

    fn publish_source(&self, file: &ChosenFile) -> SourceHandle {
        SourceHandle::new(file.name.clone())
    }

    fn revoke_source(&self, handle: SourceHandle) {
        debug!(source = handle.as_str(), "Released source file");
    }

    fn deliver(&self, artifact: Artifact) {
        *self
            .artifact
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(artifact);
    }
}
