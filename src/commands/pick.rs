use crate::backend::ChosenFile;
use crate::commands::terminal::TerminalView;
use crate::page_range::selection_positions;
use crate::pdf::{LopdfComposer, PreviewRenderer};
use crate::session::{ControllerConfig, LoadOutcome, ReassembleOutcome, SessionController};
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

pub async fn run<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    pages: &str,
    output_dir: Q,
    preview_dir: Option<PathBuf>,
    config: ControllerConfig,
) -> Result<()> {
    let input = input.as_ref();
    let output_dir = output_dir.as_ref();

    let controller = SessionController::new(
        PreviewRenderer::new(),
        LopdfComposer,
        TerminalView::new(preview_dir),
        config,
    );

    let page_count = match controller.on_file_chosen(ChosenFile::from_path(input)?).await {
        LoadOutcome::Loaded { page_count } => page_count,
        LoadOutcome::Ignored => bail!("Not a PDF file: {}", input.display()),
        _ => bail!("Failed to load PDF: {}", input.display()),
    };

    for position in selection_positions(pages, page_count)? {
        controller.on_toggle_selection(position, true).await;
    }

    let selected = match controller.on_reassemble().await {
        ReassembleOutcome::Delivered { page_count } => page_count,
        outcome => bail!("Reassembly did not complete: {:?}", outcome),
    };
    let artifact = controller
        .view()
        .take_artifact()
        .context("Reassembled PDF was not delivered")?;

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create directory: {}", output_dir.display()))?;
    let output = output_dir.join(&artifact.file_name);
    std::fs::write(&output, &artifact.bytes)
        .with_context(|| format!("Failed to save PDF: {}", output.display()))?;

    let source = controller.status().await.source.unwrap_or_default();
    println!(
        "Reassembled {} of {} page(s) from {} into {}",
        selected,
        page_count,
        source,
        output.display()
    );

    Ok(())
}
