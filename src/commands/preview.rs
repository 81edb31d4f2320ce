use crate::backend::ChosenFile;
use crate::commands::terminal::TerminalView;
use crate::pdf::{LopdfComposer, PreviewRenderer};
use crate::session::{
    ControllerConfig, LoadOutcome, NavigateOutcome, Navigation, PresentationMode,
    SessionController,
};
use anyhow::{bail, Result};
use std::path::Path;

/// Write page previews as PNG files: one page if `page` is given, otherwise all
pub async fn run<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    page: Option<u32>,
    output_dir: Q,
    scale: f32,
) -> Result<()> {
    let input = input.as_ref();
    let mut view = TerminalView::new(Some(output_dir.as_ref().to_path_buf()));
    let mode = match page {
        Some(number) => {
            view = view.only_page(number);
            PresentationMode::Single
        }
        None => PresentationMode::Grid,
    };
    let controller = SessionController::new(
        PreviewRenderer::new(),
        LopdfComposer,
        view,
        ControllerConfig { mode, scale },
    );

    match controller.on_file_chosen(ChosenFile::from_path(input)?).await {
        LoadOutcome::Loaded { .. } => {}
        LoadOutcome::Ignored => bail!("Not a PDF file: {}", input.display()),
        _ => bail!("Failed to load PDF: {}", input.display()),
    }

    if let Some(number) = page.filter(|&n| n != 1) {
        match controller.on_navigate(Navigation::Page(number)).await {
            NavigateOutcome::Rendered { .. } => {}
            NavigateOutcome::Rejected => bail!(
                "Page {} is out of range (1-{})",
                number,
                controller.page_count().await
            ),
            outcome => bail!("Could not render page {}: {:?}", number, outcome),
        }
    }

    Ok(())
}
