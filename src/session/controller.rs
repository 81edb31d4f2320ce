//! Event-driven orchestration of a [`DocumentSession`] and a [`PageCatalog`]
//!
//! Handlers take `&self` and may interleave at their await points. State lives
//! behind a mutex that is never held while a collaborator is working, and every
//! asynchronous result is checked against the load generation it started under
//! before it is allowed to touch state or the view.

use crate::backend::{ChosenFile, Composer, Renderer};
use crate::error::PickError;
use crate::pdf::DEFAULT_SCALE;
use crate::session::catalog::PageCatalog;
use crate::session::document::DocumentSession;
use crate::session::view::{PagePreview, Phase, SourceHandle, View};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PresentationMode {
    /// One page at a time with previous/next navigation
    #[default]
    Single,
    /// Every page at once
    Grid,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerConfig {
    pub mode: PresentationMode,
    pub scale: f32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            mode: PresentationMode::Single,
            scale: DEFAULT_SCALE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Navigation {
    Previous,
    Next,
    /// Jump to a 1-based page number
    Page(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoadOutcome {
    /// Not a PDF; nothing changed
    Ignored,
    Loaded { page_count: u32 },
    Failed,
    /// A newer file was chosen before this one finished loading
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NavigateOutcome {
    Rendered { page: u32 },
    /// Already at the first or last page
    Unchanged,
    /// Target outside the document; the current page stays
    Rejected,
    /// Grid mode, or nothing loaded
    Unavailable,
    /// The render finished after the document or page changed
    Discarded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReassembleOutcome {
    Delivered { page_count: usize },
    EmptySelection,
    Failed,
    InProgress,
    Unavailable,
    /// A new file replaced the document while the artifact was being built
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub phase: Phase,
    pub mode: PresentationMode,
    pub page_count: u32,
    pub current_page: u32,
    pub selected: Vec<u32>,
    /// Published handle to the chosen file, until it is revoked
    pub source: Option<String>,
}

enum RenderStatus {
    Shown,
    Discarded,
    Failed,
}

struct ControllerState {
    phase: Phase,
    catalog: PageCatalog,
    /// 1-based; 0 while nothing is loaded
    current_page: u32,
    source: Option<SourceHandle>,
}

pub struct SessionController<R: Renderer, C: Composer, V: View> {
    session: DocumentSession<R, C>,
    state: Mutex<ControllerState>,
    // Held for the duration of a render so two renders never race for the
    // same output surface
    render_gate: Mutex<()>,
    view: V,
    config: ControllerConfig,
}

impl<R: Renderer, C: Composer, V: View> SessionController<R, C, V> {
    pub fn new(renderer: R, composer: C, view: V, config: ControllerConfig) -> Self {
        Self {
            session: DocumentSession::new(renderer, composer),
            state: Mutex::new(ControllerState {
                phase: Phase::Empty,
                catalog: PageCatalog::new(0),
                current_page: 0,
                source: None,
            }),
            render_gate: Mutex::new(()),
            view,
            config,
        }
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub async fn status(&self) -> SessionStatus {
        let state = self.state.lock().await;
        SessionStatus {
            phase: state.phase,
            mode: self.config.mode,
            page_count: state.catalog.page_count(),
            current_page: state.current_page,
            selected: state.catalog.selected_ordered(),
            source: state.source.as_ref().map(|handle| handle.as_str().to_string()),
        }
    }

    pub async fn page_count(&self) -> u32 {
        self.state.lock().await.catalog.page_count()
    }

    pub async fn on_file_chosen(&self, file: ChosenFile) -> LoadOutcome {
        if !file.is_pdf() {
            debug!(name = %file.name, media_type = %file.media_type, "Ignoring non-PDF file");
            return LoadOutcome::Ignored;
        }

        let generation = {
            let mut state = self.state.lock().await;
            if let Some(previous) = state.source.take() {
                self.view.revoke_source(previous);
            }
            state.source = Some(self.view.publish_source(&file));
            let generation = self.session.begin_load();
            state.catalog.reset(0);
            state.current_page = 0;
            self.set_phase(&mut state, Phase::Loading);
            generation
        };

        info!(name = %file.name, bytes = file.bytes.len(), generation, "Loading PDF");
        let result = self.session.load(generation, Arc::clone(&file.bytes)).await;

        let page_count = {
            let mut state = self.state.lock().await;
            if !self.session.is_current(generation) {
                debug!(generation, "Load superseded by a newer file");
                return LoadOutcome::Superseded;
            }
            match result {
                Ok(page_count) => {
                    state.catalog.reset(page_count);
                    state.current_page = page_count.min(1);
                    self.set_phase(&mut state, Phase::Ready);
                    page_count
                }
                Err(err) => {
                    warn!(error = %err, name = %file.name, "Failed to load PDF");
                    self.set_phase(&mut state, Phase::Empty);
                    self.view.notify(&err);
                    return LoadOutcome::Failed;
                }
            }
        };

        info!(page_count, generation, "PDF loaded");
        match self.config.mode {
            PresentationMode::Single if page_count > 0 => {
                self.render(generation, 0, true).await;
            }
            PresentationMode::Single => {}
            PresentationMode::Grid => {
                let positions = self.state.lock().await.catalog.positions();
                for position in positions {
                    if let RenderStatus::Discarded = self.render(generation, position, false).await
                    {
                        break;
                    }
                }
            }
        }
        LoadOutcome::Loaded { page_count }
    }

    /// Returns false when the position was rejected
    pub async fn on_toggle_selection(&self, position: u32, included: bool) -> bool {
        let mut state = self.state.lock().await;
        match state.catalog.set_selected(position, included) {
            Ok(()) => {
                debug!(
                    position,
                    included,
                    selected = state.catalog.selected_count(),
                    "Selection updated"
                );
                true
            }
            Err(err) => {
                warn!(error = %err, "Rejected selection change");
                self.view.notify(&err);
                false
            }
        }
    }

    pub async fn on_navigate(&self, navigation: Navigation) -> NavigateOutcome {
        let (generation, target) = {
            let mut state = self.state.lock().await;
            if self.config.mode != PresentationMode::Single
                || !matches!(state.phase, Phase::Ready | Phase::Reassembling)
            {
                return NavigateOutcome::Unavailable;
            }

            let page_count = state.catalog.page_count();
            let current = state.current_page;
            let target = match navigation {
                Navigation::Previous if current <= 1 => return NavigateOutcome::Unchanged,
                Navigation::Previous => current - 1,
                Navigation::Next if current >= page_count => return NavigateOutcome::Unchanged,
                Navigation::Next => current + 1,
                Navigation::Page(number) => number,
            };
            if target < 1 || target > page_count {
                debug!(target, current, page_count, "Rejected navigation");
                self.view.page_number_restored(current);
                return NavigateOutcome::Rejected;
            }

            state.current_page = target;
            (self.session.generation(), target)
        };

        match self.render(generation, target - 1, true).await {
            RenderStatus::Shown => NavigateOutcome::Rendered { page: target },
            RenderStatus::Discarded => NavigateOutcome::Discarded,
            RenderStatus::Failed => NavigateOutcome::Failed,
        }
    }

    pub async fn on_reassemble(&self) -> ReassembleOutcome {
        let (generation, positions) = {
            let mut state = self.state.lock().await;
            match state.phase {
                Phase::Ready => {}
                Phase::Reassembling => return ReassembleOutcome::InProgress,
                Phase::Loading => return ReassembleOutcome::Unavailable,
                Phase::Empty => {
                    self.view.notify(&PickError::NoDocument);
                    return ReassembleOutcome::Unavailable;
                }
            }
            let positions = state.catalog.selected_ordered();
            if positions.is_empty() {
                self.view.notify(&PickError::EmptySelection);
                return ReassembleOutcome::EmptySelection;
            }
            self.set_phase(&mut state, Phase::Reassembling);
            (self.session.generation(), positions)
        };

        info!(pages = ?positions, "Reassembling PDF");
        let result = self.session.extract_pages(&positions).await;

        let mut state = self.state.lock().await;
        if !self.session.is_current(generation) || matches!(result, Err(PickError::Stale { .. })) {
            debug!(generation, "Dropping artifact built from a replaced document");
            return ReassembleOutcome::Superseded;
        }
        self.set_phase(&mut state, Phase::Ready);
        match result {
            Ok(artifact) => {
                info!(bytes = artifact.bytes.len(), "Reassembled PDF ready");
                self.view.deliver(artifact);
                ReassembleOutcome::Delivered {
                    page_count: positions.len(),
                }
            }
            Err(err) => {
                warn!(error = %err, "Reassembly failed");
                self.view.notify(&err);
                ReassembleOutcome::Failed
            }
        }
    }

    /// Render one page and show it if nothing changed in the meantime.
    /// With `follow_current`, the page must still be the current page.
    async fn render(&self, generation: u64, position: u32, follow_current: bool) -> RenderStatus {
        let _gate = self.render_gate.lock().await;

        if !self.still_wanted(&self.state.lock().await, generation, position, follow_current) {
            return RenderStatus::Discarded;
        }

        debug!(page = position + 1, "Rendering page");
        let surface = match self.session.renderable_page(position).await {
            Ok(handle) => handle.render(self.config.scale).await,
            Err(err) => Err(err),
        };

        let state = self.state.lock().await;
        if !self.still_wanted(&state, generation, position, follow_current)
            || matches!(surface, Err(PickError::Stale { .. }))
        {
            debug!(page = position + 1, "Discarding stale render");
            return RenderStatus::Discarded;
        }
        match surface {
            Ok(surface) => {
                self.view.show_page(PagePreview {
                    position,
                    page_count: state.catalog.page_count(),
                    selected: state.catalog.is_selected(position),
                    surface,
                });
                RenderStatus::Shown
            }
            Err(err) => {
                warn!(error = %err, "Page render failed");
                self.view.notify(&err);
                RenderStatus::Failed
            }
        }
    }

    fn still_wanted(
        &self,
        state: &MutexGuard<'_, ControllerState>,
        generation: u64,
        position: u32,
        follow_current: bool,
    ) -> bool {
        self.session.is_current(generation)
            && (!follow_current || state.current_page == position + 1)
    }

    fn set_phase(&self, state: &mut ControllerState, phase: Phase) {
        if state.phase != phase {
            debug!(from = ?state.phase, to = ?phase, "Phase change");
            state.phase = phase;
            self.view.phase_changed(phase);
        }
    }
}

impl<R: Renderer, C: Composer, V: View> Drop for SessionController<R, C, V> {
    fn drop(&mut self) {
        if let Some(handle) = self.state.get_mut().source.take() {
            self.view.revoke_source(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{
        Artifact, ComposeDoc, ImageSurface, RenderDoc, RenderPage, PDF_MEDIA_TYPE,
    };
    use crate::pdf::testing::{create_test_pdf, page_width, page_widths};
    use crate::pdf::{LopdfComposer, PreviewRenderer};
    use anyhow::{anyhow, bail, Result};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex as StdMutex;

    // Gives other handlers a chance to run in between
    async fn pause() {
        for _ in 0..32 {
            tokio::task::yield_now().await;
        }
    }

    // Fake documents are plain text: "pages=N", optionally prefixed with "slow:"
    async fn fake_parse(bytes: &[u8]) -> Result<u32> {
        let text = std::str::from_utf8(bytes)?;
        let (slow, rest) = match text.strip_prefix("slow:") {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        let pages = rest
            .strip_prefix("pages=")
            .ok_or_else(|| anyhow!("not a document"))?
            .parse()?;
        if slow {
            pause().await;
        }
        Ok(pages)
    }

    #[derive(Clone, Default)]
    struct FakeRenderer {
        rendered: Arc<StdMutex<Vec<u32>>>,
        slow: Arc<AtomicBool>,
        failing: Arc<AtomicBool>,
    }

    impl FakeRenderer {
        fn rendered(&self) -> Vec<u32> {
            self.rendered.lock().unwrap().clone()
        }

        fn set_slow(&self, slow: bool) {
            self.slow.store(slow, Ordering::SeqCst);
        }

        fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }
    }

    struct FakeRenderDoc {
        pages: u32,
        renderer: FakeRenderer,
    }

    struct FakePage {
        number: u32,
        renderer: FakeRenderer,
    }

    #[async_trait]
    impl Renderer for FakeRenderer {
        type Doc = FakeRenderDoc;

        async fn parse(&self, bytes: Arc<[u8]>) -> Result<FakeRenderDoc> {
            Ok(FakeRenderDoc {
                pages: fake_parse(&bytes).await?,
                renderer: self.clone(),
            })
        }
    }

    #[async_trait]
    impl RenderDoc for FakeRenderDoc {
        type Page = FakePage;

        fn page_count(&self) -> u32 {
            self.pages
        }

        async fn page(&self, number: u32) -> Result<FakePage> {
            if number == 0 || number > self.pages {
                bail!("no page {}", number);
            }
            Ok(FakePage {
                number,
                renderer: self.renderer.clone(),
            })
        }
    }

    #[async_trait]
    impl RenderPage for FakePage {
        async fn render(&self, _scale: f32) -> Result<ImageSurface> {
            if self.renderer.slow.load(Ordering::SeqCst) {
                pause().await;
            }
            if self.renderer.failing.load(Ordering::SeqCst) {
                bail!("rasteriser crashed on page {}", self.number);
            }
            self.renderer.rendered.lock().unwrap().push(self.number);
            Ok(ImageSurface::filled(1, 1, [0, 0, 0, 255]))
        }
    }

    #[derive(Clone, Default)]
    struct FakeComposer {
        extractions: Arc<StdMutex<Vec<Vec<u32>>>>,
        fail_serialize: bool,
        slow_serialize: bool,
    }

    impl FakeComposer {
        fn extractions(&self) -> Vec<Vec<u32>> {
            self.extractions.lock().unwrap().clone()
        }
    }

    struct FakeComposeDoc {
        pages: u32,
        appended: Vec<u32>,
        extractions: Arc<StdMutex<Vec<Vec<u32>>>>,
        fail_serialize: bool,
        slow_serialize: bool,
    }

    #[async_trait]
    impl Composer for FakeComposer {
        type Doc = FakeComposeDoc;

        async fn parse(&self, bytes: Arc<[u8]>) -> Result<FakeComposeDoc> {
            let mut doc = self.new_document();
            doc.pages = fake_parse(&bytes).await?;
            Ok(doc)
        }

        fn new_document(&self) -> FakeComposeDoc {
            FakeComposeDoc {
                pages: 0,
                appended: Vec::new(),
                extractions: Arc::clone(&self.extractions),
                fail_serialize: self.fail_serialize,
                slow_serialize: self.slow_serialize,
            }
        }
    }

    #[async_trait]
    impl ComposeDoc for FakeComposeDoc {
        type PageRef = u32;

        fn page_count(&self) -> u32 {
            self.pages
        }

        async fn copy_pages_from(&mut self, source: &Self, positions: &[u32]) -> Result<Vec<u32>> {
            if positions.iter().any(|&p| p >= source.pages) {
                bail!("position out of range");
            }
            self.extractions.lock().unwrap().push(positions.to_vec());
            Ok(positions.to_vec())
        }

        fn append(&mut self, page: u32) -> Result<()> {
            self.appended.push(page);
            Ok(())
        }

        async fn serialize(&mut self) -> Result<Vec<u8>> {
            if self.slow_serialize {
                pause().await;
            }
            if self.fail_serialize {
                bail!("disk full");
            }
            Ok(format!("pages={}", self.appended.len()).into_bytes())
        }
    }

    #[derive(Default)]
    struct Recorded {
        phases: Vec<Phase>,
        shown: Vec<(u32, bool)>,
        restored: Vec<u32>,
        notices: Vec<&'static str>,
        published: Vec<String>,
        revoked: Vec<String>,
        delivered: Vec<Artifact>,
    }

    #[derive(Clone, Default)]
    struct RecordingView {
        log: Arc<StdMutex<Recorded>>,
    }

    impl RecordingView {
        fn with<T>(&self, f: impl FnOnce(&Recorded) -> T) -> T {
            f(&self.log.lock().unwrap())
        }
    }

    impl View for RecordingView {
        fn phase_changed(&self, phase: Phase) {
            self.log.lock().unwrap().phases.push(phase);
        }

        fn show_page(&self, page: PagePreview) {
            self.log
                .lock()
                .unwrap()
                .shown
                .push((page.position, page.selected));
        }

        fn page_number_restored(&self, current: u32) {
            self.log.lock().unwrap().restored.push(current);
        }

        fn notify(&self, error: &PickError) {
            self.log.lock().unwrap().notices.push(error.user_message());
        }

        fn publish_source(&self, file: &ChosenFile) -> SourceHandle {
            self.log.lock().unwrap().published.push(file.name.clone());
            SourceHandle::new(file.name.clone())
        }

        fn revoke_source(&self, handle: SourceHandle) {
            self.log
                .lock()
                .unwrap()
                .revoked
                .push(handle.as_str().to_string());
        }

        fn deliver(&self, artifact: Artifact) {
            self.log.lock().unwrap().delivered.push(artifact);
        }
    }

    type FakeController = SessionController<FakeRenderer, FakeComposer, RecordingView>;

    struct Harness {
        controller: FakeController,
        renderer: FakeRenderer,
        composer: FakeComposer,
        view: RecordingView,
    }

    fn harness_with(mode: PresentationMode, composer: FakeComposer) -> Harness {
        let renderer = FakeRenderer::default();
        let view = RecordingView::default();
        let controller = SessionController::new(
            renderer.clone(),
            composer.clone(),
            view.clone(),
            ControllerConfig {
                mode,
                ..Default::default()
            },
        );
        Harness {
            controller,
            renderer,
            composer,
            view,
        }
    }

    fn harness(mode: PresentationMode) -> Harness {
        harness_with(mode, FakeComposer::default())
    }

    fn pdf(name: &str, contents: &str) -> ChosenFile {
        ChosenFile::new(name, PDF_MEDIA_TYPE, contents.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn test_load_renders_first_page() {
        let h = harness(PresentationMode::Single);
        let outcome = h.controller.on_file_chosen(pdf("a.pdf", "pages=3")).await;
        assert_eq!(outcome, LoadOutcome::Loaded { page_count: 3 });
        let status = h.controller.status().await;
        assert_eq!(status.phase, Phase::Ready);
        assert_eq!(status.current_page, 1);
        assert_eq!(status.source.as_deref(), Some("a.pdf"));
        assert_eq!(h.renderer.rendered(), vec![1]);
        assert_eq!(h.view.with(|r| r.shown.clone()), vec![(0, false)]);
        assert_eq!(
            h.view.with(|r| r.phases.clone()),
            vec![Phase::Loading, Phase::Ready]
        );
    }

    #[tokio::test]
    async fn test_grid_mode_renders_every_page() {
        let h = harness(PresentationMode::Grid);
        h.controller.on_file_chosen(pdf("a.pdf", "pages=3")).await;
        assert_eq!(h.renderer.rendered(), vec![1, 2, 3]);
        assert_eq!(
            h.controller.on_navigate(Navigation::Next).await,
            NavigateOutcome::Unavailable
        );
    }

    #[tokio::test]
    async fn test_non_pdf_is_silently_ignored() {
        let h = harness(PresentationMode::Single);
        let file = ChosenFile::new("notes.txt", "text/plain", b"pages=3".to_vec());
        assert_eq!(h.controller.on_file_chosen(file).await, LoadOutcome::Ignored);
        let status = h.controller.status().await;
        assert_eq!(status.phase, Phase::Empty);
        assert_eq!(status.source, None);
        assert!(h.view.with(|r| r.published.is_empty() && r.notices.is_empty()));
    }

    #[tokio::test]
    async fn test_empty_selection_never_extracts() {
        let h = harness(PresentationMode::Single);
        h.controller.on_file_chosen(pdf("a.pdf", "pages=3")).await;
        assert_eq!(
            h.controller.on_reassemble().await,
            ReassembleOutcome::EmptySelection
        );
        assert!(h.composer.extractions().is_empty());
        assert_eq!(
            h.view.with(|r| r.notices.clone()),
            vec![PickError::EmptySelection.user_message()]
        );
        assert_eq!(h.controller.status().await.phase, Phase::Ready);
    }

    #[tokio::test]
    async fn test_reassembly_uses_sorted_unique_positions() {
        let h = harness(PresentationMode::Single);
        h.controller.on_file_chosen(pdf("a.pdf", "pages=3")).await;
        assert!(h.controller.on_toggle_selection(2, true).await);
        assert!(h.controller.on_toggle_selection(0, true).await);
        assert!(h.controller.on_toggle_selection(2, true).await);

        assert_eq!(
            h.controller.on_reassemble().await,
            ReassembleOutcome::Delivered { page_count: 2 }
        );
        assert_eq!(h.composer.extractions(), vec![vec![0, 2]]);
        let delivered = h.view.with(|r| r.delivered.clone());
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].file_name, "reassembled.pdf");
        assert_eq!(delivered[0].media_type, "application/pdf");
        assert_eq!(delivered[0].bytes, b"pages=2".to_vec());
        assert_eq!(h.controller.status().await.phase, Phase::Ready);
    }

    #[tokio::test]
    async fn test_late_load_does_not_overwrite_newer_file() {
        let h = harness(PresentationMode::Single);
        let (first, second) = tokio::join!(
            h.controller.on_file_chosen(pdf("a.pdf", "slow:pages=5")),
            h.controller.on_file_chosen(pdf("b.pdf", "pages=2"))
        );
        assert_eq!(first, LoadOutcome::Superseded);
        assert_eq!(second, LoadOutcome::Loaded { page_count: 2 });
        let status = h.controller.status().await;
        assert_eq!(status.page_count, 2);
        assert_eq!(status.phase, Phase::Ready);
        assert_eq!(status.source.as_deref(), Some("b.pdf"));
        assert_eq!(
            h.view.with(|r| (r.published.clone(), r.revoked.clone())),
            (vec!["a.pdf".to_string(), "b.pdf".to_string()], vec!["a.pdf".to_string()])
        );
    }

    #[tokio::test]
    async fn test_out_of_range_navigation_is_a_no_op() {
        let h = harness(PresentationMode::Single);
        h.controller.on_file_chosen(pdf("a.pdf", "pages=3")).await;
        for target in [0, 4, 99] {
            assert_eq!(
                h.controller.on_navigate(Navigation::Page(target)).await,
                NavigateOutcome::Rejected
            );
        }
        assert_eq!(h.controller.status().await.current_page, 1);
        assert_eq!(h.renderer.rendered(), vec![1]);
        assert_eq!(h.view.with(|r| r.restored.clone()), vec![1, 1, 1]);
    }

    #[tokio::test]
    async fn test_previous_and_next_stop_at_the_ends() {
        let h = harness(PresentationMode::Single);
        h.controller.on_file_chosen(pdf("a.pdf", "pages=2")).await;
        assert_eq!(
            h.controller.on_navigate(Navigation::Previous).await,
            NavigateOutcome::Unchanged
        );
        assert_eq!(
            h.controller.on_navigate(Navigation::Next).await,
            NavigateOutcome::Rendered { page: 2 }
        );
        assert_eq!(
            h.controller.on_navigate(Navigation::Next).await,
            NavigateOutcome::Unchanged
        );
        assert_eq!(
            h.controller.on_navigate(Navigation::Previous).await,
            NavigateOutcome::Rendered { page: 1 }
        );
        assert_eq!(h.renderer.rendered(), vec![1, 2, 1]);
    }

    #[tokio::test]
    async fn test_rendered_page_reflects_selection() {
        let h = harness(PresentationMode::Single);
        h.controller.on_file_chosen(pdf("a.pdf", "pages=3")).await;
        h.controller.on_toggle_selection(2, true).await;
        h.controller.on_navigate(Navigation::Page(3)).await;
        assert_eq!(h.view.with(|r| r.shown.last().copied()), Some((2, true)));
    }

    #[tokio::test]
    async fn test_failed_load_resets_to_empty() {
        let h = harness(PresentationMode::Single);
        h.controller.on_file_chosen(pdf("a.pdf", "pages=3")).await;
        h.controller.on_toggle_selection(0, true).await;

        let outcome = h.controller.on_file_chosen(pdf("bad.pdf", "garbage")).await;
        assert_eq!(outcome, LoadOutcome::Failed);
        let status = h.controller.status().await;
        assert_eq!(status.phase, Phase::Empty);
        assert_eq!(status.page_count, 0);
        assert!(status.selected.is_empty());
        assert_eq!(
            h.view.with(|r| r.notices.clone()),
            vec!["Could not load the PDF. Please try another file."]
        );
        // stale selection can't be toggled back on
        assert!(!h.controller.on_toggle_selection(0, true).await);

        let outcome = h.controller.on_file_chosen(pdf("c.pdf", "pages=4")).await;
        assert_eq!(outcome, LoadOutcome::Loaded { page_count: 4 });
        assert!(h.controller.status().await.selected.is_empty());
    }

    #[tokio::test]
    async fn test_failed_reassembly_keeps_session_ready() {
        let h = harness_with(
            PresentationMode::Single,
            FakeComposer {
                fail_serialize: true,
                ..Default::default()
            },
        );
        h.controller.on_file_chosen(pdf("a.pdf", "pages=3")).await;
        h.controller.on_toggle_selection(1, true).await;

        assert_eq!(h.controller.on_reassemble().await, ReassembleOutcome::Failed);
        let status = h.controller.status().await;
        assert_eq!(status.phase, Phase::Ready);
        assert_eq!(status.selected, vec![1]);
        assert!(h.view.with(|r| r.delivered.is_empty()));
        assert_eq!(
            h.view.with(|r| r.notices.clone()),
            vec!["Failed to create reassembled PDF."]
        );
    }

    #[tokio::test]
    async fn test_reassemble_without_document_is_unavailable() {
        let h = harness(PresentationMode::Single);
        assert_eq!(
            h.controller.on_reassemble().await,
            ReassembleOutcome::Unavailable
        );
        assert!(h.composer.extractions().is_empty());
        assert_eq!(h.view.with(|r| r.notices.clone()), vec!["Open a PDF first."]);
    }

    #[tokio::test]
    async fn test_toggle_out_of_range_is_reported() {
        let h = harness(PresentationMode::Single);
        h.controller.on_file_chosen(pdf("a.pdf", "pages=2")).await;
        assert!(!h.controller.on_toggle_selection(2, true).await);
        assert_eq!(
            h.view.with(|r| r.notices.clone()),
            vec!["That page does not exist in this document."]
        );
    }

    #[tokio::test]
    async fn test_source_handle_revoked_once_on_drop() {
        let h = harness(PresentationMode::Single);
        h.controller.on_file_chosen(pdf("a.pdf", "pages=1")).await;
        h.controller.on_file_chosen(pdf("b.pdf", "pages=1")).await;
        let view = h.view.clone();
        drop(h);
        assert_eq!(
            view.with(|r| r.revoked.clone()),
            vec!["a.pdf".to_string(), "b.pdf".to_string()]
        );
    }

    #[tokio::test]
    async fn test_render_failure_keeps_ready() {
        let h = harness(PresentationMode::Single);
        h.controller.on_file_chosen(pdf("a.pdf", "pages=3")).await;
        h.renderer.set_failing(true);

        assert_eq!(
            h.controller.on_navigate(Navigation::Next).await,
            NavigateOutcome::Failed
        );
        let status = h.controller.status().await;
        assert_eq!(status.phase, Phase::Ready);
        assert_eq!(status.current_page, 2);
        assert_eq!(
            h.view.with(|r| r.notices.clone()),
            vec!["Could not render the page preview."]
        );

        h.renderer.set_failing(false);
        assert_eq!(
            h.controller.on_navigate(Navigation::Next).await,
            NavigateOutcome::Rendered { page: 3 }
        );
    }

    #[tokio::test]
    async fn test_stale_render_is_discarded() {
        let h = harness(PresentationMode::Single);
        h.controller.on_file_chosen(pdf("a.pdf", "pages=3")).await;
        h.renderer.set_slow(true);

        let (second, third) = tokio::join!(
            h.controller.on_navigate(Navigation::Page(2)),
            h.controller.on_navigate(Navigation::Page(3))
        );
        assert_eq!(second, NavigateOutcome::Discarded);
        assert_eq!(third, NavigateOutcome::Rendered { page: 3 });
        // page 2 was rasterised but never shown
        assert_eq!(h.renderer.rendered(), vec![1, 2, 3]);
        assert_eq!(
            h.view.with(|r| r.shown.clone()),
            vec![(0, false), (2, false)]
        );
    }

    #[tokio::test]
    async fn test_reassembly_superseded_by_new_file() {
        let h = harness_with(
            PresentationMode::Single,
            FakeComposer {
                slow_serialize: true,
                ..Default::default()
            },
        );
        h.controller.on_file_chosen(pdf("a.pdf", "pages=3")).await;
        h.controller.on_toggle_selection(0, true).await;

        let (reassembled, loaded) = tokio::join!(
            h.controller.on_reassemble(),
            h.controller.on_file_chosen(pdf("b.pdf", "pages=2"))
        );
        assert_eq!(reassembled, ReassembleOutcome::Superseded);
        assert_eq!(loaded, LoadOutcome::Loaded { page_count: 2 });
        assert!(h.view.with(|r| r.delivered.is_empty()));
        let status = h.controller.status().await;
        assert_eq!(status.phase, Phase::Ready);
        assert_eq!(status.page_count, 2);
        assert!(status.selected.is_empty());
    }

    #[tokio::test]
    async fn test_reassemble_while_reassembling_is_in_progress() {
        let h = harness_with(
            PresentationMode::Single,
            FakeComposer {
                slow_serialize: true,
                ..Default::default()
            },
        );
        h.controller.on_file_chosen(pdf("a.pdf", "pages=3")).await;
        h.controller.on_toggle_selection(1, true).await;

        let (first, second) = tokio::join!(
            h.controller.on_reassemble(),
            h.controller.on_reassemble()
        );
        assert_eq!(first, ReassembleOutcome::Delivered { page_count: 1 });
        assert_eq!(second, ReassembleOutcome::InProgress);
        assert_eq!(h.composer.extractions(), vec![vec![1]]);
        assert_eq!(h.view.with(|r| r.delivered.len()), 1);
        assert_eq!(h.controller.status().await.phase, Phase::Ready);
    }

    #[tokio::test]
    async fn test_end_to_end_with_lopdf() {
        let view = RecordingView::default();
        let controller = SessionController::new(
            PreviewRenderer::outline_fallback(),
            LopdfComposer,
            view.clone(),
            ControllerConfig::default(),
        );
        let file = ChosenFile::new("doc.pdf", PDF_MEDIA_TYPE, create_test_pdf(3));
        assert_eq!(
            controller.on_file_chosen(file).await,
            LoadOutcome::Loaded { page_count: 3 }
        );
        controller.on_toggle_selection(2, true).await;
        controller.on_toggle_selection(0, true).await;
        assert_eq!(
            controller.on_reassemble().await,
            ReassembleOutcome::Delivered { page_count: 2 }
        );

        let artifact = view.with(|r| r.delivered[0].clone());
        let reparsed = LopdfComposer.parse(artifact.bytes.clone().into()).await.unwrap();
        assert_eq!(reparsed.page_count(), 2);
        assert_eq!(
            page_widths(&artifact.bytes),
            vec![page_width(0), page_width(2)]
        );
    }
}
