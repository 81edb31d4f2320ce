use crate::backend::{
    Artifact, ComposeDoc, Composer, ImageSurface, RenderDoc, RenderPage, Renderer,
};
use crate::error::PickError;
use crate::pdf::compose::assemble;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// A source document parsed by both collaborators
struct LoadedDocument<R: Renderer, C: Composer> {
    generation: u64,
    render_doc: R::Doc,
    compose_doc: C::Doc,
}

impl<R: Renderer, C: Composer> LoadedDocument<R, C> {
    fn page_count(&self) -> u32 {
        self.render_doc.page_count()
    }
}

/// Renderable page tied to the load generation it came from. It refuses to
/// render once its document has been replaced.
pub struct PageHandle<P> {
    generation: u64,
    latest: Arc<AtomicU64>,
    number: u32,
    page: P,
}

impl<P: RenderPage> PageHandle<P> {
    /// 1-based page number
    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn is_current(&self) -> bool {
        self.latest.load(Ordering::Acquire) == self.generation
    }

    fn ensure_current(&self) -> Result<(), PickError> {
        if self.is_current() {
            Ok(())
        } else {
            Err(PickError::Stale {
                generation: self.generation,
            })
        }
    }

    pub async fn render(&self, scale: f32) -> Result<ImageSurface, PickError> {
        self.ensure_current()?;
        let surface = self
            .page
            .render(scale)
            .await
            .map_err(|cause| PickError::Render {
                number: self.number,
                cause,
            })?;
        self.ensure_current()?;
        Ok(surface)
    }
}

/// Owns the currently loaded document, if any.
///
/// Every load gets a new generation. Documents, page handles and artifacts
/// remember the generation they came from and are refused once it is no
/// longer current, so a late result from an earlier file can never leak
/// into a later one.
pub struct DocumentSession<R: Renderer, C: Composer> {
    renderer: R,
    composer: C,
    generation: Arc<AtomicU64>,
    current: Mutex<Option<Arc<LoadedDocument<R, C>>>>,
}

impl<R: Renderer, C: Composer> DocumentSession<R, C> {
    pub fn new(renderer: R, composer: C) -> Self {
        Self {
            renderer,
            composer,
            generation: Arc::new(AtomicU64::new(0)),
            current: Mutex::new(None),
        }
    }

    fn current_slot(&self) -> MutexGuard<'_, Option<Arc<LoadedDocument<R, C>>>> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn current(&self) -> Option<Arc<LoadedDocument<R, C>>> {
        self.current_slot().clone()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation() == generation
    }

    /// Discard the current document. Outstanding page handles become stale.
    /// Returns the new generation.
    pub fn unload(&self) -> u64 {
        let mut current = self.current_slot();
        *current = None;
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Start a load: drop the current document and hand out the generation
    /// that [`load`](Self::load) must present
    pub fn begin_load(&self) -> u64 {
        self.unload()
    }

    /// Parse `bytes` for rendering and for composition at the same time and
    /// install the result. Either parse failing fails the whole load. Returns
    /// the page count, or [`PickError::Stale`] if a newer load has begun.
    pub async fn load(&self, generation: u64, bytes: Arc<[u8]>) -> Result<u32, PickError> {
        let (render_doc, compose_doc) = tokio::try_join!(
            self.renderer.parse(Arc::clone(&bytes)),
            self.composer.parse(bytes)
        )
        .map_err(PickError::Load)?;

        if compose_doc.page_count() != render_doc.page_count() {
            warn!(
                render_pages = render_doc.page_count(),
                compose_pages = compose_doc.page_count(),
                "Collaborators disagree on page count"
            );
        }

        self.install(LoadedDocument {
            generation,
            render_doc,
            compose_doc,
        })
    }

    fn install(&self, doc: LoadedDocument<R, C>) -> Result<u32, PickError> {
        let mut current = self.current_slot();
        if !self.is_current(doc.generation) {
            debug!(
                stale = doc.generation,
                current = self.generation(),
                "Discarding superseded load"
            );
            return Err(PickError::Stale {
                generation: doc.generation,
            });
        }
        let page_count = doc.page_count();
        *current = Some(Arc::new(doc));
        Ok(page_count)
    }

    /// 0 while nothing is loaded
    pub fn page_count(&self) -> u32 {
        self.current().map_or(0, |doc| doc.page_count())
    }

    pub async fn renderable_page(
        &self,
        position: u32,
    ) -> Result<PageHandle<<R::Doc as RenderDoc>::Page>, PickError> {
        let Some(doc) = self.current() else {
            return Err(PickError::OutOfRange {
                position,
                page_count: 0,
            });
        };
        let page_count = doc.page_count();
        if position >= page_count {
            return Err(PickError::OutOfRange {
                position,
                page_count,
            });
        }

        let number = position + 1;
        let page = doc
            .render_doc
            .page(number)
            .await
            .map_err(|cause| PickError::Render { number, cause })?;
        Ok(PageHandle {
            generation: doc.generation,
            latest: Arc::clone(&self.generation),
            number,
            page,
        })
    }

    /// Copy `positions`, in order, into a fresh document and serialize it.
    /// An artifact built from a document replaced in the meantime is refused.
    pub async fn extract_pages(&self, positions: &[u32]) -> Result<Artifact, PickError> {
        let Some(doc) = self.current() else {
            return Err(PickError::Extract(anyhow::anyhow!("No document loaded")));
        };

        let page_count = doc.page_count();
        let mut seen = HashSet::new();
        for &position in positions {
            if position >= page_count {
                return Err(PickError::Extract(anyhow::anyhow!(
                    "Page position {} is out of range (document has {} pages)",
                    position,
                    page_count
                )));
            }
            if !seen.insert(position) {
                return Err(PickError::Extract(anyhow::anyhow!(
                    "Page position {} requested twice",
                    position
                )));
            }
        }

        debug!(pages = positions.len(), "Assembling new document");
        let bytes = assemble(&self.composer, &doc.compose_doc, positions)
            .await
            .map_err(PickError::Extract)?;
        if !self.is_current(doc.generation) {
            return Err(PickError::Stale {
                generation: doc.generation,
            });
        }
        Ok(Artifact::pdf(bytes))
    }
}
