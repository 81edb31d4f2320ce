//! Page preview rendering
//!
//! Page content is rasterised by Pdfium. When the Pdfium library can't be
//! bound, previews fall back to an outline: a white sheet at the page's
//! scaled, rotation-adjusted size with a thin grey border, so selection still
//! works without a rasteriser installed.

use crate::backend::{ImageSurface, RenderDoc, RenderPage, Renderer};
use crate::pdf::page_tree;
use crate::pdf::pdfium::PdfiumWorker;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use lopdf::{Document, ObjectId};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

pub const DEFAULT_SCALE: f32 = 1.2;

// Keeps a hostile MediaBox from allocating gigabytes
pub(crate) const MAX_SURFACE_EDGE: u32 = 8192;

const PAPER: [u8; 4] = [255, 255, 255, 255];
const BORDER: [u8; 4] = [160, 160, 160, 255];

#[derive(Clone)]
enum Raster {
    Pdfium(PdfiumWorker),
    /// No rasteriser available: draw page outlines only
    OutlineFallback,
}

#[derive(Clone)]
pub struct PreviewRenderer {
    raster: Raster,
}

impl PreviewRenderer {
    /// Render through Pdfium, falling back to outlines if it can't be bound
    pub fn new() -> Self {
        match PdfiumWorker::shared() {
            Ok(worker) => Self {
                raster: Raster::Pdfium(worker),
            },
            Err(err) => {
                let error = format!("{:#}", err);
                warn!(%error, "Previews will show page outlines only");
                Self::outline_fallback()
            }
        }
    }

    pub fn outline_fallback() -> Self {
        Self {
            raster: Raster::OutlineFallback,
        }
    }

    pub fn draws_content(&self) -> bool {
        matches!(self.raster, Raster::Pdfium(_))
    }
}

#[async_trait]
impl Renderer for PreviewRenderer {
    type Doc = PreviewDocument;

    async fn parse(&self, bytes: Arc<[u8]>) -> Result<PreviewDocument> {
        let lopdf_bytes = Arc::clone(&bytes);
        let doc = tokio::task::spawn_blocking(move || Document::load_mem(&lopdf_bytes))
            .await
            .context("Preview parser task failed")?
            .context("Failed to parse PDF for preview")?;
        let doc = PreviewDocument::new(doc, bytes, self.raster.clone());

        if let Raster::Pdfium(worker) = &self.raster {
            let pdfium_pages = worker.page_count(Arc::clone(&doc.bytes)).await?;
            if pdfium_pages != doc.page_count() {
                warn!(
                    pdfium_pages,
                    lopdf_pages = doc.page_count(),
                    "Page count differs between parsers"
                );
            }
        }
        Ok(doc)
    }
}

pub struct PreviewDocument {
    doc: Document,
    pages: BTreeMap<u32, ObjectId>,
    bytes: Arc<[u8]>,
    raster: Raster,
}

impl PreviewDocument {
    fn new(doc: Document, bytes: Arc<[u8]>, raster: Raster) -> Self {
        let pages = doc.get_pages();
        Self {
            doc,
            pages,
            bytes,
            raster,
        }
    }
}

#[async_trait]
impl RenderDoc for PreviewDocument {
    type Page = PreviewPage;

    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    async fn page(&self, number: u32) -> Result<PreviewPage> {
        let id = self
            .pages
            .get(&number)
            .ok_or_else(|| anyhow!("Page {} not found", number))?;
        let dict = self
            .doc
            .get_dictionary(*id)
            .with_context(|| format!("Page {} is not a dictionary", number))?;

        let [x0, y0, x1, y1] = page_tree::media_box(&self.doc, dict);
        let (width, height) = ((x1 - x0).abs(), (y1 - y0).abs());
        let (width, height) = if matches!(page_tree::rotation(&self.doc, dict), 90 | 270) {
            (height, width)
        } else {
            (width, height)
        };

        Ok(PreviewPage {
            number,
            geometry: PageGeometry { width, height },
            bytes: Arc::clone(&self.bytes),
            raster: self.raster.clone(),
        })
    }
}

/// Page size in points, already adjusted for /Rotate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub width: f32,
    pub height: f32,
}

pub struct PreviewPage {
    number: u32,
    pub geometry: PageGeometry,
    bytes: Arc<[u8]>,
    raster: Raster,
}

#[async_trait]
impl RenderPage for PreviewPage {
    async fn render(&self, scale: f32) -> Result<ImageSurface> {
        if !(scale.is_finite() && scale > 0.0) {
            return Err(anyhow!("Invalid render scale: {}", scale));
        }
        match &self.raster {
            Raster::Pdfium(worker) => {
                worker
                    .render(Arc::clone(&self.bytes), self.number, scale)
                    .await
            }
            Raster::OutlineFallback => Ok(draw_outline(self.geometry, scale)),
        }
    }
}

fn draw_outline(geometry: PageGeometry, scale: f32) -> ImageSurface {
    let width = scaled_edge(geometry.width, scale);
    let height = scaled_edge(geometry.height, scale);

    let mut surface = ImageSurface::filled(width, height, PAPER);
    for x in 0..width {
        surface.put_pixel(x, 0, BORDER);
        surface.put_pixel(x, height - 1, BORDER);
    }
    for y in 0..height {
        surface.put_pixel(0, y, BORDER);
        surface.put_pixel(width - 1, y, BORDER);
    }
    surface
}

fn scaled_edge(points: f32, scale: f32) -> u32 {
    ((points * scale).round() as u32).clamp(1, MAX_SURFACE_EDGE)
}
