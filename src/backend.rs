//! Collaborator seams
//!
//! The controller never parses or rasterises PDFs itself. It drives a
//! [`Renderer`] for page previews and a [`Composer`] for building the output
//! document, both supplied at construction time.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

pub const PDF_MEDIA_TYPE: &str = "application/pdf";
pub const ARTIFACT_FILE_NAME: &str = "reassembled.pdf";

/// Parses documents for preview rendering
#[async_trait]
pub trait Renderer: Send + Sync + 'static {
    type Doc: RenderDoc;

    async fn parse(&self, bytes: Arc<[u8]>) -> Result<Self::Doc>;
}

#[async_trait]
pub trait RenderDoc: Send + Sync + 'static {
    type Page: RenderPage;

    fn page_count(&self) -> u32;

    /// Fetch a page by its 1-based number
    async fn page(&self, number: u32) -> Result<Self::Page>;
}

#[async_trait]
pub trait RenderPage: Send + Sync {
    async fn render(&self, scale: f32) -> Result<ImageSurface>;
}

/// Parses and builds documents at the object level
#[async_trait]
pub trait Composer: Send + Sync + 'static {
    type Doc: ComposeDoc;

    async fn parse(&self, bytes: Arc<[u8]>) -> Result<Self::Doc>;

    fn new_document(&self) -> Self::Doc;
}

#[async_trait]
pub trait ComposeDoc: Send + Sync + Sized + 'static {
    type PageRef: Send;

    fn page_count(&self) -> u32;

    /// Copy pages (0-based positions, in the given order) out of `source`.
    /// The copies are owned by `self` but not yet part of its page tree.
    async fn copy_pages_from(&mut self, source: &Self, positions: &[u32])
        -> Result<Vec<Self::PageRef>>;

    fn append(&mut self, page: Self::PageRef) -> Result<()>;

    async fn serialize(&mut self) -> Result<Vec<u8>>;
}

/// RGBA8 raster produced by a [`RenderPage`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSurface {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl ImageSurface {
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn put_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        self.pixels[offset..offset + 4].copy_from_slice(&rgba);
    }

    pub fn to_png(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut out, self.width, self.height);
            encoder.set_color(png::ColorType::Rgba);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder.write_header().context("Failed to write PNG header")?;
            writer
                .write_image_data(&self.pixels)
                .context("Failed to write PNG data")?;
        }
        Ok(out)
    }
}

/// A file handed over by the file picker
#[derive(Debug, Clone)]
pub struct ChosenFile {
    pub name: String,
    pub media_type: String,
    pub bytes: Arc<[u8]>,
}

impl ChosenFile {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a file from disk, typing it as a PDF when the extension says so
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read file: {}", path.display()))?;
        let is_pdf = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        let media_type = if is_pdf {
            PDF_MEDIA_TYPE
        } else {
            "application/octet-stream"
        };
        let name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("document")
            .to_string();
        Ok(Self::new(name, media_type, bytes))
    }

    pub fn is_pdf(&self) -> bool {
        self.media_type == PDF_MEDIA_TYPE
    }
}

/// Serialized output of a reassembly, ready for download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub file_name: String,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl Artifact {
    pub fn pdf(bytes: Vec<u8>) -> Self {
        Self {
            file_name: ARTIFACT_FILE_NAME.to_string(),
            media_type: PDF_MEDIA_TYPE.to_string(),
            bytes,
        }
    }
}
