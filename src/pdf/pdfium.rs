//! Page rasterisation through the Pdfium library
//!
//! Pdfium is bound once per process on a dedicated worker thread, which owns
//! the bindings for the rest of the run. Callers send jobs over a channel and
//! await the reply, so nothing Pdfium hands out ever crosses a thread.

use crate::backend::ImageSurface;
use crate::pdf::preview::MAX_SURFACE_EDGE;
use anyhow::{anyhow, bail, Context, Result};
use pdfium_render::prelude::{PdfBitmapFormat, PdfRenderConfig, Pdfium};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

const LIB_PATH_ENV: &str = "PAGEPICK_PDFIUM_LIB_PATH";
const LIB_DIR_ENV: &str = "PAGEPICK_PDFIUM_DIR";
const DISABLE_ENV: &str = "PAGEPICK_DISABLE_PDFIUM";

enum Job {
    Count {
        bytes: Arc<[u8]>,
        reply: oneshot::Sender<Result<u32>>,
    },
    Render {
        bytes: Arc<[u8]>,
        number: u32,
        scale: f32,
        reply: oneshot::Sender<Result<ImageSurface>>,
    },
}

/// Handle to the process-wide Pdfium worker
#[derive(Clone)]
pub struct PdfiumWorker {
    jobs: mpsc::UnboundedSender<Job>,
}

impl PdfiumWorker {
    /// The shared worker, started on first use. A failed bind is remembered
    /// and reported again on every later call.
    pub fn shared() -> Result<Self> {
        static WORKER: OnceLock<Result<PdfiumWorker, String>> = OnceLock::new();
        WORKER
            .get_or_init(|| Self::spawn().map_err(|err| format!("{:#}", err)))
            .clone()
            .map_err(|err| anyhow!(err))
    }

    fn spawn() -> Result<Self> {
        if pdfium_disabled() {
            bail!("Pdfium disabled via {}", DISABLE_ENV);
        }

        let (jobs, mut queue) = mpsc::unbounded_channel::<Job>();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();
        std::thread::Builder::new()
            .name("pdfium".to_string())
            .spawn(move || {
                let pdfium = match bind_pdfium() {
                    Ok(pdfium) => {
                        let _ = ready_tx.send(Ok(()));
                        pdfium
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                while let Some(job) = queue.blocking_recv() {
                    run_job(&pdfium, job);
                }
                debug!("Pdfium worker stopped");
            })
            .context("Failed to start Pdfium worker thread")?;

        ready_rx
            .recv()
            .context("Pdfium worker exited during startup")??;
        info!("Pdfium bound, previews show page content");
        Ok(Self { jobs })
    }

    async fn request<T>(&self, job: impl FnOnce(oneshot::Sender<Result<T>>) -> Job) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.jobs
            .send(job(reply))
            .map_err(|_| anyhow!("Pdfium worker has stopped"))?;
        response
            .await
            .context("Pdfium worker dropped the request")?
    }

    pub async fn page_count(&self, bytes: Arc<[u8]>) -> Result<u32> {
        self.request(|reply| Job::Count { bytes, reply }).await
    }

    /// Rasterise the 1-based page `number` at `scale` pixels per point
    pub async fn render(&self, bytes: Arc<[u8]>, number: u32, scale: f32) -> Result<ImageSurface> {
        self.request(|reply| Job::Render {
            bytes,
            number,
            scale,
            reply,
        })
        .await
    }
}

fn run_job(pdfium: &Pdfium, job: Job) {
    match job {
        Job::Count { bytes, reply } => {
            let _ = reply.send(count_pages(pdfium, &bytes));
        }
        Job::Render {
            bytes,
            number,
            scale,
            reply,
        } => {
            let _ = reply.send(render_page(pdfium, &bytes, number, scale));
        }
    }
}

fn count_pages(pdfium: &Pdfium, bytes: &[u8]) -> Result<u32> {
    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|err| anyhow!(err))
        .context("Pdfium could not open the PDF")?;
    Ok(document.pages().len() as u32)
}

fn render_page(pdfium: &Pdfium, bytes: &[u8], number: u32, scale: f32) -> Result<ImageSurface> {
    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|err| anyhow!(err))
        .context("Pdfium could not open the PDF")?;

    let index = number
        .checked_sub(1)
        .and_then(|index| u16::try_from(index).ok())
        .ok_or_else(|| anyhow!("Page {} out of range", number))?;
    let page = document
        .pages()
        .get(index)
        .map_err(|err| anyhow!(err))
        .with_context(|| format!("Page {} not found", number))?;

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(scale)
        .set_maximum_width(MAX_SURFACE_EDGE as i32)
        .set_maximum_height(MAX_SURFACE_EDGE as i32)
        .render_form_data(false)
        .use_grayscale_rendering(false)
        .set_reverse_byte_order(false)
        .set_format(PdfBitmapFormat::BGRA);

    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|err| anyhow!(err))
        .with_context(|| format!("Pdfium failed to render page {}", number))?;

    Ok(bgra_to_surface(
        bitmap.width().max(0) as u32,
        bitmap.height().max(0) as u32,
        &bitmap.as_raw_bytes(),
    ))
}

/// Repack a BGRA bitmap with any row stride into tightly packed RGBA.
/// Missing bytes read as opaque white.
fn bgra_to_surface(width: u32, height: u32, src: &[u8]) -> ImageSurface {
    let (w, h) = (width as usize, height as usize);
    let stride = if h == 0 { 0 } else { src.len() / h };

    let mut pixels = Vec::with_capacity(w.saturating_mul(h).saturating_mul(4));
    for y in 0..h {
        let base = y.saturating_mul(stride);
        for x in 0..w {
            let idx = base.saturating_add(x.saturating_mul(4));
            let b = src.get(idx).copied().unwrap_or(255);
            let g = src.get(idx + 1).copied().unwrap_or(255);
            let r = src.get(idx + 2).copied().unwrap_or(255);
            let a = src.get(idx + 3).copied().unwrap_or(255);
            pixels.extend_from_slice(&[r, g, b, a]);
        }
    }

    ImageSurface {
        width,
        height,
        pixels,
    }
}

fn pdfium_disabled() -> bool {
    std::env::var(DISABLE_ENV)
        .map(|v| !v.trim().is_empty() && v.trim() != "0")
        .unwrap_or(false)
}

/// Find a Pdfium shared library: an explicit path, then an explicit
/// directory, the executable's directory, `.pdfium/`, `.`, and finally
/// the system search path.
fn bind_pdfium() -> Result<Pdfium> {
    if let Ok(path) = std::env::var(LIB_PATH_ENV) {
        let path = PathBuf::from(path);
        let bindings = Pdfium::bind_to_library(&path)
            .map_err(|err| anyhow!(err))
            .with_context(|| {
                format!("Failed to load Pdfium from {}={}", LIB_PATH_ENV, path.display())
            })?;
        return Ok(Pdfium::new(bindings));
    }

    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Ok(dir) = std::env::var(LIB_DIR_ENV) {
        candidates.push(Pdfium::pdfium_platform_library_name_at_path(Path::new(&dir)));
    }
    if let Some(dir) = std::env::current_exe()
        .ok()
        .as_deref()
        .and_then(Path::parent)
    {
        candidates.push(Pdfium::pdfium_platform_library_name_at_path(dir));
    }
    candidates.push(Pdfium::pdfium_platform_library_name_at_path(Path::new(
        ".pdfium",
    )));
    candidates.push(Pdfium::pdfium_platform_library_name_at_path(Path::new(".")));

    for path in candidates {
        if let Ok(bindings) = Pdfium::bind_to_library(&path) {
            debug!(path = %path.display(), "Bound Pdfium");
            return Ok(Pdfium::new(bindings));
        }
    }

    let bindings = Pdfium::bind_to_system_library()
        .map_err(|err| anyhow!(err))
        .with_context(|| {
            format!(
                "Pdfium library not found. Install it system-wide, place {} next to the \
                 executable, or set {}",
                Pdfium::pdfium_platform_library_name().to_string_lossy(),
                LIB_PATH_ENV
            )
        })?;
    Ok(Pdfium::new(bindings))
}
