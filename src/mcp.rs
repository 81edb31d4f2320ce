use anyhow::Result;
use rmcp::{
    ServerHandler, ServiceExt,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{ServerCapabilities, ServerInfo},
    schemars, tool, tool_handler, tool_router,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use crate::backend::{Artifact, ChosenFile};
use crate::error::PickError;
use crate::page_range::selection_positions;
use crate::pdf::{LopdfComposer, PreviewRenderer};
use crate::session::{
    ControllerConfig, LoadOutcome, NavigateOutcome, Navigation, PagePreview, ReassembleOutcome,
    SessionController, SessionStatus, SourceHandle, View,
};

// Request structs for tools

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct OpenPdfRequest {
    #[schemars(description = "Path to the PDF file")]
    pub path: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SelectPagesRequest {
    #[schemars(description = "Page ranges (e.g., '1-5,10,15-end')")]
    pub pages: String,
    #[schemars(description = "Select (true, default) or deselect (false) the pages")]
    #[serde(default = "default_included")]
    pub included: bool,
}

fn default_included() -> bool {
    true
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct NavigateRequest {
    #[schemars(description = "'previous', 'next', or a 1-based page number")]
    pub target: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ReassembleRequest {
    #[schemars(description = "Directory to write reassembled.pdf into (default: current directory)")]
    #[serde(default)]
    pub output_dir: Option<String>,
}

/// Collects what the controller shows during one tool call
#[derive(Default)]
struct Inbox {
    notices: Vec<String>,
    pages: Vec<PageSummary>,
    artifact: Option<Artifact>,
    next_source: u64,
}

#[derive(Default)]
pub struct McpView {
    inbox: Mutex<Inbox>,
}

impl McpView {
    fn inbox(&self) -> MutexGuard<'_, Inbox> {
        self.inbox.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn drain(&self) -> (Vec<String>, Vec<PageSummary>) {
        let mut inbox = self.inbox();
        (
            std::mem::take(&mut inbox.notices),
            std::mem::take(&mut inbox.pages),
        )
    }

    fn take_artifact(&self) -> Option<Artifact> {
        self.inbox().artifact.take()
    }
}

impl View for McpView {
    fn show_page(&self, page: PagePreview) {
        self.inbox().pages.push(PageSummary {
            page: page.number(),
            selected: page.selected,
            width: page.surface.width,
            height: page.surface.height,
        });
    }

    fn page_number_restored(&self, current: u32) {
        self.inbox()
            .notices
            .push(format!("Staying on page {}", current));
    }

    fn notify(&self, error: &PickError) {
        self.inbox()
            .notices
            .push(format!("{} ({})", error.user_message(), error));
    }

    fn publish_source(&self, file: &ChosenFile) -> SourceHandle {
        let mut inbox = self.inbox();
        inbox.next_source += 1;
        SourceHandle::new(format!("source-{}:{}", inbox.next_source, file.name))
    }

    fn revoke_source(&self, handle: SourceHandle) {
        debug!(source = handle.as_str(), "Released source file");
    }

    fn deliver(&self, artifact: Artifact) {
        self.inbox().artifact = Some(artifact);
    }
}

type Controller = SessionController<PreviewRenderer, LopdfComposer, McpView>;

#[derive(Clone)]
pub struct PickServer {
    controller: Arc<Controller>,
    tool_router: ToolRouter<Self>,
}

impl PickServer {
    pub fn new(config: ControllerConfig) -> Self {
        Self {
            controller: Arc::new(SessionController::new(
                PreviewRenderer::new(),
                LopdfComposer,
                McpView::default(),
                config,
            )),
            tool_router: Self::tool_router(),
        }
    }

    async fn respond<T: Serialize>(&self, outcome: T) -> String {
        let (notices, pages) = self.controller.view().drain();
        let result = ToolResult {
            outcome,
            notices,
            pages,
            session: self.controller.status().await,
        };
        serde_json::to_string_pretty(&result).unwrap_or_else(|e| format!("Error: {}", e))
    }
}

#[tool_router]
impl PickServer {
    #[tool(description = "Open a PDF for page selection. Replaces any open document and clears the selection.")]
    async fn open_pdf(&self, Parameters(req): Parameters<OpenPdfRequest>) -> String {
        let file = match ChosenFile::from_path(&req.path) {
            Ok(f) => f,
            Err(e) => return format!("Error: {:#}", e),
        };
        let outcome: LoadOutcome = self.controller.on_file_chosen(file).await;
        self.respond(outcome).await
    }

    #[tool(description = "Select or deselect pages of the open PDF. Use page range syntax like '1-5,10,15-end'.")]
    async fn select_pages(&self, Parameters(req): Parameters<SelectPagesRequest>) -> String {
        let page_count = self.controller.page_count().await;
        let positions = match selection_positions(&req.pages, page_count) {
            Ok(p) => p,
            Err(e) => return format!("Error: {:#}", e),
        };
        let mut applied = 0;
        for position in positions {
            if self
                .controller
                .on_toggle_selection(position, req.included)
                .await
            {
                applied += 1;
            }
        }
        self.respond(SelectResult { applied }).await
    }

    #[tool(description = "Move the single-page preview: 'previous', 'next', or a page number")]
    async fn navigate(&self, Parameters(req): Parameters<NavigateRequest>) -> String {
        let navigation = match parse_navigation(&req.target) {
            Some(n) => n,
            None => return format!("Error: Invalid navigation target: {}", req.target),
        };
        let outcome: NavigateOutcome = self.controller.on_navigate(navigation).await;
        self.respond(outcome).await
    }

    #[tool(description = "Build a new PDF from the selected pages (in original order) and save it as reassembled.pdf")]
    async fn reassemble(&self, Parameters(req): Parameters<ReassembleRequest>) -> String {
        let outcome: ReassembleOutcome = self.controller.on_reassemble().await;
        if let Some(artifact) = self.controller.view().take_artifact() {
            let dir = req.output_dir.map(PathBuf::from).unwrap_or_default();
            match save_artifact(&dir, &artifact) {
                Ok(path) => info!(path = %path.display(), "Saved reassembled PDF"),
                Err(e) => return format!("Error: {:#}", e),
            }
        }
        self.respond(outcome).await
    }

    #[tool(description = "Show the current phase, page count, current page, selected pages and the open source file")]
    async fn session_status(&self) -> String {
        self.respond(()).await
    }
}

fn parse_navigation(target: &str) -> Option<Navigation> {
    let target = target.trim();
    if target.eq_ignore_ascii_case("previous") || target.eq_ignore_ascii_case("prev") {
        Some(Navigation::Previous)
    } else if target.eq_ignore_ascii_case("next") {
        Some(Navigation::Next)
    } else {
        target.parse().ok().map(Navigation::Page)
    }
}

fn save_artifact(dir: &Path, artifact: &Artifact) -> Result<PathBuf> {
    use anyhow::Context;

    if !dir.as_os_str().is_empty() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    }
    let path = dir.join(&artifact.file_name);
    std::fs::write(&path, &artifact.bytes)
        .with_context(|| format!("Failed to save PDF: {}", path.display()))?;
    Ok(path)
}

// Result types for MCP tools

#[derive(Debug, Serialize)]
pub struct ToolResult<T> {
    pub outcome: T,
    pub notices: Vec<String>,
    pub pages: Vec<PageSummary>,
    pub session: SessionStatus,
}

#[derive(Debug, Serialize, Deserialize, schemars::JsonSchema)]
pub struct PageSummary {
    pub page: u32,
    pub selected: bool,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Serialize)]
pub struct SelectResult {
    pub applied: u32,
}

#[tool_handler]
impl ServerHandler for PickServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Pick pages out of a PDF. Use open_pdf to load a document, select_pages to mark \
                 pages, navigate to move the page preview, reassemble to write the selected pages \
                 to reassembled.pdf, and session_status to inspect the current selection."
                    .to_string(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

pub async fn run_server(config: ControllerConfig) -> Result<()> {
    let server = PickServer::new(config);

    // Serve using stdin/stdout as a tuple
    let service = server.serve((tokio::io::stdin(), tokio::io::stdout())).await?;

    service.waiting().await?;

    Ok(())
}
