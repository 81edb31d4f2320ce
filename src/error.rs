use thiserror::Error;

#[derive(Error, Debug)]
pub enum PickError {
    #[error("Failed to load PDF: {0:#}")]
    Load(anyhow::Error),

    #[error("Page position {position} is out of range (document has {page_count} pages)")]
    OutOfRange { position: u32, page_count: u32 },

    #[error("No pages selected")]
    EmptySelection,

    #[error("Failed to build reassembled PDF: {0:#}")]
    Extract(anyhow::Error),

    #[error("No document loaded")]
    NoDocument,

    #[error("Failed to render page {number}: {cause:#}")]
    Render { number: u32, cause: anyhow::Error },

    #[error("Document from load {generation} has been replaced")]
    Stale { generation: u64 },
}

impl PickError {
    /// Message shown to the user when this error reaches the controller boundary
    pub fn user_message(&self) -> &'static str {
        match self {
            PickError::Load(_) => "Could not load the PDF. Please try another file.",
            PickError::OutOfRange { .. } => "That page does not exist in this document.",
            PickError::EmptySelection => "Please select at least one page.",
            PickError::Extract(_) => "Failed to create reassembled PDF.",
            PickError::NoDocument => "Open a PDF first.",
            PickError::Render { .. } => "Could not render the page preview.",
            PickError::Stale { .. } => "That document is no longer open.",
        }
    }
}
