//! The presentation side of the controller: everything the user sees

use crate::backend::{Artifact, ChosenFile, ImageSurface};
use crate::error::PickError;
use serde::Serialize;

/// Controller lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Empty,
    Loading,
    Ready,
    Reassembling,
}

/// A rendered page ready for display next to its selection checkbox
#[derive(Debug, Clone)]
pub struct PagePreview {
    pub position: u32,
    pub page_count: u32,
    pub selected: bool,
    pub surface: ImageSurface,
}

impl PagePreview {
    /// 1-based page number, as shown in labels
    pub fn number(&self) -> u32 {
        self.position + 1
    }
}

/// A released-exactly-once reference to the uploaded file, such as an object
/// URL. Deliberately not `Clone`: [`View::revoke_source`] consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct SourceHandle(String);

impl SourceHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

pub trait View: Send + Sync {
    fn phase_changed(&self, _phase: Phase) {}

    fn show_page(&self, page: PagePreview);

    /// Navigation was rejected; the visible page number must go back to `current`
    fn page_number_restored(&self, _current: u32) {}

    fn notify(&self, error: &PickError);

    fn publish_source(&self, file: &ChosenFile) -> SourceHandle;

    fn revoke_source(&self, handle: SourceHandle);

    /// Hand the reassembled document to the user as a download
    fn deliver(&self, artifact: Artifact);
}
