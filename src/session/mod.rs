//! Page selection and reassembly orchestration

pub mod catalog;
pub mod controller;
pub mod document;
pub mod view;

pub use controller::{
    ControllerConfig, LoadOutcome, NavigateOutcome, Navigation, PresentationMode,
    ReassembleOutcome, SessionController, SessionStatus,
};
pub use view::{PagePreview, SourceHandle, View};
