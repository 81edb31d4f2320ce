pub mod compose;
pub mod page_tree;
pub mod pdfium;
pub mod preview;
#[cfg(test)]
pub mod testing;

pub use compose::LopdfComposer;
pub use preview::{PreviewRenderer, DEFAULT_SCALE};
