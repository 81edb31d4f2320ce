use crate::error::PickError;
use std::collections::BTreeSet;
use std::ops::Range;

/// Tracks which page positions of the loaded document are selected
#[derive(Debug, Default, Clone)]
pub struct PageCatalog {
    page_count: u32,
    selected: BTreeSet<u32>,
}

impl PageCatalog {
    pub fn new(page_count: u32) -> Self {
        Self {
            page_count,
            selected: BTreeSet::new(),
        }
    }

    /// Forget the current selection and accept positions in `0..page_count`
    pub fn reset(&mut self, page_count: u32) {
        self.page_count = page_count;
        self.selected.clear();
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    pub fn positions(&self) -> Range<u32> {
        0..self.page_count
    }

    pub fn set_selected(&mut self, position: u32, included: bool) -> Result<(), PickError> {
        if position >= self.page_count {
            return Err(PickError::OutOfRange {
                position,
                page_count: self.page_count,
            });
        }
        if included {
            self.selected.insert(position);
        } else {
            self.selected.remove(&position);
        }
        Ok(())
    }

    pub fn is_selected(&self, position: u32) -> bool {
        self.selected.contains(&position)
    }

    pub fn selected_count(&self) -> usize {
        self.selected.len()
    }

    /// Selected positions, ascending and unique
    pub fn selected_ordered(&self) -> Vec<u32> {
        self.selected.iter().copied().collect()
    }
}
