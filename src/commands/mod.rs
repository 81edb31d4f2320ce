pub mod pick;
pub mod preview;
pub mod terminal;
