//! `fleetgrid-core`: interaction types for the editing grid.
//!
//! Selection, fill geometry and clipboard text. No store, no records.

pub mod clipboard;
pub mod fill;
pub mod selection;

pub use clipboard::{ClipboardError, ClipboardPort, MemoryClipboard};
pub use fill::{FillRange, FillStep};
pub use selection::{Coord, Direction, Gesture, Range, Selection, SelectionSnapshot};
