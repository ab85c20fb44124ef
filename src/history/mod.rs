//! Durable record of completed and aborted releases.

mod store;
mod theme;

pub use store::{HistoryDetail, HistoryEntry, HistoryStatus, HistoryStore, record_for};
pub use theme::{ThemeColorSnapshot, ThemeColors, ThemeOverrides, recolor, theme_color};
